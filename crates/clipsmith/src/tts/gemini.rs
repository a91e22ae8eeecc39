use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::PathBuf;
use tracing::{info, warn};

use super::{parse_sample_rate, read_wav_info, write_pcm_wav, Narration, Synthesizer, VoiceStyle};
use crate::error::SynthesisError;
use crate::gemini::GeminiClient;
use crate::media::text_digest;

pub const TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

pub struct GeminiTts {
    client: GeminiClient,
    voice: String,
    speed: f32,
    audio_dir: PathBuf,
}

impl GeminiTts {
    pub fn new(client: GeminiClient, voice: impl Into<String>, speed: f32, audio_dir: PathBuf) -> Self {
        GeminiTts {
            client,
            voice: voice.into(),
            speed,
            audio_dir,
        }
    }

    fn cache_path(&self, text: &str, style: VoiceStyle) -> PathBuf {
        let key = format!("{}|{}|{}|{}", self.voice, style, self.speed, text);
        self.audio_dir.join(format!("voiceover_{}.wav", text_digest(&key)))
    }

    fn prompt(&self, text: &str, style: VoiceStyle) -> String {
        let mut prompt = style.instruction().to_string();
        if (self.speed - 1.0).abs() > f32::EPSILON {
            prompt.push_str(&format!(" Speak at about {:.1}x your normal pace.", self.speed));
        }
        prompt.push_str("\n\nText to speak:\n");
        prompt.push_str(text);
        prompt
    }
}

#[async_trait]
impl Synthesizer for GeminiTts {
    async fn synthesize(&self, text: &str, style: VoiceStyle) -> Result<Narration, SynthesisError> {
        let audio_path = self.cache_path(text, style);

        if audio_path.exists() {
            match read_wav_info(&audio_path) {
                Ok((duration_seconds, sample_rate)) if duration_seconds > 0.0 => {
                    return Ok(Narration {
                        audio_path,
                        duration_seconds,
                        sample_rate,
                        cached: true,
                    })
                }
                Ok(_) => warn!("Regenerating empty narration {:?}", audio_path),
                Err(err) => warn!("Regenerating unreadable narration {:?}: {}", audio_path, err),
            }
        }

        let config = serde_json::json!({
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": self.voice}}
            }
        });
        let response = self
            .client
            .generate(TTS_MODEL, None, &self.prompt(text, style), Some(config))
            .await?;

        let inline = response.inline_data().ok_or(SynthesisError::NoAudio)?;
        let pcm = STANDARD.decode(inline.data.as_bytes())?;
        let sample_rate = parse_sample_rate(&inline.mime_type);

        let path = audio_path.clone();
        let duration_seconds =
            tokio::task::spawn_blocking(move || write_pcm_wav(&path, &pcm, sample_rate))
                .await
                .map_err(|e| SynthesisError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        info!(
            "Synthesized {:.1}s of narration ({} Hz) to {:?}",
            duration_seconds, sample_rate, audio_path
        );
        Ok(Narration {
            audio_path,
            duration_seconds,
            sample_rate,
            cached: false,
        })
    }
}
