pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::SynthesisError;
use engine::geometry::ParseEnumError;

pub use gemini::GeminiTts;

pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;
pub const DEFAULT_WORDS_PER_MINUTE: u32 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceStyle {
    #[default]
    Neutral,
    Energetic,
    Calm,
    Professional,
}

impl VoiceStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceStyle::Neutral => "neutral",
            VoiceStyle::Energetic => "energetic",
            VoiceStyle::Calm => "calm",
            VoiceStyle::Professional => "professional",
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            VoiceStyle::Neutral => "Speak in a clear, neutral tone.",
            VoiceStyle::Energetic => {
                "Speak with energy and enthusiasm, perfect for engaging content."
            }
            VoiceStyle::Calm => "Speak in a calm, relaxed, and soothing manner.",
            VoiceStyle::Professional => "Speak in a professional, authoritative tone.",
        }
    }
}

impl fmt::Display for VoiceStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoiceStyle {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neutral" => Ok(VoiceStyle::Neutral),
            "energetic" => Ok(VoiceStyle::Energetic),
            "calm" => Ok(VoiceStyle::Calm),
            "professional" => Ok(VoiceStyle::Professional),
            _ => Err(ParseEnumError::new("voice style", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Narration {
    pub audio_path: PathBuf,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub cached: bool,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, style: VoiceStyle) -> Result<Narration, SynthesisError>;
}

/// Rough spoken length of `text` at `words_per_minute`.
pub fn estimate_speech_duration(text: &str, words_per_minute: u32) -> f64 {
    if words_per_minute == 0 {
        return 0.0;
    }
    let words = text.split_whitespace().count() as f64;
    words / words_per_minute as f64 * 60.0
}

/// `audio/L16;codec=pcm;rate=24000` → 24000.
pub fn parse_sample_rate(mime_type: &str) -> u32 {
    mime_type
        .split(';')
        .find_map(|param| param.trim().strip_prefix("rate="))
        .and_then(|rate| rate.trim().parse().ok())
        .filter(|rate| *rate > 0)
        .unwrap_or(DEFAULT_SAMPLE_RATE)
}

/// Write little-endian 16-bit PCM as a mono WAV. Returns the duration in seconds.
/// A payload without a single whole sample is `NoAudio`.
pub fn write_pcm_wav(path: &Path, pcm: &[u8], sample_rate: u32) -> Result<f64, SynthesisError> {
    if pcm.len() < 2 {
        return Err(SynthesisError::NoAudio);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
    }
    writer.finalize()?;
    Ok((pcm.len() / 2) as f64 / sample_rate as f64)
}

/// Duration and sample rate of an existing WAV file.
pub fn read_wav_info(path: &Path) -> Result<(f64, u32), SynthesisError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let frames = reader.duration() as f64;
    Ok((frames / spec.sample_rate as f64, spec.sample_rate))
}
