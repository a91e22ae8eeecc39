//! Stand-ins for the network collaborators.

use async_trait::async_trait;
use engine::learning::{Aspect, Preference};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{Pipeline, PipelineSettings};
use crate::config::Config;
use crate::db::{Database, NewGeneration};
use crate::error::{DownloadError, LlmError, ProviderError, SynthesisError};
use crate::llm::ScriptWriter;
use crate::media::ffmpeg::FfmpegBackend;
use crate::providers::{cache_path, Downloaded, MediaItem, Orientation, StockProvider};
use crate::tts::{Narration, Synthesizer, VoiceStyle};

pub const SCRIPT: &str = "HOOK (0-3 seconds):\n[Visual: steaming coffee cup]\n[Narration: Coffee fuels the world.]\n\
SEGMENT 1:\n[Visual: coffee beans roasting]\n[Narration: It starts with the roast.]\n\
OUTRO:\n[Visual: empty street at dawn]\n[Narration: Brew better tomorrow.]";

#[derive(Default)]
pub struct FakeWriter {
    pub prompts: Mutex<Vec<String>>,
    pub fail_refine: bool,
}

#[async_trait]
impl ScriptWriter for FakeWriter {
    async fn draft_script(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(SCRIPT.to_string())
    }

    async fn refine_query(&self, visual_cue: &str, hints: &[String]) -> Result<String, LlmError> {
        if self.fail_refine {
            return Err(LlmError::Empty);
        }
        self.prompts.lock().unwrap().push(format!("{} | {}", visual_cue, hints.join(";")));
        Ok(format!("refined {}", visual_cue))
    }
}

pub struct FakeProvider {
    name: &'static str,
    results: HashMap<String, Vec<&'static str>>,
    pub searches: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(name: &'static str, results: Vec<(&str, Vec<&'static str>)>) -> Self {
        FakeProvider {
            name,
            results: results.into_iter().map(|(q, ids)| (q.to_string(), ids)).collect(),
            searches: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StockProvider for FakeProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn search(
        &self,
        query: &str,
        _count: usize,
        _orientation: Option<Orientation>,
    ) -> Result<Vec<MediaItem>, ProviderError> {
        self.searches.lock().unwrap().push(query.to_string());
        Ok(self
            .results
            .get(query)
            .into_iter()
            .flatten()
            .map(|id| MediaItem {
                id: id.to_string(),
                url: format!("https://{}/{}.mp4", self.name, id),
                width: Some(1920),
                height: Some(1080),
                duration: Some(8.0),
                thumbnail: None,
                source: self.name.to_string(),
            })
            .collect())
    }

    async fn download(&self, url: &str, media_id: &str) -> Result<Downloaded, DownloadError> {
        Ok(Downloaded {
            file_path: cache_path(Path::new("cache/videos"), self.name, media_id, url)?,
            cached: false,
        })
    }
}

#[derive(Default)]
pub struct FakeSynth {
    pub calls: Mutex<Vec<(String, VoiceStyle)>>,
}

#[async_trait]
impl Synthesizer for FakeSynth {
    async fn synthesize(&self, text: &str, style: VoiceStyle) -> Result<Narration, SynthesisError> {
        self.calls.lock().unwrap().push((text.to_string(), style));
        Ok(Narration {
            audio_path: PathBuf::from("cache/audio/voiceover_test.wav"),
            duration_seconds: 9.0,
            sample_rate: 24_000,
            cached: false,
        })
    }
}

pub struct Harness {
    pub pipeline: Pipeline<FfmpegBackend>,
    pub writer: Arc<FakeWriter>,
    pub pexels: Arc<FakeProvider>,
    pub pixabay: Arc<FakeProvider>,
    pub synth: Arc<FakeSynth>,
}

pub fn harness(writer: FakeWriter, pexels: FakeProvider, pixabay: FakeProvider) -> Harness {
    let writer = Arc::new(writer);
    let pexels = Arc::new(pexels);
    let pixabay = Arc::new(pixabay);
    let synth = Arc::new(FakeSynth::default());
    let pipeline = Pipeline::new(
        Arc::new(Database::in_memory().unwrap()),
        writer.clone(),
        vec![pexels.clone(), pixabay.clone()],
        synth.clone(),
        FfmpegBackend::new(),
        PipelineSettings::from_config(&Config::default()),
    );
    Harness {
        pipeline,
        writer,
        pexels,
        pixabay,
        synth,
    }
}

pub fn empty_harness() -> Harness {
    harness(
        FakeWriter::default(),
        FakeProvider::new("pexels", vec![]),
        FakeProvider::new("pixabay", vec![]),
    )
}

pub fn preference(aspect: Aspect, key: &str, value: &str, confidence: f64) -> Preference {
    Preference {
        preference_type: aspect,
        preference_key: key.to_string(),
        preference_value: value.to_string(),
        confidence,
        updated_at: None,
    }
}

pub fn saved_generation(pipeline: &Pipeline<FfmpegBackend>) -> i64 {
    pipeline
        .db()
        .save_generation(&NewGeneration {
            topic: "coffee".to_string(),
            script_text: SCRIPT.to_string(),
            video_format: "horizontal".to_string(),
            output_path: PathBuf::from("output/coffee.mp4"),
            duration: 9.0,
            media_sources: Vec::new(),
            metadata: None,
        })
        .unwrap()
}
