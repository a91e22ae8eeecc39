//! Topic → script → footage → narration → video → generation record.
//!
//! Each stage is a method so the tool API can drive them one at a time; the
//! `generate` method chains them for the CLI.

use engine::compose::{output_path_for, Composer, CompositionError, CompositionOutput, CompositionRequest, Transition};
use engine::geometry::VideoFormat;
use engine::learning::{Aspect, Insights, LearningEngine, LearningSummary, Preference, PromptType};
use engine::media::MediaBackend;
use engine::script::{has_markers, parse_script, Script};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, VideoSettings};
use crate::db::{Database, MediaSource, NewGeneration, NewRating};
use crate::error::{ErrorKind, LlmError, StoreError, SynthesisError, ToolError};
use crate::llm::{script_prompt, ScriptWriter};
use crate::media::compute_file_checksum;
use crate::providers::{Orientation, StockProvider};
use crate::tts::{Narration, Synthesizer, VoiceStyle};
use engine::geometry::ParseEnumError;

pub const SEARCH_COUNT: usize = 5;
pub const GENERATION_NOT_FOUND: &str = "Generation not found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One script prompt enhanced with every surfaced preference.
    #[default]
    Single,
    /// Stage-specific enhancement plus LLM query refinement.
    Sequential,
}

impl Mode {
    fn script_prompt_type(&self) -> PromptType {
        match self {
            Mode::Single => PromptType::General,
            Mode::Sequential => PromptType::Script,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Single => "single",
            Mode::Sequential => "sequential",
        })
    }
}

impl FromStr for Mode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Mode::Single),
            "sequential" => Ok(Mode::Sequential),
            _ => Err(ParseEnumError::new("mode", s)),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Script drafting failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Script contains no [Visual: ...] segments")]
    EmptyScript,

    #[error("No stock footage found for any visual cue")]
    NoMedia,

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ToolError for PipelineError {
    fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Llm(err) => err.kind(),
            PipelineError::EmptyScript => ErrorKind::Llm,
            PipelineError::NoMedia => ErrorKind::Provider,
            PipelineError::Synthesis(err) => err.kind(),
            PipelineError::Composition(err) => err.kind(),
            PipelineError::Store(err) => err.kind(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub output_dir: PathBuf,
    pub trimmed_dir: PathBuf,
    pub video: VideoSettings,
    pub voice_style: VoiceStyle,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        PipelineSettings {
            output_dir: config.output_dir.clone(),
            trimmed_dir: config.trimmed_dir(),
            video: config.video.clone(),
            voice_style: VoiceStyle::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftedScript {
    pub text: String,
    pub script: Script,
    pub drafted: bool,
}

/// A script segment resolved to a downloaded clip.
#[derive(Debug, Clone, Serialize)]
pub struct SourcedClip {
    pub segment_index: usize,
    pub source: MediaSource,
    pub duration: Option<f64>,
    pub cached: bool,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub topic: String,
    pub output_name: String,
    pub format: Option<VideoFormat>,
    pub mode: Mode,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub generation_id: i64,
    pub output_path: PathBuf,
    pub duration: f64,
    pub clips_used: usize,
    pub segments_skipped: usize,
    pub narration: Option<Narration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RatingOutcome {
    Saved { rating_id: i64, insights: Insights },
    GenerationNotFound { generation_id: i64 },
}

/// Transition implied by learned pacing preferences.
pub fn transition_for(pacing: &[Preference]) -> Transition {
    if pacing.iter().any(|p| p.preference_value == "moderate") {
        Transition::Fade
    } else {
        Transition::None
    }
}

/// Voice style implied by learned audio preferences, falling back to `default`.
pub fn voice_style_for(audio: &[Preference], default: VoiceStyle) -> VoiceStyle {
    if audio.iter().any(|p| p.preference_value == "clearer_speech") {
        VoiceStyle::Professional
    } else {
        default
    }
}

pub struct Pipeline<B: MediaBackend> {
    db: Arc<Database>,
    writer: Arc<dyn ScriptWriter>,
    providers: Vec<Arc<dyn StockProvider>>,
    synthesizer: Arc<dyn Synthesizer>,
    backend: B,
    settings: PipelineSettings,
}

impl<B: MediaBackend> Pipeline<B> {
    /// `providers` are searched in order; the first with an unused match wins.
    pub fn new(
        db: Arc<Database>,
        writer: Arc<dyn ScriptWriter>,
        providers: Vec<Arc<dyn StockProvider>>,
        synthesizer: Arc<dyn Synthesizer>,
        backend: B,
        settings: PipelineSettings,
    ) -> Self {
        Pipeline {
            db,
            writer,
            providers,
            synthesizer,
            backend,
            settings,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn synthesizer(&self) -> &dyn Synthesizer {
        self.synthesizer.as_ref()
    }

    pub fn provider(&self, name: &str) -> Option<&dyn StockProvider> {
        self.providers
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .map(|p| p.as_ref())
    }

    fn learning(&self) -> LearningEngine<'_, Database> {
        LearningEngine::new(self.db.as_ref())
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerationReport> {
        // Reject unusable names before any network call.
        output_path_for(&self.settings.output_dir, &request.output_name)?;
        let format = request.format.unwrap_or(self.settings.video.format);
        info!(
            "Generating {} video ({} mode) for {:?}",
            format, request.mode, request.topic
        );

        let drafted = self.draft_script(&request.topic, request.mode).await?;
        let clips = self.source_media(&drafted.script, format, request.mode).await?;
        let narration = self.synthesize_narration(&drafted.script).await?;
        let output = self
            .compose(&clips, narration.as_ref(), format, &request.output_name)
            .await?;
        let generation_id = self
            .record_generation(&request.topic, &drafted.text, format, request.mode, &output, &clips)
            .await?;

        Ok(GenerationReport {
            generation_id,
            output_path: output.output_path,
            duration: output.duration,
            clips_used: output.clips_used,
            segments_skipped: drafted.script.segments.len() - clips.len(),
            narration,
        })
    }

    /// Use `topic` verbatim if it is already a marked-up script, otherwise draft one.
    pub async fn draft_script(&self, topic: &str, mode: Mode) -> Result<DraftedScript> {
        let (text, drafted) = if has_markers(topic) {
            info!("Input already contains visual markers; using it as the script");
            (topic.to_string(), false)
        } else {
            let prompt = self
                .learning()
                .enhance_prompt(&script_prompt(topic), mode.script_prompt_type())?;
            (self.writer.draft_script(&prompt).await?, true)
        };

        let script = parse_script(&text);
        if script.is_empty() {
            return Err(PipelineError::EmptyScript);
        }
        info!("Script has {} segment(s)", script.segments.len());
        Ok(DraftedScript {
            text,
            script,
            drafted,
        })
    }

    /// Download one clip per visual cue. Cues without a usable match are skipped.
    pub async fn source_media(
        &self,
        script: &Script,
        format: VideoFormat,
        mode: Mode,
    ) -> Result<Vec<SourcedClip>> {
        let orientation = Orientation::for_format(format);
        let hints: Vec<String> = match mode {
            Mode::Single => Vec::new(),
            Mode::Sequential => self
                .learning()
                .surfaced(Aspect::Visuals)?
                .iter()
                .filter_map(|p| p.hint().map(str::to_string))
                .collect(),
        };

        let mut used = HashSet::new();
        let mut clips = Vec::new();

        for (index, segment) in script.segments.iter().enumerate() {
            let query = match mode {
                Mode::Single => segment.visual.clone(),
                Mode::Sequential => match self.writer.refine_query(&segment.visual, &hints).await {
                    Ok(query) => query,
                    Err(err) => {
                        warn!("Query refinement failed for {:?}: {}", segment.visual, err);
                        segment.visual.clone()
                    }
                },
            };

            match self.fetch_clip(&query, orientation, &mut used).await {
                Some((source, duration, cached)) => clips.push(SourcedClip {
                    segment_index: index,
                    source,
                    duration,
                    cached,
                }),
                None => warn!("No footage for segment {} ({:?}); skipping", index + 1, query),
            }
        }

        if clips.is_empty() {
            return Err(PipelineError::NoMedia);
        }
        Ok(clips)
    }

    async fn fetch_clip(
        &self,
        query: &str,
        orientation: Orientation,
        used: &mut HashSet<(String, String)>,
    ) -> Option<(MediaSource, Option<f64>, bool)> {
        for provider in &self.providers {
            let items = match provider.search(query, SEARCH_COUNT, Some(orientation)).await {
                Ok(items) => items,
                Err(err) => {
                    warn!("{} search failed for {:?}: {}", provider.name(), query, err);
                    continue;
                }
            };

            let Some(item) = items
                .into_iter()
                .find(|item| !used.contains(&(provider.name().to_string(), item.id.clone())))
            else {
                continue;
            };

            match provider.download(&item.url, &item.id).await {
                Ok(downloaded) => {
                    used.insert((provider.name().to_string(), item.id.clone()));
                    let source = MediaSource {
                        provider: provider.name().to_string(),
                        media_id: item.id,
                        query: query.to_string(),
                        path: downloaded.file_path,
                    };
                    return Some((source, item.duration, downloaded.cached));
                }
                Err(err) => warn!("{} download of {} failed: {}", provider.name(), item.id, err),
            }
        }
        None
    }

    /// Synthesize the script's narration. Returns `None` when the script has none.
    pub async fn synthesize_narration(&self, script: &Script) -> Result<Option<Narration>> {
        let text = script.narration_text();
        if text.is_empty() {
            warn!("Script has no narration; composing without a voiceover");
            return Ok(None);
        }
        let style = voice_style_for(
            &self.learning().surfaced(Aspect::Audio)?,
            self.settings.voice_style,
        );
        let narration = self.synthesizer.synthesize(&text, style).await?;
        info!(
            "Narration: {:.1}s ({} style, cached: {})",
            narration.duration_seconds, style, narration.cached
        );
        Ok(Some(narration))
    }

    pub async fn compose(
        &self,
        clips: &[SourcedClip],
        narration: Option<&Narration>,
        format: VideoFormat,
        output_name: &str,
    ) -> Result<CompositionOutput> {
        let transition = transition_for(&self.learning().surfaced(Aspect::Pacing)?);
        let paths = clips.iter().map(|c| c.source.path.clone()).collect();
        let mut request = CompositionRequest::new(paths, output_path_for(&self.settings.output_dir, output_name)?)
            .with_format(format, self.settings.video.resolution)
            .with_transition(transition, engine::compose::DEFAULT_TRANSITION_DURATION)
            .with_fps(self.settings.video.fps);
        if let Some(narration) = narration {
            request = request.with_narration(&narration.audio_path);
        }

        let output = Composer::new(&self.backend).compose(&request).await?;
        info!(
            "Composed {:?}: {:.1}s at {} from {} clip(s)",
            output.output_path, output.duration, output.resolution, output.clips_used
        );
        Ok(output)
    }

    pub async fn record_generation(
        &self,
        topic: &str,
        script_text: &str,
        format: VideoFormat,
        mode: Mode,
        output: &CompositionOutput,
        clips: &[SourcedClip],
    ) -> Result<i64> {
        let checksum = checksum_or_warn(&output.output_path).await;
        let metadata = serde_json::json!({
            "mode": mode,
            "resolution": output.resolution.to_string(),
            "clips_used": output.clips_used,
            "clips_skipped": output.clips_skipped,
            "checksum": checksum,
        });

        let id = self.db.save_generation(&NewGeneration {
            topic: topic.to_string(),
            script_text: script_text.to_string(),
            video_format: format.to_string(),
            output_path: output.output_path.clone(),
            duration: output.duration,
            media_sources: clips.iter().map(|c| c.source.clone()).collect(),
            metadata: Some(metadata),
        })?;
        info!("Recorded generation {}", id);
        Ok(id)
    }

    /// Store a rating and re-run preference analysis. An unknown generation is
    /// reported in the outcome rather than as an error.
    pub fn submit_rating(&self, rating: &NewRating) -> Result<RatingOutcome> {
        let Some(generation) = self.db.get_generation(rating.generation_id)? else {
            warn!("Rating for unknown generation {}", rating.generation_id);
            return Ok(RatingOutcome::GenerationNotFound {
                generation_id: rating.generation_id,
            });
        };
        let rating_id = self.db.save_rating(rating)?;
        info!(
            "Saved rating {} ({}/5) for generation {} ({:?})",
            rating_id,
            rating.overall.get(),
            generation.id,
            generation.topic
        );
        let insights = self.learning().analyze()?;
        Ok(RatingOutcome::Saved { rating_id, insights })
    }

    /// Read-only overview of ratings and surfaced preferences.
    pub fn learning_summary(&self) -> Result<LearningSummary> {
        Ok(self.learning().learning_summary()?)
    }

    pub fn improvement_suggestions(&self, generation_id: i64) -> Result<Vec<String>> {
        if !self.db.generation_exists(generation_id)? {
            return Ok(vec![GENERATION_NOT_FOUND.to_string()]);
        }
        Ok(self.learning().improvement_suggestions()?)
    }
}

async fn checksum_or_warn(path: &Path) -> Option<String> {
    match compute_file_checksum(path).await {
        Ok(checksum) => Some(checksum),
        Err(err) => {
            warn!("Could not checksum {:?}: {}", path, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::db::Score;
    use crate::media::ffmpeg::FfmpegBackend;
    use async_trait::async_trait;
    use engine::geometry::Resolution;

    #[tokio::test]
    async fn marked_up_input_skips_the_writer() {
        let h = empty_harness();
        let drafted = h.pipeline.draft_script(SCRIPT, Mode::Single).await.unwrap();
        assert!(!drafted.drafted);
        assert_eq!(drafted.script.segments.len(), 3);
        assert!(h.writer.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn escaping_output_name_is_rejected_before_drafting() {
        let h = empty_harness();
        let request = GenerateRequest {
            topic: "why coffee matters".to_string(),
            output_name: "../../outside".to_string(),
            format: None,
            mode: Mode::Single,
        };
        let err = h.pipeline.generate(&request).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Composition(CompositionError::InvalidOutputName(_))
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(h.writer.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn drafting_prompt_carries_stage_preferences() {
        let h = empty_harness();
        h.pipeline
            .db()
            .update_preference(&preference(Aspect::Script, "style", "more_engaging", 0.6))
            .unwrap();
        h.pipeline
            .db()
            .update_preference(&preference(Aspect::Visuals, "quality", "higher_quality", 0.6))
            .unwrap();

        h.pipeline.draft_script("why coffee matters", Mode::Sequential).await.unwrap();
        h.pipeline.draft_script("why coffee matters", Mode::Single).await.unwrap();

        let prompts = h.writer.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("Create a short-form video script about: why coffee matters"));
        assert!(prompts[0].contains("Focus on creating highly engaging, hook-driven content"));
        assert!(!prompts[0].contains("Prioritize high-quality"));
        assert!(prompts[1].contains("Prioritize high-quality, professional-looking footage"));
    }

    #[tokio::test]
    async fn reply_without_markers_is_an_empty_script() {
        struct Chatty;
        #[async_trait]
        impl ScriptWriter for Chatty {
            async fn draft_script(&self, _: &str) -> std::result::Result<String, LlmError> {
                Ok("Sure! Here is a great idea for a video.".to_string())
            }
            async fn refine_query(&self, cue: &str, _: &[String]) -> std::result::Result<String, LlmError> {
                Ok(cue.to_string())
            }
        }
        let pipeline = Pipeline::new(
            Arc::new(Database::in_memory().unwrap()),
            Arc::new(Chatty),
            Vec::new(),
            Arc::new(FakeSynth::default()),
            FfmpegBackend::new(),
            PipelineSettings::from_config(&Config::default()),
        );
        let err = pipeline.draft_script("coffee", Mode::Single).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyScript));
    }

    #[tokio::test]
    async fn pexels_first_then_pixabay_without_reusing_clips() {
        let h = harness(
            FakeWriter::default(),
            FakeProvider::new(
                "pexels",
                vec![("steaming coffee cup", vec!["1", "2"]), ("coffee beans roasting", vec!["1"])],
            ),
            FakeProvider::new("pixabay", vec![("coffee beans roasting", vec!["77"])]),
        );
        let script = parse_script(SCRIPT);
        let clips = h
            .pipeline
            .source_media(&script, VideoFormat::Horizontal, Mode::Single)
            .await
            .unwrap();

        let picked: Vec<(usize, &str, &str)> = clips
            .iter()
            .map(|c| (c.segment_index, c.source.provider.as_str(), c.source.media_id.as_str()))
            .collect();
        // Pexels 1 is already used by the hook, so the roast falls back to Pixabay;
        // nothing matches the outro and it is skipped.
        assert_eq!(picked, vec![(0, "pexels", "1"), (1, "pixabay", "77")]);
        assert_eq!(clips[1].source.path, PathBuf::from("cache/videos/pixabay/pixabay_77.mp4"));
        assert_eq!(h.pixabay.searches.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn no_footage_at_all_fails() {
        let h = empty_harness();
        let err = h
            .pipeline
            .source_media(&parse_script(SCRIPT), VideoFormat::Vertical, Mode::Single)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoMedia));
    }

    #[tokio::test]
    async fn sequential_mode_refines_queries_with_visual_hints() {
        let h = harness(
            FakeWriter::default(),
            FakeProvider::new("pexels", vec![("refined steaming coffee cup", vec!["5"])]),
            FakeProvider::new("pixabay", vec![]),
        );
        h.pipeline
            .db()
            .update_preference(&preference(Aspect::Visuals, "quality", "higher_quality", 0.7))
            .unwrap();

        let clips = h
            .pipeline
            .source_media(&parse_script(SCRIPT), VideoFormat::Horizontal, Mode::Sequential)
            .await
            .unwrap();
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].source.query, "refined steaming coffee cup");
        let prompts = h.writer.prompts.lock().unwrap();
        assert_eq!(
            prompts[0],
            "steaming coffee cup | Prioritize high-quality, professional-looking footage"
        );
        assert_eq!(h.pexels.searches.lock().unwrap()[1], "refined coffee beans roasting");
    }

    #[tokio::test]
    async fn failed_refinement_falls_back_to_the_cue() {
        let h = harness(
            FakeWriter {
                fail_refine: true,
                ..FakeWriter::default()
            },
            FakeProvider::new("pexels", vec![("empty street at dawn", vec!["9"])]),
            FakeProvider::new("pixabay", vec![]),
        );
        let clips = h
            .pipeline
            .source_media(&parse_script(SCRIPT), VideoFormat::Horizontal, Mode::Sequential)
            .await
            .unwrap();
        assert_eq!(clips[0].segment_index, 2);
        assert_eq!(clips[0].source.query, "empty street at dawn");
    }

    #[tokio::test]
    async fn audio_preference_switches_to_professional_voice() {
        let h = empty_harness();
        let script = parse_script(SCRIPT);

        h.pipeline.synthesize_narration(&script).await.unwrap();
        h.pipeline
            .db()
            .update_preference(&preference(Aspect::Audio, "style", "clearer_speech", 0.6))
            .unwrap();
        let narration = h.pipeline.synthesize_narration(&script).await.unwrap().unwrap();
        assert_eq!(narration.duration_seconds, 9.0);

        let calls = h.synth.calls.lock().unwrap();
        assert_eq!(
            calls[0].0,
            "Coffee fuels the world. It starts with the roast. Brew better tomorrow."
        );
        assert_eq!(calls[0].1, VoiceStyle::Neutral);
        assert_eq!(calls[1].1, VoiceStyle::Professional);
    }

    #[tokio::test]
    async fn script_without_narration_has_no_voiceover() {
        let h = empty_harness();
        let script = parse_script("[Visual: quiet forest]");
        assert!(h.pipeline.synthesize_narration(&script).await.unwrap().is_none());
        assert!(h.synth.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn pacing_preference_selects_fade() {
        assert_eq!(transition_for(&[]), Transition::None);
        assert_eq!(
            transition_for(&[preference(Aspect::Pacing, "speed", "moderate", 0.55)]),
            Transition::Fade
        );
    }

    #[tokio::test]
    async fn generation_record_includes_checksum() {
        let h = empty_harness();
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("coffee.mp4");
        std::fs::write(&video, b"not really a video").unwrap();

        let output = CompositionOutput {
            output_path: video.clone(),
            duration: 9.0,
            resolution: Resolution::new(1920, 1080),
            clips_used: 1,
            clips_skipped: 0,
        };
        let clips = vec![SourcedClip {
            segment_index: 0,
            source: MediaSource {
                provider: "pexels".to_string(),
                media_id: "1".to_string(),
                query: "steaming coffee cup".to_string(),
                path: PathBuf::from("cache/videos/pexels/pexels_1.mp4"),
            },
            duration: Some(8.0),
            cached: true,
        }];

        let id = h
            .pipeline
            .record_generation("coffee", SCRIPT, VideoFormat::Horizontal, Mode::Sequential, &output, &clips)
            .await
            .unwrap();
        let generation = h.pipeline.db().get_generation(id).unwrap().unwrap();
        let metadata = generation.metadata.unwrap();
        assert_eq!(metadata["mode"], "sequential");
        assert_eq!(metadata["resolution"], "1920x1080");
        assert_eq!(metadata["checksum"].as_str().map(str::len), Some(64));
        assert_eq!(generation.media_sources, vec![clips[0].source.clone()]);
    }

    #[test]
    fn rating_an_unknown_generation_is_reported() {
        let h = empty_harness();
        let outcome = h
            .pipeline
            .submit_rating(&NewRating::new(42, Score::new(4).unwrap()))
            .unwrap();
        assert!(matches!(outcome, RatingOutcome::GenerationNotFound { generation_id: 42 }));
        assert_eq!(
            h.pipeline.improvement_suggestions(42).unwrap(),
            vec![GENERATION_NOT_FOUND.to_string()]
        );
    }

    #[test]
    fn third_low_rating_learns_preferences() {
        let h = empty_harness();
        let id = saved_generation(&h.pipeline);
        let low = Score::new(2).unwrap();

        for round in 1..=3 {
            let rating = NewRating::new(id, low).with_score(Aspect::Pacing, low);
            let outcome = h.pipeline.submit_rating(&rating).unwrap();
            let RatingOutcome::Saved { insights, .. } = outcome else {
                panic!("rating was not saved");
            };
            assert_eq!(insights.total_ratings, round);
            assert_eq!(insights.recommendations.is_empty(), round < 3);
        }

        let pacing = h.pipeline.learning().surfaced(Aspect::Pacing).unwrap();
        assert_eq!(pacing.len(), 1);
        assert!((pacing[0].confidence - 0.65).abs() < 1e-9);
        assert_eq!(transition_for(&pacing), Transition::Fade);
        assert_eq!(
            h.pipeline.improvement_suggestions(id).unwrap(),
            vec!["Experiment with different transition durations".to_string()]
        );
    }

    #[test]
    fn modes_parse() {
        assert_eq!("Sequential".parse::<Mode>(), Ok(Mode::Sequential));
        assert!("parallel".parse::<Mode>().is_err());
    }
}
