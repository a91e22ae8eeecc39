use axum::{extract::State, response::Json, routing::post, Router};
use engine::compose::{output_path_for, Composer, CompositionOutput, CompositionRequest, Transition};
use engine::geometry::{ResolutionPreset, VideoFormat};
use engine::render::RenderSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::SharedPipeline;
use crate::error::{ErrorKind, ToolResult};
use crate::media::ffmpeg::{trim, TrimOutput};
use crate::tts::{estimate_speech_duration, Narration, VoiceStyle, DEFAULT_WORDS_PER_MINUTE};

#[derive(Debug, Deserialize)]
pub struct VoiceoverRequest {
    pub text: String,
    #[serde(default)]
    pub voice_style: Option<VoiceStyle>,
}

#[derive(Debug, Serialize)]
pub struct VoiceoverResponse {
    #[serde(flatten)]
    pub narration: Narration,
    pub voice_style: VoiceStyle,
    pub estimated_duration: f64,
}

#[derive(Debug, Deserialize)]
pub struct ComposeVideoRequest {
    pub clips: Vec<PathBuf>,
    #[serde(default)]
    pub narration_audio: Option<PathBuf>,
    #[serde(default = "default_output_name")]
    pub output_name: String,
    #[serde(default)]
    pub format: Option<VideoFormat>,
    #[serde(default)]
    pub resolution: Option<ResolutionPreset>,
    #[serde(default)]
    pub transition: Transition,
    #[serde(default)]
    pub transition_duration: Option<f64>,
}

fn default_output_name() -> String {
    "generated_video".to_string()
}

#[derive(Debug, Deserialize)]
pub struct TrimVideoRequest {
    pub video_path: PathBuf,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub output_name: Option<String>,
}

pub fn router(pipeline: SharedPipeline) -> Router {
    Router::new()
        .route("/generate_voiceover", post(generate_voiceover))
        .route("/compose_video", post(compose_video))
        .route("/trim_video", post(trim_video))
        .with_state(pipeline)
}

async fn generate_voiceover(
    State(pipeline): State<SharedPipeline>,
    Json(req): Json<VoiceoverRequest>,
) -> ToolResult<VoiceoverResponse> {
    if req.text.trim().is_empty() {
        return ToolResult::error(ErrorKind::InvalidInput, "text must not be empty");
    }
    let style = req.voice_style.unwrap_or(pipeline.settings().voice_style);
    pipeline
        .synthesizer()
        .synthesize(&req.text, style)
        .await
        .map(|narration| VoiceoverResponse {
            narration,
            voice_style: style,
            estimated_duration: estimate_speech_duration(&req.text, DEFAULT_WORDS_PER_MINUTE),
        })
        .into()
}

async fn compose_video(
    State(pipeline): State<SharedPipeline>,
    Json(req): Json<ComposeVideoRequest>,
) -> ToolResult<CompositionOutput> {
    let settings = pipeline.settings();
    let output_path = match output_path_for(&settings.output_dir, &req.output_name) {
        Ok(path) => path,
        Err(err) => return Err::<CompositionOutput, _>(err).into(),
    };
    let mut request = CompositionRequest::new(req.clips, output_path)
        .with_format(
            req.format.unwrap_or(settings.video.format),
            req.resolution.unwrap_or(settings.video.resolution),
        )
        .with_transition(
            req.transition,
            req.transition_duration
                .unwrap_or(engine::compose::DEFAULT_TRANSITION_DURATION),
        )
        .with_fps(settings.video.fps);
    if let Some(audio) = req.narration_audio {
        request = request.with_narration(audio);
    }

    Composer::new(pipeline.backend()).compose(&request).await.into()
}

async fn trim_video(
    State(pipeline): State<SharedPipeline>,
    Json(req): Json<TrimVideoRequest>,
) -> ToolResult<TrimOutput> {
    if req.end <= req.start || req.start < 0.0 {
        return ToolResult::error(
            ErrorKind::InvalidInput,
            format!("invalid trim range {}-{}", req.start, req.end),
        );
    }
    let settings = pipeline.settings();
    trim(
        pipeline.backend(),
        &req.video_path,
        req.start,
        req.end,
        &settings.trimmed_dir,
        req.output_name.as_deref(),
        &RenderSettings::with_fps(settings.video.fps),
    )
    .await
    .into()
}
