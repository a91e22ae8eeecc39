use async_trait::async_trait;
use engine::compose::{is_plain_name, output_path_for, CompositionError};
use engine::geometry::Resolution;
use engine::media::{MediaBackend, MediaError};
use engine::render::{build_render_command, AudioSource, ClipGraph, RenderSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub has_video: bool,
    pub has_audio: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProbeOutput {
    format: Option<FormatInfo>,
    #[serde(default)]
    streams: Vec<StreamInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

fn parse_frame_rate(raw: &str) -> Option<f64> {
    let (num, den) = raw.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    (den > 0.0).then(|| num / den)
}

impl ProbeOutput {
    fn into_info(self) -> MediaInfo {
        let duration = self
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let video = self
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));

        let (width, height, fps) = match video {
            Some(vs) => (
                vs.width.unwrap_or(0),
                vs.height.unwrap_or(0),
                vs.r_frame_rate
                    .as_deref()
                    .or(vs.avg_frame_rate.as_deref())
                    .and_then(parse_frame_rate)
                    .unwrap_or(30.0),
            ),
            None => (0, 0, 0.0),
        };

        MediaInfo {
            duration,
            width,
            height,
            fps,
            has_video: video.is_some(),
            has_audio: self
                .streams
                .iter()
                .any(|s| s.codec_type.as_deref() == Some("audio")),
        }
    }
}

pub struct FFmpegWrapper;

impl FFmpegWrapper {
    pub async fn probe(media_path: &Path) -> Result<MediaInfo, MediaError> {
        let open_err = |reason: String| MediaError::Open {
            path: media_path.to_path_buf(),
            reason,
        };

        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration:stream=codec_type,width,height,r_frame_rate,avg_frame_rate",
                "-of",
                "json",
            ])
            .arg(media_path)
            .output()
            .await
            .map_err(|e| open_err(format!("failed to execute ffprobe ({}). Make sure FFmpeg is installed.", e)))?;

        if !output.status.success() {
            return Err(open_err(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| open_err(format!("failed to parse ffprobe output: {}", e)))?;
        Ok(probe.into_info())
    }

    pub async fn run(args: &[String]) -> Result<(), MediaError> {
        debug!("ffmpeg {}", args.join(" "));
        let output = Command::new("ffmpeg")
            .args(args)
            .output()
            .await
            .map_err(|e| MediaError::Render(format!("failed to execute ffmpeg ({}). Make sure FFmpeg is installed.", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(MediaError::Render(
                tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
            ));
        }
        Ok(())
    }
}

/// `MediaBackend` that builds a `ClipGraph` and renders it with one ffmpeg call.
///
/// Nothing stays open between calls, so the handle registry exists to keep the
/// load/release pairing checkable.
#[derive(Default)]
pub struct FfmpegBackend {
    open: Mutex<HashSet<Uuid>>,
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_handles(&self) -> usize {
        self.open.lock().map(|open| open.len()).unwrap_or(0)
    }

    fn register(&self, handle: Uuid) {
        if let Ok(mut open) = self.open.lock() {
            open.insert(handle);
        }
    }

    fn release(&self, handle: Uuid) {
        let removed = self
            .open
            .lock()
            .map(|mut open| open.remove(&handle))
            .unwrap_or(false);
        if !removed {
            warn!("Released unknown media handle {}", handle);
        }
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    type Clip = ClipGraph;
    type Audio = AudioSource;

    async fn load_clip(&self, path: &Path) -> Result<ClipGraph, MediaError> {
        let info = FFmpegWrapper::probe(path).await?;
        if !info.has_video {
            return Err(MediaError::Open {
                path: path.to_path_buf(),
                reason: "no video stream".to_string(),
            });
        }
        let clip = ClipGraph::source(
            path.to_path_buf(),
            info.duration,
            Resolution::new(info.width, info.height),
        );
        if let Some(handle) = clip.handle() {
            self.register(handle);
        }
        Ok(clip)
    }

    async fn load_audio(&self, path: &Path) -> Result<AudioSource, MediaError> {
        let info = FFmpegWrapper::probe(path).await?;
        if !info.has_audio {
            return Err(MediaError::Open {
                path: path.to_path_buf(),
                reason: "no audio stream".to_string(),
            });
        }
        let audio = AudioSource::new(path.to_path_buf(), info.duration);
        self.register(audio.handle);
        Ok(audio)
    }

    fn clip_duration(&self, clip: &ClipGraph) -> f64 {
        clip.duration()
    }

    fn clip_size(&self, clip: &ClipGraph) -> Resolution {
        clip.size()
    }

    fn audio_duration(&self, audio: &AudioSource) -> f64 {
        audio.duration
    }

    fn resize(&self, clip: ClipGraph, size: Resolution) -> ClipGraph {
        ClipGraph::Resize {
            input: Box::new(clip),
            size,
        }
    }

    fn crop(&self, clip: ClipGraph, x: u32, y: u32, size: Resolution) -> ClipGraph {
        ClipGraph::Crop {
            input: Box::new(clip),
            x,
            y,
            size,
        }
    }

    fn subclip(&self, clip: ClipGraph, start: f64, end: f64) -> ClipGraph {
        ClipGraph::Subclip {
            input: Box::new(clip),
            start,
            end,
        }
    }

    fn fade_in(&self, clip: ClipGraph, duration: f64) -> ClipGraph {
        ClipGraph::FadeIn {
            input: Box::new(clip),
            duration,
        }
    }

    fn fade_out(&self, clip: ClipGraph, duration: f64) -> ClipGraph {
        ClipGraph::FadeOut {
            input: Box::new(clip),
            duration,
        }
    }

    fn concatenate(&self, clips: Vec<ClipGraph>) -> ClipGraph {
        ClipGraph::Concat { parts: clips }
    }

    fn with_audio(&self, clip: ClipGraph, audio: &AudioSource) -> ClipGraph {
        ClipGraph::WithAudio {
            input: Box::new(clip),
            audio: audio.clone(),
        }
    }

    async fn render(
        &self,
        clip: &ClipGraph,
        output: &Path,
        settings: &RenderSettings,
    ) -> Result<f64, MediaError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let command = build_render_command(clip, output, settings);
        info!(
            "Rendering {} input(s) to {:?}",
            clip.source_count() + usize::from(clip.audio().is_some()),
            output
        );
        FFmpegWrapper::run(&command.ffmpeg_args).await?;

        let rendered = FFmpegWrapper::probe(output).await?;
        Ok(rendered.duration)
    }

    fn release_clip(&self, clip: &ClipGraph) {
        if let Some(handle) = clip.handle() {
            self.release(handle);
        }
    }

    fn release_audio(&self, audio: &AudioSource) {
        self.release(audio.handle);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrimOutput {
    pub file_path: PathBuf,
    pub duration: f64,
}

/// Cut `[start, end)` out of `video` into `cache_dir/trimmed/<name>.mp4`.
/// `end` is clamped to the clip's duration.
pub async fn trim(
    backend: &FfmpegBackend,
    video: &Path,
    start: f64,
    end: f64,
    trimmed_dir: &Path,
    output_name: Option<&str>,
    settings: &RenderSettings,
) -> Result<TrimOutput, CompositionError> {
    let name = match output_name {
        Some(name) => name.to_string(),
        None => format!(
            "trimmed_{}",
            video
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|stem| is_plain_name(stem))
                .unwrap_or("clip")
        ),
    };
    let output = output_path_for(trimmed_dir, &name)?;

    let clip = backend.load_clip(video).await?;
    let source_duration = clip.duration();
    let end = end.min(source_duration);
    let start = start.max(0.0);

    let result = if end <= start {
        Err(MediaError::Render(format!(
            "empty trim range {:.2}-{:.2} for {:.2}s clip",
            start, end, source_duration
        )))
    } else {
        let trimmed = backend.subclip(clip.clone(), start, end);
        backend
            .render(&trimmed, &output, settings)
            .await
            .map(|duration| TrimOutput {
                file_path: output,
                duration,
            })
    };

    backend.release_clip(&clip);
    Ok(result?)
}
