use crate::geometry::Resolution;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub fps: u32,
    pub video_codec: String,
    pub preset: String,
    pub crf: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub pixel_format: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            fps: 30,
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 23,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            pixel_format: "yuv420p".to_string(),
        }
    }
}

impl RenderSettings {
    pub fn with_fps(fps: u32) -> Self {
        RenderSettings {
            fps,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioSource {
    pub handle: Uuid,
    pub path: PathBuf,
    pub duration: f64,
}

impl AudioSource {
    pub fn new(path: PathBuf, duration: f64) -> Self {
        AudioSource {
            handle: Uuid::new_v4(),
            path,
            duration,
        }
    }
}

/// Symbolic clip: a source file plus the chain of edits applied to it.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipGraph {
    Source {
        handle: Uuid,
        path: PathBuf,
        duration: f64,
        size: Resolution,
    },
    Resize {
        input: Box<ClipGraph>,
        size: Resolution,
    },
    Crop {
        input: Box<ClipGraph>,
        x: u32,
        y: u32,
        size: Resolution,
    },
    Subclip {
        input: Box<ClipGraph>,
        start: f64,
        end: f64,
    },
    FadeIn {
        input: Box<ClipGraph>,
        duration: f64,
    },
    FadeOut {
        input: Box<ClipGraph>,
        duration: f64,
    },
    Concat {
        parts: Vec<ClipGraph>,
    },
    WithAudio {
        input: Box<ClipGraph>,
        audio: AudioSource,
    },
}

impl ClipGraph {
    pub fn source(path: PathBuf, duration: f64, size: Resolution) -> Self {
        ClipGraph::Source {
            handle: Uuid::new_v4(),
            path,
            duration,
            size,
        }
    }

    pub fn duration(&self) -> f64 {
        match self {
            ClipGraph::Source { duration, .. } => *duration,
            ClipGraph::Subclip { start, end, .. } => (end - start).max(0.0),
            ClipGraph::Concat { parts } => parts.iter().map(ClipGraph::duration).sum(),
            ClipGraph::Resize { input, .. }
            | ClipGraph::Crop { input, .. }
            | ClipGraph::FadeIn { input, .. }
            | ClipGraph::FadeOut { input, .. }
            | ClipGraph::WithAudio { input, .. } => input.duration(),
        }
    }

    pub fn size(&self) -> Resolution {
        match self {
            ClipGraph::Source { size, .. }
            | ClipGraph::Resize { size, .. }
            | ClipGraph::Crop { size, .. } => *size,
            // Concatenation composes onto a canvas large enough for every part.
            ClipGraph::Concat { parts } => parts.iter().fold(Resolution::new(0, 0), |acc, p| {
                let s = p.size();
                Resolution::new(acc.width.max(s.width), acc.height.max(s.height))
            }),
            ClipGraph::Subclip { input, .. }
            | ClipGraph::FadeIn { input, .. }
            | ClipGraph::FadeOut { input, .. }
            | ClipGraph::WithAudio { input, .. } => input.size(),
        }
    }

    pub fn handle(&self) -> Option<Uuid> {
        match self {
            ClipGraph::Source { handle, .. } => Some(*handle),
            _ => None,
        }
    }

    /// Outermost audio track attached to the graph, if any.
    pub fn audio(&self) -> Option<&AudioSource> {
        match self {
            ClipGraph::WithAudio { audio, .. } => Some(audio),
            ClipGraph::Resize { input, .. }
            | ClipGraph::Crop { input, .. }
            | ClipGraph::Subclip { input, .. }
            | ClipGraph::FadeIn { input, .. }
            | ClipGraph::FadeOut { input, .. } => input.audio(),
            ClipGraph::Source { .. } | ClipGraph::Concat { .. } => None,
        }
    }

    /// Number of source references, i.e. ffmpeg inputs needed to render it.
    pub fn source_count(&self) -> usize {
        match self {
            ClipGraph::Source { .. } => 1,
            ClipGraph::Concat { parts } => parts.iter().map(ClipGraph::source_count).sum(),
            ClipGraph::Resize { input, .. }
            | ClipGraph::Crop { input, .. }
            | ClipGraph::Subclip { input, .. }
            | ClipGraph::FadeIn { input, .. }
            | ClipGraph::FadeOut { input, .. }
            | ClipGraph::WithAudio { input, .. } => input.source_count(),
        }
    }
}

pub struct RenderCommand {
    pub ffmpeg_args: Vec<String>,
    pub output_path: PathBuf,
    pub filter_complex: String,
}

struct FilterWriter {
    inputs: Vec<PathBuf>,
    filters: Vec<String>,
    next_label: usize,
    fps: u32,
}

impl FilterWriter {
    fn label(&mut self) -> String {
        let label = format!("v{}", self.next_label);
        self.next_label += 1;
        label
    }

    fn chain(&mut self, input: &str, filter: String) -> String {
        let out = self.label();
        self.filters.push(format!("[{}]{}[{}]", input, filter, out));
        out
    }

    // Each source reference gets its own `-i`, so looped clips become repeated inputs
    // instead of needing split filters.
    fn emit(&mut self, node: &ClipGraph) -> String {
        match node {
            ClipGraph::Source { path, .. } => {
                let idx = self.inputs.len();
                self.inputs.push(path.clone());
                let filter = format!("fps={},setsar=1,setpts=PTS-STARTPTS", self.fps);
                self.chain(&format!("{}:v", idx), filter)
            }
            ClipGraph::Resize { input, size } => {
                let src = self.emit(input);
                self.chain(&src, format!("scale={}:{}", size.width, size.height))
            }
            ClipGraph::Crop { input, x, y, size } => {
                let src = self.emit(input);
                self.chain(
                    &src,
                    format!("crop={}:{}:{}:{}", size.width, size.height, x, y),
                )
            }
            ClipGraph::Subclip { input, start, end } => {
                let src = self.emit(input);
                self.chain(
                    &src,
                    format!(
                        "trim=start={}:end={},setpts=PTS-STARTPTS",
                        secs(*start),
                        secs(*end)
                    ),
                )
            }
            ClipGraph::FadeIn { input, duration } => {
                let src = self.emit(input);
                self.chain(&src, format!("fade=t=in:st=0:d={}", secs(*duration)))
            }
            ClipGraph::FadeOut { input, duration } => {
                let start = (input.duration() - duration).max(0.0);
                let src = self.emit(input);
                self.chain(
                    &src,
                    format!("fade=t=out:st={}:d={}", secs(start), secs(*duration)),
                )
            }
            ClipGraph::Concat { parts } => {
                if parts.len() == 1 {
                    return self.emit(&parts[0]);
                }
                let labels: Vec<String> = parts.iter().map(|p| self.emit(p)).collect();
                let out = self.label();
                let inputs: String = labels.iter().map(|l| format!("[{}]", l)).collect();
                self.filters.push(format!(
                    "{}concat=n={}:v=1:a=0[{}]",
                    inputs,
                    labels.len(),
                    out
                ));
                out
            }
            // Audio is mapped straight from its input; the video chain passes through.
            ClipGraph::WithAudio { input, .. } => self.emit(input),
        }
    }
}

fn secs(value: f64) -> String {
    format!("{:.3}", value)
}

/// Generate the ffmpeg invocation that renders `graph` to `output_path`.
pub fn build_render_command(
    graph: &ClipGraph,
    output_path: &Path,
    settings: &RenderSettings,
) -> RenderCommand {
    let mut writer = FilterWriter {
        inputs: Vec::new(),
        filters: Vec::new(),
        next_label: 0,
        fps: settings.fps,
    };

    let root = writer.emit(graph);
    writer.filters.push(format!(
        "[{}]format={}[outv]",
        root, settings.pixel_format
    ));

    let audio = graph.audio();
    let audio_index = audio.map(|a| {
        writer.inputs.push(a.path.clone());
        writer.inputs.len() - 1
    });

    let filter_complex = writer.filters.join(";");

    let mut args = Vec::new();
    for input in &writer.inputs {
        args.push("-i".to_string());
        args.push(input.to_string_lossy().to_string());
    }
    args.push("-filter_complex".to_string());
    args.push(filter_complex.clone());
    args.push("-map".to_string());
    args.push("[outv]".to_string());

    match audio_index {
        Some(idx) => {
            args.push("-map".to_string());
            args.push(format!("{}:a", idx));
            args.push("-c:a".to_string());
            args.push(settings.audio_codec.clone());
            args.push("-b:a".to_string());
            args.push(settings.audio_bitrate.clone());
        }
        None => args.push("-an".to_string()),
    }

    args.push("-c:v".to_string());
    args.push(settings.video_codec.clone());
    args.push("-preset".to_string());
    args.push(settings.preset.clone());
    args.push("-crf".to_string());
    args.push(settings.crf.to_string());
    args.push("-r".to_string());
    args.push(settings.fps.to_string());
    args.push("-t".to_string());
    args.push(secs(graph.duration()));
    args.push("-y".to_string());
    args.push(output_path.to_string_lossy().to_string());

    RenderCommand {
        ffmpeg_args: args,
        output_path: output_path.to_path_buf(),
        filter_complex,
    }
}
