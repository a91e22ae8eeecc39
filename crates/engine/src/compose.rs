//! Audio-led composition: normalize clip geometry, fit clips to the narration
//! length, apply transitions, concatenate, attach narration and render.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::geometry::{
    fill_plan, target_resolution, ParseEnumError, Resolution, ResolutionPreset, VideoFormat,
};
use crate::media::{MediaBackend, MediaError};
use crate::render::RenderSettings;

pub const DEFAULT_TRANSITION_DURATION: f64 = 0.5;

/// Durations closer than this are treated as equal.
const DURATION_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    #[default]
    None,
    /// Concatenated like `None`; clips are not altered individually.
    Crossfade,
    Fade,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::None => "none",
            Transition::Crossfade => "crossfade",
            Transition::Fade => "fade",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transition {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Transition::None),
            "crossfade" => Ok(Transition::Crossfade),
            "fade" => Ok(Transition::Fade),
            _ => Err(ParseEnumError::new("transition", s)),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("No video clips provided")]
    NoClips,

    #[error("No valid video clips could be loaded")]
    NoValidClips,

    #[error("Video composition failed: {0}")]
    Media(#[from] MediaError),

    #[error("Invalid output name {0:?}: expected a plain file name")]
    InvalidOutputName(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionRequest {
    pub clips: Vec<PathBuf>,
    pub narration_audio: Option<PathBuf>,
    pub output_path: PathBuf,
    #[serde(default)]
    pub format: VideoFormat,
    #[serde(default)]
    pub resolution: ResolutionPreset,
    #[serde(default)]
    pub transition: Transition,
    #[serde(default = "default_transition_duration")]
    pub transition_duration: f64,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_transition_duration() -> f64 {
    DEFAULT_TRANSITION_DURATION
}

fn default_fps() -> u32 {
    30
}

impl CompositionRequest {
    pub fn new(clips: Vec<PathBuf>, output_path: PathBuf) -> Self {
        CompositionRequest {
            clips,
            narration_audio: None,
            output_path,
            format: VideoFormat::default(),
            resolution: ResolutionPreset::default(),
            transition: Transition::default(),
            transition_duration: DEFAULT_TRANSITION_DURATION,
            fps: default_fps(),
        }
    }

    pub fn with_narration(mut self, audio: impl Into<PathBuf>) -> Self {
        self.narration_audio = Some(audio.into());
        self
    }

    pub fn with_format(mut self, format: VideoFormat, resolution: ResolutionPreset) -> Self {
        self.format = format;
        self.resolution = resolution;
        self
    }

    pub fn with_transition(mut self, transition: Transition, duration: f64) -> Self {
        self.transition = transition;
        self.transition_duration = duration;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionOutput {
    pub output_path: PathBuf,
    pub duration: f64,
    pub resolution: Resolution,
    pub clips_used: usize,
    pub clips_skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DurationFit {
    Keep,
    Truncate { to: f64 },
    Loop { to: f64 },
}

pub fn fit_duration(clip_duration: f64, target: f64) -> DurationFit {
    if (clip_duration - target).abs() <= DURATION_TOLERANCE {
        DurationFit::Keep
    } else if clip_duration > target {
        DurationFit::Truncate { to: target }
    } else {
        DurationFit::Loop { to: target }
    }
}

/// Even split of the narration across clips. Segment narration lengths are not
/// weighted.
pub fn per_clip_budget(total: f64, clip_count: usize) -> Option<f64> {
    if clip_count == 0 || total <= 0.0 {
        return None;
    }
    Some(total / clip_count as f64)
}

/// Releases every loaded handle when dropped, whichever way `compose` exits.
struct LoadedMedia<'a, B: MediaBackend> {
    backend: &'a B,
    clips: Vec<B::Clip>,
    audio: Option<B::Audio>,
}

impl<'a, B: MediaBackend> LoadedMedia<'a, B> {
    fn new(backend: &'a B) -> Self {
        LoadedMedia {
            backend,
            clips: Vec::new(),
            audio: None,
        }
    }
}

impl<'a, B: MediaBackend> Drop for LoadedMedia<'a, B> {
    fn drop(&mut self) {
        for clip in &self.clips {
            self.backend.release_clip(clip);
        }
        if let Some(audio) = &self.audio {
            self.backend.release_audio(audio);
        }
        debug!(
            "Released {} clip handle(s){}",
            self.clips.len(),
            if self.audio.is_some() { " and narration audio" } else { "" }
        );
    }
}

pub struct Composer<'a, B: MediaBackend> {
    backend: &'a B,
}

impl<'a, B: MediaBackend> Composer<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Composer { backend }
    }

    pub async fn compose(
        &self,
        request: &CompositionRequest,
    ) -> Result<CompositionOutput, CompositionError> {
        if request.clips.is_empty() {
            return Err(CompositionError::NoClips);
        }

        let target = target_resolution(request.format, request.resolution);
        let mut loaded = LoadedMedia::new(self.backend);
        let mut clips = Vec::with_capacity(request.clips.len());
        let mut skipped = 0;

        for path in &request.clips {
            if !path.exists() {
                warn!("Skipping missing clip {:?}", path);
                skipped += 1;
                continue;
            }
            let clip = self.backend.load_clip(path).await?;
            loaded.clips.push(clip.clone());
            clips.push(self.fill_resize(clip, target));
        }

        if clips.is_empty() {
            return Err(CompositionError::NoValidClips);
        }

        if let Some(audio_path) = &request.narration_audio {
            if audio_path.exists() {
                loaded.audio = Some(self.backend.load_audio(audio_path).await?);
            } else {
                warn!(
                    "Narration audio {:?} not found, composing video only",
                    audio_path
                );
            }
        }

        let narration_duration = match loaded
            .audio
            .as_ref()
            .map(|audio| self.backend.audio_duration(audio))
        {
            Some(total) if total <= 0.0 => {
                warn!("Narration audio is empty, composing video only");
                None
            }
            other => other,
        };

        if let Some(total) = narration_duration {
            clips = self.reconcile(clips, total);
        }

        if request.transition == Transition::Fade {
            clips = self.apply_fades(clips, request.transition_duration);
        }

        let clip_count = clips.len();
        let mut sequence = self.backend.concatenate(clips);

        if let (Some(audio), Some(total)) = (loaded.audio.as_ref(), narration_duration) {
            sequence = self.fit(sequence, total);
            sequence = self.backend.with_audio(sequence, audio);
        }

        let settings = RenderSettings::with_fps(request.fps);
        let duration = self
            .backend
            .render(&sequence, &request.output_path, &settings)
            .await?;

        info!(
            "Composed {} clip(s) into {:?} ({:.2}s, {})",
            clip_count, request.output_path, duration, target
        );

        Ok(CompositionOutput {
            output_path: request.output_path.clone(),
            duration,
            resolution: target,
            clips_used: clip_count,
            clips_skipped: skipped,
        })
    }

    fn fill_resize(&self, clip: B::Clip, target: Resolution) -> B::Clip {
        let size = self.backend.clip_size(&clip);
        if size == target {
            return clip;
        }
        let plan = fill_plan(size, target);
        let resized = self.backend.resize(clip, plan.scaled);
        if !plan.needs_crop() {
            return resized;
        }
        self.backend.crop(resized, plan.crop_x, plan.crop_y, target)
    }

    fn fit(&self, clip: B::Clip, target: f64) -> B::Clip {
        match fit_duration(self.backend.clip_duration(&clip), target) {
            DurationFit::Keep => clip,
            DurationFit::Truncate { to } => self.backend.subclip(clip, 0.0, to),
            DurationFit::Loop { to } => self.backend.loop_to(clip, to),
        }
    }

    fn reconcile(&self, clips: Vec<B::Clip>, total: f64) -> Vec<B::Clip> {
        let Some(budget) = per_clip_budget(total, clips.len()) else {
            return clips;
        };
        debug!("Fitting {} clip(s) to {:.3}s each", clips.len(), budget);
        clips.into_iter().map(|clip| self.fit(clip, budget)).collect()
    }

    fn apply_fades(&self, clips: Vec<B::Clip>, duration: f64) -> Vec<B::Clip> {
        let count = clips.len();
        if count < 2 {
            return clips;
        }
        clips
            .into_iter()
            .enumerate()
            .map(|(i, clip)| {
                let clip = if i > 0 {
                    self.backend.fade_in(clip, duration)
                } else {
                    clip
                };
                if i < count - 1 {
                    self.backend.fade_out(clip, duration)
                } else {
                    clip
                }
            })
            .collect()
    }
}

/// A name usable as a single file name: no separators, no `..`.
pub fn is_plain_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty() && !name.contains("..") && !name.contains(['/', '\\', '\0'])
}

/// Output path for a named composition inside `output_dir`.
pub fn output_path_for(output_dir: &Path, output_name: &str) -> Result<PathBuf, CompositionError> {
    if !is_plain_name(output_name) {
        return Err(CompositionError::InvalidOutputName(output_name.to_string()));
    }
    Ok(output_dir.join(format!("{}.mp4", output_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_truncates_loops_and_keeps() {
        assert_eq!(fit_duration(10.0, 2.0), DurationFit::Truncate { to: 2.0 });
        assert_eq!(fit_duration(1.5, 2.0), DurationFit::Loop { to: 2.0 });
        assert_eq!(fit_duration(2.0, 2.0), DurationFit::Keep);
        assert_eq!(fit_duration(2.0004, 2.0), DurationFit::Keep);
    }

    #[test]
    fn budget_splits_evenly() {
        assert_eq!(per_clip_budget(6.0, 3), Some(2.0));
        assert_eq!(per_clip_budget(6.0, 0), None);
        assert_eq!(per_clip_budget(0.0, 2), None);
    }

    #[test]
    fn transition_parses_case_insensitively() {
        assert_eq!("Fade".parse::<Transition>(), Ok(Transition::Fade));
        assert_eq!("crossfade".parse::<Transition>(), Ok(Transition::Crossfade));
        assert!("wipe".parse::<Transition>().is_err());
    }

    #[test]
    fn output_names_stay_inside_the_output_dir() {
        let dir = Path::new("/srv/clipsmith/output");
        assert_eq!(
            output_path_for(dir, "ocean_short").unwrap(),
            PathBuf::from("/srv/clipsmith/output/ocean_short.mp4")
        );
        for name in ["../../../tmp/pwned", "nested/name", "..", "a\\b", "  ", ""] {
            assert!(
                matches!(output_path_for(dir, name), Err(CompositionError::InvalidOutputName(_))),
                "{:?} accepted",
                name
            );
        }
    }

    #[test]
    fn request_defaults() {
        let req: CompositionRequest = serde_json::from_value(serde_json::json!({
            "clips": ["a.mp4"],
            "narration_audio": null,
            "output_path": "out.mp4"
        }))
        .unwrap();
        assert_eq!(req.transition, Transition::None);
        assert_eq!(req.transition_duration, DEFAULT_TRANSITION_DURATION);
        assert_eq!(req.format, VideoFormat::Horizontal);
        assert_eq!(req.fps, 30);
    }
}
