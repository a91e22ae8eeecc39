use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::geometry::Resolution;
use crate::render::RenderSettings;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to open {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("render failed: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Clip operations the composition engine needs from a rendering library.
///
/// Transforming methods consume a clip and return the derived clip; nothing is
/// decoded until [`MediaBackend::render`]. Every handle returned by
/// `load_clip`/`load_audio` must be passed back to the matching `release_*`
/// method exactly once.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    type Clip: Clone + Send + Sync;
    type Audio: Send + Sync;

    async fn load_clip(&self, path: &Path) -> Result<Self::Clip, MediaError>;
    async fn load_audio(&self, path: &Path) -> Result<Self::Audio, MediaError>;

    fn clip_duration(&self, clip: &Self::Clip) -> f64;
    fn clip_size(&self, clip: &Self::Clip) -> Resolution;
    fn audio_duration(&self, audio: &Self::Audio) -> f64;

    fn resize(&self, clip: Self::Clip, size: Resolution) -> Self::Clip;
    fn crop(&self, clip: Self::Clip, x: u32, y: u32, size: Resolution) -> Self::Clip;
    fn subclip(&self, clip: Self::Clip, start: f64, end: f64) -> Self::Clip;
    fn fade_in(&self, clip: Self::Clip, duration: f64) -> Self::Clip;
    fn fade_out(&self, clip: Self::Clip, duration: f64) -> Self::Clip;
    fn concatenate(&self, clips: Vec<Self::Clip>) -> Self::Clip;
    fn with_audio(&self, clip: Self::Clip, audio: &Self::Audio) -> Self::Clip;

    /// Encode `clip` to `output` and return the duration of the written file.
    async fn render(
        &self,
        clip: &Self::Clip,
        output: &Path,
        settings: &RenderSettings,
    ) -> Result<f64, MediaError>;

    fn release_clip(&self, clip: &Self::Clip);
    fn release_audio(&self, audio: &Self::Audio);

    /// Repeat the whole clip until it covers `duration`, then cut it there.
    fn loop_to(&self, clip: Self::Clip, duration: f64) -> Self::Clip {
        let clip_duration = self.clip_duration(&clip);
        if clip_duration <= 0.0 {
            return clip;
        }
        let repeats = (duration / clip_duration) as usize + 1;
        let looped = self.concatenate(vec![clip; repeats]);
        self.subclip(looped, 0.0, duration)
    }
}
