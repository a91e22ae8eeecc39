use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use engine::compose::{Composer, CompositionError, CompositionRequest, Transition};
use engine::geometry::{Resolution, ResolutionPreset, VideoFormat};
use engine::media::{MediaBackend, MediaError};
use engine::render::RenderSettings;

#[derive(Debug, Clone)]
struct FakeClip {
    duration: f64,
    size: Resolution,
    history: Vec<String>,
}

impl FakeClip {
    fn with(mut self, op: String) -> Self {
        self.history.push(op);
        self
    }

    fn describe(&self) -> String {
        self.history.join(" > ")
    }
}

struct FakeAudio {
    handle: usize,
    duration: f64,
}

#[derive(Default)]
struct FakeBackend {
    clips: HashMap<PathBuf, (f64, Resolution)>,
    audio: HashMap<PathBuf, f64>,
    fail_render: bool,
    next_handle: Mutex<usize>,
    open: Mutex<HashSet<usize>>,
    rendered: Mutex<Option<FakeClip>>,
    settings: Mutex<Option<RenderSettings>>,
}

impl FakeBackend {
    fn open_handles(&self) -> usize {
        self.open.lock().unwrap().len()
    }

    fn acquire(&self) -> usize {
        let mut next = self.next_handle.lock().unwrap();
        *next += 1;
        self.open.lock().unwrap().insert(*next);
        *next
    }

    fn rendered(&self) -> FakeClip {
        self.rendered.lock().unwrap().clone().expect("nothing rendered")
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    type Clip = FakeClip;
    type Audio = FakeAudio;

    async fn load_clip(&self, path: &Path) -> Result<FakeClip, MediaError> {
        let (duration, size) = self.clips.get(path).copied().ok_or_else(|| MediaError::Open {
            path: path.to_path_buf(),
            reason: "unknown clip".to_string(),
        })?;
        let handle = self.acquire();
        Ok(FakeClip {
            duration,
            size,
            history: vec![format!("load#{}", handle)],
        })
    }

    async fn load_audio(&self, path: &Path) -> Result<FakeAudio, MediaError> {
        let duration = *self.audio.get(path).ok_or_else(|| MediaError::Open {
            path: path.to_path_buf(),
            reason: "unknown audio".to_string(),
        })?;
        Ok(FakeAudio {
            handle: self.acquire(),
            duration,
        })
    }

    fn clip_duration(&self, clip: &FakeClip) -> f64 {
        clip.duration
    }

    fn clip_size(&self, clip: &FakeClip) -> Resolution {
        clip.size
    }

    fn audio_duration(&self, audio: &FakeAudio) -> f64 {
        audio.duration
    }

    fn resize(&self, clip: FakeClip, size: Resolution) -> FakeClip {
        FakeClip { size, ..clip }.with(format!("resize {}", size))
    }

    fn crop(&self, clip: FakeClip, x: u32, y: u32, size: Resolution) -> FakeClip {
        FakeClip { size, ..clip }.with(format!("crop {},{} {}", x, y, size))
    }

    fn subclip(&self, clip: FakeClip, start: f64, end: f64) -> FakeClip {
        FakeClip {
            duration: end - start,
            ..clip
        }
        .with(format!("subclip {:.2}-{:.2}", start, end))
    }

    fn fade_in(&self, clip: FakeClip, duration: f64) -> FakeClip {
        clip.with(format!("fadein {:.1}", duration))
    }

    fn fade_out(&self, clip: FakeClip, duration: f64) -> FakeClip {
        clip.with(format!("fadeout {:.1}", duration))
    }

    fn concatenate(&self, clips: Vec<FakeClip>) -> FakeClip {
        let duration = clips.iter().map(|c| c.duration).sum();
        let size = clips.first().map(|c| c.size).unwrap_or(Resolution::new(0, 0));
        let parts: Vec<String> = clips.iter().map(FakeClip::describe).collect();
        FakeClip {
            duration,
            size,
            history: vec![format!("concat[{}]", parts.join(" | "))],
        }
    }

    fn with_audio(&self, clip: FakeClip, audio: &FakeAudio) -> FakeClip {
        clip.with(format!("audio#{}", audio.handle))
    }

    async fn render(
        &self,
        clip: &FakeClip,
        _output: &Path,
        settings: &RenderSettings,
    ) -> Result<f64, MediaError> {
        if self.fail_render {
            return Err(MediaError::Render("encoder exploded".to_string()));
        }
        *self.rendered.lock().unwrap() = Some(clip.clone());
        *self.settings.lock().unwrap() = Some(settings.clone());
        Ok(clip.duration)
    }

    fn release_clip(&self, clip: &FakeClip) {
        let handle = clip.history[0]
            .strip_prefix("load#")
            .and_then(|h| h.parse::<usize>().ok())
            .expect("released a derived clip");
        assert!(self.open.lock().unwrap().remove(&handle), "double release");
    }

    fn release_audio(&self, audio: &FakeAudio) {
        assert!(self.open.lock().unwrap().remove(&audio.handle), "double release");
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    backend: FakeBackend,
}

impl Fixture {
    fn new() -> Self {
        Fixture {
            dir: tempfile::tempdir().unwrap(),
            backend: FakeBackend::default(),
        }
    }

    fn touch(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"").unwrap();
        path
    }

    fn clip(&mut self, name: &str, duration: f64, size: Resolution) -> PathBuf {
        let path = self.touch(name);
        self.backend.clips.insert(path.clone(), (duration, size));
        path
    }

    fn narration(&mut self, duration: f64) -> PathBuf {
        let path = self.touch("narration.wav");
        self.backend.audio.insert(path.clone(), duration);
        path
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("out.mp4")
    }
}

const HD: Resolution = Resolution::new(1920, 1080);

#[tokio::test]
async fn clip_matching_narration_is_untouched() {
    let mut fx = Fixture::new();
    let clip = fx.clip("a.mp4", 6.0, HD);
    let audio = fx.narration(6.0);

    let request = CompositionRequest::new(vec![clip], fx.output()).with_narration(audio);
    let output = Composer::new(&fx.backend).compose(&request).await.unwrap();

    assert_eq!(output.duration, 6.0);
    assert_eq!(output.resolution, HD);
    assert_eq!(output.resolution.to_string(), "1920x1080");
    let rendered = fx.backend.rendered().describe();
    assert_eq!(rendered, "concat[load#1] > audio#2");
    assert_eq!(fx.backend.open_handles(), 0);
}

#[tokio::test]
async fn clips_are_split_evenly_across_narration() {
    let mut fx = Fixture::new();
    let clips = vec![
        fx.clip("a.mp4", 2.0, HD),
        fx.clip("b.mp4", 10.0, HD),
        fx.clip("c.mp4", 1.5, HD),
    ];
    let audio = fx.narration(6.0);

    let request = CompositionRequest::new(clips, fx.output()).with_narration(audio);
    let output = Composer::new(&fx.backend).compose(&request).await.unwrap();

    assert!((output.duration - 6.0).abs() < 1e-9);
    assert_eq!(output.clips_used, 3);
    let rendered = fx.backend.rendered().describe();
    // a fits exactly, b is truncated from the start, c is looped then cut.
    assert!(rendered.contains("load#1 |"), "{}", rendered);
    assert!(rendered.contains("load#2 > subclip 0.00-2.00"), "{}", rendered);
    assert!(rendered.contains("concat[load#3 | load#3] > subclip 0.00-2.00"), "{}", rendered);
    assert_eq!(fx.backend.open_handles(), 0);
}

#[tokio::test]
async fn four_by_three_source_crops_top_and_bottom() {
    let mut fx = Fixture::new();
    let clip = fx.clip("a.mp4", 3.0, Resolution::new(1440, 1080));

    let request = CompositionRequest::new(vec![clip], fx.output());
    let output = Composer::new(&fx.backend).compose(&request).await.unwrap();

    assert_eq!(output.resolution, HD);
    let rendered = fx.backend.rendered();
    assert_eq!(rendered.size, HD);
    let described = rendered.describe();
    assert!(described.contains("resize 1920x1440 > crop 0,180 1920x1080"), "{}", described);
}

#[tokio::test]
async fn vertical_format_swaps_target() {
    let mut fx = Fixture::new();
    let clip = fx.clip("a.mp4", 3.0, HD);

    let request = CompositionRequest::new(vec![clip], fx.output())
        .with_format(VideoFormat::Vertical, ResolutionPreset::P720);
    let output = Composer::new(&fx.backend).compose(&request).await.unwrap();

    assert_eq!(output.resolution, Resolution::new(720, 1280));
    assert!(fx.backend.rendered().describe().contains("crop 777,0 720x1280"));
}

#[tokio::test]
async fn missing_clips_are_skipped() {
    let mut fx = Fixture::new();
    let clip = fx.clip("a.mp4", 4.0, HD);
    let missing = fx.dir.path().join("gone.mp4");

    let request = CompositionRequest::new(vec![missing, clip], fx.output());
    let output = Composer::new(&fx.backend).compose(&request).await.unwrap();

    assert_eq!(output.clips_used, 1);
    assert_eq!(output.clips_skipped, 1);
}

#[tokio::test]
async fn no_existing_clips_is_an_error() {
    let fx = Fixture::new();
    let request = CompositionRequest::new(vec![fx.dir.path().join("gone.mp4")], fx.output());
    let err = Composer::new(&fx.backend).compose(&request).await.unwrap_err();
    assert!(matches!(err, CompositionError::NoValidClips));

    let empty = CompositionRequest::new(Vec::new(), fx.output());
    let err = Composer::new(&fx.backend).compose(&empty).await.unwrap_err();
    assert!(matches!(err, CompositionError::NoClips));
}

#[tokio::test]
async fn missing_narration_keeps_clip_lengths() {
    let mut fx = Fixture::new();
    let clips = vec![fx.clip("a.mp4", 2.0, HD), fx.clip("b.mp4", 10.0, HD)];

    let request = CompositionRequest::new(clips, fx.output())
        .with_narration(fx.dir.path().join("missing.wav"));
    let output = Composer::new(&fx.backend).compose(&request).await.unwrap();

    assert_eq!(output.duration, 12.0);
    assert!(!fx.backend.rendered().describe().contains("audio#"));
}

#[tokio::test]
async fn empty_narration_is_ignored() {
    let mut fx = Fixture::new();
    let clips = vec![fx.clip("a.mp4", 2.0, HD), fx.clip("b.mp4", 3.0, HD)];
    let audio = fx.narration(0.0);

    let request = CompositionRequest::new(clips, fx.output()).with_narration(audio);
    let output = Composer::new(&fx.backend).compose(&request).await.unwrap();

    assert_eq!(output.duration, 5.0);
    let rendered = fx.backend.rendered().describe();
    assert!(!rendered.contains("subclip"), "{}", rendered);
    assert!(!rendered.contains("audio#"), "{}", rendered);
    assert_eq!(fx.backend.open_handles(), 0);
}

#[tokio::test]
async fn fade_skips_outer_edges() {
    let mut fx = Fixture::new();
    let clips = vec![
        fx.clip("a.mp4", 2.0, HD),
        fx.clip("b.mp4", 2.0, HD),
        fx.clip("c.mp4", 2.0, HD),
    ];

    let request = CompositionRequest::new(clips, fx.output())
        .with_transition(Transition::Fade, 0.5)
        .with_fps(24);
    Composer::new(&fx.backend).compose(&request).await.unwrap();

    assert_eq!(
        fx.backend.rendered().describe(),
        "concat[load#1 > fadeout 0.5 | load#2 > fadein 0.5 > fadeout 0.5 | load#3 > fadein 0.5]"
    );
    assert_eq!(fx.backend.settings.lock().unwrap().as_ref().unwrap().fps, 24);
}

#[tokio::test]
async fn single_clip_never_fades_and_crossfade_is_plain() {
    let mut fx = Fixture::new();
    let clip = fx.clip("a.mp4", 2.0, HD);
    let request = CompositionRequest::new(vec![clip.clone()], fx.output())
        .with_transition(Transition::Fade, 0.5);
    Composer::new(&fx.backend).compose(&request).await.unwrap();
    assert_eq!(fx.backend.rendered().describe(), "concat[load#1]");

    let other = fx.clip("b.mp4", 2.0, HD);
    let request = CompositionRequest::new(vec![clip, other], fx.output())
        .with_transition(Transition::Crossfade, 0.5);
    Composer::new(&fx.backend).compose(&request).await.unwrap();
    assert!(!fx.backend.rendered().describe().contains("fade"));
}

#[tokio::test]
async fn handles_are_released_when_render_fails() {
    let mut fx = Fixture::new();
    fx.backend.fail_render = true;
    let clips = vec![fx.clip("a.mp4", 2.0, HD), fx.clip("b.mp4", 2.0, HD)];
    let audio = fx.narration(4.0);

    let request = CompositionRequest::new(clips, fx.output()).with_narration(audio);
    let err = Composer::new(&fx.backend).compose(&request).await.unwrap_err();

    assert!(matches!(err, CompositionError::Media(MediaError::Render(_))));
    assert_eq!(fx.backend.open_handles(), 0);
}

#[tokio::test]
async fn handles_are_released_when_a_later_clip_fails_to_load() {
    let mut fx = Fixture::new();
    let good = fx.clip("a.mp4", 2.0, HD);
    // Exists on disk but the backend cannot decode it.
    let corrupt = fx.touch("corrupt.mp4");

    let request = CompositionRequest::new(vec![good, corrupt], fx.output());
    let err = Composer::new(&fx.backend).compose(&request).await.unwrap_err();

    assert!(matches!(err, CompositionError::Media(MediaError::Open { .. })));
    assert_eq!(fx.backend.open_handles(), 0);
}
