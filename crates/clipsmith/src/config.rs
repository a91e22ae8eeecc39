use engine::geometry::{ResolutionPreset, VideoFormat};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_LLM_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_TTS_VOICE: &str = "Kore";

#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub format: VideoFormat,
    pub resolution: ResolutionPreset,
    pub fps: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        VideoSettings {
            format: VideoFormat::Horizontal,
            resolution: ResolutionPreset::P1080,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TtsSettings {
    pub voice: String,
    pub speed: f32,
}

impl Default for TtsSettings {
    fn default() -> Self {
        TtsSettings {
            voice: DEFAULT_TTS_VOICE.to_string(),
            speed: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub google_api_key: Option<String>,
    pub pexels_api_key: Option<String>,
    pub pixabay_api_key: Option<String>,
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
    pub video: VideoSettings,
    pub tts: TtsSettings,
    pub llm_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            google_api_key: None,
            pexels_api_key: None,
            pixabay_api_key: None,
            output_dir: PathBuf::from("output"),
            cache_dir: PathBuf::from("cache"),
            data_dir: PathBuf::from("data"),
            video: VideoSettings::default(),
            tts: TtsSettings::default(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
        }
    }
}

impl Config {
    /// Build from the process environment. Call `dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        Ok(Config {
            google_api_key: get("GOOGLE_API_KEY"),
            pexels_api_key: get("PEXELS_API_KEY"),
            pixabay_api_key: get("PIXABAY_API_KEY"),
            output_dir: get("OUTPUT_DIR").map(PathBuf::from).unwrap_or(defaults.output_dir),
            cache_dir: get("CACHE_DIR").map(PathBuf::from).unwrap_or(defaults.cache_dir),
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            video: VideoSettings {
                format: parse_or("DEFAULT_VIDEO_FORMAT", get("DEFAULT_VIDEO_FORMAT"), defaults.video.format)?,
                resolution: parse_or(
                    "DEFAULT_VIDEO_RESOLUTION",
                    get("DEFAULT_VIDEO_RESOLUTION"),
                    defaults.video.resolution,
                )?,
                fps: parse_or("DEFAULT_FPS", get("DEFAULT_FPS"), defaults.video.fps)?,
            },
            tts: TtsSettings {
                voice: get("TTS_VOICE").unwrap_or(defaults.tts.voice),
                speed: parse_or("TTS_SPEED", get("TTS_SPEED"), defaults.tts.speed)?,
            },
            llm_model: get("LLM_MODEL").unwrap_or(defaults.llm_model),
        })
    }

    /// Names of required keys that are not set.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.google_api_key.is_none() {
            errors.push(ConfigError::Missing("GOOGLE_API_KEY"));
        }
        if self.pexels_api_key.is_none() {
            errors.push(ConfigError::Missing("PEXELS_API_KEY"));
        }
        if self.pixabay_api_key.is_none() {
            errors.push(ConfigError::Missing("PIXABAY_API_KEY"));
        }
        errors
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.output_dir, &self.cache_dir, &self.data_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("clipsmith.db")
    }

    pub fn video_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("videos")
    }

    pub fn audio_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("audio")
    }

    pub fn trimmed_dir(&self) -> PathBuf {
        self.cache_dir.join("trimmed")
    }
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
