use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        ParseEnumError {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    /// 16:9
    #[default]
    Horizontal,
    /// 9:16
    Vertical,
}

impl VideoFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoFormat::Horizontal => "horizontal",
            VideoFormat::Vertical => "vertical",
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoFormat {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "horizontal" => Ok(VideoFormat::Horizontal),
            "vertical" => Ok(VideoFormat::Vertical),
            _ => Err(ParseEnumError::new("video format", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResolutionPreset {
    #[serde(rename = "720p")]
    P720,
    #[default]
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "4k")]
    P4k,
}

impl ResolutionPreset {
    /// Horizontal baseline for the preset.
    pub fn baseline(&self) -> Resolution {
        match self {
            ResolutionPreset::P720 => Resolution::new(1280, 720),
            ResolutionPreset::P1080 => Resolution::new(1920, 1080),
            ResolutionPreset::P4k => Resolution::new(3840, 2160),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionPreset::P720 => "720p",
            ResolutionPreset::P1080 => "1080p",
            ResolutionPreset::P4k => "4k",
        }
    }
}

impl FromStr for ResolutionPreset {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "720p" => Ok(ResolutionPreset::P720),
            "1080p" => Ok(ResolutionPreset::P1080),
            "4k" => Ok(ResolutionPreset::P4k),
            _ => Err(ParseEnumError::new("resolution preset", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Resolution { width, height }
    }

    pub fn swapped(&self) -> Self {
        Resolution::new(self.height, self.width)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

pub fn target_resolution(format: VideoFormat, preset: ResolutionPreset) -> Resolution {
    let baseline = preset.baseline();
    match format {
        VideoFormat::Horizontal => baseline,
        VideoFormat::Vertical => baseline.swapped(),
    }
}

/// Scale-then-center-crop plan that covers `target` with no letterboxing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillPlan {
    pub scaled: Resolution,
    pub crop_x: u32,
    pub crop_y: u32,
    pub target: Resolution,
}

impl FillPlan {
    pub fn needs_crop(&self) -> bool {
        self.scaled != self.target
    }
}

pub fn fill_plan(source: Resolution, target: Resolution) -> FillPlan {
    if source.is_empty() || target.is_empty() {
        return FillPlan {
            scaled: target,
            crop_x: 0,
            crop_y: 0,
            target,
        };
    }

    let (sw, sh) = (source.width as u64, source.height as u64);
    let (tw, th) = (target.width as u64, target.height as u64);

    // Wider than the target: height drives the scale and the sides overflow.
    let scaled = if sw * th > tw * sh {
        Resolution::new((sw * th / sh) as u32, target.height)
    } else {
        Resolution::new(target.width, (th.max(tw * sh / sw)) as u32)
    };

    FillPlan {
        scaled,
        crop_x: (scaled.width - target.width) / 2,
        crop_y: (scaled.height - target.height) / 2,
        target,
    }
}
