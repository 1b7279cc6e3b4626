//! Closed, validated render configuration.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Which edge of the frame survives when a tall source is cropped to 16:9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropAnchor {
    #[default]
    Center,
    Top,
    Bottom,
}

impl CropAnchor {
    pub fn token(self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::Top => "keep_top",
            Self::Bottom => "keep_bottom",
        }
    }
}

impl FromStr for CropAnchor {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().replace('-', "_").as_str() {
            "center" | "centre" => Ok(Self::Center),
            "keep_top" | "top" => Ok(Self::Top),
            "keep_bottom" | "bottom" => Ok(Self::Bottom),
            _ => Err(Error::configuration(format!(
                "unknown crop position '{raw}' (expected center, keep_top or keep_bottom)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropMode {
    #[default]
    None,
    /// Largest centered square.
    Square,
    /// 16:9, at most 1920x1080.
    Hd(CropAnchor),
    /// 16:9, at most 3840x2160.
    Uhd(CropAnchor),
}

impl CropMode {
    pub fn is_none(self) -> bool {
        self == Self::None
    }

    /// Token used in output file names, `None` when no crop is applied.
    pub fn token(self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Square => Some("instagram".to_string()),
            Self::Hd(anchor) => Some(format!("hd_{}", anchor.token())),
            Self::Uhd(anchor) => Some(format!("uhd_{}", anchor.token())),
        }
    }
}

impl FromStr for CropMode {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let normalized = raw.to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "none" | "" => return Ok(Self::None),
            "square" | "instagram" => return Ok(Self::Square),
            _ => {}
        }
        if let Some(anchor) = normalized.strip_prefix("uhd_") {
            return Ok(Self::Uhd(anchor.parse()?));
        }
        if let Some(anchor) = normalized.strip_prefix("hd_") {
            return Ok(Self::Hd(anchor.parse()?));
        }
        Err(Error::configuration(format!("unknown crop mode '{raw}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayMode {
    #[default]
    None,
    Date,
    Frame,
}

impl OverlayMode {
    pub fn is_none(self) -> bool {
        self == Self::None
    }

    pub fn token(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Date => Some("date"),
            Self::Frame => Some("frame"),
        }
    }
}

impl FromStr for OverlayMode {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "date" => Ok(Self::Date),
            "frame" => Ok(Self::Frame),
            _ => Err(Error::configuration(format!("unknown overlay mode '{raw}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Quality {
    /// H.264 MP4
    #[default]
    Default,
    /// Apple ProRes 422
    Prores,
    /// Apple ProRes 422 HQ
    Proreshq,
    /// Animated GIF with a generated palette
    Gif,
}

impl Quality {
    pub fn token(self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::Prores => Some("prores"),
            Self::Proreshq => Some("proreshq"),
            Self::Gif => Some("gif"),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Default => "mp4",
            Self::Prores | Self::Proreshq => "mov",
            Self::Gif => "gif",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.token().unwrap_or("default"))
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "prores" => Ok(Self::Prores),
            "proreshq" => Ok(Self::Proreshq),
            "gif" => Ok(Self::Gif),
            _ => Err(Error::configuration(format!(
                "unknown quality '{raw}' (expected default, prores, proreshq or gif)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub fps: f64,
    pub crop: CropMode,
    pub overlay: OverlayMode,
    pub quality: Quality,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            fps: 30.0,
            crop: CropMode::None,
            overlay: OverlayMode::None,
            quality: Quality::Default,
            max_width: None,
            max_height: None,
        }
    }
}

impl RenderOptions {
    pub fn validate(&self) -> Result<()> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(Error::configuration(format!(
                "fps must be a positive number, got {}",
                self.fps
            )));
        }
        if self.max_width == Some(0) {
            return Err(Error::configuration("max width must be a positive integer"));
        }
        if self.max_height == Some(0) {
            return Err(Error::configuration(
                "max height must be a positive integer",
            ));
        }
        if !self.crop.is_none() && (self.max_width.is_some() || self.max_height.is_some()) {
            return Err(Error::configuration(
                "max width/height can only be used when no crop mode is selected",
            ));
        }
        Ok(())
    }

    pub fn has_max_bounds(&self) -> bool {
        self.max_width.is_some() || self.max_height.is_some()
    }
}

/// Parses `WxH` or `W:H`. Anything else yields `(None, None)`.
pub fn parse_resolution(raw: &str) -> (Option<u32>, Option<u32>) {
    let separator = if raw.contains('x') { 'x' } else { ':' };
    let mut parts = raw.split(separator);
    let (Some(width), Some(height), None) = (parts.next(), parts.next(), parts.next()) else {
        return (None, None);
    };
    match (width.trim().parse::<u32>(), height.trim().parse::<u32>()) {
        (Ok(width), Ok(height)) => (Some(width), Some(height)),
        _ => (None, None),
    }
}
