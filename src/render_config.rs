//! Render parameters shared by the sampler and the renderer.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ascii::GlyphRamp;
use crate::config::ConfigError;

/// Smallest accepted target frame rate.
pub const MIN_FPS: u32 = 1;

/// Largest accepted target frame rate.
pub const MAX_FPS: u32 = 60;

/// Default sampling scale (12% of source resolution).
pub const DEFAULT_SCALE: f64 = 0.12;

/// Default target frame rate.
pub const DEFAULT_FPS: u32 = 12;

/// An RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl FromStr for Rgb {
    type Err = ConfigError;

    /// Parse `#rrggbb` (the leading `#` is optional).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidColor(s.to_string());
        let hex = s.trim().strip_prefix('#').unwrap_or(s.trim());
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How a cell reads its color from the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    /// Single pixel at the cell centre.
    Nearest,
    /// Average of every pixel the cell covers.
    #[default]
    Area,
}

impl FromStr for SamplingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(SamplingMode::Nearest),
            "area" => Ok(SamplingMode::Area),
            _ => Err(ConfigError::InvalidSampling(s.to_string())),
        }
    }
}

/// Parameters for one render session.
///
/// Created from user input and replaced wholesale on every parameter
/// change; a running renderer is restarted with the new value.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Fraction of the source resolution sampled per axis, in `(0, 1]`.
    pub scale: f64,
    /// Glyphs from darkest to lightest.
    pub ramp: GlyphRamp,
    /// Fill color behind the glyphs.
    pub background: Rgb,
    /// Render ticks per second, in `[1, 60]`.
    pub fps: u32,
    pub sampling: SamplingMode,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            ramp: GlyphRamp::default(),
            background: Rgb::BLACK,
            fps: DEFAULT_FPS,
            sampling: SamplingMode::default(),
        }
    }
}

impl RenderConfig {
    /// Check the numeric invariants.
    ///
    /// The ramp is validated when it is constructed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(ConfigError::ScaleOutOfRange(self.scale));
        }
        if !(MIN_FPS..=MAX_FPS).contains(&self.fps) {
            return Err(ConfigError::FpsOutOfRange(self.fps));
        }
        Ok(())
    }

    /// Period between render ticks (`1000 / fps` milliseconds).
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.fps.clamp(MIN_FPS, MAX_FPS) as u64)
    }
}
