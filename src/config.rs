//! Configuration file handling for ascii-recorder.
//!
//! Loads configuration from `~/.config/ascii-recorder/config.toml` or a custom path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ascii::{GlyphRamp, DEFAULT_RAMP};
use crate::capture::{CaptureSettings, RecorderSettings};
use crate::engine::EngineSource;
use crate::render_config::{RenderConfig, Rgb, SamplingMode, DEFAULT_FPS, DEFAULT_SCALE};
use crate::transcode::{CodecOptions, OutputFormat, TranscodeRequest};

/// Configuration file structure for ascii-recorder.
/// Loaded from ~/.config/ascii-recorder/config.toml (or custom path via --config).
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub render: RenderSection,
    #[serde(default)]
    pub recording: RecordingSection,
    #[serde(default)]
    pub transcode: TranscodeSection,
    #[serde(default)]
    pub engine: EngineSection,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RenderSection {
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_ramp")]
    pub ramp: String,
    #[serde(default)]
    pub background: Rgb,
    #[serde(default)]
    pub sampling: SamplingMode,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            fps: default_fps(),
            ramp: default_ramp(),
            background: Rgb::BLACK,
            sampling: SamplingMode::default(),
        }
    }
}

impl RenderSection {
    /// Build a validated render config from this section.
    ///
    /// The ramp may be a literal glyph string or a preset name
    /// (`standard`, `blocks`, `minimal`, `default`).
    pub fn to_render_config(&self) -> Result<RenderConfig, ConfigError> {
        let ramp = match GlyphRamp::preset(&self.ramp) {
            Some(preset) => preset,
            None => GlyphRamp::new(&self.ramp)?,
        };
        let config = RenderConfig {
            scale: self.scale,
            ramp,
            background: self.background,
            fps: self.fps,
            sampling: self.sampling,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RecordingSection {
    /// Milliseconds between chunk emissions from the recorder.
    #[serde(default = "default_chunk_interval_ms")]
    pub chunk_interval_ms: u64,
    #[serde(default = "default_recording_codec")]
    pub codec: String,
    /// Encoder tried when `codec` is not available. An empty string disables the fallback.
    #[serde(default = "default_fallback_codec")]
    pub fallback_codec: Option<String>,
    #[serde(default = "default_recording_bitrate")]
    pub bitrate: String,
}

impl Default for RecordingSection {
    fn default() -> Self {
        Self {
            chunk_interval_ms: default_chunk_interval_ms(),
            codec: default_recording_codec(),
            fallback_codec: default_fallback_codec(),
            bitrate: default_recording_bitrate(),
        }
    }
}

impl RecordingSection {
    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            chunk_interval: Duration::from_millis(self.chunk_interval_ms.max(1)),
        }
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            codec: self.codec.clone(),
            fallback_codec: self.fallback_codec.clone().filter(|c| !c.is_empty()),
            bitrate: self.bitrate.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct TranscodeSection {
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(flatten)]
    pub codec: CodecOptions,
}

impl TranscodeSection {
    pub fn to_request(&self) -> TranscodeRequest {
        TranscodeRequest::new(self.output_format, self.codec.clone())
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EngineSection {
    /// Engine acquisition strategies, tried in order.
    #[serde(default = "default_engine_sources")]
    pub sources: Vec<EngineSource>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            sources: default_engine_sources(),
        }
    }
}

fn default_scale() -> f64 {
    DEFAULT_SCALE
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

fn default_ramp() -> String {
    DEFAULT_RAMP.to_string()
}

fn default_chunk_interval_ms() -> u64 {
    1000
}

fn default_recording_codec() -> String {
    "libvpx-vp9".to_string()
}

fn default_fallback_codec() -> Option<String> {
    Some("libvpx".to_string())
}

fn default_recording_bitrate() -> String {
    "2M".to_string()
}

fn default_engine_sources() -> Vec<EngineSource> {
    EngineSource::defaults()
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            Self::from_toml(&content).map_err(|e| ConfigError::Parse { path, source: e })
        } else {
            Ok(Config::default())
        }
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Errors from configuration files and parameter validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Glyph ramp needs at least 2 characters, got {len}")]
    RampTooShort { len: usize },

    #[error("Scale must be in (0, 1], got {0}")]
    ScaleOutOfRange(f64),

    #[error("FPS must be between 1 and 60, got {0}")]
    FpsOutOfRange(u32),

    #[error("Invalid color '{0}', expected #rrggbb")]
    InvalidColor(String),

    #[error("Unknown sampling mode '{0}', expected 'area' or 'nearest'")]
    InvalidSampling(String),
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("ascii-recorder").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/ascii-recorder/config.toml")
        })
}

/// Commented default config written by `config init`.
pub const DEFAULT_CONFIG_TOML: &str = r##"# ascii-recorder configuration

[render]
# Fraction of the source resolution sampled per axis (0 < scale <= 1)
scale = 0.12
# Render ticks per second (1-60)
fps = 12
# Glyphs from darkest to lightest, or a preset: standard, blocks, minimal
ramp = "@%#*+=-:. "
# Background fill color
background = "#000000"
# Cell sampling: area (average) or nearest (centre pixel)
sampling = "area"

[recording]
# Milliseconds between recorded chunks
chunk_interval_ms = 1000
codec = "libvpx-vp9"
# Used when codec is unavailable; "" disables the fallback
fallback_codec = "libvpx"
bitrate = "2M"

[transcode]
# Delivery format: mp4 or mov
output_format = "mp4"
codec = "libx264"
preset = "medium"
crf = 23
pixel_format = "yuv420p"
faststart = true

# Engine acquisition, tried in order; first working engine wins.
[[engine.sources]]
kind = "env"
var = "ASCII_RECORDER_FFMPEG"

[[engine.sources]]
kind = "system"
"##;
