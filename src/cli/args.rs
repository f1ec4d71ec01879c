//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ascii_recorder::render_config::{Rgb, SamplingMode, MAX_FPS, MIN_FPS};
use ascii_recorder::transcode::OutputFormat;

/// Parse and validate the sampling scale (0 < scale <= 1)
fn parse_scale(s: &str) -> Result<f64, String> {
    let scale: f64 = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if !(scale > 0.0 && scale <= 1.0) {
        return Err(format!("Scale must be in (0, 1], got {}", scale));
    }
    Ok(scale)
}

/// Parse and validate the frame rate (1-60 fps)
fn parse_fps(s: &str) -> Result<u32, String> {
    let fps: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid frame rate", s))?;
    if !(MIN_FPS..=MAX_FPS).contains(&fps) {
        return Err(format!(
            "Frame rate must be between {} and {} fps, got {}",
            MIN_FPS, MAX_FPS, fps
        ));
    }
    Ok(fps)
}

/// Parse and validate a recording duration in seconds
fn parse_duration(s: &str) -> Result<f64, String> {
    let secs: f64 = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if !(secs.is_finite() && secs > 0.0) {
        return Err(format!("Duration must be a positive number of seconds, got {}", s));
    }
    Ok(secs)
}

/// Render a video as ASCII art and record it to a shareable file
#[derive(Parser, Debug)]
#[command(name = "ascii-recorder")]
#[command(version, about = "Real-time ASCII video renderer and recorder", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a video file as ASCII art and record the result
    Record(RecordArgs),
    /// Locate and verify the transcoding engine
    CheckEngine,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct RecordArgs {
    /// Input video file
    pub input: PathBuf,

    /// Output file (default: ascii-video-<millis>.<ext> in the current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Fraction of the source resolution sampled per axis
    #[arg(long, value_parser = parse_scale)]
    pub scale: Option<f64>,

    /// Render frame rate
    #[arg(long, value_parser = parse_fps)]
    pub fps: Option<u32>,

    /// Glyphs from darkest to lightest, or a preset (standard, blocks, minimal)
    #[arg(long)]
    pub ramp: Option<String>,

    /// Background color (#rrggbb)
    #[arg(long)]
    pub background: Option<Rgb>,

    /// Cell sampling mode (area, nearest)
    #[arg(long)]
    pub sampling: Option<SamplingMode>,

    /// Delivery format (mp4, mov)
    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Stop recording after this many seconds
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<f64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Create default config file
    Init,
}
