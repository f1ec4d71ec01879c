//! Video frame sources.
//!
//! This module provides the playable source the renderer samples from:
//! - The [`FrameSource`] trait polled once per render tick
//! - [`FfmpegSource`], which decodes a file in real time via ffmpeg
//! - Dimension probing via [`probe_dimensions`]

mod decoder;
mod probe;
mod types;

pub use decoder::{decode_args, FfmpegSource};
pub use probe::{ffprobe_for, parse_probe_output, probe_dimensions};
pub use types::{Frame, FrameSource, PlaybackState, SourceError};
