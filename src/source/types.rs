//! Frame source types and data structures.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use crate::pipeline::PipelineError;

/// Playback state of a frame source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Opened but not yet producing frames
    NotStarted,
    /// Producing frames
    Playing,
    /// Temporarily suspended; the last frame stays available
    Paused,
    /// Input exhausted or stopped
    Ended,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::NotStarted => "not started",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// A decoded video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data in RGB format (3 bytes per pixel, row-major)
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Timestamp when the frame was decoded
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// A frame filled with a single color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let data = rgb.iter().copied().cycle().take(pixels * 3).collect();
        Self::new(width, height, data)
    }

    /// Size in bytes of one frame at these dimensions.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }
}

/// A playable source of video frames.
///
/// The renderer polls it once per tick; implementations keep only the
/// latest decoded frame.
pub trait FrameSource: Send + Sync {
    fn playback_state(&self) -> PlaybackState;

    /// The most recent frame, if one has been decoded.
    fn current_frame(&self) -> Option<Frame>;

    /// Intrinsic `(width, height)` of the video.
    fn dimensions(&self) -> (u32, u32);
}

/// Errors that can occur while opening or decoding a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Input file '{}' not found", .0.display())]
    InputNotFound(PathBuf),

    #[error("Failed to probe '{}': {reason}", path.display())]
    ProbeFailed { path: PathBuf, reason: String },

    #[error("Decoder is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
