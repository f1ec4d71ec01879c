//! Error types for capture operations.
//!
//! This module contains the errors raised while recording the rendered
//! surface into a chunked container.

use std::path::PathBuf;

/// Errors that can occur during capture operations
#[derive(Debug)]
pub enum CaptureError {
    /// Encoder executable not found
    EncoderNotFound(PathBuf),
    /// Encoder process failed or closed its input early
    EncoderFailed(String),
    /// Neither the preferred nor the fallback codec is available
    CodecUnsupported {
        codec: String,
        fallback: Option<String>,
    },
    /// A frame's size differs from the first recorded frame
    FrameSizeChanged {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    /// Recording stopped before any data was produced
    EmptyContainer,
    /// I/O error while talking to the encoder
    Io(std::io::Error),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::EncoderNotFound(path) => {
                write!(
                    f,
                    "Encoder '{}' not found.\n\nRun `ascii-recorder check-engine` to see which engine sources were tried.",
                    path.display()
                )
            }
            CaptureError::EncoderFailed(msg) => write!(f, "Encoder failed: {}", msg),
            CaptureError::CodecUnsupported { codec, fallback } => match fallback {
                Some(fallback) => write!(
                    f,
                    "Neither '{}' nor fallback '{}' is supported by the engine",
                    codec, fallback
                ),
                None => write!(f, "Codec '{}' is not supported by the engine", codec),
            },
            CaptureError::FrameSizeChanged { expected, actual } => write!(
                f,
                "Frame size changed during recording: expected {}x{}, got {}x{}",
                expected.0, expected.1, actual.0, actual.1
            ),
            CaptureError::EmptyContainer => {
                write!(f, "Recording produced no data. Was anything rendered?")
            }
            CaptureError::Io(e) => write!(f, "Capture I/O error: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        CaptureError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_unsupported_display() {
        let err = CaptureError::CodecUnsupported {
            codec: "libvpx-vp9".to_string(),
            fallback: Some("libvpx".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("libvpx-vp9"));
        assert!(msg.contains("fallback 'libvpx'"));
    }

    #[test]
    fn test_frame_size_changed_display() {
        let err = CaptureError::FrameSizeChanged {
            expected: (640, 480),
            actual: (320, 240),
        };
        assert!(err.to_string().contains("expected 640x480, got 320x240"));
    }

    #[test]
    fn test_io_error_has_source() {
        use std::error::Error;
        let err = CaptureError::from(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe closed",
        ));
        assert!(err.source().is_some());
        assert!(CaptureError::EmptyContainer.source().is_none());
    }
}
