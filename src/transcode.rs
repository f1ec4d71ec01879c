//! Conversion of a recorded container into a delivery format.
//!
//! The conversion stages the raw bytes in the engine workspace, runs the
//! engine with an explicit, versioned argument set, reads the result back,
//! and always removes both workspace files afterwards.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::capture::RawContainer;
use crate::engine::{EngineError, TranscodeEngine};

/// Version of the argument set produced by [`TranscodeRequest::args`].
///
/// Bump when the produced flags change, since output characteristics
/// change with them.
pub const TRANSCODE_ARGS_VERSION: u32 = 1;

/// Prefix of generated artifact file names.
pub const FILE_NAME_PREFIX: &str = "ascii-video";

/// Container format of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerFormat {
    #[default]
    Webm,
    Matroska,
    Mp4,
}

impl ContainerFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Webm => "webm",
            ContainerFormat::Matroska => "mkv",
            ContainerFormat::Mp4 => "mp4",
        }
    }

    /// Recognize a container from a MIME type, ignoring codec parameters.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let base = mime.split(';').next().unwrap_or("").trim();
        match base.to_ascii_lowercase().as_str() {
            "video/webm" => Some(ContainerFormat::Webm),
            "video/x-matroska" => Some(ContainerFormat::Matroska),
            "video/mp4" => Some(ContainerFormat::Mp4),
            _ => None,
        }
    }
}

/// Delivery format of the transcoded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Mov,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mov => "mov",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Mov => "video/quicktime",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Ok(OutputFormat::Mp4),
            "mov" => Ok(OutputFormat::Mov),
            other => Err(format!("unknown output format '{}', expected mp4 or mov", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Encoder options for the delivery format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    pub codec: String,
    pub preset: String,
    /// Constant rate factor (lower is higher quality)
    pub crf: u8,
    pub pixel_format: String,
    /// Move the index to the front of the file for progressive playback
    pub faststart: bool,
    /// Optional bitrate cap, in ffmpeg notation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 23,
            pixel_format: "yuv420p".to_string(),
            faststart: true,
            bitrate: None,
        }
    }
}

/// What to convert into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeRequest {
    pub input_format: ContainerFormat,
    pub output_format: OutputFormat,
    pub codec: CodecOptions,
}

impl Default for TranscodeRequest {
    fn default() -> Self {
        Self::new(OutputFormat::default(), CodecOptions::default())
    }
}

impl TranscodeRequest {
    /// A request for WebM input.
    pub fn new(output_format: OutputFormat, codec: CodecOptions) -> Self {
        Self {
            input_format: ContainerFormat::Webm,
            output_format,
            codec,
        }
    }

    pub fn with_input_format(mut self, input_format: ContainerFormat) -> Self {
        self.input_format = input_format;
        self
    }

    /// Workspace name of the staged input.
    pub fn input_name(&self) -> String {
        format!("input.{}", self.input_format.extension())
    }

    /// Workspace name of the produced output.
    pub fn output_name(&self) -> String {
        format!("output.{}", self.output_format.extension())
    }

    /// The engine argument vector (version [`TRANSCODE_ARGS_VERSION`]).
    ///
    /// Every output characteristic is set explicitly rather than left to
    /// engine defaults.
    pub fn args(&self) -> Vec<String> {
        let codec = &self.codec;
        let mut args = vec![
            "-i".to_string(),
            self.input_name(),
            "-c:v".to_string(),
            codec.codec.clone(),
            "-preset".to_string(),
            codec.preset.clone(),
            "-crf".to_string(),
            codec.crf.to_string(),
        ];
        if let Some(bitrate) = &codec.bitrate {
            args.push("-b:v".to_string());
            args.push(bitrate.clone());
        }
        args.push("-pix_fmt".to_string());
        args.push(codec.pixel_format.clone());
        if codec.faststart {
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }
        args.push(self.output_name());
        args
    }
}

/// A converted, downloadable artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodedMedia {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub extension: &'static str,
}

impl TranscodedMedia {
    /// Suggested file name: `ascii-video-<unix millis>.<ext>`.
    pub fn file_name(&self, timestamp: SystemTime) -> String {
        let millis = timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("{}-{}.{}", FILE_NAME_PREFIX, millis, self.extension)
    }
}

/// Coarse failure classification surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeErrorKind {
    EngineUnavailable,
    ConversionFailed,
    EmptyInput,
}

/// Errors from a conversion.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("Transcoding engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Conversion failed while {stage}: {source}")]
    ConversionFailed {
        stage: &'static str,
        #[source]
        source: EngineError,
    },

    #[error("Conversion produced an empty output file")]
    EmptyOutput,

    #[error("Recording is empty; nothing to convert")]
    EmptyInput,
}

impl TranscodeError {
    pub fn kind(&self) -> TranscodeErrorKind {
        match self {
            TranscodeError::EngineUnavailable(_) => TranscodeErrorKind::EngineUnavailable,
            TranscodeError::ConversionFailed { .. } | TranscodeError::EmptyOutput => {
                TranscodeErrorKind::ConversionFailed
            }
            TranscodeError::EmptyInput => TranscodeErrorKind::EmptyInput,
        }
    }
}

pub type TranscodeResult = Result<TranscodedMedia, TranscodeError>;

/// Runs conversions against an engine.
///
/// Workspace file names are fixed per request, so conversions on one
/// engine must not run concurrently.
pub struct TranscodePipeline;

impl TranscodePipeline {
    /// Convert a recorded container. Runs at most once; never retries.
    ///
    /// # Arguments
    /// * `engine` - The loaded engine, or `None` if it failed to load
    /// * `container` - The recording; its MIME type overrides the request's input format
    /// * `request` - Output format and codec options
    ///
    /// # Errors
    /// * `TranscodeError::EmptyInput` - the container has no bytes (the engine is not touched)
    /// * `TranscodeError::EngineUnavailable` - no engine was given
    /// * `TranscodeError::ConversionFailed` - staging, running or reading back failed
    pub async fn convert<E: TranscodeEngine>(
        engine: Option<&E>,
        container: &RawContainer,
        request: &TranscodeRequest,
    ) -> TranscodeResult {
        if container.is_empty() {
            return Err(TranscodeError::EmptyInput);
        }
        let engine = engine
            .ok_or_else(|| TranscodeError::EngineUnavailable("engine not loaded".to_string()))?;

        let input_format =
            ContainerFormat::from_mime(&container.mime_type).unwrap_or(request.input_format);
        let request = request.clone().with_input_format(input_format);
        let input_name = request.input_name();
        let output_name = request.output_name();

        log::info!(
            "Converting {} bytes of {} to {} (args v{})",
            container.len(),
            container.mime_type,
            request.output_format,
            TRANSCODE_ARGS_VERSION
        );

        let result = Self::run_conversion(engine, container, &request).await;

        for name in [&input_name, &output_name] {
            if let Err(e) = engine.delete_file(name).await {
                log::warn!("Cleanup of {} failed: {}", name, e);
            }
        }

        let bytes = result?;
        log::info!("Conversion finished: {} bytes", bytes.len());
        Ok(TranscodedMedia {
            bytes,
            mime_type: request.output_format.mime_type().to_string(),
            extension: request.output_format.extension(),
        })
    }

    async fn run_conversion<E: TranscodeEngine>(
        engine: &E,
        container: &RawContainer,
        request: &TranscodeRequest,
    ) -> Result<Vec<u8>, TranscodeError> {
        let failed = |stage: &'static str| {
            move |source: EngineError| TranscodeError::ConversionFailed { stage, source }
        };

        engine
            .stage_file(&request.input_name(), &container.bytes)
            .await
            .map_err(failed("staging input"))?;
        engine
            .run(&request.args())
            .await
            .map_err(failed("running engine"))?;
        let bytes = engine
            .read_file(&request.output_name())
            .await
            .map_err(failed("reading output"))?;

        if bytes.is_empty() {
            return Err(TranscodeError::EmptyOutput);
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args_match_version_1() {
        let request = TranscodeRequest::default();
        assert_eq!(
            request.args(),
            vec![
                "-i", "input.webm", "-c:v", "libx264", "-preset", "medium", "-crf", "23",
                "-pix_fmt", "yuv420p", "-movflags", "+faststart", "output.mp4",
            ]
        );
    }

    #[test]
    fn test_args_with_bitrate_and_no_faststart() {
        let codec = CodecOptions {
            bitrate: Some("4M".to_string()),
            faststart: false,
            ..CodecOptions::default()
        };
        let request = TranscodeRequest::new(OutputFormat::Mov, codec)
            .with_input_format(ContainerFormat::Matroska);
        let args = request.args();
        assert_eq!(args[1], "input.mkv");
        assert!(args.windows(2).any(|w| w == ["-b:v", "4M"]));
        assert!(!args.contains(&"-movflags".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("output.mov"));
    }

    #[test]
    fn test_container_format_from_mime() {
        assert_eq!(
            ContainerFormat::from_mime("video/webm;codecs=vp9"),
            Some(ContainerFormat::Webm)
        );
        assert_eq!(
            ContainerFormat::from_mime("video/x-matroska"),
            Some(ContainerFormat::Matroska)
        );
        assert_eq!(ContainerFormat::from_mime("audio/ogg"), None);
    }

    #[test]
    fn test_file_name_uses_millis() {
        let media = TranscodedMedia {
            bytes: vec![1],
            mime_type: "video/mp4".to_string(),
            extension: "mp4",
        };
        let ts = UNIX_EPOCH + std::time::Duration::from_millis(1_700_000_000_123);
        assert_eq!(media.file_name(ts), "ascii-video-1700000000123.mp4");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(TranscodeError::EmptyInput.kind(), TranscodeErrorKind::EmptyInput);
        assert_eq!(
            TranscodeError::EmptyOutput.kind(),
            TranscodeErrorKind::ConversionFailed
        );
        assert_eq!(
            TranscodeError::EngineUnavailable("x".into()).kind(),
            TranscodeErrorKind::EngineUnavailable
        );
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("MOV".parse::<OutputFormat>().unwrap(), OutputFormat::Mov);
        assert!("avi".parse::<OutputFormat>().is_err());
    }
}
