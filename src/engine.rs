//! External transcoding engine.
//!
//! The engine is reached through a narrow file-oriented contract
//! ([`TranscodeEngine`]): stage input bytes under a name, run an argument
//! vector, read output bytes back, delete files. [`FfmpegEngine`] implements
//! it over an ffmpeg binary and a private temporary workspace.
//!
//! Acquiring the binary is an ordered list of [`EngineSource`] strategies,
//! tried with [`try_in_order`] until one yields a working engine.

mod download;
mod ffmpeg;
mod loader;

pub use download::{default_cache_dir, download_engine, sha256_hex};
pub use ffmpeg::FfmpegEngine;
pub use loader::{
    find_on_path, try_in_order, verify_engine, AggregateError, EngineLoader, EngineSource,
    ENGINE_ENV_VAR,
};

use std::path::PathBuf;

/// Narrow contract for an external transcoding engine.
///
/// File names are plain names inside the engine's workspace; they must not
/// contain path separators.
#[allow(async_fn_in_trait)]
pub trait TranscodeEngine {
    /// Write `bytes` into the workspace as `name`.
    async fn stage_file(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError>;

    /// Run the engine with `args`; a non-zero outcome is an error.
    async fn run(&self, args: &[String]) -> Result<(), EngineError>;

    /// Read a workspace file.
    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    /// Delete a workspace file. Deleting a missing file succeeds.
    async fn delete_file(&self, name: &str) -> Result<(), EngineError>;
}

/// Errors from engine acquisition and engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid workspace file name '{0}'")]
    InvalidFileName(String),

    #[error("Workspace file '{name}': {source}")]
    File {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create engine workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("Engine exited with code {exit_code:?}: {stderr}")]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Engine binary '{}' not found", .0.display())]
    NotFound(PathBuf),

    #[error("Environment variable {0} is not set")]
    EnvNotSet(String),

    #[error("Engine '{}' failed verification: {reason}", path.display())]
    VerificationFailed { path: PathBuf, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download of {url} failed with status {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    AllSourcesFailed(AggregateError<EngineError>),
}
