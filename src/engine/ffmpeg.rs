//! ffmpeg implementation of the engine contract.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempDir;

use super::{EngineError, TranscodeEngine};

/// An ffmpeg binary plus a private workspace directory.
///
/// The workspace is removed when the engine is dropped.
#[derive(Debug)]
pub struct FfmpegEngine {
    binary: PathBuf,
    workspace: TempDir,
}

impl FfmpegEngine {
    /// Wrap a verified ffmpeg binary.
    ///
    /// # Errors
    /// * `EngineError::Workspace` - the temporary workspace could not be created
    pub fn new(binary: &Path) -> Result<Self, EngineError> {
        let workspace = tempfile::Builder::new()
            .prefix("ascii-recorder-")
            .tempdir()
            .map_err(EngineError::Workspace)?;
        log::debug!(
            "Engine {} using workspace {}",
            binary.display(),
            workspace.path().display()
        );
        Ok(Self {
            binary: binary.to_path_buf(),
            workspace,
        })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, EngineError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && Path::new(name).is_relative();
        if !valid {
            return Err(EngineError::InvalidFileName(name.to_string()));
        }
        Ok(self.workspace.path().join(name))
    }
}

impl TranscodeEngine for FfmpegEngine {
    async fn stage_file(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        let path = self.resolve(name)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| EngineError::File {
                name: name.to_string(),
                source,
            })
    }

    async fn run(&self, args: &[String]) -> Result<(), EngineError> {
        log::debug!("engine run: {:?}", args);
        let output = tokio::process::Command::new(&self.binary)
            .args(["-y", "-hide_banner", "-loglevel", "error"])
            .args(args)
            .current_dir(self.workspace.path())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    EngineError::NotFound(self.binary.clone())
                } else {
                    EngineError::Io(e)
                }
            })?;

        if output.status.success() {
            return Ok(());
        }
        Err(EngineError::ProcessFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.resolve(name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|source| EngineError::File {
                name: name.to_string(),
                source,
            })
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(EngineError::File {
                name: name.to_string(),
                source,
            }),
        }
    }
}
