//! Ordered engine acquisition.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::download::{default_cache_dir, download_engine};
use super::ffmpeg::FfmpegEngine;
use super::EngineError;

/// Environment variable consulted by the default `env` source.
pub const ENGINE_ENV_VAR: &str = "ASCII_RECORDER_FFMPEG";

/// Connect timeout for remote engine downloads.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One way of obtaining an engine binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EngineSource {
    /// An explicit binary path
    Path { path: PathBuf },
    /// A binary path read from an environment variable
    Env { var: String },
    /// `ffmpeg` found on `PATH`
    System,
    /// A binary downloaded into the cache directory
    Remote {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
}

impl EngineSource {
    /// The default acquisition order: the environment override, then `PATH`.
    pub fn defaults() -> Vec<Self> {
        vec![
            EngineSource::Env {
                var: ENGINE_ENV_VAR.to_string(),
            },
            EngineSource::System,
        ]
    }
}

impl fmt::Display for EngineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineSource::Path { path } => write!(f, "path {}", path.display()),
            EngineSource::Env { var } => write!(f, "env ${}", var),
            EngineSource::System => write!(f, "system PATH"),
            EngineSource::Remote { url, .. } => write!(f, "remote {}", url),
        }
    }
}

/// Every strategy failed; failures are kept in the order they were tried.
#[derive(Debug)]
pub struct AggregateError<E> {
    pub failures: Vec<(String, E)>,
}

impl<E: fmt::Display> fmt::Display for AggregateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.is_empty() {
            return write!(f, "No engine sources configured");
        }
        write!(f, "All {} engine sources failed:", self.failures.len())?;
        for (source, error) in &self.failures {
            write!(f, "\n  - {}: {}", source, error)?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for AggregateError<E> {}

/// Try each strategy in sequence; the first success wins.
///
/// Failures are logged and collected. Strategies after the first success
/// are never attempted.
///
/// # Errors
/// Returns an `AggregateError` holding every failure, in order, when all
/// strategies fail (or when there are none).
pub async fn try_in_order<'a, S, T, E, F, Fut>(
    strategies: &'a [S],
    mut attempt: F,
) -> Result<T, AggregateError<E>>
where
    S: fmt::Display,
    E: fmt::Display,
    F: FnMut(&'a S) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut failures = Vec::new();
    for strategy in strategies {
        match attempt(strategy).await {
            Ok(value) => {
                log::debug!("Strategy '{}' succeeded", strategy);
                return Ok(value);
            }
            Err(e) => {
                log::warn!("Strategy '{}' failed: {}", strategy, e);
                failures.push((strategy.to_string(), e));
            }
        }
    }
    Err(AggregateError { failures })
}

/// Find an executable named `name` on `PATH`.
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let file_name = if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    };
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}

/// Run `<binary> -version` and return the first output line.
///
/// # Errors
/// * `EngineError::NotFound` - the binary does not exist
/// * `EngineError::VerificationFailed` - it ran but is not a working ffmpeg
pub async fn verify_engine(binary: &Path) -> Result<String, EngineError> {
    let output = match version_output(binary).await {
        // A freshly written binary can briefly be busy in a forked child.
        #[cfg(unix)]
        Err(e) if e.raw_os_error() == Some(libc::ETXTBSY) => {
            tokio::time::sleep(Duration::from_millis(50)).await;
            version_output(binary).await
        }
        other => other,
    }
    .map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EngineError::NotFound(binary.to_path_buf())
        } else {
            EngineError::VerificationFailed {
                path: binary.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })?;

    let failed = |reason: String| EngineError::VerificationFailed {
        path: binary.to_path_buf(),
        reason,
    };
    if !output.status.success() {
        return Err(failed(format!("-version exited with {:?}", output.status.code())));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first_line = stdout.lines().next().unwrap_or("").trim().to_string();
    if !first_line.starts_with("ffmpeg version") {
        return Err(failed(format!("unexpected -version output: {:?}", first_line)));
    }
    Ok(first_line)
}

async fn version_output(binary: &Path) -> std::io::Result<std::process::Output> {
    tokio::process::Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
}

/// Resolves engine sources into a verified binary.
#[derive(Debug, Clone)]
pub struct EngineLoader {
    cache_dir: PathBuf,
    http_client: reqwest::Client,
}

impl EngineLoader {
    /// Create a loader that downloads into the default cache directory.
    pub fn new() -> Result<Self, EngineError> {
        Self::with_cache_dir(default_cache_dir())
    }

    /// Create a loader with a custom download directory.
    pub fn with_cache_dir(cache_dir: PathBuf) -> Result<Self, EngineError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            cache_dir,
            http_client,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Find the first source that yields a working binary.
    ///
    /// # Returns
    /// The binary path, its `-version` line and the winning source.
    pub async fn locate(
        &self,
        sources: &[EngineSource],
    ) -> Result<(PathBuf, String, EngineSource), EngineError> {
        try_in_order(sources, |source| async move {
            log::info!("Trying engine source: {}", source);
            let binary = self.acquire(source).await?;
            let version = verify_engine(&binary).await?;
            Ok::<_, EngineError>((binary, version, source.clone()))
        })
        .await
        .map_err(|aggregate| {
            log::error!("{}", aggregate);
            EngineError::AllSourcesFailed(aggregate)
        })
    }

    /// Locate a binary and wrap it as an engine with a fresh workspace.
    pub async fn load(&self, sources: &[EngineSource]) -> Result<FfmpegEngine, EngineError> {
        let (binary, version, source) = self.locate(sources).await?;
        log::info!("Engine loaded from {}: {}", source, version);
        FfmpegEngine::new(&binary)
    }

    async fn acquire(&self, source: &EngineSource) -> Result<PathBuf, EngineError> {
        match source {
            EngineSource::Path { path } => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(EngineError::NotFound(path.clone()))
                }
            }
            EngineSource::Env { var } => match std::env::var_os(var) {
                Some(value) if !value.is_empty() => Ok(PathBuf::from(value)),
                _ => Err(EngineError::EnvNotSet(var.clone())),
            },
            EngineSource::System => {
                find_on_path("ffmpeg").ok_or_else(|| EngineError::NotFound(PathBuf::from("ffmpeg")))
            }
            EngineSource::Remote { url, sha256 } => {
                download_engine(&self.http_client, url, sha256.as_deref(), &self.cache_dir).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sources() {
        let sources = EngineSource::defaults();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1], EngineSource::System);
    }

    #[test]
    fn test_source_display() {
        assert_eq!(EngineSource::System.to_string(), "system PATH");
        let env = EngineSource::Env {
            var: "FOO".to_string(),
        };
        assert_eq!(env.to_string(), "env $FOO");
    }

    #[tokio::test]
    async fn test_try_in_order_first_success_wins() {
        let mut tried = Vec::new();
        let result: Result<u32, AggregateError<String>> =
            try_in_order(&[1u32, 2, 3], |n| {
                tried.push(*n);
                let n = *n;
                async move {
                    if n >= 2 {
                        Ok(n * 10)
                    } else {
                        Err(format!("{} failed", n))
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 20);
        assert_eq!(tried, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_try_in_order_aggregates_all_failures() {
        let result: Result<(), AggregateError<String>> =
            try_in_order(&["a", "b"], |s| {
                let s = s.to_string();
                async move { Err(format!("{} broke", s)) }
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.failures.len(), 2);
        assert_eq!(err.failures[0].0, "a");
        let msg = err.to_string();
        assert!(msg.contains("a: a broke"));
        assert!(msg.contains("b: b broke"));
    }

    #[tokio::test]
    async fn test_try_in_order_with_no_strategies() {
        let result: Result<(), AggregateError<String>> =
            try_in_order(&[] as &[&str], |_| async { Ok(()) }).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "No engine sources configured"
        );
    }

    #[tokio::test]
    async fn test_verify_missing_binary() {
        assert!(matches!(
            verify_engine(Path::new("/no/such/ffmpeg")).await,
            Err(EngineError::NotFound(_))
        ));
    }
}
