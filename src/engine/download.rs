//! Remote engine download with checksum verification.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use super::EngineError;

/// Default directory for downloaded engines.
/// Default: ~/.cache/ascii-recorder/engine/
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("ascii-recorder")
        .join("engine")
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Cache file name for a download URL.
///
/// Deterministic: the same URL always maps to the same file.
fn cache_file_name(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let name = format!("ffmpeg-{}", hex::encode(&digest[..8]));
    if cfg!(windows) {
        name + ".exe"
    } else {
        name
    }
}

/// Download an engine binary into `cache_dir`.
///
/// The body is streamed to a `.part` file while being hashed, then renamed
/// into place and marked executable. A previously downloaded file is reused
/// when it still matches `sha256` (or unconditionally when no checksum is
/// given).
///
/// # Arguments
/// * `client` - HTTP client to use
/// * `url` - Location of the binary
/// * `sha256` - Expected lowercase hex digest, if known
/// * `cache_dir` - Directory the binary is stored in
///
/// # Errors
/// Returns `EngineError::Http` if the request fails,
/// `EngineError::DownloadFailed` on a non-success status,
/// `EngineError::ChecksumMismatch` if the digest differs, or
/// `EngineError::Io` if writing to disk fails.
pub async fn download_engine(
    client: &reqwest::Client,
    url: &str,
    sha256: Option<&str>,
    cache_dir: &Path,
) -> Result<PathBuf, EngineError> {
    tokio::fs::create_dir_all(cache_dir).await?;
    let dest = cache_dir.join(cache_file_name(url));

    if dest.is_file() {
        match sha256 {
            None => {
                log::debug!("Using cached engine {}", dest.display());
                return Ok(dest);
            }
            Some(expected) => {
                let existing = tokio::fs::read(&dest).await?;
                if sha256_hex(&existing).eq_ignore_ascii_case(expected) {
                    log::debug!("Using cached engine {}", dest.display());
                    return Ok(dest);
                }
                log::warn!("Cached engine {} is stale, downloading again", dest.display());
            }
        }
    }

    log::info!("Downloading engine from {}", url);
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(EngineError::DownloadFailed {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let partial = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut hasher = Sha256::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result?;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    let actual = hex::encode(hasher.finalize());
    if let Some(expected) = sha256 {
        if !actual.eq_ignore_ascii_case(expected) {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(EngineError::ChecksumMismatch {
                expected: expected.to_lowercase(),
                actual,
            });
        }
    }

    tokio::fs::rename(&partial, &dest).await?;
    mark_executable(&dest).await?;
    log::info!("Engine stored at {}", dest.display());
    Ok(dest)
}

#[cfg(unix)]
async fn mark_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn mark_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
