//! Video dimension probing via ffprobe.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::types::SourceError;

/// Locate `ffprobe` for an engine binary.
///
/// Prefers a sibling of the engine executable, falling back to `PATH`.
pub fn ffprobe_for(engine: &Path) -> PathBuf {
    let name = if cfg!(windows) { "ffprobe.exe" } else { "ffprobe" };
    if let Some(parent) = engine.parent() {
        let sibling = parent.join(name);
        if sibling.is_file() {
            return sibling;
        }
    }
    PathBuf::from(name)
}

/// Probe the intrinsic `(width, height)` of the first video stream.
///
/// # Errors
/// * `SourceError::InputNotFound` - the input file does not exist
/// * `SourceError::ProbeFailed` - ffprobe is missing, failed, or printed no size
pub fn probe_dimensions(ffprobe: &Path, input: &Path) -> Result<(u32, u32), SourceError> {
    if !input.exists() {
        return Err(SourceError::InputNotFound(input.to_path_buf()));
    }

    let failed = |reason: String| SourceError::ProbeFailed {
        path: input.to_path_buf(),
        reason,
    };

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0:s=x",
        ])
        .arg(input)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| failed(format!("could not run {}: {}", ffprobe.display(), e)))?;

    if !output.status.success() {
        return Err(failed(String::from_utf8_lossy(&output.stderr).trim().to_string()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&stdout).ok_or_else(|| failed("no video stream".to_string()))
}

/// Parse ffprobe's `WIDTHxHEIGHT` output.
///
/// Zero dimensions are rejected.
pub fn parse_probe_output(output: &str) -> Option<(u32, u32)> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (w, h) = line.split_once('x')?;
    let width: u32 = w.trim().parse().ok()?;
    // Some containers append a trailing separator
    let height: u32 = h.trim().trim_end_matches('x').parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        assert_eq!(parse_probe_output("640x480\n"), Some((640, 480)));
        assert_eq!(parse_probe_output("\n1920x1080x\n"), Some((1920, 1080)));
        assert_eq!(parse_probe_output(""), None);
        assert_eq!(parse_probe_output("0x480"), None);
        assert_eq!(parse_probe_output("N/A"), None);
    }

    #[test]
    fn test_missing_input_is_reported_before_probing() {
        let err = probe_dimensions(Path::new("ffprobe"), Path::new("/no/such/clip.webm"))
            .unwrap_err();
        assert!(matches!(err, SourceError::InputNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_ffprobe_prefers_engine_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let engine = dir.path().join("ffmpeg");
        assert_eq!(ffprobe_for(&engine), PathBuf::from("ffprobe"));

        std::fs::write(dir.path().join("ffprobe"), b"").unwrap();
        assert_eq!(ffprobe_for(&engine), dir.path().join("ffprobe"));
    }
}
