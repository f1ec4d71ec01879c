//! Chunked recorders: the encoder the capture session feeds.

use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::pipeline::{PipeMode, Pipeline, PipelineError};
use crate::surface::SurfaceSnapshot;

use super::errors::CaptureError;
use super::RecorderSettings;

/// Frames queued for the encoder before new ones are dropped.
const FRAME_QUEUE_DEPTH: usize = 8;

/// An encoder that accepts surface frames and emits container bytes in
/// chunks.
///
/// Concatenating every chunk returned by `take_chunk` followed by the bytes
/// returned by `finish` yields one playable container.
pub trait ChunkRecorder: Send {
    /// Encode one frame.
    fn push_frame(&mut self, frame: &SurfaceSnapshot) -> Result<(), CaptureError>;

    /// Bytes produced since the previous call, if any.
    fn take_chunk(&mut self) -> Option<Vec<u8>>;

    /// Flush the encoder and return any remaining bytes.
    fn finish(&mut self) -> Result<Option<Vec<u8>>, CaptureError>;

    /// MIME type of the produced container.
    fn mime_type(&self) -> &str;
}

/// Records frames into WebM by piping raw RGB into an ffmpeg process.
///
/// The encoder is spawned on the first frame, which fixes the frame size
/// for the rest of the recording. Frames reach the encoder through a
/// writer thread, so `push_frame` never waits on the encoder; when the
/// queue is full the frame is dropped.
pub struct FfmpegRecorder {
    engine: PathBuf,
    bitrate: String,
    fps: u32,
    codec: String,
    frame_size: Option<(u32, u32)>,
    frames_dropped: u64,
    encoder: Option<EncoderProcess>,
}

struct EncoderProcess {
    pipeline: Pipeline,
    frames: Option<SyncSender<Vec<u8>>>,
    writer: Option<JoinHandle<std::io::Result<()>>>,
    output: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for FfmpegRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegRecorder")
            .field("engine", &self.engine)
            .field("codec", &self.codec)
            .field("frame_size", &self.frame_size)
            .finish_non_exhaustive()
    }
}

impl FfmpegRecorder {
    /// Create a recorder for `engine`, choosing the codec from the encoders
    /// the engine reports.
    ///
    /// Runs the engine once to list its encoders, so call it off the async
    /// worker threads.
    ///
    /// # Errors
    /// * `CaptureError::CodecUnsupported` - neither the codec nor its fallback is available
    pub fn new(engine: &Path, settings: RecorderSettings, fps: u32) -> Result<Self, CaptureError> {
        let available = list_encoders(engine);
        let codec = select_codec(available.as_deref(), &settings)?;
        if codec != settings.codec {
            log::warn!(
                "Encoder '{}' unavailable, recording with '{}'",
                settings.codec,
                codec
            );
        }
        Ok(Self {
            engine: engine.to_path_buf(),
            bitrate: settings.bitrate,
            fps: fps.max(1),
            codec,
            frame_size: None,
            frames_dropped: 0,
            encoder: None,
        })
    }

    /// The codec this recording uses.
    pub fn codec(&self) -> &str {
        &self.codec
    }

    fn start_encoder(&mut self, width: u32, height: u32) -> Result<(), CaptureError> {
        let args = encode_args(width, height, self.fps, &self.codec, &self.bitrate);
        let mut pipeline =
            Pipeline::spawn(&self.engine, &args, PipeMode::Duplex, "encoder").map_err(
                |e| match e {
                    PipelineError::EngineNotFound(path) => CaptureError::EncoderNotFound(path),
                    other => CaptureError::EncoderFailed(other.to_string()),
                },
            )?;

        let stdin = pipeline
            .take_stdin()
            .ok_or_else(|| CaptureError::EncoderFailed("encoder stdin unavailable".into()))?;
        let stdout = pipeline
            .take_stdout()
            .ok_or_else(|| CaptureError::EncoderFailed("encoder stdout unavailable".into()))?;

        let (frames, queue) = mpsc::sync_channel(FRAME_QUEUE_DEPTH);
        let writer = std::thread::spawn(move || write_frames(stdin, queue));

        let output = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&output);
        let reader = std::thread::spawn(move || drain_into(stdout, &sink));

        log::info!(
            "Recording {}x{} at {} fps with {}",
            width,
            height,
            self.fps,
            self.codec
        );
        self.frame_size = Some((width, height));
        self.encoder = Some(EncoderProcess {
            pipeline,
            frames: Some(frames),
            writer: Some(writer),
            output,
            reader: Some(reader),
        });
        Ok(())
    }
}

impl ChunkRecorder for FfmpegRecorder {
    fn push_frame(&mut self, frame: &SurfaceSnapshot) -> Result<(), CaptureError> {
        if frame.is_empty() {
            return Ok(());
        }

        match self.frame_size {
            None => self.start_encoder(frame.width, frame.height)?,
            Some(expected) if expected != (frame.width, frame.height) => {
                return Err(CaptureError::FrameSizeChanged {
                    expected,
                    actual: (frame.width, frame.height),
                });
            }
            Some(_) => {}
        }

        let Some(encoder) = self.encoder.as_mut() else {
            return Err(CaptureError::EncoderFailed("encoder already finished".into()));
        };
        let Some(frames) = encoder.frames.as_ref() else {
            return Err(CaptureError::EncoderFailed("encoder input closed".into()));
        };

        match frames.try_send(frame.data.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.frames_dropped += 1;
                log::debug!("Encoder is behind, dropped frame {}", self.frames_dropped);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                encoder.frames = None;
                Err(encoder.input_failure())
            }
        }
    }

    fn take_chunk(&mut self) -> Option<Vec<u8>> {
        let encoder = self.encoder.as_ref()?;
        let mut output = encoder.output.lock().ok()?;
        if output.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut *output))
    }

    fn finish(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        let Some(mut encoder) = self.encoder.take() else {
            return Ok(None);
        };
        if self.frames_dropped > 0 {
            log::warn!("Encoder fell behind: {} frames dropped", self.frames_dropped);
        }

        // The writer drains the queue, then closing stdin lets ffmpeg write the trailer
        drop(encoder.frames.take());
        let written = encoder.join_writer();
        if let Some(reader) = encoder.reader.take() {
            let _ = reader.join();
        }

        encoder.pipeline.wait_success().map_err(|e| match e {
            PipelineError::ProcessFailed { stderr, .. } => CaptureError::EncoderFailed(stderr),
            other => CaptureError::EncoderFailed(other.to_string()),
        })?;
        written?;

        let rest = encoder
            .output
            .lock()
            .map(|mut out| std::mem::take(&mut *out))
            .unwrap_or_default();
        Ok((!rest.is_empty()).then_some(rest))
    }

    fn mime_type(&self) -> &str {
        match self.codec.as_str() {
            "libvpx-vp9" => "video/webm;codecs=vp9",
            "libvpx" => "video/webm;codecs=vp8",
            _ => "video/webm",
        }
    }
}

impl EncoderProcess {
    /// Wait for the writer thread and report how it ended.
    fn join_writer(&mut self) -> Result<(), CaptureError> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        match writer.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => Err(CaptureError::EncoderFailed(
                "encoder closed its input".to_string(),
            )),
            Ok(Err(e)) => Err(CaptureError::Io(e)),
            Err(_) => Err(CaptureError::EncoderFailed("frame writer panicked".into())),
        }
    }

    /// The error for a writer that stopped accepting frames.
    fn input_failure(&mut self) -> CaptureError {
        let written = self.join_writer();
        let stderr = self.pipeline.take_stderr_output().join("\n");
        if !stderr.is_empty() {
            return CaptureError::EncoderFailed(stderr);
        }
        match written {
            Err(e) => e,
            Ok(()) => CaptureError::EncoderFailed("encoder closed its input".to_string()),
        }
    }
}

fn write_frames(mut stdin: ChildStdin, queue: Receiver<Vec<u8>>) -> std::io::Result<()> {
    for frame in queue {
        stdin.write_all(&frame)?;
    }
    Ok(())
}

fn drain_into<R: Read>(mut reader: R, sink: &Mutex<Vec<u8>>) {
    let mut buf = [0u8; 64 * 1024];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if let Ok(mut out) = sink.lock() {
                    out.extend_from_slice(&buf[..n]);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("Encoder output read failed: {}", e);
                break;
            }
        }
    }
}

/// Build the encoder arguments: raw RGB frames on stdin, WebM on stdout.
pub fn encode_args(width: u32, height: u32, fps: u32, codec: &str, bitrate: &str) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}x{}", width, height));
    args.extend(["-r".to_string(), fps.to_string()]);
    args.extend(["-i", "pipe:0", "-an", "-c:v"].iter().map(|s| s.to_string()));
    args.push(codec.to_string());
    args.extend(["-b:v".to_string(), bitrate.to_string()]);
    args.extend(
        ["-pix_fmt", "yuv420p", "-f", "webm", "pipe:1"]
            .iter()
            .map(|s| s.to_string()),
    );
    args
}

/// Ask the engine which encoders it supports.
///
/// Returns `None` if the listing could not be obtained.
fn list_encoders(engine: &Path) -> Option<Vec<String>> {
    let output = Command::new(engine)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(parse_encoder_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse the output of `ffmpeg -encoders` into encoder names.
///
/// Encoder lines look like ` V....D libvpx-vp9   libvpx VP9`; the legend
/// above the `------` separator is skipped.
pub fn parse_encoder_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            flags.starts_with('V').then(|| name.to_string())
        })
        .collect()
}

/// Pick the codec to record with.
///
/// When the encoder list is unknown the preferred codec is used as-is.
///
/// # Errors
/// * `CaptureError::CodecUnsupported` - neither codec appears in the list
pub fn select_codec(
    available: Option<&[String]>,
    settings: &RecorderSettings,
) -> Result<String, CaptureError> {
    let Some(available) = available else {
        return Ok(settings.codec.clone());
    };
    let supported = |codec: &str| available.iter().any(|a| a == codec);

    if supported(&settings.codec) {
        return Ok(settings.codec.clone());
    }
    match &settings.fallback_codec {
        Some(fallback) if supported(fallback) => Ok(fallback.clone()),
        fallback => Err(CaptureError::CodecUnsupported {
            codec: settings.codec.clone(),
            fallback: fallback.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODERS: &str = "Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC
 V....D libvpx               libvpx VP8 (codec vp8)
 A....D libopus              libopus Opus
";

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_encoder_list_keeps_video_encoders() {
        assert_eq!(parse_encoder_list(ENCODERS), names(&["libx264", "libvpx"]));
        assert!(parse_encoder_list("garbage").is_empty());
    }

    #[test]
    fn test_select_codec_prefers_configured() {
        let settings = RecorderSettings::default();
        let available = names(&["libvpx-vp9", "libvpx"]);
        assert_eq!(select_codec(Some(available.as_slice()), &settings).unwrap(), "libvpx-vp9");
    }

    #[test]
    fn test_select_codec_falls_back() {
        let settings = RecorderSettings::default();
        let available = parse_encoder_list(ENCODERS);
        assert_eq!(select_codec(Some(available.as_slice()), &settings).unwrap(), "libvpx");
    }

    #[test]
    fn test_select_codec_reports_unsupported() {
        let settings = RecorderSettings {
            fallback_codec: None,
            ..RecorderSettings::default()
        };
        let available = names(&["libx264"]);
        assert!(matches!(
            select_codec(Some(available.as_slice()), &settings),
            Err(CaptureError::CodecUnsupported { fallback: None, .. })
        ));
        assert_eq!(select_codec(None, &settings).unwrap(), "libvpx-vp9");
    }

    #[test]
    fn test_encode_args() {
        let args = encode_args(608, 456, 12, "libvpx-vp9", "2M");
        assert!(args.windows(2).any(|w| w == ["-s", "608x456"]));
        assert!(args.windows(2).any(|w| w == ["-r", "12"]));
        assert!(args.windows(2).any(|w| w == ["-c:v", "libvpx-vp9"]));
        assert!(args.windows(2).any(|w| w == ["-f", "webm"]));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_mime_type_follows_codec() {
        // Without an encoder listing the preferred codec is kept
        let recorder =
            FfmpegRecorder::new(Path::new("/no/such/engine"), RecorderSettings::default(), 12)
                .unwrap();
        assert_eq!(recorder.codec(), "libvpx-vp9");
        assert_eq!(recorder.mime_type(), "video/webm;codecs=vp9");
    }

    #[test]
    fn test_empty_frames_are_ignored_before_spawn() {
        let mut recorder = FfmpegRecorder::new(
            Path::new("/no/such/engine"),
            RecorderSettings::default(),
            12,
        )
        .unwrap();
        let empty = SurfaceSnapshot {
            width: 0,
            height: 0,
            data: Vec::new(),
        };
        assert!(recorder.push_frame(&empty).is_ok());
        assert!(recorder.take_chunk().is_none());
        assert_eq!(recorder.finish().unwrap(), None);
    }

    #[test]
    fn test_missing_engine_is_reported() {
        let mut recorder = FfmpegRecorder::new(
            Path::new("/no/such/engine"),
            RecorderSettings::default(),
            12,
        )
        .unwrap();
        let frame = SurfaceSnapshot {
            width: 2,
            height: 2,
            data: vec![0; 12],
        };
        assert!(matches!(
            recorder.push_frame(&frame),
            Err(CaptureError::EncoderNotFound(_))
        ));
    }
}
