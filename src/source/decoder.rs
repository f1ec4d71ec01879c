//! ffmpeg-backed frame source.

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::pipeline::{PipeMode, Pipeline, PipelineError};

use super::probe::{ffprobe_for, probe_dimensions};
use super::types::{Frame, FrameSource, PlaybackState, SourceError};

/// Decodes a video file with ffmpeg in real time.
///
/// The decoder runs as a child process writing raw RGB frames to a pipe.
/// A background thread reads them and stores the latest frame in a shared
/// buffer, so `current_frame()` always returns the frame "on screen".
pub struct FfmpegSource {
    input: PathBuf,
    engine: PathBuf,
    width: u32,
    height: u32,
    /// Latest decoded frame (shared with the reader thread)
    frame_buffer: Arc<Mutex<Option<Frame>>>,
    state: Arc<Mutex<PlaybackState>>,
    /// Signal to stop the reader thread
    stop_signal: Arc<AtomicBool>,
    pipeline: Mutex<Option<Pipeline>>,
    reader_thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for FfmpegSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegSource")
            .field("input", &self.input)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("state", &self.playback_state())
            .finish_non_exhaustive()
    }
}

impl FfmpegSource {
    /// Open a video file, probing its dimensions.
    ///
    /// Decoding doesn't begin until `start()` is called.
    ///
    /// # Arguments
    /// * `engine` - Path of the ffmpeg executable
    /// * `input` - Video file to decode
    ///
    /// # Errors
    /// * `SourceError::InputNotFound` - If the file doesn't exist
    /// * `SourceError::ProbeFailed` - If the file has no readable video stream
    pub fn open(engine: &Path, input: &Path) -> Result<Self, SourceError> {
        let (width, height) = probe_dimensions(&ffprobe_for(engine), input)?;
        log::info!("Opened {} ({}x{})", input.display(), width, height);

        Ok(Self {
            input: input.to_path_buf(),
            engine: engine.to_path_buf(),
            width,
            height,
            frame_buffer: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(PlaybackState::NotStarted)),
            stop_signal: Arc::new(AtomicBool::new(false)),
            pipeline: Mutex::new(None),
            reader_thread: Mutex::new(None),
        })
    }

    /// Start decoding in a background thread.
    ///
    /// # Errors
    /// * `SourceError::AlreadyRunning` - If decoding was already started
    /// * `SourceError::Pipeline` - If ffmpeg fails to spawn
    pub fn start(&self) -> Result<(), SourceError> {
        if self.playback_state() != PlaybackState::NotStarted {
            return Err(SourceError::AlreadyRunning);
        }

        let mut pipeline = Pipeline::spawn(
            &self.engine,
            &decode_args(&self.input),
            PipeMode::Output,
            "decoder",
        )?;
        let stdout = pipeline.take_stdout().ok_or_else(|| {
            PipelineError::Io(std::io::Error::new(
                ErrorKind::BrokenPipe,
                "decoder stdout unavailable",
            ))
        })?;

        self.stop_signal.store(false, Ordering::SeqCst);
        set_state(&self.state, PlaybackState::Playing);

        let buffer = Arc::clone(&self.frame_buffer);
        let state = Arc::clone(&self.state);
        let stop = Arc::clone(&self.stop_signal);
        let (width, height) = (self.width, self.height);

        let handle = std::thread::spawn(move || {
            run_decode_loop(stdout, width, height, buffer, stop);
            set_state(&state, PlaybackState::Ended);
        });

        if let Ok(mut slot) = self.pipeline.lock() {
            *slot = Some(pipeline);
        }
        if let Ok(mut slot) = self.reader_thread.lock() {
            *slot = Some(handle);
        }
        Ok(())
    }

    /// Suspend decoding; the current frame stays on screen.
    pub fn pause(&self) {
        if self.transition(PlaybackState::Playing, PlaybackState::Paused) {
            if let Ok(guard) = self.pipeline.lock() {
                if let Some(pipeline) = guard.as_ref() {
                    pipeline.pause();
                }
            }
        }
    }

    /// Resume decoding after `pause()`.
    pub fn resume(&self) {
        if self.transition(PlaybackState::Paused, PlaybackState::Playing) {
            if let Ok(guard) = self.pipeline.lock() {
                if let Some(pipeline) = guard.as_ref() {
                    pipeline.resume();
                }
            }
        }
    }

    /// Stop decoding and wait for the reader thread to finish.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);

        if let Some(mut pipeline) = self.pipeline.lock().ok().and_then(|mut p| p.take()) {
            if let Err(e) = pipeline.shutdown() {
                log::warn!("Decoder shutdown failed: {}", e);
            }
        }

        if let Some(handle) = self.reader_thread.lock().ok().and_then(|mut h| h.take()) {
            let _ = handle.join();
        }
        set_state(&self.state, PlaybackState::Ended);
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        match self.state.lock() {
            Ok(mut state) if *state == from => {
                *state = to;
                true
            }
            _ => false,
        }
    }
}

impl FrameSource for FfmpegSource {
    fn playback_state(&self) -> PlaybackState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(PlaybackState::Ended)
    }

    fn current_frame(&self) -> Option<Frame> {
        let buffer = self.frame_buffer.lock().ok()?;
        buffer.clone()
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build the decoder arguments: real-time rate, raw RGB frames on stdout.
pub fn decode_args(input: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-re".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-an".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "pipe:1".to_string(),
    ]
}

fn set_state(state: &Mutex<PlaybackState>, value: PlaybackState) {
    if let Ok(mut s) = state.lock() {
        *s = value;
    }
}

/// Read fixed-size frames until EOF or stop.
fn run_decode_loop<R: Read>(
    mut reader: R,
    width: u32,
    height: u32,
    buffer: Arc<Mutex<Option<Frame>>>,
    stop: Arc<AtomicBool>,
) {
    let frame_len = Frame::byte_len(width, height);
    let mut decoded = 0u64;

    while !stop.load(Ordering::Relaxed) {
        let mut data = vec![0u8; frame_len];
        match reader.read_exact(&mut data) {
            Ok(()) => {
                decoded += 1;
                if let Ok(mut buf) = buffer.lock() {
                    *buf = Some(Frame::new(width, height, data));
                }
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("Decoder read failed: {}", e);
                break;
            }
        }
    }

    log::debug!("Decoder finished after {} frames", decoded);
}
