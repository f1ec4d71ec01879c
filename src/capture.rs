//! Capture of the rendered surface into a chunked container.
//!
//! A [`CaptureSession`] runs two timers while recording: a frame pump that
//! feeds surface snapshots to a [`ChunkRecorder`] at the render rate, and a
//! chunk pump that collects whatever the recorder has produced. Stopping
//! flushes the recorder and concatenates every chunk, in arrival order,
//! into a [`RawContainer`].

mod errors;
mod recorder;

pub use errors::CaptureError;
pub use recorder::{encode_args, parse_encoder_list, select_codec, ChunkRecorder, FfmpegRecorder};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::render_config::{MAX_FPS, MIN_FPS};
use crate::scheduler::{Scheduler, TimerHandle};
use crate::surface::SharedSurface;

/// Default period between chunk collections.
pub const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_millis(1000);

/// Settings for a capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    /// How often the recorder's output is collected
    pub chunk_interval: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            chunk_interval: DEFAULT_CHUNK_INTERVAL,
        }
    }
}

/// Encoder settings for [`FfmpegRecorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderSettings {
    /// Preferred video encoder
    pub codec: String,
    /// Encoder used when the preferred one is unavailable
    pub fallback_codec: Option<String>,
    /// Target bitrate, in ffmpeg notation (e.g. `2M`)
    pub bitrate: String,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            codec: "libvpx-vp9".to_string(),
            fallback_codec: Some("libvpx".to_string()),
            bitrate: "2M".to_string(),
        }
    }
}

/// One chunk of encoded container bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureChunk {
    /// Arrival order, starting at 0
    pub sequence: u64,
    /// Byte offset of this chunk within the container
    pub offset: u64,
    pub data: Vec<u8>,
}

/// A complete recording, ready for transcoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContainer {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub chunk_count: usize,
}

impl RawContainer {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Concatenate chunks in sequence order.
///
/// # Errors
/// * `CaptureError::EmptyContainer` - there are no chunks
pub fn assemble(mut chunks: Vec<CaptureChunk>, mime_type: &str) -> Result<RawContainer, CaptureError> {
    if chunks.is_empty() {
        return Err(CaptureError::EmptyContainer);
    }
    chunks.sort_by_key(|c| c.sequence);

    let total: usize = chunks.iter().map(|c| c.data.len()).sum();
    let mut bytes = Vec::with_capacity(total);
    for chunk in &chunks {
        bytes.extend_from_slice(&chunk.data);
    }

    Ok(RawContainer {
        bytes,
        mime_type: mime_type.to_string(),
        chunk_count: chunks.len(),
    })
}

/// State shared between the pumps and the handle.
struct CaptureState {
    recorder: Box<dyn ChunkRecorder>,
    chunks: Vec<CaptureChunk>,
    next_offset: u64,
    frames_recorded: u64,
    frames_skipped: u64,
    failure: Option<CaptureError>,
}

impl CaptureState {
    fn push_chunk(&mut self, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }
        let len = data.len() as u64;
        self.chunks.push(CaptureChunk {
            sequence: self.chunks.len() as u64,
            offset: self.next_offset,
            data,
        });
        self.next_offset += len;
    }
}

/// Entry point for recording a surface.
pub struct CaptureSession;

impl CaptureSession {
    /// Start recording `surface` at `fps` frames per second.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn start(
        scheduler: &Scheduler,
        surface: SharedSurface,
        fps: u32,
        settings: CaptureSettings,
        recorder: Box<dyn ChunkRecorder>,
    ) -> CaptureHandle {
        let fps = fps.clamp(MIN_FPS, MAX_FPS);
        let state = Arc::new(Mutex::new(CaptureState {
            recorder,
            chunks: Vec::new(),
            next_offset: 0,
            frames_recorded: 0,
            frames_skipped: 0,
            failure: None,
        }));

        let frame_state = Arc::clone(&state);
        let frame_timer = scheduler.schedule_repeating(
            Duration::from_millis(1000 / fps as u64),
            move || pump_frame(&surface, &frame_state),
        );

        let chunk_state = Arc::clone(&state);
        let chunk_timer = scheduler.schedule_repeating(settings.chunk_interval, move || {
            if let Ok(mut state) = chunk_state.lock() {
                if let Some(data) = state.recorder.take_chunk() {
                    state.push_chunk(data);
                }
            }
        });

        log::debug!(
            "Capture started: {} fps, chunks every {:?}",
            fps,
            settings.chunk_interval
        );

        CaptureHandle {
            state,
            frame_timer: Some(frame_timer),
            chunk_timer: Some(chunk_timer),
            started_at: Instant::now(),
        }
    }
}

fn pump_frame(surface: &SharedSurface, state: &Mutex<CaptureState>) {
    let snapshot = match surface.lock() {
        Ok(surface) => surface.snapshot(),
        Err(_) => return,
    };
    let Ok(mut state) = state.lock() else {
        return;
    };
    if state.failure.is_some() || snapshot.is_empty() {
        return;
    }

    match state.recorder.push_frame(&snapshot) {
        Ok(()) => state.frames_recorded += 1,
        Err(e @ CaptureError::FrameSizeChanged { .. }) => {
            state.frames_skipped += 1;
            log::warn!("Skipping frame: {}", e);
        }
        Err(e) => {
            log::warn!("Recorder failed: {}", e);
            state.failure = Some(e);
        }
    }
}

/// A running capture. Dropping it without `stop` discards the recording.
pub struct CaptureHandle {
    state: Arc<Mutex<CaptureState>>,
    frame_timer: Option<TimerHandle>,
    chunk_timer: Option<TimerHandle>,
    started_at: Instant,
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("chunk_count", &self.chunk_count())
            .field("elapsed", &self.elapsed())
            .finish_non_exhaustive()
    }
}

impl CaptureHandle {
    /// Chunks collected so far.
    pub fn chunk_count(&self) -> usize {
        self.state.lock().map(|s| s.chunks.len()).unwrap_or(0)
    }

    /// Frames handed to the recorder so far.
    pub fn frames_recorded(&self) -> u64 {
        self.state.lock().map(|s| s.frames_recorded).unwrap_or(0)
    }

    /// Frames dropped because their size changed mid-recording.
    pub fn frames_skipped(&self) -> u64 {
        self.state.lock().map(|s| s.frames_skipped).unwrap_or(0)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stop recording and assemble the container.
    ///
    /// Both timers are cancelled before the recorder is flushed, so no frame
    /// is pushed after `finish`. The flush runs on the blocking pool.
    ///
    /// # Errors
    /// * `CaptureError::EmptyContainer` - no bytes were recorded
    /// * any error the recorder reported while recording or flushing
    pub async fn stop(mut self) -> Result<RawContainer, CaptureError> {
        self.frame_timer.take();
        self.chunk_timer.take();

        let state = Arc::clone(&self.state);
        let result = tokio::task::spawn_blocking(move || {
            let mut state = state
                .lock()
                .map_err(|_| CaptureError::EncoderFailed("capture state poisoned".into()))?;

            if let Some(failure) = state.failure.take() {
                // Release the encoder; its output is unusable now.
                let _ = state.recorder.finish();
                return Err(failure);
            }

            if let Some(rest) = state.recorder.finish()? {
                state.push_chunk(rest);
            }

            let chunks = std::mem::take(&mut state.chunks);
            let mime_type = state.recorder.mime_type().to_string();
            assemble(chunks, &mime_type)
        })
        .await
        .map_err(|e| CaptureError::EncoderFailed(format!("capture task failed: {}", e)))?;

        if let Ok(container) = &result {
            log::info!(
                "Capture finished: {} bytes in {} chunks",
                container.len(),
                container.chunk_count
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(sequence: u64, data: &[u8]) -> CaptureChunk {
        CaptureChunk {
            sequence,
            offset: 0,
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_assemble_concatenates_in_sequence_order() {
        let chunks = vec![chunk(1, b"bb"), chunk(0, b"aa"), chunk(2, b"c")];
        let container = assemble(chunks, "video/webm").unwrap();
        assert_eq!(container.bytes, b"aabbc");
        assert_eq!(container.chunk_count, 3);
        assert_eq!(container.mime_type, "video/webm");
    }

    #[test]
    fn test_assemble_rejects_no_chunks() {
        assert!(matches!(
            assemble(Vec::new(), "video/webm"),
            Err(CaptureError::EmptyContainer)
        ));
    }

    #[test]
    fn test_recorder_settings_default() {
        let settings = RecorderSettings::default();
        assert_eq!(settings.codec, "libvpx-vp9");
        assert_eq!(settings.fallback_codec.as_deref(), Some("libvpx"));
        assert_eq!(CaptureSettings::default().chunk_interval, Duration::from_secs(1));
    }
}
