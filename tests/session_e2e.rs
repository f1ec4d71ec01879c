//! End-to-end session tests: render, record, convert.
//!
//! Everything runs on paused time with in-memory stand-ins for the video
//! source, the encoder and the transcoding engine.

use std::sync::Arc;
use std::time::Duration;

use ascii_recorder::ascii::{GlyphRamp, CELL_HEIGHT, CELL_WIDTH};
use ascii_recorder::capture::{CaptureError, CaptureSettings, ChunkRecorder};
use ascii_recorder::config::ConfigError;
use ascii_recorder::engine::{EngineError, TranscodeEngine};
use ascii_recorder::render_config::RenderConfig;
use ascii_recorder::session::{EngineStatus, SessionController, SessionError, SessionState};
use ascii_recorder::source::{Frame, FrameSource, PlaybackState};
use ascii_recorder::surface::SurfaceSnapshot;
use ascii_recorder::transcode::TranscodeRequest;

struct GrayClip;

impl FrameSource for GrayClip {
    fn playback_state(&self) -> PlaybackState {
        PlaybackState::Playing
    }

    fn current_frame(&self) -> Option<Frame> {
        Some(Frame::solid(640, 480, [128, 128, 128]))
    }

    fn dimensions(&self) -> (u32, u32) {
        (640, 480)
    }
}

/// Emits the number of frames pushed since the last chunk as one byte.
#[derive(Default)]
struct CountingRecorder {
    pending: u8,
}

impl ChunkRecorder for CountingRecorder {
    fn push_frame(&mut self, frame: &SurfaceSnapshot) -> Result<(), CaptureError> {
        assert!(!frame.is_empty());
        self.pending = self.pending.saturating_add(1);
        Ok(())
    }

    fn take_chunk(&mut self) -> Option<Vec<u8>> {
        let chunk = vec![std::mem::take(&mut self.pending)];
        Some(chunk)
    }

    fn finish(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        Ok(None)
    }

    fn mime_type(&self) -> &str {
        "video/webm"
    }
}

/// Echoes the staged input back as output.
#[derive(Default)]
struct EchoEngine {
    staged: std::sync::Mutex<Vec<u8>>,
}

impl TranscodeEngine for EchoEngine {
    async fn stage_file(&self, _name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        *self.staged.lock().unwrap() = bytes.to_vec();
        Ok(())
    }

    async fn run(&self, _args: &[String]) -> Result<(), EngineError> {
        Ok(())
    }

    async fn read_file(&self, _name: &str) -> Result<Vec<u8>, EngineError> {
        Ok(self.staged.lock().unwrap().clone())
    }

    async fn delete_file(&self, _name: &str) -> Result<(), EngineError> {
        Ok(())
    }
}

fn controller() -> SessionController<EchoEngine> {
    SessionController::new(RenderConfig::default(), CaptureSettings::default()).unwrap()
}

async fn ready_controller() -> SessionController<EchoEngine> {
    let mut session = controller();
    session
        .load_engine(async { Ok(EchoEngine::default()) })
        .await
        .unwrap();
    session
}

#[tokio::test(start_paused = true)]
async fn test_record_three_chunks_and_convert() {
    let mut session = ready_controller().await;
    assert_eq!(session.state(), SessionState::Ready);

    session.start_rendering(Arc::new(GrayClip)).unwrap();
    assert_eq!(session.state(), SessionState::Rendering);
    assert_eq!(session.scheduler().active_timers(), 1);

    session
        .start_recording(Box::new(CountingRecorder::default()))
        .unwrap();
    assert_eq!(session.state(), SessionState::Recording);
    assert_eq!(session.scheduler().active_timers(), 3);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    let capture = session.recording().unwrap();
    assert_eq!(capture.chunk_count(), 3);
    assert!(capture.frames_recorded() > 0);

    let media = session
        .finish_recording(&TranscodeRequest::default())
        .await
        .unwrap();
    assert_eq!(media.mime_type, "video/mp4");
    assert_eq!(media.bytes.len(), 3);
    assert!(media.bytes.iter().any(|&frames| frames > 0));

    assert_eq!(session.state(), SessionState::Rendering);
    assert_eq!(session.scheduler().active_timers(), 1);

    session.stop_rendering().unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.scheduler().active_timers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rendered_surface_matches_grid() {
    let mut session = ready_controller().await;
    session.start_rendering(Arc::new(GrayClip)).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let surface = session.surface();
    let surface = surface.lock().unwrap();
    assert_eq!(surface.width(), 76 * CELL_WIDTH);
    assert_eq!(surface.height(), 57 * CELL_HEIGHT);
    assert!(session.renderer().frames_rendered() >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_config_change_restarts_single_timer() {
    let mut session = ready_controller().await;
    session.start_rendering(Arc::new(GrayClip)).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let config = RenderConfig {
        scale: 0.25,
        fps: 30,
        ramp: GlyphRamp::preset("blocks").unwrap(),
        ..RenderConfig::default()
    };
    session.update_config(config).unwrap();
    session.update_config(session.config().clone()).unwrap();
    assert_eq!(session.scheduler().active_timers(), 1);
    assert_eq!(session.renderer().config().fps, 30);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let surface = session.surface();
    let surface = surface.lock().unwrap();
    assert_eq!(surface.width(), 160 * CELL_WIDTH);
    assert_eq!(surface.height(), 120 * CELL_HEIGHT);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_keeps_previous() {
    let mut session = ready_controller().await;
    session.start_rendering(Arc::new(GrayClip)).unwrap();

    let bad = RenderConfig {
        fps: 0,
        ..RenderConfig::default()
    };
    let err = session.update_config(bad).unwrap_err();
    assert!(matches!(err, SessionError::Config(ConfigError::FpsOutOfRange(0))));
    assert_eq!(session.config().fps, 12);
    assert!(session.renderer().is_running());
    assert_eq!(session.scheduler().active_timers(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_busy_session_rejects_conflicting_actions() {
    let mut session = ready_controller().await;
    session.start_rendering(Arc::new(GrayClip)).unwrap();
    session
        .start_recording(Box::new(CountingRecorder::default()))
        .unwrap();

    assert!(matches!(
        session.start_rendering(Arc::new(GrayClip)),
        Err(SessionError::InvalidState { .. })
    ));
    assert!(matches!(
        session.start_recording(Box::new(CountingRecorder::default())),
        Err(SessionError::InvalidState {
            state: SessionState::Recording,
            ..
        })
    ));
    assert!(matches!(
        session.stop_rendering(),
        Err(SessionError::InvalidState { .. })
    ));
    assert_eq!(session.state(), SessionState::Recording);
}

#[tokio::test(start_paused = true)]
async fn test_recording_requires_engine() {
    let mut session = controller();
    session.start_rendering(Arc::new(GrayClip)).unwrap();
    assert!(matches!(
        session.start_recording(Box::new(CountingRecorder::default())),
        Err(SessionError::EngineNotReady)
    ));
    assert_eq!(session.state(), SessionState::Rendering);
}

#[tokio::test(start_paused = true)]
async fn test_stop_recording_when_idle_is_rejected() {
    let mut session = ready_controller().await;
    assert!(matches!(
        session.stop_recording().await,
        Err(SessionError::InvalidState { .. })
    ));
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_rendering_survives_engine_failure() {
    let mut session = controller();
    let result = session
        .load_engine(async { Err(EngineError::EnvNotSet("ASCII_RECORDER_FFMPEG".into())) })
        .await;
    assert!(result.is_err());
    assert_eq!(session.state(), SessionState::EngineFailed);
    assert_eq!(session.engine_status(), EngineStatus::Failed);

    session.start_rendering(Arc::new(GrayClip)).unwrap();
    assert_eq!(session.state(), SessionState::Rendering);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(session.renderer().frames_rendered() >= 1);

    session.stop_rendering().unwrap();
    assert_eq!(session.state(), SessionState::EngineFailed);
}

#[tokio::test(start_paused = true)]
async fn test_empty_recording_enters_error_state() {
    let mut session = ready_controller().await;
    // Never rendered: the surface stays blank, so no frame reaches the recorder.
    session
        .start_recording(Box::new(EmptyRecorder))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let err = session.stop_recording().await.unwrap_err();
    assert!(matches!(err, SessionError::Capture(CaptureError::EmptyContainer)));
    assert_eq!(session.state(), SessionState::Error);
    assert!(session.last_error().is_some());

    session.reset_error();
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_rendering_from_error_clears_last_error() {
    let mut session = ready_controller().await;
    session.start_recording(Box::new(EmptyRecorder)).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(session.stop_recording().await.is_err());
    assert_eq!(session.state(), SessionState::Error);

    session.start_rendering(Arc::new(GrayClip)).unwrap();
    assert_eq!(session.state(), SessionState::Rendering);
    assert!(session.last_error().is_none());
}

struct EmptyRecorder;

impl ChunkRecorder for EmptyRecorder {
    fn push_frame(&mut self, _frame: &SurfaceSnapshot) -> Result<(), CaptureError> {
        Ok(())
    }

    fn take_chunk(&mut self) -> Option<Vec<u8>> {
        None
    }

    fn finish(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        Ok(None)
    }

    fn mime_type(&self) -> &str {
        "video/webm"
    }
}
