//! Session lifecycle: engine loading, rendering, recording, converting.
//!
//! [`SessionController`] owns every piece of mutable session state (the
//! engine, the renderer, the active capture) and is the only component that
//! calls across the others. State changes are published on a
//! `tokio::sync::watch` channel for the UI collaborator.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::capture::{
    CaptureError, CaptureHandle, CaptureSession, CaptureSettings, ChunkRecorder, RawContainer,
};
use crate::config::ConfigError;
use crate::engine::{EngineError, TranscodeEngine};
use crate::render_config::RenderConfig;
use crate::renderer::AsciiRenderer;
use crate::scheduler::Scheduler;
use crate::source::FrameSource;
use crate::surface::{SharedSurface, Surface};
use crate::transcode::{TranscodeError, TranscodePipeline, TranscodeRequest, TranscodedMedia};

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing loaded, nothing rendering
    Idle,
    EngineLoading,
    /// The engine could not be loaded; rendering still works
    EngineFailed,
    /// Engine loaded, not rendering
    Ready,
    Rendering,
    Recording,
    Converting,
    /// A fatal error occurred; see `last_error`
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::EngineLoading => "loading engine",
            SessionState::EngineFailed => "engine failed",
            SessionState::Ready => "ready",
            SessionState::Rendering => "rendering",
            SessionState::Recording => "recording",
            SessionState::Converting => "converting",
            SessionState::Error => "in error",
        };
        f.write_str(name)
    }
}

/// Load status of the transcoding engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    NotLoaded,
    Loading,
    Loaded,
    Failed,
}

/// Errors returned by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },

    #[error("Transcoding engine is not loaded")]
    EngineNotReady,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),
}

/// Orchestrates one rendering/recording session.
pub struct SessionController<E: TranscodeEngine> {
    scheduler: Scheduler,
    renderer: AsciiRenderer,
    config: RenderConfig,
    capture_settings: CaptureSettings,
    engine: Option<E>,
    engine_status: EngineStatus,
    capture: Option<CaptureHandle>,
    state_tx: watch::Sender<SessionState>,
    last_error: Option<String>,
}

impl<E: TranscodeEngine> fmt::Debug for SessionController<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state())
            .field("engine_status", &self.engine_status)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl<E: TranscodeEngine> SessionController<E> {
    /// Create an idle session.
    ///
    /// # Errors
    /// * `ConfigError` - if `config` fails validation
    pub fn new(config: RenderConfig, capture_settings: CaptureSettings) -> Result<Self, ConfigError> {
        config.validate()?;
        let scheduler = Scheduler::new();
        let renderer = AsciiRenderer::new(scheduler.clone(), Surface::shared(0, 0));
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Ok(Self {
            scheduler,
            renderer,
            config,
            capture_settings,
            engine: None,
            engine_status: EngineStatus::NotLoaded,
            capture: None,
            state_tx,
            last_error: None,
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn engine_status(&self) -> EngineStatus {
        self.engine_status
    }

    /// User-facing message for the most recent failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn renderer(&self) -> &AsciiRenderer {
        &self.renderer
    }

    pub fn surface(&self) -> SharedSurface {
        self.renderer.surface()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The active capture, while recording.
    pub fn recording(&self) -> Option<&CaptureHandle> {
        self.capture.as_ref()
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    /// Load the transcoding engine.
    ///
    /// The session shows `EngineLoading` while `loader` runs (unless it is
    /// rendering), then settles on its baseline. A failure leaves rendering
    /// usable and the state at `EngineFailed`.
    pub async fn load_engine<F>(&mut self, loader: F) -> Result<(), SessionError>
    where
        F: Future<Output = Result<E, EngineError>>,
    {
        self.ensure_not_busy("load the engine")?;
        self.engine = None;
        self.engine_status = EngineStatus::Loading;
        if !self.renderer.is_running() {
            self.set_state(SessionState::EngineLoading);
        }

        match loader.await {
            Ok(engine) => {
                self.engine = Some(engine);
                self.engine_status = EngineStatus::Loaded;
                self.last_error = None;
                self.settle();
                Ok(())
            }
            Err(e) => {
                log::error!("Engine failed to load: {}", e);
                self.engine_status = EngineStatus::Failed;
                self.last_error = Some(format!("Failed to load transcoding engine: {}", e));
                self.settle();
                Err(SessionError::Engine(e))
            }
        }
    }

    /// Start rendering `source`, replacing any current render session.
    ///
    /// Starting from `Error` clears the recorded error, as `reset_error` does.
    pub fn start_rendering(&mut self, source: Arc<dyn FrameSource>) -> Result<(), SessionError> {
        self.ensure_not_busy("start rendering")?;
        let leaving_error = self.state() == SessionState::Error;
        self.renderer.start(source, self.config.clone())?;
        if leaving_error {
            self.last_error = None;
        }
        self.set_state(SessionState::Rendering);
        Ok(())
    }

    /// Apply new render parameters.
    ///
    /// A running renderer is restarted with the new config. While recording,
    /// a change of surface size makes the recorder skip frames until the
    /// size returns.
    pub fn update_config(&mut self, config: RenderConfig) -> Result<(), SessionError> {
        self.renderer.restart(config.clone())?;
        self.config = config;
        Ok(())
    }

    pub fn stop_rendering(&mut self) -> Result<(), SessionError> {
        self.ensure_not_busy("stop rendering")?;
        self.renderer.stop();
        self.settle();
        Ok(())
    }

    /// Start recording the output surface.
    ///
    /// # Errors
    /// * `SessionError::InvalidState` - unless the session is `Ready` or `Rendering`
    /// * `SessionError::EngineNotReady` - the engine has not loaded successfully
    pub fn start_recording(&mut self, recorder: Box<dyn ChunkRecorder>) -> Result<(), SessionError> {
        let state = self.state();
        if !matches!(state, SessionState::Ready | SessionState::Rendering) {
            return Err(SessionError::InvalidState {
                action: "start recording",
                state,
            });
        }
        if self.engine_status != EngineStatus::Loaded || self.engine.is_none() {
            return Err(SessionError::EngineNotReady);
        }

        let handle = CaptureSession::start(
            &self.scheduler,
            self.renderer.surface(),
            self.config.fps,
            self.capture_settings.clone(),
            recorder,
        );
        self.capture = Some(handle);
        self.set_state(SessionState::Recording);
        Ok(())
    }

    /// Stop recording and return the assembled container.
    ///
    /// A capture failure moves the session to `Error`.
    pub async fn stop_recording(&mut self) -> Result<RawContainer, SessionError> {
        let state = self.state();
        let Some(capture) = self.capture.take().filter(|_| state == SessionState::Recording)
        else {
            return Err(SessionError::InvalidState {
                action: "stop recording",
                state,
            });
        };

        match capture.stop().await {
            Ok(container) => {
                self.settle();
                Ok(container)
            }
            Err(e) => Err(self.fail(SessionError::Capture(e))),
        }
    }

    /// Convert a recorded container. Only one conversion runs at a time.
    ///
    /// A failure moves the session to `Error`.
    pub async fn convert(
        &mut self,
        container: &RawContainer,
        request: &TranscodeRequest,
    ) -> Result<TranscodedMedia, SessionError> {
        self.ensure_not_busy("convert")?;
        if container.is_empty() {
            return Err(self.fail(SessionError::Transcode(TranscodeError::EmptyInput)));
        }

        self.set_state(SessionState::Converting);
        match TranscodePipeline::convert(self.engine.as_ref(), container, request).await {
            Ok(media) => {
                self.settle();
                Ok(media)
            }
            Err(e) => Err(self.fail(SessionError::Transcode(e))),
        }
    }

    /// Stop recording, then convert the result.
    pub async fn finish_recording(
        &mut self,
        request: &TranscodeRequest,
    ) -> Result<TranscodedMedia, SessionError> {
        let container = self.stop_recording().await?;
        self.convert(&container, request).await
    }

    /// Leave the `Error` state for the baseline state.
    pub fn reset_error(&mut self) {
        if self.state() == SessionState::Error {
            self.last_error = None;
            self.settle();
        }
    }

    /// The stable state implied by the renderer and engine status.
    fn baseline(&self) -> SessionState {
        if self.renderer.is_running() {
            return SessionState::Rendering;
        }
        match self.engine_status {
            EngineStatus::Loaded => SessionState::Ready,
            EngineStatus::Failed => SessionState::EngineFailed,
            EngineStatus::Loading => SessionState::EngineLoading,
            EngineStatus::NotLoaded => SessionState::Idle,
        }
    }

    fn settle(&mut self) {
        let baseline = self.baseline();
        self.set_state(baseline);
    }

    fn fail(&mut self, error: SessionError) -> SessionError {
        log::error!("Session error: {}", error);
        self.last_error = Some(error.to_string());
        self.set_state(SessionState::Error);
        error
    }

    fn ensure_not_busy(&self, action: &'static str) -> Result<(), SessionError> {
        match self.state() {
            state @ (SessionState::Recording | SessionState::Converting) => {
                Err(SessionError::InvalidState { action, state })
            }
            _ => Ok(()),
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            log::debug!("Session state: {} -> {}", previous, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoEngine;

    impl TranscodeEngine for NoEngine {
        async fn stage_file(&self, _name: &str, _bytes: &[u8]) -> Result<(), EngineError> {
            Ok(())
        }
        async fn run(&self, _args: &[String]) -> Result<(), EngineError> {
            Ok(())
        }
        async fn read_file(&self, _name: &str) -> Result<Vec<u8>, EngineError> {
            Ok(vec![1])
        }
        async fn delete_file(&self, _name: &str) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn controller() -> SessionController<NoEngine> {
        SessionController::new(RenderConfig::default(), CaptureSettings::default()).unwrap()
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = controller();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.engine_status(), EngineStatus::NotLoaded);
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_engine_failure_is_distinct_state() {
        let mut session = controller();
        let result = session
            .load_engine(async { Err(EngineError::NotFound("ffmpeg".into())) })
            .await;
        assert!(result.is_err());
        assert_eq!(session.state(), SessionState::EngineFailed);
        assert!(session.last_error().unwrap().contains("ffmpeg"));
    }

    #[tokio::test]
    async fn test_engine_load_reaches_ready() {
        let mut session = controller();
        let mut states = session.subscribe();
        session.load_engine(async { Ok(NoEngine) }).await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_empty_container_conversion_enters_error() {
        let mut session = controller();
        session.load_engine(async { Ok(NoEngine) }).await.unwrap();
        let empty = RawContainer {
            bytes: Vec::new(),
            mime_type: "video/webm".to_string(),
            chunk_count: 0,
        };
        let err = session
            .convert(&empty, &TranscodeRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Transcode(TranscodeError::EmptyInput)));
        assert_eq!(session.state(), SessionState::Error);

        session.reset_error();
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = SessionError::InvalidState {
            action: "start recording",
            state: SessionState::Converting,
        };
        assert_eq!(err.to_string(), "Cannot start recording while converting");
    }
}
