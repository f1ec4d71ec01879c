//! Periodic ASCII rendering onto the output surface.
//!
//! Each tick samples the source's current frame, clears a back buffer to
//! the background color, draws one glyph per cell in the cell's own color,
//! and publishes the finished frame to the shared surface with one swap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::ascii::{
    cell_brightness, cell_origin, map_glyph, sample, surface_dimensions, RenderedFrame,
    SamplingError,
};
use crate::config::ConfigError;
use crate::render_config::{RenderConfig, Rgb};
use crate::scheduler::{Scheduler, TimerHandle};
use crate::source::{FrameSource, PlaybackState};
use crate::surface::{SharedSurface, Surface};

/// Result of a single render tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new frame was published
    Rendered,
    /// The source is not playing; nothing was drawn
    Idle,
}

/// Counters shared with the tick callback.
#[derive(Debug, Default)]
struct RenderStats {
    frames_rendered: AtomicU64,
    ticks_failed: AtomicU64,
}

/// Drives the render cadence for one source.
///
/// At most one tick timer is installed at any time: `start` and `restart`
/// cancel the previous timer before scheduling a new one.
pub struct AsciiRenderer {
    scheduler: Scheduler,
    surface: SharedSurface,
    config: RenderConfig,
    source: Option<Arc<dyn FrameSource>>,
    timer: Option<TimerHandle>,
    stats: Arc<RenderStats>,
}

impl std::fmt::Debug for AsciiRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsciiRenderer")
            .field("config", &self.config)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl AsciiRenderer {
    pub fn new(scheduler: Scheduler, surface: SharedSurface) -> Self {
        Self {
            scheduler,
            surface,
            config: RenderConfig::default(),
            source: None,
            timer: None,
            stats: Arc::new(RenderStats::default()),
        }
    }

    /// Start rendering `source` with `config`.
    ///
    /// Any running tick timer is cancelled first.
    ///
    /// # Errors
    /// * `ConfigError` - if `config` fails validation; the renderer is left stopped
    pub fn start(
        &mut self,
        source: Arc<dyn FrameSource>,
        config: RenderConfig,
    ) -> Result<(), ConfigError> {
        self.stop();
        config.validate()?;
        self.source = Some(source);
        self.config = config;
        self.install_timer();
        Ok(())
    }

    /// Stop rendering. Safe to call when already stopped.
    ///
    /// # Returns
    /// `true` if a timer was cancelled.
    pub fn stop(&mut self) -> bool {
        match self.timer.take() {
            Some(timer) => {
                self.scheduler.cancel(timer);
                log::debug!("Renderer stopped");
                true
            }
            None => false,
        }
    }

    /// Replace the render config, reinstalling the timer if running.
    ///
    /// # Errors
    /// * `ConfigError` - if `config` fails validation; the previous config stays active
    pub fn restart(&mut self, config: RenderConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let was_running = self.stop();
        self.config = config;
        if was_running {
            self.install_timer();
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn surface(&self) -> SharedSurface {
        Arc::clone(&self.surface)
    }

    /// Frames published since this renderer was created.
    pub fn frames_rendered(&self) -> u64 {
        self.stats.frames_rendered.load(Ordering::Relaxed)
    }

    /// Ticks that failed with a sampling error.
    pub fn ticks_failed(&self) -> u64 {
        self.stats.ticks_failed.load(Ordering::Relaxed)
    }

    fn install_timer(&mut self) {
        let Some(source) = self.source.clone() else {
            return;
        };
        let config = self.config.clone();
        let surface = Arc::clone(&self.surface);
        let stats = Arc::clone(&self.stats);
        let mut back = Surface::new(0, 0);

        log::debug!(
            "Renderer started: {} fps, scale {}, ramp {:?}",
            config.fps,
            config.scale,
            config.ramp.to_string()
        );

        let timer = self
            .scheduler
            .schedule_repeating(config.tick_interval(), move || {
                match render_tick(source.as_ref(), &config, &surface, &mut back) {
                    Ok(TickOutcome::Rendered) => {
                        stats.frames_rendered.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(TickOutcome::Idle) => {}
                    Err(SamplingError::NoFrame) => {
                        stats.ticks_failed.fetch_add(1, Ordering::Relaxed);
                        log::debug!("Render tick skipped: no frame decoded yet");
                    }
                    Err(e) => {
                        stats.ticks_failed.fetch_add(1, Ordering::Relaxed);
                        log::warn!("Render tick failed: {}", e);
                    }
                }
            });
        self.timer = Some(timer);
    }
}

impl Drop for AsciiRenderer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run one render tick.
///
/// Composes into `back` and swaps it with the shared surface, so `back`
/// holds the previous frame afterwards.
pub fn render_tick(
    source: &dyn FrameSource,
    config: &RenderConfig,
    surface: &SharedSurface,
    back: &mut Surface,
) -> Result<TickOutcome, SamplingError> {
    if source.playback_state() != PlaybackState::Playing {
        return Ok(TickOutcome::Idle);
    }

    let frame = source.current_frame().ok_or(SamplingError::NoFrame)?;
    let rendered = sample(&frame, config)?;
    compose(&rendered, config, back);

    // A surface is always whole between swaps, so a poisoned lock is still usable.
    let mut front = surface.lock().unwrap_or_else(|poisoned| {
        log::warn!("Output surface lock was poisoned, recovering");
        poisoned.into_inner()
    });
    std::mem::swap(&mut *front, back);
    Ok(TickOutcome::Rendered)
}

/// Draw a sampled frame: background fill, then one glyph per cell.
///
/// The target is resized to `grid * (8, 12)` pixels.
pub fn compose(rendered: &RenderedFrame, config: &RenderConfig, target: &mut Surface) {
    let (width, height) = surface_dimensions(rendered.width, rendered.height);
    target.resize(width, height);
    target.fill(config.background);

    for (x, y, color) in rendered.iter_cells() {
        let glyph = map_glyph(cell_brightness(&color), &config.ramp);
        let (px, py) = cell_origin(x, y);
        target.draw_glyph(glyph, px, py, Rgb::new(color.r, color.g, color.b));
    }
}
