//! Subcommand handlers for record, check-engine and config actions.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use log::{info, warn};

use ascii_recorder::capture::{CaptureError, FfmpegRecorder};
use ascii_recorder::config::{self, Config, ConfigError, DEFAULT_CONFIG_TOML};
use ascii_recorder::engine::{EngineError, EngineLoader, FfmpegEngine};
use ascii_recorder::pipeline::ctrlc_received;
use ascii_recorder::session::{SessionController, SessionError};
use ascii_recorder::source::{FfmpegSource, FrameSource, PlaybackState, SourceError};

use super::args::{ConfigAction, RecordArgs};

/// How often the record loop checks for end of input, duration and Ctrl+C.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors surfaced by subcommands.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Config file already exists: {}", .0.display())]
    ConfigExists(PathBuf),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Why the record loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Interrupted,
    InputEnded,
    DurationReached,
}

/// Render `args.input` as ASCII art, record it, and write the converted file.
///
/// # Returns
/// The path of the written file.
pub async fn record(args: RecordArgs, config_path: Option<&Path>) -> Result<PathBuf, CliError> {
    let mut cfg = Config::load(config_path)?;
    apply_overrides(&mut cfg, &args);

    let render_config = cfg.render.to_render_config()?;
    let fps = render_config.fps;
    let request = cfg.transcode.to_request();

    let mut session: SessionController<FfmpegEngine> =
        SessionController::new(render_config, cfg.recording.capture_settings())?;

    let loader = EngineLoader::new()?;
    info!("Loading transcoding engine...");
    session.load_engine(loader.load(&cfg.engine.sources)).await?;
    let binary = match session.engine() {
        Some(engine) => engine.binary().to_path_buf(),
        None => return Err(SessionError::EngineNotReady.into()),
    };

    let source = Arc::new(FfmpegSource::open(&binary, &args.input)?);
    source.start()?;
    let (width, height) = source.dimensions();
    info!("Rendering {} ({}x{})", args.input.display(), width, height);

    session.start_rendering(source.clone() as Arc<dyn FrameSource>)?;
    let settings = cfg.recording.recorder_settings();
    let recorder =
        tokio::task::block_in_place(|| FfmpegRecorder::new(&binary, settings, fps))?;
    session.start_recording(Box::new(recorder))?;
    println!("Recording... press Ctrl+C to stop.");

    let limit = args.duration.map(Duration::from_secs_f64);
    let reason = wait_for_stop(source.as_ref(), limit).await;
    info!("Stopping recording ({:?})", reason);

    if let Some(capture) = session.recording() {
        info!(
            "Captured {} frames in {} chunks ({} skipped)",
            capture.frames_recorded(),
            capture.chunk_count(),
            capture.frames_skipped()
        );
    }

    let result = session.finish_recording(&request).await;
    if let Err(e) = session.stop_rendering() {
        warn!("Failed to stop renderer: {}", e);
    }
    source.stop();
    let media = result?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(media.file_name(SystemTime::now())));
    tokio::fs::write(&output, &media.bytes)
        .await
        .map_err(|e| CliError::Write {
            path: output.clone(),
            source: e,
        })?;
    println!(
        "Saved {} ({} bytes, {})",
        output.display(),
        media.bytes.len(),
        media.mime_type
    );
    Ok(output)
}

/// Merge CLI flags over the loaded config. CLI wins.
fn apply_overrides(cfg: &mut Config, args: &RecordArgs) {
    if let Some(scale) = args.scale {
        cfg.render.scale = scale;
    }
    if let Some(fps) = args.fps {
        cfg.render.fps = fps;
    }
    if let Some(ramp) = &args.ramp {
        cfg.render.ramp = ramp.clone();
    }
    if let Some(background) = args.background {
        cfg.render.background = background;
    }
    if let Some(sampling) = args.sampling {
        cfg.render.sampling = sampling;
    }
    if let Some(format) = args.format {
        cfg.transcode.output_format = format;
    }
}

async fn wait_for_stop(source: &dyn FrameSource, limit: Option<Duration>) -> StopReason {
    let started = Instant::now();
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        if ctrlc_received() {
            return StopReason::Interrupted;
        }
        if source.playback_state() == PlaybackState::Ended {
            return StopReason::InputEnded;
        }
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            return StopReason::DurationReached;
        }
    }
}

/// Locate and verify the engine, printing which source won.
pub async fn check_engine(config_path: Option<&Path>) -> Result<(), CliError> {
    let cfg = Config::load(config_path)?;
    let loader = EngineLoader::new()?;

    println!("Engine sources (in order):");
    for source in &cfg.engine.sources {
        println!("  {}", source);
    }
    println!();

    let (binary, version, source) = loader.locate(&cfg.engine.sources).await?;
    println!("Engine: {}", binary.display());
    println!("Version: {}", version);
    println!("Source: {}", source);
    Ok(())
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, config_path: Option<&Path>) -> Result<(), CliError> {
    let path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(config::default_path);

    match action {
        ConfigAction::Show => {
            let cfg = Config::load(Some(path.as_path()))?;
            println!("{}", cfg.to_toml()?);
            if path.exists() {
                println!("# Config file: {} (exists)", path.display());
            } else {
                println!("# Config file: {} (not found, showing defaults)", path.display());
            }
        }
        ConfigAction::Init => {
            if path.exists() {
                return Err(CliError::ConfigExists(path));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CliError::Write {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            std::fs::write(&path, DEFAULT_CONFIG_TOML).map_err(|e| CliError::Write {
                path: path.clone(),
                source: e,
            })?;
            println!("Created config file: {}", path.display());
        }
    }
    Ok(())
}
