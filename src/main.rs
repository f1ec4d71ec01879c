//! ascii-recorder - render a video as ASCII art, record it, and transcode it to MP4.

mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ascii_recorder::pipeline::setup_ctrlc_handler;
use cli::{Args, CliError, Command};

const LOG_ENV_VAR: &str = "ASCII_RECORDER_LOG";

/// Load .env file.
///
/// Loads environment variables (such as `ASCII_RECORDER_FFMPEG` or `RUST_LOG`)
/// from a .env file in the working directory. Does not override existing
/// environment variables.
fn load_env() {
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();
}

/// Route `log` records to stderr.
///
/// `ASCII_RECORDER_LOG`, then `RUST_LOG`, win over `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(args: Args) -> Result<(), CliError> {
    let config_path = args.config.as_deref();
    match args.command {
        Command::Record(record) => {
            cli::record(record, config_path).await?;
        }
        Command::CheckEngine => cli::check_engine(config_path).await?,
        Command::Config { action } => cli::handle_config_action(action, config_path)?,
    }
    Ok(())
}

fn main() {
    // Load .env file before anything else
    load_env();

    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = setup_ctrlc_handler() {
        log::warn!("Failed to install Ctrl+C handler: {}", e);
    }

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run(args)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
