//! RTMP relay - follows an RTMP server log and republishes streams over RTSP.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rtmp_relay::config::{ConfigLoader, LoadedConfig};
use rtmp_relay::relay::{self, RelayError};

#[derive(Parser)]
#[command(
    name = "rtmp-relay",
    about = "Follow an RTMP server log and relay each live stream with ffmpeg",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (default: ./rtmp-relay.toml, then the user config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Media server log file to follow.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Transcoder binary.
    #[arg(long)]
    transcoder: Option<String>,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Cancel `token` on Ctrl-C or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        tracing::info!("Shutdown requested");
        token.cancel();
    });
}

async fn run(cli: Cli) -> Result<(), RelayError> {
    let loader = cli
        .config
        .map_or_else(ConfigLoader::discover, ConfigLoader::explicit);
    let LoadedConfig { mut config, source } = loader.load()?;
    match &source {
        Some(path) => tracing::info!(path = %path.display(), "Loaded config file"),
        None => tracing::info!("No config file found, using defaults"),
    }

    if let Some(log_file) = cli.log_file {
        config.log_file = log_file;
    }
    if let Some(binary) = cli.transcoder {
        config.transcoder.binary = binary;
    }

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let summary = relay::run(&config, shutdown).await?;
    tracing::info!(
        lines = summary.lines,
        stopped = summary.stopped_on_shutdown,
        "Relay stopped"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Relay failed");
            ExitCode::FAILURE
        }
    }
}
