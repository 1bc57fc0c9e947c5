// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod config;
mod logging;
mod status;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use overhead_client::{Tracker, TrackerError, TrackingLoop};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, ConfigError};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML config file, defaults to the platform config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single update, print the snapshot as JSON and exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Log level, overrides RUST_LOG
    #[arg(short, long)]
    log_level: Option<log::LevelFilter>,

    /// Print the config file location and exit
    #[arg(long, default_value_t = false)]
    print_config_path: bool,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start tracker: {0}")]
    Tracker(#[from] TrackerError),

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to listen for signals: {0}")]
    Signal(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup_logging(cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    if cli.print_config_path {
        let path = match cli.config {
            Some(path) => path,
            None => AppConfig::config_path()?,
        };
        println!("{}", path.display());
        return Ok(());
    }

    let config = AppConfig::load(cli.config.as_deref())?;
    config.validate()?;
    let tracker_config = config.to_tracker_config()?;
    info!(
        "Watching {:.1} km around {} from {}",
        tracker_config.zone.radius_km,
        config.location_label(),
        tracker_config.data_source
    );

    if cli.once {
        let mut tracking = TrackingLoop::new(tracker_config)?;
        let snapshot = tracking.tick().await;
        println!("{}", serde_json::to_string_pretty(&*snapshot)?);
        return Ok(());
    }

    let tracker = Tracker::spawn(tracker_config)?;
    let cancel_token = CancellationToken::new();

    let event_logger = tokio::spawn(status::log_events(tracker.subscribe(), cancel_token.clone()));
    let reporter = (config.status.interval_seconds > 0).then(|| {
        tokio::spawn(status::report_status(
            tracker.watch(),
            Duration::from_secs(config.status.interval_seconds),
            cancel_token.clone(),
        ))
    });

    let result = wait_for_shutdown(&tracker).await;
    info!("Shutting down");

    cancel_token.cancel();
    tracker.join().await;
    let _ = event_logger.await;
    if let Some(reporter) = reporter {
        let _ = reporter.await;
    }

    info!("Overhead tracker stopped");
    result.map_err(AppError::from)
}

/// Wait for Ctrl-C. On Unix, SIGUSR1 triggers an immediate update meanwhile.
#[cfg(unix)]
async fn wait_for_shutdown(tracker: &Tracker) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut refresh = signal(SignalKind::user_defined1())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => return result,
            _ = refresh.recv() => {
                info!("Refresh requested");
                tracker.request_update();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_tracker: &Tracker) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
