//! chzzk-recorder - unattended Chzzk live-stream recorder.

mod cli;
mod config;
mod error;
mod logging;
mod poller;
mod session_refresher;
mod supervisor;

use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use chzzk_engine::{http::build_client, AuthStore, ChzzkClient};
use clap::Parser;
use tracing::{error, info};

use cli::CliArgs;
use config::Config;
use error::AppError;
use poller::Poller;
use session_refresher::{NoopSessionLogin, SessionRefresher};
use supervisor::Supervisor;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal configuration error: {e}");
            exit(1);
        }
    };

    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    let _guard = match logging::init_logging(&config.log_dir, log_level) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            exit(1);
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), "starting chzzk-recorder");

    if let Err(e) = run(args, config).await {
        error!(error = %e, "fatal error, exiting");
        exit(1);
    }
}

async fn run(args: CliArgs, config: Config) -> Result<(), AppError> {
    let auth = Arc::new(
        AuthStore::from_session_file(&config.session_path)
            .map_err(|e| AppError::config(format!("loading session: {e}")))?,
    );

    let http = build_client(CONNECT_TIMEOUT, REQUEST_TIMEOUT)?;
    let client = Arc::new(ChzzkClient::new(http.clone(), auth.clone()));

    let recordings_root = args.recordings_root.unwrap_or(config.recordings_root.clone());
    let downloader_options = chzzk_engine::DownloaderOptions {
        recordings_root,
        archive_dir: config.archive_dir.clone(),
        on_start_previous: config.on_start_previous,
        quality: config.quality,
        ..Default::default()
    };

    let poller = Poller::new(client.clone(), config.target_channels.clone());
    let mut supervisor = Supervisor::new(
        http,
        auth.clone(),
        client,
        downloader_options,
        config.stall_restart_sec,
    );
    let mut session_refresher = SessionRefresher::new(
        auth,
        Arc::new(NoopSessionLogin),
        config.session_refresh_hours.clone(),
    );

    info!(channels = ?config.target_channels, "entering main loop");

    let mut interval = tokio::time::interval(Duration::from_secs(config.poll_interval_sec));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                session_refresher.maybe_refresh().await;
                let poll_results = poller.tick().await;
                supervisor.tick(&poll_results).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, shutting down gracefully");
                break;
            }
            _ = wait_for_sigterm() => {
                info!("received SIGTERM, shutting down gracefully");
                break;
            }
        }
    }

    supervisor.cancel_all();
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    info!("shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
