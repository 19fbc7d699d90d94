mod session;
mod sink;

use camview_common::config::Config;
use session::CaptureSession;
use sink::Sinks;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        cameras = config.cameras.len(),
        snapshot_dir = ?config.viewer.snapshot_dir,
        max_frames = ?config.viewer.max_frames,
        "starting camview"
    );

    // Every camera must open before any capture starts.
    let mut sessions = Vec::with_capacity(config.cameras.len());
    for camera in &config.cameras {
        let sinks = match Sinks::from_config(&config.viewer) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to set up frame sinks");
                std::process::exit(1);
            }
        };
        match CaptureSession::open(camera).await {
            Ok(session) => sessions.push((session, sinks)),
            Err(e) => {
                error!(error = %e, "failed to open camera");
                std::process::exit(1);
            }
        }
    }

    let (quit_tx, quit_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("quit requested");
                let _ = quit_tx.send(true);
            }
            Err(e) => error!(error = %e, "failed to listen for Ctrl-C; running until streams end"),
        }
    });

    // One independent session per camera; no cross-camera synchronization.
    let mut handles = Vec::with_capacity(sessions.len());
    for (session, sinks) in sessions {
        let quit = quit_requested(quit_rx.clone());
        let camera = session.camera().to_string();
        let handle = tokio::spawn(session.run(sinks, quit, config.viewer.max_frames));
        handles.push((camera, handle));
    }

    let mut failed = false;
    for (camera, handle) in handles {
        match handle.await {
            Ok(Ok(report)) => {
                info!(
                    camera = report.camera,
                    stop = ?report.stop,
                    producer = ?report.producer,
                    produced = report.produced,
                    displayed = report.displayed,
                    dropped = report.dropped,
                    "camera closed"
                );
            }
            Ok(Err(e)) => {
                error!(error = %e, camera, "session failed");
                failed = true;
            }
            Err(e) => {
                error!(error = %e, camera, "session task panicked");
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    info!("all cameras released");
}

/// Resolve once a quit has been requested on `quit`.
async fn quit_requested(mut quit: watch::Receiver<bool>) {
    loop {
        let requested = *quit.borrow_and_update();
        if requested {
            return;
        }
        if quit.changed().await.is_err() {
            // Sender gone without a quit request: run until the streams end.
            std::future::pending::<()>().await;
        }
    }
}
