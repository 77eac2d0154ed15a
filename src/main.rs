use std::process::ExitCode;

use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use uriwatch::config::Config;
use uriwatch::diagnostics;
use uriwatch::dispatcher::{Dispatcher, FileWatcher};

/// Startup failed before the loop ran
const EXIT_STARTUP: u8 = 1;
/// The event loop itself failed
const EXIT_FATAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("uriwatch: invalid configuration: {e:#}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    match diagnostics::init(&config.diagnostics) {
        Some(path) => info!("Diagnostics written to {}", path.display()),
        None => info!("No writable diagnostics file, logging to stderr"),
    }
    info!(
        "Monitoring {} for {} watched URIs",
        config.monitor.log_path.display(),
        config.monitor.watched_uris.len()
    );

    let mut dispatcher = match Dispatcher::from_config(&config).await {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            error!("Failed to initialize pipeline: {:#}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut watcher = match FileWatcher::spawn(&config.monitor.log_path, events_tx) {
        Ok(watcher) => watcher,
        Err(e) => {
            error!("Failed to start file watcher: {:#}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let result = dispatcher.run(&mut events_rx, shutdown_rx).await;

    // Join the watcher before the queue goes away
    watcher.stop();
    drop(events_rx);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Unrecoverable failure in main loop: {:#}", anyhow::Error::from(e));
            ExitCode::from(EXIT_FATAL)
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
