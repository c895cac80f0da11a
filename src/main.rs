//! scan-capture-daemon: barcode capture service for the operations dashboard
//!
//! Runs the capture mode controller and exposes it over a Unix socket:
//! - UI clients open/cancel sessions and pick a channel
//! - Keystrokes from the page are forwarded for wedge-scanner decoding
//! - Subscribed clients receive scan results and capture events

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scan_capture::config::Config;
use scan_capture::events::CaptureEvent;
use scan_capture::ipc::{Notification, Server};
use scan_capture::keyboard::KeyboardHub;
use scan_capture::lifecycle::ShutdownSignal;
use scan_capture::optical::UnavailableCamera;
use scan_capture::state::{CaptureController, ScanResult};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "scan-capture-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        inactivity_ms = config.inactivity_window.as_millis() as u64,
        "configuration loaded"
    );

    let mut shutdown = ShutdownSignal::new().context("failed to install signal handlers")?;

    // Controller -> IPC subscribers
    let (event_tx, mut event_rx) = broadcast::channel::<CaptureEvent>(64);
    // Result sink -> IPC subscribers
    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<ScanResult>();
    // IPC clients -> controller
    let (command_tx, command_rx) = mpsc::channel(32);

    let keyboard = KeyboardHub::new();

    let mut controller = CaptureController::new(
        keyboard.clone(),
        Arc::new(UnavailableCamera),
        move |result: ScanResult| {
            info!(channel = %result.channel, value = %result.value, "scan result handed off");
            if result_tx.send(result).is_err() {
                warn!("result forwarder closed, dropping scan result");
            }
        },
        event_tx,
    )
    .with_inactivity_window(config.inactivity_window);

    let server = Server::new(&config.socket_path, controller.handle(command_tx), keyboard)?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Run the controller (processes commands, keys and camera events)
        _ = controller.run(command_rx) => {
            info!("capture controller exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Forward results and events to subscribed clients
        _ = async {
            loop {
                tokio::select! {
                    Some(result) = result_rx.recv() => {
                        server.publish(Notification::ScanResult(result));
                    }
                    event = event_rx.recv() => match event {
                        Ok(event) => server.publish(Notification::CaptureEvent(event)),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "capture event receiver lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        } => {
            info!("notification forwarder exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    controller.cancel().await;
    server.shutdown().await;

    info!("scan-capture-daemon stopped");

    Ok(())
}
