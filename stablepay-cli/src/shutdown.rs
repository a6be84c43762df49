//! Signal handling for graceful shutdown.

use stablepay_core::WalletSession;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;

/// Completes when SIGTERM or SIGINT (Ctrl+C) is received.
pub async fn shutdown_signal() -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
    Ok(())
}

/// Spawns a task that, on a shutdown signal, flips `shutdown_tx` and
/// disconnects `session`, which cancels every running monitor.
pub fn spawn_shutdown_handler(session: WalletSession, shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            tracing::error!("Failed to install signal handlers: {}", e);
            return;
        }
        let _ = shutdown_tx.send(true);
        session.disconnect().await;
    });
}
