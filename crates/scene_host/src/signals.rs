//! Signal handling for graceful host shutdown.
//!
//! A soak run can be cut short with Ctrl+C; every session is still stopped
//! cleanly and the final statistics are printed. A second signal exits
//! immediately.

use scene_sync::ShutdownState;
use std::io;
use tokio::signal;
use tracing::{error, info, warn};

/// Resolves on SIGINT or SIGTERM (Ctrl+C on Windows).
pub async fn termination_signal() -> io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    Ok(())
}

/// Initiates `shutdown` on the first termination signal and exits the
/// process on the second.
pub fn install_shutdown_handler(shutdown: ShutdownState) {
    tokio::spawn(async move {
        if let Err(e) = termination_signal().await {
            error!("❌ Failed to install signal handler: {e}");
            return;
        }
        info!("📡 Received shutdown signal - stopping the soak run");
        shutdown.initiate_shutdown();

        if termination_signal().await.is_ok() {
            warn!("Shutdown signal received again - exiting now");
            std::process::exit(1);
        }
    });
}
