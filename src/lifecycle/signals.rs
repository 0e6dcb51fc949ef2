//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (Ctrl+C) or SIGTERM
//! - Translate the signal into a graceful shutdown with exit status 0
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A handler that cannot be installed is logged and never fires

use super::shutdown::{Shutdown, ShutdownReason};

/// Trigger `shutdown` on the first termination signal.
///
/// Returns early if shutdown starts for another reason.
pub async fn forward(shutdown: Shutdown) {
    let mut signal = shutdown.subscribe();
    tokio::select! {
        name = wait_for_signal() => {
            tracing::info!(signal = name, "Shutdown signal received");
            shutdown.trigger(ShutdownReason::Signal(name));
        }
        _ = signal.recv() => {}
    }
}

async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
    }
}
