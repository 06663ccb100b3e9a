//! Process-signal shutdown wiring for the audit service.

use std::sync::Arc;

use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::audit_service::AuditService;

/// Invoke [`AuditService::close`] when the process receives SIGINT or
/// SIGTERM.
///
/// The close itself is idempotent, so combining this listener with an
/// explicit close on the graceful-shutdown path is safe.
pub fn spawn_shutdown_listener(service: Arc<AuditService>) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, draining audit buffer");
        service.close().await;
    })
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
