//! Teardown Handling
//!
//! Cancels every tracked request when the embedding process goes away.

use crate::infrastructure::request_registry::RequestRegistry;
use tokio_util::sync::CancellationToken;

/// RAII teardown hook.
///
/// Dropping the guard (or calling [`teardown`](Self::teardown)) cancels all
/// requests in the registry and the shared shutdown token. Discovery and
/// breaker state hold no external resources and need no teardown.
pub struct TeardownGuard {
    registry: RequestRegistry,
    token: CancellationToken,
}

impl TeardownGuard {
    pub fn new(registry: RequestRegistry, token: CancellationToken) -> Self {
        Self { registry, token }
    }

    /// Token cancelled on teardown; background tasks select on it.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run teardown now. Idempotent.
    pub fn teardown(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("tearing down backend client");
        }
        self.token.cancel();
        self.registry.cancel_all();
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Completes when the process receives Ctrl+C or SIGTERM.
#[cfg_attr(coverage_nightly, coverage(off))]
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}
