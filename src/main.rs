//! backend-discovery - discover the backend and watch the connection
//!
//! This is the composition root that wires together all the components.

use backend_discovery::infrastructure::shutdown_signal;
use backend_discovery::{load_config, BackendClient};
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting backend discovery production={} explicit={:?}",
        cfg.production,
        cfg.explicit_url
    );

    let client = BackendClient::new(cfg)?;

    let url = client.discover_backend_url().await;
    match client.current_backend_url() {
        Some(_) => tracing::info!("backend at {}", url),
        None => tracing::warn!("no backend answered, best guess {}", url),
    }

    let (monitor, handle) = client.spawn_monitor();

    shutdown_signal().await;
    tracing::info!("last status: {}", monitor.status_message());

    // Page-unload equivalent: cancel everything in flight
    client.shutdown();
    handle.await?;

    Ok(())
}
