//! Backend Monitor
//!
//! Periodically checks that the current backend still answers and
//! rediscovers it when the connection is lost.

use crate::application::discoverer::Discoverer;
use crate::config::Config;
use crate::domain::entities::{BackendStatus, ConnectionState, UNAVAILABLE_AFTER_ERRORS};
use crate::domain::ports::HealthProbe;
use crate::domain::value_objects::BaseUrl;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type StatusCallback = Arc<dyn Fn(&BackendStatus) + Send + Sync>;

/// Clears `checking` when a check ends, including when the check future
/// is dropped before the probe returns.
struct CheckingGuard {
    status: Arc<RwLock<BackendStatus>>,
}

impl Drop for CheckingGuard {
    fn drop(&mut self) {
        self.status.write().checking = false;
    }
}

/// Connection monitor for the discovered backend.
///
/// Checks every `connected_interval` while connected and every
/// `disconnected_interval` otherwise. Rediscovery is triggered on the
/// first failure after having been connected, and again once
/// `rediscover_after` consecutive failures have accumulated.
#[derive(Clone)]
pub struct BackendMonitor {
    discoverer: Discoverer,
    probe: Arc<dyn HealthProbe>,
    timeout: Duration,
    connected_interval: Duration,
    disconnected_interval: Duration,
    rediscover_after: u32,
    status: Arc<RwLock<BackendStatus>>,
    on_status_change: Option<StatusCallback>,
}

impl BackendMonitor {
    pub fn new(cfg: &Config, discoverer: Discoverer, probe: Arc<dyn HealthProbe>) -> Self {
        let initial = discoverer.current().unwrap_or_else(|| discoverer.fallback().clone());
        Self {
            discoverer,
            probe,
            timeout: cfg.revalidate_timeout(),
            connected_interval: cfg.monitor_interval(true),
            disconnected_interval: cfg.monitor_interval(false),
            rediscover_after: cfg.monitor_rediscover_after,
            status: Arc::new(RwLock::new(BackendStatus::new(initial))),
            on_status_change: None,
        }
    }

    /// Set callback for connected/disconnected transitions.
    pub fn on_status_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&BackendStatus) + Send + Sync + 'static,
    {
        self.on_status_change = Some(Arc::new(callback));
        self
    }

    pub fn status(&self) -> BackendStatus {
        self.status.read().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.read().state()
    }

    pub fn status_message(&self) -> String {
        self.status.read().message()
    }

    /// Start the monitoring loop; it runs until `token` is cancelled.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub fn start(&self, token: CancellationToken) -> JoinHandle<()> {
        let monitor = self.clone();

        tokio::spawn(async move {
            loop {
                let connected = monitor.check_once().await;
                let interval = if connected {
                    monitor.connected_interval
                } else {
                    monitor.disconnected_interval
                };

                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("backend monitor stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        })
    }

    /// Run one health check, rediscovering if the failure pattern calls
    /// for it. Returns whether the backend is connected afterwards.
    pub async fn check_once(&self) -> bool {
        let url = {
            let mut status = self.status.write();
            if status.checking {
                return status.connected;
            }
            status.checking = true;
            self.discoverer
                .current()
                .unwrap_or_else(|| status.backend_url.clone())
        };
        let guard = self.checking_guard();

        let (connected, was_connected, errors) = self.check_url(url).await;
        drop(guard);
        if connected {
            return true;
        }

        if errors == self.rediscover_after || (was_connected && errors == 1) {
            tracing::info!("backend connection lost, attempting rediscovery");
            return self.rediscover().await;
        }
        false
    }

    /// Reset the error count, rediscover and re-check.
    pub async fn refresh(&self) -> bool {
        self.status.write().error_count = 0;
        self.rediscover().await
    }

    async fn rediscover(&self) -> bool {
        let url = self.discoverer.rediscover().await;
        {
            let mut status = self.status.write();
            if url != status.backend_url {
                tracing::info!("backend url updated to {}", url);
                status.backend_url = url.clone();
                status.error_count = 0;
            }
            status.checking = true;
        }
        let _guard = self.checking_guard();
        self.check_url(url).await.0
    }

    fn checking_guard(&self) -> CheckingGuard {
        CheckingGuard {
            status: self.status.clone(),
        }
    }

    /// Probe `url` and record the outcome. Expects `checking` to be set.
    async fn check_url(&self, url: BaseUrl) -> (bool, bool, u32) {
        let healthy = self.probe.probe(&url, self.timeout).await;

        let (was_connected, errors, snapshot) = {
            let mut status = self.status.write();
            let was_connected = status.connected;
            status.checking = false;

            if healthy {
                status.connected = true;
                status.error_count = 0;
                status.last_check = Some(Instant::now());
                status.backend_url = url;
                if !was_connected {
                    tracing::info!("backend connection restored ({})", status.backend_url);
                }
            } else {
                status.connected = false;
                status.error_count = status.error_count.saturating_add(1);
                // Only the first few failures are worth a log line
                if status.error_count <= UNAVAILABLE_AFTER_ERRORS {
                    tracing::debug!(
                        "backend health check failed (attempt {}) for {}",
                        status.error_count,
                        url
                    );
                }
            }
            (was_connected, status.error_count, status.clone())
        };

        if was_connected != healthy {
            if let Some(callback) = &self.on_status_change {
                callback(&snapshot);
            }
        }

        (healthy, was_connected, errors)
    }
}
