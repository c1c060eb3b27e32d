//! Health Probe Port
//!
//! Defines the liveness check run against a candidate backend.

use crate::domain::value_objects::BaseUrl;
use async_trait::async_trait;
use std::time::Duration;

/// Liveness check for a backend base URL.
///
/// This is an outbound port. Implementations issue
/// `GET {url}/api/health` and must collapse every failure mode
/// (timeout, network error, bad status, bad body) into `false`.
/// They never error and never panic.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Returns true iff the backend answered healthy within `timeout`.
    async fn probe(&self, url: &BaseUrl, timeout: Duration) -> bool;
}
