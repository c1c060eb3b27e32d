//! Runtime Config Hint
//!
//! Reads `backend_port` from a static `config.json` served next to the app.

use crate::domain::ports::ConfigHintProvider;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RuntimeConfig {
    backend_port: Option<u16>,
}

/// Fetches the runtime config document over HTTP.
///
/// Every failure (unreachable, non-2xx, bad JSON, missing field) is
/// treated as "no hint".
#[derive(Debug, Clone)]
pub struct HttpConfigHint {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpConfigHint {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    async fn fetch(&self) -> Result<Option<u16>, reqwest::Error> {
        let resp = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        let cfg: RuntimeConfig = resp.json().await?;
        Ok(cfg.backend_port)
    }
}

#[async_trait]
impl ConfigHintProvider for HttpConfigHint {
    async fn try_get_port(&self) -> Option<u16> {
        match self.fetch().await {
            Ok(port) => port,
            Err(e) => {
                tracing::debug!("could not fetch runtime config {}: {}", self.url, e);
                None
            }
        }
    }
}

/// Fixed hint, for embedding and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticConfigHint(pub Option<u16>);

#[async_trait]
impl ConfigHintProvider for StaticConfigHint {
    async fn try_get_port(&self) -> Option<u16> {
        self.0
    }
}
