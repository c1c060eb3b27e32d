//! HTTP Health Probe
//!
//! Implements HealthProbe with a reqwest `GET {base}/api/health`.

use crate::domain::ports::HealthProbe;
use crate::domain::value_objects::BaseUrl;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::time::Duration;

/// Health endpoint exposed by every backend instance.
pub const HEALTH_PATH: &str = "/api/health";

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

/// reqwest-backed health probe.
///
/// Healthy means: a 2xx response within the timeout whose JSON body has
/// `"status": "healthy"`. Everything else is unhealthy.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(reqwest::Client::builder().build()?))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Perform the check, keeping the failure reason for logging.
    async fn check(&self, url: &BaseUrl, timeout: Duration) -> Result<(), String> {
        let resp = self
            .client
            .get(url.join(HEALTH_PATH))
            .header(ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !resp.status().is_success() {
            return Err(format!("unhealthy status: {}", resp.status()));
        }

        let body: HealthBody = resp
            .json()
            .await
            .map_err(|e| format!("invalid body: {}", e))?;

        if body.status == "healthy" {
            Ok(())
        } else {
            Err(format!("reported status {:?}", body.status))
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, url: &BaseUrl, timeout: Duration) -> bool {
        match self.check(url, timeout).await {
            Ok(()) => {
                tracing::debug!("health probe {} ok", url);
                true
            }
            Err(reason) => {
                // Expected while scanning ports, keep it quiet
                tracing::debug!("health probe {} failed: {}", url, reason);
                false
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn probe_against(template: ResponseTemplate, timeout: Duration) -> bool {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/health"))
            .and(header("accept", "application/json"))
            .respond_with(template)
            .mount(&mock_server)
            .await;

        let url = BaseUrl::parse(&mock_server.uri()).unwrap();
        HttpHealthProbe::new().unwrap().probe(&url, timeout).await
    }

    #[tokio::test]
    async fn test_probe_healthy() {
        let template = ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "healthy",
            "version": "1.0.0"
        }));
        assert!(probe_against(template, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_probe_wrong_status_value() {
        let template =
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "degraded" }));
        assert!(!probe_against(template, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_probe_error_status() {
        let template =
            ResponseTemplate::new(503).set_body_json(serde_json::json!({ "status": "healthy" }));
        assert!(!probe_against(template, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_probe_malformed_body() {
        let template = ResponseTemplate::new(200).set_body_string("OK");
        assert!(!probe_against(template, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let template = ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({ "status": "healthy" }))
            .set_delay(Duration::from_secs(5));
        assert!(!probe_against(template, Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        let url = BaseUrl::parse("http://127.0.0.1:59999").unwrap();
        let probe = HttpHealthProbe::new().unwrap();
        assert!(!probe.probe(&url, Duration::from_millis(500)).await);
    }
}
