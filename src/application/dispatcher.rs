//! Resilient Dispatcher
//!
//! Sends a request to the discovered backend and, when the backend cannot be
//! reached at all, rediscovers it and retries exactly once.

use crate::application::discoverer::Discoverer;
use crate::domain::ports::HeaderInjector;
use crate::domain::value_objects::BaseUrl;
use crate::infrastructure::request_registry::RequestRegistry;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Failure of a dispatched request.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No HTTP response was obtained (refused, DNS, timeout, reset)
    #[error("backend unreachable at {url}: {source}")]
    Connectivity {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The backend answered with a 4xx/5xx status
    #[error("backend returned {status} for {url}")]
    Application {
        url: String,
        status: StatusCode,
        body: Bytes,
    },
    /// Superseded by a newer request under the same key, or torn down
    #[error("request {key} was cancelled")]
    Cancelled { key: String },
    /// The request could not be built (bad header, bad URL)
    #[error("invalid request to {url}: {source}")]
    InvalidRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The request body could not be serialized
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DispatchError {
    /// Whether this failure says the backend address may be wrong.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, DispatchError::Connectivity { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Cancelled { .. })
    }

    /// HTTP status of an application error.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DispatchError::Application { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn from_reqwest(url: String, source: reqwest::Error) -> Self {
        if source.is_builder() {
            DispatchError::InvalidRequest { url, source }
        } else {
            DispatchError::Connectivity { url, source }
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Overrides the dispatcher's default timeout
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, DispatchError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A successful (non-4xx/5xx) response, fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Dispatcher for requests against the discovered backend.
#[derive(Clone)]
pub struct ResilientDispatcher {
    client: reqwest::Client,
    discoverer: Discoverer,
    registry: RequestRegistry,
    injector: Option<Arc<dyn HeaderInjector>>,
    default_timeout: Duration,
}

impl ResilientDispatcher {
    pub fn new(
        client: reqwest::Client,
        discoverer: Discoverer,
        registry: RequestRegistry,
        default_timeout: Duration,
    ) -> Self {
        Self {
            client,
            discoverer,
            registry,
            injector: None,
            default_timeout,
        }
    }

    /// Set the collaborator that decorates every outgoing request.
    pub fn with_injector(mut self, injector: Arc<dyn HeaderInjector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }

    /// Send `options` to `{backend}{path}`.
    ///
    /// With a `key`, a newer request under the same key cancels this one.
    /// A connectivity failure on the first attempt triggers one rediscovery
    /// and, if that yields a different backend, one retry; if the retry
    /// fails too the original error is returned. Application errors and
    /// cancellations are returned as they are.
    pub async fn request(
        &self,
        path: &str,
        options: RequestOptions,
        key: Option<&str>,
    ) -> Result<ApiResponse, DispatchError> {
        let path = normalize_path(path);
        let base = self.discoverer.discover().await;

        let err = match self.attempt(&base, &path, &options, key).await {
            Ok(resp) => return Ok(resp),
            Err(err) if err.is_connectivity() => err,
            Err(err) => return Err(err),
        };

        tracing::warn!("backend request failed ({}), attempting rediscovery", err);
        let fresh = self.discoverer.rediscover().await;
        if fresh == base {
            tracing::debug!("rediscovery returned the same backend {}, not retrying", base);
            return Err(err);
        }

        tracing::info!("retrying {} with discovered backend {}", path, fresh);
        match self.attempt(&fresh, &path, &options, key).await {
            Ok(resp) => Ok(resp),
            Err(retry_err) if retry_err.is_cancelled() => Err(retry_err),
            Err(retry_err) => {
                tracing::debug!("retry against {} failed: {}", fresh, retry_err);
                Err(err)
            }
        }
    }

    pub async fn get(&self, path: &str, key: Option<&str>) -> Result<ApiResponse, DispatchError> {
        self.request(path, RequestOptions::new(Method::GET), key).await
    }

    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        key: Option<&str>,
    ) -> Result<ApiResponse, DispatchError> {
        self.request(path, RequestOptions::new(Method::POST).json(body)?, key)
            .await
    }

    pub async fn put<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        key: Option<&str>,
    ) -> Result<ApiResponse, DispatchError> {
        self.request(path, RequestOptions::new(Method::PUT).json(body)?, key)
            .await
    }

    pub async fn delete(&self, path: &str, key: Option<&str>) -> Result<ApiResponse, DispatchError> {
        self.request(path, RequestOptions::new(Method::DELETE), key).await
    }

    /// One network attempt, tracked under `key` when given.
    async fn attempt(
        &self,
        base: &BaseUrl,
        path: &str,
        options: &RequestOptions,
        key: Option<&str>,
    ) -> Result<ApiResponse, DispatchError> {
        let url = base.join(path);

        let mut headers = options.headers.clone();
        if let Some(injector) = &self.injector {
            injector.inject(path, &mut headers);
        }

        let mut builder = self
            .client
            .request(options.method.clone(), &url)
            .headers(headers)
            .timeout(options.timeout.unwrap_or(self.default_timeout));
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(body) = &options.body {
            // Sets Content-Type: application/json unless the caller did
            builder = builder.json(body);
        }

        let call = execute(builder, url);
        match key {
            Some(key) => match self.registry.run(key, call).await {
                Some(result) => result,
                None => {
                    tracing::debug!("request cancelled: {}", key);
                    Err(DispatchError::Cancelled {
                        key: key.to_string(),
                    })
                }
            },
            None => call.await,
        }
    }
}

async fn execute(builder: RequestBuilder, url: String) -> Result<ApiResponse, DispatchError> {
    let resp = match builder.send().await {
        Ok(resp) => resp,
        Err(e) => return Err(DispatchError::from_reqwest(url, e)),
    };

    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.bytes().await;

    // A status line was received, so the backend is reachable even if the
    // body is cut short
    if status.is_client_error() || status.is_server_error() {
        let body = body.unwrap_or_else(|e| {
            tracing::debug!("failed to read error body from {}: {}", url, e);
            Bytes::new()
        });
        return Err(DispatchError::Application { url, status, body });
    }

    let body = match body {
        Ok(body) => body,
        Err(e) => return Err(DispatchError::from_reqwest(url, e)),
    };

    Ok(ApiResponse {
        status,
        headers,
        body,
    })
}

/// Ensure the path starts with `/`.
fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
