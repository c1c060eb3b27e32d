//! Backend Client - the surface the UI/store layer talks to
//!
//! Wires discoverer, request registry and dispatcher together and owns
//! teardown.

use crate::adapters::outbound::{HttpConfigHint, HttpHealthProbe, StaticConfigHint};
use crate::application::backend_monitor::BackendMonitor;
use crate::application::discoverer::Discoverer;
use crate::application::dispatcher::{ApiResponse, DispatchError, RequestOptions, ResilientDispatcher};
use crate::config::{Config, ConfigError};
use crate::domain::ports::{ConfigHintProvider, HeaderInjector, HealthProbe};
use crate::domain::value_objects::BaseUrl;
use crate::infrastructure::request_registry::RequestRegistry;
use crate::infrastructure::shutdown::TeardownGuard;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Discovery-aware backend client.
///
/// Construct once at startup and share by reference. Dropping it (or
/// calling [`shutdown`](Self::shutdown)) cancels every tracked request.
pub struct BackendClient {
    config: Config,
    discoverer: Discoverer,
    dispatcher: ResilientDispatcher,
    probe: Arc<dyn HealthProbe>,
    teardown: TeardownGuard,
}

impl BackendClient {
    /// Build a client with the reqwest-backed probe and config hint.
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().build()?;
        let probe: Arc<dyn HealthProbe> = Arc::new(HttpHealthProbe::with_client(client.clone()));
        let hints: Arc<dyn ConfigHintProvider> = match &config.config_hint_url {
            Some(url) => Arc::new(HttpConfigHint::new(
                client.clone(),
                url.clone(),
                config.probe_timeout(),
            )),
            None => Arc::new(StaticConfigHint(None)),
        };
        Self::with_parts(config, client, probe, hints).map_err(Into::into)
    }

    /// Build a client from explicit collaborators.
    pub fn with_parts(
        config: Config,
        client: reqwest::Client,
        probe: Arc<dyn HealthProbe>,
        hints: Arc<dyn ConfigHintProvider>,
    ) -> Result<Self, ConfigError> {
        let discoverer = Discoverer::new(&config, probe.clone(), hints)?;
        let registry = RequestRegistry::new();
        let dispatcher = ResilientDispatcher::new(
            client,
            discoverer.clone(),
            registry.clone(),
            config.request_timeout(),
        );

        Ok(Self {
            teardown: TeardownGuard::new(registry, CancellationToken::new()),
            config,
            discoverer,
            dispatcher,
            probe,
        })
    }

    /// Set the auth/session collaborator that decorates requests.
    pub fn with_injector(mut self, injector: Arc<dyn HeaderInjector>) -> Self {
        self.dispatcher = self.dispatcher.with_injector(injector);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn discoverer(&self) -> &Discoverer {
        &self.discoverer
    }

    pub fn dispatcher(&self) -> &ResilientDispatcher {
        &self.dispatcher
    }

    pub fn registry(&self) -> &RequestRegistry {
        self.dispatcher.registry()
    }

    pub async fn discover_backend_url(&self) -> BaseUrl {
        self.discoverer.discover().await
    }

    /// Cached backend URL; `None` means "not connected".
    pub fn current_backend_url(&self) -> Option<BaseUrl> {
        self.discoverer.current()
    }

    pub fn clear_discovery_cache(&self) {
        self.discoverer.clear_cache();
    }

    pub async fn request(
        &self,
        path: &str,
        options: RequestOptions,
        key: Option<&str>,
    ) -> Result<ApiResponse, DispatchError> {
        self.dispatcher.request(path, options, key).await
    }

    pub async fn get(&self, path: &str, key: Option<&str>) -> Result<ApiResponse, DispatchError> {
        self.dispatcher.get(path, key).await
    }

    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        key: Option<&str>,
    ) -> Result<ApiResponse, DispatchError> {
        self.dispatcher.post(path, body, key).await
    }

    pub async fn put<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        key: Option<&str>,
    ) -> Result<ApiResponse, DispatchError> {
        self.dispatcher.put(path, body, key).await
    }

    pub async fn delete(&self, path: &str, key: Option<&str>) -> Result<ApiResponse, DispatchError> {
        self.dispatcher.delete(path, key).await
    }

    /// Start a connection monitor that stops on teardown.
    pub fn spawn_monitor(&self) -> (BackendMonitor, tokio::task::JoinHandle<()>) {
        let monitor = BackendMonitor::new(&self.config, self.discoverer.clone(), self.probe.clone());
        let handle = monitor.start(self.teardown.token().child_token());
        (monitor, handle)
    }

    /// Token cancelled on teardown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.teardown.token()
    }

    /// Cancel all tracked requests and stop background tasks.
    pub fn shutdown(&self) {
        self.teardown.teardown();
    }
}
