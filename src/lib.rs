//! Backend Discovery Library
//!
//! Finds a live backend among candidate addresses, caches it, and dispatches
//! requests against it with one rediscover-and-retry on connectivity loss.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::outbound::{BearerTokenInjector, HttpConfigHint, HttpHealthProbe, StaticConfigHint};
pub use application::{
    ApiResponse, BackendClient, BackendMonitor, ClientError, DispatchError, Discoverer,
    RequestOptions, ResilientDispatcher,
};
pub use config::{load_config, Config, ConfigError};
pub use domain::entities::{BackendStatus, Candidate, ConnectionState};
pub use domain::ports::{ConfigHintProvider, HeaderInjector, HealthProbe};
pub use domain::services::CandidateList;
pub use domain::value_objects::{BaseUrl, BaseUrlError, CandidateOrigin};
pub use infrastructure::{CircuitBreaker, DiscoveryCache, RequestRegistry};
