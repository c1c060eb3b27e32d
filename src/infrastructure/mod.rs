//! Infrastructure Layer
//!
//! Cross-cutting state holders: circuit breaker, discovery cache, request
//! registry and teardown.

pub mod circuit_breaker;
pub mod discovery_cache;
pub mod request_registry;
pub mod shutdown;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState};
pub use discovery_cache::DiscoveryCache;
pub use request_registry::{RequestGuard, RequestRegistry};
pub use shutdown::{shutdown_signal, TeardownGuard};
