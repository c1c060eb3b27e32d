//! Circuit Breaker Pattern
//!
//! Stops discovery from probing a backend that keeps failing its health
//! checks, so an outage is not amplified by a probe on every request.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing is allowed again
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(120),
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    /// Normal operation - probes allowed
    #[default]
    Closed,
    /// Circuit tripped - probes blocked until the cooldown elapses
    Open,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker guarding health probes.
///
/// One instance per process; mutated only by probe outcomes and read by
/// the discoverer before each probe. After the cooldown the next
/// [`is_open`](Self::is_open) call resets it completely, there is no
/// gradual half-open recovery.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Record a failed probe.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        if state.consecutive_failures >= self.config.failure_threshold && state.opened_at.is_none() {
            state.opened_at = Some(Instant::now());
            tracing::warn!(
                "health check circuit breaker opened after {} failures, probing paused for {}s",
                state.consecutive_failures,
                self.config.cooldown.as_secs()
            );
        }
    }

    /// Record a successful probe.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.opened_at.is_some() {
            tracing::info!("health check circuit breaker closed (probe succeeded)");
        }
        *state = BreakerState::default();
    }

    /// Whether probing is currently blocked.
    ///
    /// Once the cooldown has elapsed this call resets the breaker and
    /// returns false.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock();
        match state.opened_at {
            Some(opened_at) if opened_at.elapsed() < self.config.cooldown => true,
            Some(_) => {
                *state = BreakerState::default();
                tracing::info!("health check circuit breaker cooldown elapsed, probing resumed");
                false
            }
            None => false,
        }
    }

    /// Get the current state without applying the cooldown reset.
    pub fn state(&self) -> CircuitState {
        if self.state.lock().opened_at.is_some() {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    /// Get metrics for the circuit.
    pub fn metrics(&self) -> CircuitMetrics {
        let state = self.state.lock();
        CircuitMetrics {
            state: if state.opened_at.is_some() {
                CircuitState::Open
            } else {
                CircuitState::Closed
            },
            consecutive_failures: state.consecutive_failures,
        }
    }

    /// Manually reset the circuit to closed.
    pub fn reset(&self) {
        *self.state.lock() = BreakerState::default();
        tracing::info!("health check circuit breaker manually reset");
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

/// Metrics for the circuit.
#[derive(Debug, Clone, Default)]
pub struct CircuitMetrics {
    pub state: CircuitState,
    pub consecutive_failures: u32,
}
