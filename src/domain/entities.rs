//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of backend discovery.
//! They have no I/O dependencies and contain only business logic.

use crate::domain::value_objects::{BaseUrl, CandidateOrigin};
use serde::Serialize;
use tokio::time::Instant;

/// A base URL proposed for health-checking during discovery.
///
/// Only used to order probing; nothing retains candidates after a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: BaseUrl,
    pub origin: CandidateOrigin,
}

impl Candidate {
    pub fn new(url: BaseUrl, origin: CandidateOrigin) -> Self {
        Self { url, origin }
    }
}

/// Coarse connection state reported by the backend monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Last health check passed
    Connected,
    /// Not connected yet, still within the first few failures
    Connecting,
    /// Repeated failures; retrying periodically
    Unavailable,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Snapshot of what the monitor knows about the backend connection.
#[derive(Debug, Clone)]
pub struct BackendStatus {
    /// URL the monitor last checked (or will check next)
    pub backend_url: BaseUrl,
    /// Whether the last health check passed
    pub connected: bool,
    /// Whether a check is currently running
    pub checking: bool,
    /// Consecutive failed checks
    pub error_count: u32,
    /// When a check last passed
    pub last_check: Option<Instant>,
}

/// Failed checks after which the connection counts as unavailable
/// rather than still connecting.
pub const UNAVAILABLE_AFTER_ERRORS: u32 = 3;

impl BackendStatus {
    pub fn new(backend_url: BaseUrl) -> Self {
        Self {
            backend_url,
            connected: false,
            checking: false,
            error_count: 0,
            last_check: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.connected {
            ConnectionState::Connected
        } else if self.error_count > UNAVAILABLE_AFTER_ERRORS {
            ConnectionState::Unavailable
        } else {
            ConnectionState::Connecting
        }
    }

    /// Human-readable status line for a UI banner.
    pub fn message(&self) -> String {
        if self.checking {
            return "Checking connection...".to_string();
        }
        match self.state() {
            ConnectionState::Connected => format!("Connected to {}", self.backend_url),
            ConnectionState::Unavailable => "Backend unavailable - retrying periodically".to_string(),
            ConnectionState::Connecting => "Connecting to backend...".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> BackendStatus {
        BackendStatus::new(BaseUrl::parse("http://localhost:5001").unwrap())
    }

    #[test]
    fn test_candidate_new() {
        let url = BaseUrl::parse("http://localhost:5002").unwrap();
        let c = Candidate::new(url.clone(), CandidateOrigin::FallbackPort);
        assert_eq!(c.url, url);
        assert_eq!(c.origin, CandidateOrigin::FallbackPort);
    }

    #[test]
    fn test_status_initial() {
        let s = status();
        assert_eq!(s.state(), ConnectionState::Connecting);
        assert_eq!(s.message(), "Connecting to backend...");
        assert!(s.last_check.is_none());
    }

    #[test]
    fn test_status_connected() {
        let mut s = status();
        s.connected = true;
        assert_eq!(s.state(), ConnectionState::Connected);
        assert_eq!(s.message(), "Connected to http://localhost:5001");
    }

    #[test]
    fn test_status_unavailable_after_threshold() {
        let mut s = status();
        s.error_count = UNAVAILABLE_AFTER_ERRORS;
        assert_eq!(s.state(), ConnectionState::Connecting);

        s.error_count += 1;
        assert_eq!(s.state(), ConnectionState::Unavailable);
        assert_eq!(s.message(), "Backend unavailable - retrying periodically");
    }

    #[test]
    fn test_status_checking_message_wins() {
        let mut s = status();
        s.connected = true;
        s.checking = true;
        assert_eq!(s.message(), "Checking connection...");
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Unavailable.to_string(), "unavailable");
    }
}
