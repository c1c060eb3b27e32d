//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use url::{Host, Url};

/// Reasons a string is rejected as a backend base URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BaseUrlError {
    #[error("invalid url {0:?}: {1}")]
    Parse(String, String),
    #[error("unsupported scheme {0:?} (expected http or https)")]
    Scheme(String),
    #[error("url {0:?} has no host")]
    MissingHost(String),
    #[error("url {0:?} must not carry a path, query or fragment")]
    HasPath(String),
}

/// Absolute address of one backend instance: scheme, host and port only.
///
/// Always stored in canonical form without a trailing slash, so two
/// `BaseUrl`s compare equal exactly when they address the same origin.
///
/// # Examples
/// ```
/// use backend_discovery::BaseUrl;
///
/// let url: BaseUrl = "http://localhost:5001/".parse().unwrap();
/// assert_eq!(url.as_str(), "http://localhost:5001");
/// assert_eq!(url.join("/api/health"), "http://localhost:5001/api/health");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BaseUrl {
    origin: String,
    loopback: bool,
}

impl BaseUrl {
    /// Parse and validate a base URL.
    pub fn parse(raw: &str) -> Result<Self, BaseUrlError> {
        let trimmed = raw.trim();
        let url = Url::parse(trimmed)
            .map_err(|e| BaseUrlError::Parse(trimmed.to_string(), e.to_string()))?;

        match url.scheme() {
            "http" | "https" => {}
            other => return Err(BaseUrlError::Scheme(other.to_string())),
        }

        let loopback = match url.host() {
            Some(Host::Domain(d)) => d.eq_ignore_ascii_case("localhost") || d.ends_with(".localhost"),
            Some(Host::Ipv4(ip)) => ip.is_loopback(),
            Some(Host::Ipv6(ip)) => ip.is_loopback(),
            None => return Err(BaseUrlError::MissingHost(trimmed.to_string())),
        };

        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return Err(BaseUrlError::HasPath(trimmed.to_string()));
        }

        Ok(Self {
            origin: url.origin().ascii_serialization(),
            loopback,
        })
    }

    /// Build the `http://{host}:{port}` URL for a local development port.
    pub fn local(host: &str, port: u16) -> Result<Self, BaseUrlError> {
        Self::parse(&format!("http://{}:{}", host, port))
    }

    /// Canonical string form (no trailing slash).
    pub fn as_str(&self) -> &str {
        &self.origin
    }

    /// Whether the host is `localhost` or a loopback IP.
    pub fn is_loopback(&self) -> bool {
        self.loopback
    }

    /// Append an absolute path to this base URL.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.origin, path)
    }
}

impl FromStr for BaseUrl {
    type Err = BaseUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = BaseUrlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BaseUrl> for String {
    fn from(value: BaseUrl) -> Self {
        value.origin
    }
}

impl std::fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.origin)
    }
}

/// Where a discovery candidate came from. Order of declaration is the
/// order of preference in development mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateOrigin {
    /// Explicit URL from configuration
    ExplicitConfig,
    /// Port read from the runtime `config.json` hint
    RuntimeHint,
    /// One of the well-known local development ports
    FallbackPort,
    /// The fixed production address
    ProductionFixed,
}

impl CandidateOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplicitConfig => "explicit-config",
            Self::RuntimeHint => "runtime-hint",
            Self::FallbackPort => "fallback-port",
            Self::ProductionFixed => "production-fixed",
        }
    }
}

impl std::fmt::Display for CandidateOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
