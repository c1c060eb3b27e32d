use crate::domain::value_objects::{BaseUrl, BaseUrlError};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Default production backend, trusted without probing.
pub const DEFAULT_PRODUCTION_URL: &str = "https://eqdatascraper-backend-production.up.railway.app";

/// Returned when nothing better is known (breaker open, no candidates).
pub const DEFAULT_FALLBACK_URL: &str = "http://localhost:5001";

/// Common local development ports, probed in this order.
pub const DEFAULT_FALLBACK_PORTS: [u16; 6] = [5002, 5001, 5000, 3001, 8000, 8080];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field}: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: BaseUrlError,
    },
    #[error("fallback_ports must not be empty")]
    NoFallbackPorts,
    #[error("breaker_failure_threshold must be at least 1")]
    ZeroFailureThreshold,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Environment
    pub production: bool,
    pub debug: bool,

    // Candidate sources
    pub explicit_url: Option<String>,
    pub production_url: String,
    pub fallback_host: String,
    pub fallback_ports: Vec<u16>,
    pub fallback_url: String,
    pub config_hint_url: Option<String>,

    // Probing
    pub probe_timeout_ms: u64,
    pub revalidate_timeout_ms: u64,
    pub probe_interval_ms: u64,

    // Discovery cache
    pub cache_ttl_secs: u64,

    // Circuit breaker
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_secs: u64,

    // Dispatch
    pub request_timeout_ms: u64,

    // Backend monitor
    pub monitor_connected_interval_secs: u64,
    pub monitor_disconnected_interval_secs: u64,
    pub monitor_rediscover_after: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            production: false,
            debug: false,
            explicit_url: None,
            production_url: DEFAULT_PRODUCTION_URL.to_string(),
            fallback_host: "localhost".to_string(),
            fallback_ports: DEFAULT_FALLBACK_PORTS.to_vec(),
            fallback_url: DEFAULT_FALLBACK_URL.to_string(),
            config_hint_url: None,
            probe_timeout_ms: 3000,
            revalidate_timeout_ms: 5000,
            probe_interval_ms: 0,
            cache_ttl_secs: 600,
            breaker_failure_threshold: 5,
            breaker_cooldown_secs: 120,
            request_timeout_ms: 5000,
            monitor_connected_interval_secs: 30,
            monitor_disconnected_interval_secs: 10,
            monitor_rediscover_after: 3,
        }
    }
}

impl Config {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn revalidate_timeout(&self) -> Duration {
        Duration::from_millis(self.revalidate_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn monitor_interval(&self, connected: bool) -> Duration {
        if connected {
            Duration::from_secs(self.monitor_connected_interval_secs)
        } else {
            Duration::from_secs(self.monitor_disconnected_interval_secs)
        }
    }

    /// Parsed `fallback_url`.
    pub fn fallback_base_url(&self) -> Result<BaseUrl, ConfigError> {
        BaseUrl::parse(&self.fallback_url).map_err(|source| ConfigError::InvalidUrl {
            field: "fallback_url",
            source,
        })
    }

    /// Reject settings the discovery layer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(explicit) = &self.explicit_url {
            BaseUrl::parse(explicit).map_err(|source| ConfigError::InvalidUrl {
                field: "explicit_url",
                source,
            })?;
        }
        BaseUrl::parse(&self.production_url).map_err(|source| ConfigError::InvalidUrl {
            field: "production_url",
            source,
        })?;
        self.fallback_base_url()?;
        BaseUrl::local(&self.fallback_host, 1).map_err(|source| ConfigError::InvalidUrl {
            field: "fallback_host",
            source,
        })?;
        if self.fallback_ports.is_empty() {
            return Err(ConfigError::NoFallbackPorts);
        }
        if self.breaker_failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

/// The API base URL wins over the plain backend URL; blank values count
/// as unset.
fn explicit_override(api_base_url: Option<String>, backend_url: Option<String>) -> Option<String> {
    let non_blank = |v: &String| !v.trim().is_empty();
    api_base_url
        .filter(non_blank)
        .or_else(|| backend_url.filter(non_blank))
}

fn parse_ports(raw: &str) -> Vec<u16> {
    raw.split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}

pub fn load_config() -> anyhow::Result<Config> {
    let defaults = Config::default();

    let production = env_flag("BACKEND_PRODUCTION");
    let debug = std::env::var("DEBUG").is_ok();

    let explicit_url = explicit_override(
        std::env::var("BACKEND_API_BASE_URL").ok(),
        std::env::var("BACKEND_URL").ok(),
    );

    let production_url = std::env::var("BACKEND_PRODUCTION_URL")
        .unwrap_or(defaults.production_url);

    let fallback_host = std::env::var("BACKEND_FALLBACK_HOST")
        .unwrap_or(defaults.fallback_host);

    let fallback_ports = std::env::var("BACKEND_FALLBACK_PORTS")
        .map(|v| parse_ports(&v))
        .unwrap_or(defaults.fallback_ports);

    let fallback_url = std::env::var("BACKEND_FALLBACK_URL")
        .unwrap_or(defaults.fallback_url);

    let config_hint_url = std::env::var("BACKEND_CONFIG_HINT_URL").ok();

    let cfg = Config {
        production,
        debug,
        explicit_url,
        production_url,
        fallback_host,
        fallback_ports,
        fallback_url,
        config_hint_url,
        probe_timeout_ms: env_parse("BACKEND_PROBE_TIMEOUT_MS", defaults.probe_timeout_ms),
        revalidate_timeout_ms: env_parse("BACKEND_REVALIDATE_TIMEOUT_MS", defaults.revalidate_timeout_ms),
        probe_interval_ms: env_parse("BACKEND_PROBE_INTERVAL_MS", defaults.probe_interval_ms),
        cache_ttl_secs: env_parse("BACKEND_CACHE_TTL_SECS", defaults.cache_ttl_secs),
        breaker_failure_threshold: env_parse(
            "BACKEND_BREAKER_FAILURE_THRESHOLD",
            defaults.breaker_failure_threshold,
        ),
        breaker_cooldown_secs: env_parse("BACKEND_BREAKER_COOLDOWN_SECS", defaults.breaker_cooldown_secs),
        request_timeout_ms: env_parse("BACKEND_REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
        monitor_connected_interval_secs: env_parse(
            "BACKEND_MONITOR_CONNECTED_INTERVAL_SECS",
            defaults.monitor_connected_interval_secs,
        ),
        monitor_disconnected_interval_secs: env_parse(
            "BACKEND_MONITOR_DISCONNECTED_INTERVAL_SECS",
            defaults.monitor_disconnected_interval_secs,
        ),
        monitor_rediscover_after: env_parse(
            "BACKEND_MONITOR_REDISCOVER_AFTER",
            defaults.monitor_rediscover_after,
        ),
    };

    cfg.validate()?;
    Ok(cfg)
}
