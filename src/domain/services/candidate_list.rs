//! Candidate List
//!
//! Builds the ordered set of base URLs tried during discovery.

use crate::config::Config;
use crate::domain::entities::Candidate;
use crate::domain::value_objects::{BaseUrl, CandidateOrigin};
use std::collections::HashSet;

/// Candidate sources resolved from configuration.
///
/// Invalid URLs are dropped here (with a warning) rather than failing the
/// whole discovery round.
#[derive(Debug, Clone)]
pub struct CandidateList {
    explicit: Option<BaseUrl>,
    production_url: Option<BaseUrl>,
    fallback_host: String,
    fallback_ports: Vec<u16>,
}

impl CandidateList {
    pub fn new(
        explicit: Option<BaseUrl>,
        production_url: Option<BaseUrl>,
        fallback_host: impl Into<String>,
        fallback_ports: Vec<u16>,
    ) -> Self {
        Self {
            explicit,
            production_url,
            fallback_host: fallback_host.into(),
            fallback_ports,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let explicit = cfg.explicit_url.as_deref().and_then(|raw| parse_or_warn("explicit", raw));
        let production_url = parse_or_warn("production", &cfg.production_url);
        Self::new(
            explicit,
            production_url,
            cfg.fallback_host.clone(),
            cfg.fallback_ports.clone(),
        )
    }

    /// The single trusted production candidate.
    ///
    /// An explicit override wins unless it points at a loopback address.
    /// Returns `None` only if neither an override nor a valid production
    /// URL is configured.
    pub fn production(&self) -> Option<Candidate> {
        match &self.explicit {
            Some(url) if !url.is_loopback() => {
                Some(Candidate::new(url.clone(), CandidateOrigin::ExplicitConfig))
            }
            _ => self
                .production_url
                .clone()
                .map(|url| Candidate::new(url, CandidateOrigin::ProductionFixed)),
        }
    }

    /// Ordered, de-duplicated development candidates.
    ///
    /// Explicit URL first, then the runtime hint port, then the fallback
    /// ports. Duplicates keep their first position.
    pub fn development(&self, hint_port: Option<u16>) -> Vec<Candidate> {
        let mut ordered = Vec::with_capacity(self.fallback_ports.len() + 2);

        if let Some(url) = &self.explicit {
            ordered.push(Candidate::new(url.clone(), CandidateOrigin::ExplicitConfig));
        }

        if let Some(port) = hint_port {
            match BaseUrl::local(&self.fallback_host, port) {
                Ok(url) => ordered.push(Candidate::new(url, CandidateOrigin::RuntimeHint)),
                Err(e) => tracing::debug!("ignoring runtime port hint {}: {}", port, e),
            }
        }

        for &port in &self.fallback_ports {
            if let Ok(url) = BaseUrl::local(&self.fallback_host, port) {
                ordered.push(Candidate::new(url, CandidateOrigin::FallbackPort));
            }
        }

        let mut seen = HashSet::new();
        ordered.retain(|c| seen.insert(c.url.clone()));
        ordered
    }

    /// Candidates for the given mode. Recomputed on every call.
    pub fn build(&self, is_production: bool, hint_port: Option<u16>) -> Vec<Candidate> {
        if is_production {
            self.production().into_iter().collect()
        } else {
            self.development(hint_port)
        }
    }
}

fn parse_or_warn(what: &str, raw: &str) -> Option<BaseUrl> {
    match BaseUrl::parse(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!("ignoring invalid {} backend url: {}", what, e);
            None
        }
    }
}
