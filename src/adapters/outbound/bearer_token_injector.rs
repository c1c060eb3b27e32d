//! Bearer Token Injector
//!
//! Adds the session's access token to outgoing requests.

use crate::domain::ports::HeaderInjector;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

/// Endpoints that must be called without credentials.
pub const PUBLIC_ENDPOINTS: [&str; 4] = [
    "/api/health",
    "/api/auth/google/login",
    "/api/auth/google/callback",
    "/api/auth/refresh",
];

/// Header injector holding the current access token.
///
/// The session layer owns the token and pushes updates with
/// [`set_token`](Self::set_token); this type only decorates requests.
#[derive(Debug, Default)]
pub struct BearerTokenInjector {
    token: RwLock<Option<String>>,
}

impl BearerTokenInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    fn is_public(path: &str) -> bool {
        PUBLIC_ENDPOINTS.iter().any(|p| path.starts_with(p))
    }
}

impl HeaderInjector for BearerTokenInjector {
    fn inject(&self, path: &str, headers: &mut HeaderMap) {
        if Self::is_public(path) {
            return;
        }
        let token = self.token.read();
        let Some(token) = token.as_deref() else {
            return;
        };
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("access token is not a valid header value, not sent"),
        }
    }
}
