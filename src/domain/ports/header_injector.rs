//! Header Injector Port
//!
//! Hook for collaborators (auth/session) that decorate outgoing requests.

use reqwest::header::HeaderMap;

/// Adds headers to a request before it is dispatched.
///
/// Called once per network attempt, so a retried request is decorated
/// against the same `path` again.
pub trait HeaderInjector: Send + Sync {
    fn inject(&self, path: &str, headers: &mut HeaderMap);
}
