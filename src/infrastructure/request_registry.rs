//! Request Registry
//!
//! Tracks in-flight requests by caller-supplied key so that a newer request
//! under the same key cancels the older one, and teardown cancels them all.

use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct PendingRequest {
    id: u64,
    token: CancellationToken,
}

/// Registry of cancellable in-flight requests.
///
/// Cheap to clone; clones share the same set of pending requests.
/// At most one request is tracked per key: starting a second one cancels
/// the first (last writer wins).
#[derive(Debug, Clone, Default)]
pub struct RequestRegistry {
    pending: Arc<DashMap<String, PendingRequest>>,
    next_id: Arc<AtomicU64>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request under `key`, cancelling any request
    /// already tracked under it.
    ///
    /// The returned guard removes the entry when dropped, unless a newer
    /// request has replaced it in the meantime.
    pub fn start(&self, key: &str) -> RequestGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let previous = self.pending.insert(
            key.to_string(),
            PendingRequest {
                id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
            tracing::debug!("request {} superseded, cancelled previous", key);
        }

        RequestGuard {
            registry: self.clone(),
            key: key.to_string(),
            id,
            token,
        }
    }

    /// Cancel and forget the request under `key`, if any.
    pub fn cancel(&self, key: &str) {
        if let Some((_, pending)) = self.pending.remove(key) {
            pending.token.cancel();
            tracing::debug!("request {} cancelled", key);
        }
    }

    /// Cancel and forget every tracked request.
    pub fn cancel_all(&self) {
        let mut cancelled = 0usize;
        self.pending.retain(|_, pending| {
            pending.token.cancel();
            cancelled += 1;
            false
        });
        if cancelled > 0 {
            tracing::info!("cancelled {} pending requests", cancelled);
        }
    }

    /// Forget the request under `key` without cancelling it.
    pub fn finish(&self, key: &str) {
        self.pending.remove(key);
    }

    /// Run `fut` under a fresh registration for `key`.
    ///
    /// Returns `None` if the request was cancelled before `fut` finished;
    /// in that case `fut` is dropped immediately.
    pub async fn run<F: Future>(&self, key: &str, fut: F) -> Option<F::Output> {
        let guard = self.start(key);
        guard.run(fut).await
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// RAII handle for one tracked request.
///
/// Dropping it deregisters the request if it is still the current one
/// for its key.
#[derive(Debug)]
pub struct RequestGuard {
    registry: RequestRegistry,
    key: String,
    id: u64,
    token: CancellationToken,
}

impl RequestGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive `fut` to completion unless this request is cancelled first.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let id = self.id;
        self.registry
            .pending
            .remove_if(&self.key, |_, pending| pending.id == id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_registry_new() {
        let registry = RequestRegistry::new();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_start_tracks_key() {
        let registry = RequestRegistry::new();
        let guard = registry.start("spells");
        assert!(registry.contains("spells"));
        assert_eq!(guard.key(), "spells");
        assert!(!guard.is_cancelled());
    }

    #[test]
    fn test_second_start_cancels_first() {
        let registry = RequestRegistry::new();
        let first = registry.start("k");
        let second = registry.start("k");

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_guard_drop_keeps_newer_entry() {
        let registry = RequestRegistry::new();
        let first = registry.start("k");
        let second = registry.start("k");

        drop(first);
        assert!(registry.contains("k"));

        drop(second);
        assert!(!registry.contains("k"));
    }

    #[test]
    fn test_cancel() {
        let registry = RequestRegistry::new();
        let guard = registry.start("k");

        registry.cancel("k");
        assert!(guard.is_cancelled());
        assert!(registry.is_empty());

        // Unknown keys are a no-op
        registry.cancel("missing");
    }

    #[test]
    fn test_finish_does_not_cancel() {
        let registry = RequestRegistry::new();
        let guard = registry.start("k");

        registry.finish("k");
        assert!(!guard.is_cancelled());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_all() {
        let registry = RequestRegistry::new();
        let a = registry.start("a");
        let b = registry.start("b");
        let c = registry.start("c");

        registry.cancel_all();

        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(c.is_cancelled());
        assert!(registry.is_empty());

        // Still usable afterwards
        let d = registry.start("a");
        assert!(!d.is_cancelled());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clone_shares_state() {
        let registry = RequestRegistry::new();
        let cloned = registry.clone();
        let guard = registry.start("k");

        cloned.cancel("k");
        assert!(guard.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_completes() {
        let registry = RequestRegistry::new();
        let out = registry.run("k", async { 42 }).await;
        assert_eq!(out, Some(42));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_run_preempted_by_newer_request() {
        let registry = RequestRegistry::new();

        let slow = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .run("k", tokio::time::sleep(Duration::from_secs(30)))
                    .await
            })
        };

        // Let the first request register
        while !registry.contains("k") {
            tokio::task::yield_now().await;
        }

        let fast = registry.run("k", async { "second" }).await;
        assert_eq!(fast, Some("second"));

        let first = slow.await.unwrap();
        assert!(first.is_none());
        assert!(registry.is_empty());
    }
}
