//! Discovery Cache
//!
//! Remembers the last backend URL that passed a health probe, with a hard
//! TTL and a soft revalidation point at half the TTL.

use crate::domain::value_objects::BaseUrl;
use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Discovered {
    url: BaseUrl,
    discovered_at: Instant,
}

/// Holder of the process-wide discovery state.
///
/// The state is replaced as a whole on every write; there are no partial
/// updates. An expired entry is kept (so it can serve as a stale fallback)
/// until it is invalidated or overwritten.
#[derive(Debug)]
pub struct DiscoveryCache {
    ttl: Duration,
    state: RwLock<Option<Discovered>>,
}

impl DiscoveryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached URL, only while it is younger than the TTL.
    pub fn get(&self) -> Option<BaseUrl> {
        self.state
            .read()
            .as_ref()
            .filter(|d| d.discovered_at.elapsed() < self.ttl)
            .map(|d| d.url.clone())
    }

    /// The cached URL regardless of age.
    pub fn peek(&self) -> Option<BaseUrl> {
        self.state.read().as_ref().map(|d| d.url.clone())
    }

    /// Whether the entry is past half its TTL and should be re-probed.
    pub fn should_revalidate(&self) -> bool {
        self.state
            .read()
            .as_ref()
            .map(|d| d.discovered_at.elapsed() > self.ttl / 2)
            .unwrap_or(false)
    }

    /// Age of the current entry.
    pub fn age(&self) -> Option<Duration> {
        self.state.read().as_ref().map(|d| d.discovered_at.elapsed())
    }

    /// Replace the cached URL and stamp it with the current time.
    pub fn set(&self, url: BaseUrl) {
        *self.state.write() = Some(Discovered {
            url,
            discovered_at: Instant::now(),
        });
    }

    pub fn invalidate(&self) {
        if self.state.write().take().is_some() {
            tracing::debug!("discovery cache invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    fn url(port: u16) -> BaseUrl {
        BaseUrl::local("localhost", port).unwrap()
    }

    #[test]
    fn test_empty() {
        let cache = DiscoveryCache::new(TTL);
        assert!(cache.get().is_none());
        assert!(cache.peek().is_none());
        assert!(cache.age().is_none());
        assert!(!cache.should_revalidate());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_until_ttl() {
        let cache = DiscoveryCache::new(TTL);
        cache.set(url(5001));

        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        assert_eq!(cache.get(), Some(url(5001)));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.get().is_none());
        // Expired entries stay visible to peek
        assert_eq!(cache.peek(), Some(url(5001)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidate_after_half_ttl() {
        let cache = DiscoveryCache::new(TTL);
        cache.set(url(5001));
        assert!(!cache.should_revalidate());

        tokio::time::advance(TTL / 2).await;
        assert!(!cache.should_revalidate());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.should_revalidate());
        assert!(cache.get().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_replaces_and_restamps() {
        let cache = DiscoveryCache::new(TTL);
        cache.set(url(5001));
        tokio::time::advance(Duration::from_secs(400)).await;

        cache.set(url(5002));
        assert_eq!(cache.get(), Some(url(5002)));
        assert_eq!(cache.age(), Some(Duration::ZERO));
        assert!(!cache.should_revalidate());
    }

    #[test]
    fn test_invalidate() {
        let cache = DiscoveryCache::new(TTL);
        cache.set(url(5001));
        cache.invalidate();
        assert!(cache.get().is_none());
        assert!(cache.peek().is_none());

        // Idempotent
        cache.invalidate();
        assert!(cache.peek().is_none());
    }
}
