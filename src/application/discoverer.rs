//! Discoverer - backend address discovery use case
//!
//! Answers "what is the current backend base URL" by combining the
//! candidate list, health probe, circuit breaker and discovery cache.

use crate::config::{Config, ConfigError};
use crate::domain::ports::{ConfigHintProvider, HealthProbe};
use crate::domain::services::CandidateList;
use crate::domain::value_objects::BaseUrl;
use crate::infrastructure::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::infrastructure::discovery_cache::DiscoveryCache;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

type DiscoveryRound = Shared<BoxFuture<'static, BaseUrl>>;

#[derive(Clone)]
struct InFlight {
    id: u64,
    forced: bool,
    round: DiscoveryRound,
}

/// Backend URL discoverer.
///
/// Cheap to clone; clones share cache, breaker and the in-flight round.
/// [`discover`](Self::discover) never fails: when nothing answers it
/// returns a best guess, which may be unreachable.
#[derive(Clone)]
pub struct Discoverer {
    inner: Arc<Inner>,
}

struct Inner {
    production: bool,
    candidates: CandidateList,
    fallback: BaseUrl,
    probe_timeout: Duration,
    revalidate_timeout: Duration,
    probe_interval: Duration,
    probe: Arc<dyn HealthProbe>,
    hints: Arc<dyn ConfigHintProvider>,
    breaker: CircuitBreaker,
    cache: DiscoveryCache,
    /// At most one discovery round at a time.
    in_flight: Mutex<Option<InFlight>>,
    rounds: AtomicU64,
}

impl Discoverer {
    pub fn new(
        cfg: &Config,
        probe: Arc<dyn HealthProbe>,
        hints: Arc<dyn ConfigHintProvider>,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;

        Ok(Self {
            inner: Arc::new(Inner {
                production: cfg.production,
                candidates: CandidateList::from_config(cfg),
                fallback: cfg.fallback_base_url()?,
                probe_timeout: cfg.probe_timeout(),
                revalidate_timeout: cfg.revalidate_timeout(),
                probe_interval: cfg.probe_interval(),
                probe,
                hints,
                breaker: CircuitBreaker::new(CircuitBreakerConfig {
                    failure_threshold: cfg.breaker_failure_threshold,
                    cooldown: cfg.breaker_cooldown(),
                }),
                cache: DiscoveryCache::new(cfg.cache_ttl()),
                in_flight: Mutex::new(None),
                rounds: AtomicU64::new(0),
            }),
        })
    }

    /// Current backend base URL, discovering it if needed.
    ///
    /// Safe to call repeatedly and concurrently: a fresh cache hit returns
    /// immediately, and concurrent callers that miss share one round.
    pub async fn discover(&self) -> BaseUrl {
        if self.inner.production {
            return self.inner.production_url();
        }

        if let Some(cached) = self.inner.cache.get() {
            if !self.inner.cache.should_revalidate() {
                return cached;
            }
        }

        self.join_round(false).await
    }

    /// Drop the cached URL and run a fresh round.
    ///
    /// Used after a connectivity failure. The breaker does not gate this
    /// path: probing goes ahead even while it is open.
    pub async fn rediscover(&self) -> BaseUrl {
        self.inner.cache.invalidate();

        if self.inner.production {
            return self.inner.production_url();
        }

        self.join_round(true).await
    }

    /// Cached URL without discovering. `None` while disconnected.
    pub fn current(&self) -> Option<BaseUrl> {
        self.inner.cache.peek()
    }

    /// Forget the cached URL, e.g. after connection settings changed.
    pub fn clear_cache(&self) {
        self.inner.cache.invalidate();
    }

    /// Static last-resort URL.
    pub fn fallback(&self) -> &BaseUrl {
        &self.inner.fallback
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    pub fn cache(&self) -> &DiscoveryCache {
        &self.inner.cache
    }

    /// Number of discovery rounds started so far.
    pub fn rounds_started(&self) -> u64 {
        self.inner.rounds.load(Ordering::Relaxed)
    }

    /// Attach to the round in flight, or start one.
    ///
    /// A forced caller does not attach to an unforced round, since that
    /// round stops once the breaker opens. It waits for it to finish and
    /// then starts its own.
    async fn join_round(&self, force: bool) -> BaseUrl {
        loop {
            let (round, joined) = {
                let mut slot = self.inner.in_flight.lock();
                match slot.as_ref() {
                    Some(running) if running.forced || !force => {
                        tracing::debug!("joining discovery already in flight");
                        (running.round.clone(), true)
                    }
                    Some(running) => (running.round.clone(), false),
                    None => {
                        let round = self.start_round(force);
                        *slot = Some(round.clone());
                        (round.round, true)
                    }
                }
            };

            let url = round.await;
            if joined {
                return url;
            }
            tracing::debug!("waited for unforced discovery, starting forced round");
        }
    }

    fn start_round(&self, force: bool) -> InFlight {
        let id = self.inner.rounds.fetch_add(1, Ordering::Relaxed) + 1;
        let inner = self.inner.clone();
        let round = async move {
            let url = inner.run_round(force).await;
            let mut slot = inner.in_flight.lock();
            if matches!(slot.as_ref(), Some(current) if current.id == id) {
                *slot = None;
            }
            url
        }
        .boxed()
        .shared();

        InFlight {
            id,
            forced: force,
            round,
        }
    }
}

impl Inner {
    fn production_url(&self) -> BaseUrl {
        if let Some(url) = self.cache.get() {
            return url;
        }

        // Production trusts configuration: no probing
        let url = self
            .candidates
            .production()
            .map(|c| c.url)
            .unwrap_or_else(|| self.fallback.clone());
        tracing::info!("using production backend {}", url);
        self.cache.set(url.clone());
        url
    }

    /// Probe and feed the outcome to the breaker.
    async fn checked_probe(&self, url: &BaseUrl, timeout: Duration) -> bool {
        let healthy = self.probe.probe(url, timeout).await;
        if healthy {
            self.breaker.record_success();
        } else {
            self.breaker.record_failure();
        }
        healthy
    }

    async fn run_round(&self, force: bool) -> BaseUrl {
        if let Some(cached) = self.cache.get() {
            if !self.cache.should_revalidate() {
                return cached;
            }
            if !force && self.breaker.is_open() {
                // Cannot check, assume it still works
                tracing::debug!("skipping revalidation of {}, circuit breaker open", cached);
                return cached;
            }
            // A passing revalidation keeps the original discovery time
            if self.checked_probe(&cached, self.revalidate_timeout).await {
                return cached;
            }
            tracing::info!("cached backend {} stopped responding", cached);
            self.cache.invalidate();
        }

        if !force && self.breaker.is_open() {
            let url = self.cache.peek().unwrap_or_else(|| self.fallback.clone());
            tracing::debug!("discovery blocked by circuit breaker, using {}", url);
            return url;
        }

        let hint = self.hints.try_get_port().await;
        let candidates = self.candidates.development(hint);
        tracing::info!("discovering backend url ({} candidates)", candidates.len());

        for (i, candidate) in candidates.iter().enumerate() {
            if !force && self.breaker.is_open() {
                tracing::debug!("circuit breaker opened mid-round, stopping discovery");
                break;
            }
            if i > 0 && !self.probe_interval.is_zero() {
                tokio::time::sleep(self.probe_interval).await;
            }
            if self.checked_probe(&candidate.url, self.probe_timeout).await {
                tracing::info!("backend discovered at {} ({})", candidate.url, candidate.origin);
                self.cache.set(candidate.url.clone());
                return candidate.url.clone();
            }
        }

        // Do not cache a failure
        self.cache.invalidate();
        let url = candidates
            .first()
            .map(|c| c.url.clone())
            .unwrap_or_else(|| self.fallback.clone());
        tracing::warn!("no responsive backend found, using fallback {}", url);
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::StaticConfigHint;
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// Probe fake: healthy set is fixed, every call is recorded in order.
    #[derive(Default)]
    struct FakeProbe {
        healthy: Mutex<HashSet<String>>,
        calls: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl FakeProbe {
        fn healthy(urls: &[&str]) -> Arc<Self> {
            Self::with_delay(urls, Duration::ZERO)
        }

        fn with_delay(urls: &[&str], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                healthy: Mutex::new(urls.iter().map(|s| s.to_string()).collect()),
                calls: Mutex::new(Vec::new()),
                delay,
            })
        }

        fn set_healthy(&self, urls: &[&str]) {
            *self.healthy.lock() = urls.iter().map(|s| s.to_string()).collect();
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl HealthProbe for FakeProbe {
        async fn probe(&self, url: &BaseUrl, _timeout: Duration) -> bool {
            self.calls.lock().push(url.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.healthy.lock().contains(url.as_str())
        }
    }

    fn config(ports: Vec<u16>) -> Config {
        Config {
            fallback_ports: ports,
            ..Default::default()
        }
    }

    fn discoverer(cfg: &Config, probe: Arc<FakeProbe>) -> Discoverer {
        Discoverer::new(cfg, probe, Arc::new(StaticConfigHint(None))).unwrap()
    }

    #[tokio::test]
    async fn test_probes_in_order_until_first_success() {
        let probe = FakeProbe::healthy(&["http://localhost:5001"]);
        let d = discoverer(&config(vec![5002, 5001, 5000]), probe.clone());

        let url = d.discover().await;

        assert_eq!(url.as_str(), "http://localhost:5001");
        assert_eq!(probe.calls(), vec!["http://localhost:5002", "http://localhost:5001"]);
        assert_eq!(d.current(), Some(url));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_probing() {
        let probe = FakeProbe::healthy(&["http://localhost:5002"]);
        let d = discoverer(&config(vec![5002]), probe.clone());

        d.discover().await;
        d.discover().await;
        d.discover().await;

        assert_eq!(probe.calls().len(), 1);
        assert_eq!(d.rounds_started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_round() {
        let probe = FakeProbe::with_delay(&["http://localhost:5001"], Duration::from_millis(50));
        let d = discoverer(&config(vec![5002, 5001]), probe.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let d = d.clone();
                tokio::spawn(async move { d.discover().await })
            })
            .collect();

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }

        assert!(results.iter().all(|u| u.as_str() == "http://localhost:5001"));
        assert_eq!(probe.calls(), vec!["http://localhost:5002", "http://localhost:5001"]);
        assert_eq!(d.rounds_started(), 1);
    }

    #[tokio::test]
    async fn test_no_candidate_returns_first_and_does_not_cache() {
        let probe = FakeProbe::healthy(&[]);
        let d = discoverer(&config(vec![5002, 5001]), probe.clone());

        let url = d.discover().await;

        assert_eq!(url.as_str(), "http://localhost:5002");
        assert!(d.current().is_none());

        // Nothing cached, so the next call probes again
        d.discover().await;
        assert_eq!(probe.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_hint_port_probed_after_explicit() {
        let probe = FakeProbe::healthy(&["http://localhost:5003"]);
        let cfg = Config {
            explicit_url: Some("http://localhost:7000".to_string()),
            fallback_ports: vec![5002],
            ..Default::default()
        };
        let d = Discoverer::new(&cfg, probe.clone(), Arc::new(StaticConfigHint(Some(5003)))).unwrap();

        assert_eq!(d.discover().await.as_str(), "http://localhost:5003");
        assert_eq!(probe.calls(), vec!["http://localhost:7000", "http://localhost:5003"]);
    }

    #[tokio::test]
    async fn test_production_trusts_configuration() {
        let probe = FakeProbe::healthy(&[]);
        let cfg = Config {
            production: true,
            ..Default::default()
        };
        let d = discoverer(&cfg, probe.clone());

        let url = d.discover().await;
        assert_eq!(url.as_str(), crate::config::DEFAULT_PRODUCTION_URL);
        assert_eq!(d.rediscover().await, url);
        assert!(probe.calls().is_empty());
        assert_eq!(d.rounds_started(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_keeps_discovery_time() {
        let probe = FakeProbe::healthy(&["http://localhost:5001"]);
        let d = discoverer(&config(vec![5001]), probe.clone());

        d.discover().await;
        tokio::time::advance(Duration::from_secs(301)).await;

        assert_eq!(d.discover().await.as_str(), "http://localhost:5001");
        assert_eq!(probe.calls().len(), 2);
        assert!(d.cache().age().unwrap() >= Duration::from_secs(301));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_revalidation_rediscovers() {
        let probe = FakeProbe::healthy(&["http://localhost:5002"]);
        let d = discoverer(&config(vec![5002, 5001]), probe.clone());

        assert_eq!(d.discover().await.as_str(), "http://localhost:5002");

        probe.set_healthy(&["http://localhost:5001"]);
        tokio::time::advance(Duration::from_secs(301)).await;

        assert_eq!(d.discover().await.as_str(), "http://localhost:5001");
        assert_eq!(
            probe.calls(),
            vec![
                "http://localhost:5002",
                // revalidation
                "http://localhost:5002",
                // fresh round
                "http://localhost:5002",
                "http://localhost:5001",
            ]
        );
    }

    #[tokio::test]
    async fn test_open_breaker_skips_probing() {
        let probe = FakeProbe::healthy(&[]);
        let d = discoverer(&config(vec![5002, 5001, 5000, 3001, 8000, 8080]), probe.clone());

        // Five failures trip the breaker mid-round; the sixth port is skipped
        let first = d.discover().await;
        assert_eq!(first.as_str(), "http://localhost:5002");
        assert_eq!(probe.calls().len(), 5);
        assert!(d.breaker().is_open());

        let second = d.discover().await;
        assert_eq!(second.as_str(), crate::config::DEFAULT_FALLBACK_URL);
        assert_eq!(probe.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_rediscover_bypasses_open_breaker() {
        let probe = FakeProbe::healthy(&[]);
        let d = discoverer(&config(vec![5002, 5001, 5000, 3001, 8000]), probe.clone());

        d.discover().await;
        assert!(d.breaker().is_open());

        probe.set_healthy(&["http://localhost:5000"]);
        let url = d.rediscover().await;

        assert_eq!(url.as_str(), "http://localhost:5000");
        assert!(!d.breaker().is_open());
        assert_eq!(d.current(), Some(url));
    }

    #[tokio::test]
    async fn test_clear_cache_forces_new_round() {
        let probe = FakeProbe::healthy(&["http://localhost:5002"]);
        let d = discoverer(&config(vec![5002]), probe.clone());

        d.discover().await;
        d.clear_cache();
        assert!(d.current().is_none());

        d.discover().await;
        assert_eq!(d.rounds_started(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_interval_spaces_probes() {
        let probe = FakeProbe::healthy(&["http://localhost:5000"]);
        let cfg = Config {
            fallback_ports: vec![5002, 5001, 5000],
            probe_interval_ms: 100,
            ..Default::default()
        };
        let d = discoverer(&cfg, probe.clone());

        let start = tokio::time::Instant::now();
        d.discover().await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_keeps_cached_url_past_half_ttl() {
        let probe = FakeProbe::healthy(&["http://localhost:5001"]);
        let d = discoverer(&config(vec![5001]), probe.clone());

        let url = d.discover().await;
        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(d.cache().should_revalidate());

        // Tripped after the clock moved, so the cooldown is still running
        for _ in 0..5 {
            d.breaker().record_failure();
        }
        assert!(d.breaker().is_open());

        assert_eq!(d.discover().await, url);
        assert_eq!(probe.calls().len(), 1);
        assert_eq!(d.current(), Some(url));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rediscover_does_not_inherit_breaker_stop() {
        let probe = FakeProbe::with_delay(&["http://localhost:8080"], Duration::from_millis(50));
        let d = discoverer(&config(vec![5002, 5001, 5000, 3001, 8000, 8080]), probe.clone());

        // The plain round stops after five failures and never reaches 8080
        let plain = {
            let d = d.clone();
            tokio::spawn(async move { d.discover().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let url = d.rediscover().await;
        assert_eq!(url.as_str(), "http://localhost:8080");
        assert_eq!(plain.await.unwrap().as_str(), "http://localhost:5002");

        assert_eq!(d.rounds_started(), 2);
        assert_eq!(probe.calls().len(), 11);
        assert_eq!(d.current(), Some(url));
    }
}
