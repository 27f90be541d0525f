//! Background refresh of provider range caches

use crate::cache::{epoch_millis, CacheEntry, SharedStore};
use crate::config::ProviderCacheConfig;
use crate::providers::{CloudProvider, FetchError, RangeSource};
use crate::ranges::normalize;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Shared state the background tasks operate on.
struct Refresher {
    store: SharedStore,
    sources: HashMap<CloudProvider, Arc<dyn RangeSource>>,
    max_age: Option<Duration>,
    persist: bool,
}

impl Refresher {
    fn is_expired(&self, provider: CloudProvider) -> bool {
        let refreshed_at = {
            let store = self.store.read().expect("lock poisoned");
            store.refreshed_at_ms(provider)
        };
        // A provider that has never refreshed is expired even when expiry is
        // disabled; otherwise it would never get its first load.
        let Some(refreshed_at) = refreshed_at else {
            return true;
        };
        match self.max_age {
            Some(max_age) => {
                epoch_millis().saturating_sub(refreshed_at) > max_age.as_millis() as u64
            }
            None => false,
        }
    }

    /// Fetch, normalize, and commit one provider's ranges.
    ///
    /// The commit is a single insert under the store's write guard: raw
    /// list, all four partitions, and the timestamp become visible to
    /// readers together or not at all.
    async fn refresh(&self, provider: CloudProvider) -> Result<(), FetchError> {
        let Some(source) = self.sources.get(&provider) else {
            debug!("{provider}: no range source configured, skipping refresh");
            return Ok(());
        };

        let raw = source.fetch().await?;
        if raw.is_empty() {
            warn!("{provider}: source returned an empty range list, keeping previous data");
            return Ok(());
        }

        let ranges = normalize(provider, &raw);
        debug!(
            "{provider}: refreshed {} ranges from {} raw entries",
            ranges.len(),
            raw.len()
        );

        let entry = CacheEntry {
            raw,
            ranges,
            refreshed_at_ms: epoch_millis(),
        };

        let mut store = self.store.write().expect("lock poisoned");
        store.commit(provider, entry);
        if self.persist {
            store.save();
        }
        Ok(())
    }

    async fn refresh_logged(&self, provider: CloudProvider) {
        if let Err(err) = self.refresh(provider).await {
            warn!("{provider}: range refresh failed, serving stale data: {err}");
        }
    }

    async fn refresh_if_expired(&self, provider: CloudProvider) {
        if self.is_expired(provider) {
            self.refresh_logged(provider).await;
        }
    }
}

/// Enforces the range-cache freshness policy.
///
/// One background task per provider re-checks freshness every
/// `refresh_rate` and refetches only on expiry; each task runs its checks
/// strictly in sequence, so there is never more than one refresh in flight
/// per provider. All tasks share one cancellation token.
pub struct RefreshController {
    inner: Arc<Refresher>,
    refresh_rate: Duration,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RefreshController {
    /// Create a controller over `store` using the given range sources.
    pub fn new(
        store: SharedStore,
        sources: Vec<Arc<dyn RangeSource>>,
        config: &ProviderCacheConfig,
    ) -> Self {
        let sources = sources
            .into_iter()
            .map(|source| (source.provider(), source))
            .collect();

        Self {
            inner: Arc::new(Refresher {
                store,
                sources,
                max_age: config.max_age,
                persist: config.persist,
            }),
            refresh_rate: config.refresh_rate,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// True when the provider has no recorded refresh, or its last refresh
    /// is older than the configured max age.
    pub fn is_expired(&self, provider: CloudProvider) -> bool {
        self.inner.is_expired(provider)
    }

    /// Refresh a provider when its cache entry has expired.
    ///
    /// Fetch failures are logged and the stale entry is retained.
    pub async fn refresh_if_expired(&self, provider: CloudProvider) {
        self.inner.refresh_if_expired(provider).await;
    }

    /// Refresh a provider unconditionally. Failures are logged and the
    /// stale entry is retained.
    pub async fn force_refresh(&self, provider: CloudProvider) {
        self.inner.refresh_logged(provider).await;
    }

    /// Start the periodic freshness loop for one provider.
    ///
    /// No loop is started when expiry is disabled: nothing can ever expire,
    /// so there is nothing to poll.
    pub fn start_loop(&mut self, provider: CloudProvider) {
        if self.inner.max_age.is_none() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let cancel = self.cancel.clone();
        let refresh_rate = self.refresh_rate;

        self.tasks.push(tokio::spawn(async move {
            let start = Instant::now() + refresh_rate;
            let mut ticker = interval_at(start, refresh_rate);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => inner.refresh_if_expired(provider).await,
                }
            }
            debug!("{provider}: refresh loop stopped");
        }));
    }

    /// Stop all refresh loops. Idempotent; no refresh check runs after this
    /// returns. A refresh already past its fetch commits nothing partial —
    /// the store commit holds no await points.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for RefreshController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ProviderCacheStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::RwLock;

    struct StubSource {
        provider: CloudProvider,
        ranges: Vec<String>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn new(provider: CloudProvider, ranges: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                provider,
                ranges: ranges.iter().map(|r| (*r).to_string()).collect(),
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(provider: CloudProvider) -> Arc<Self> {
            Arc::new(Self {
                provider,
                ranges: Vec::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RangeSource for StubSource {
        fn provider(&self) -> CloudProvider {
            self.provider
        }

        async fn fetch(&self) -> Result<Vec<String>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FetchError::Http("stub failure".to_string()));
            }
            Ok(self.ranges.clone())
        }
    }

    fn shared_store() -> SharedStore {
        Arc::new(RwLock::new(ProviderCacheStore::in_memory()))
    }

    fn cache_config(max_age: Option<Duration>, refresh_rate: Duration) -> ProviderCacheConfig {
        ProviderCacheConfig {
            max_age,
            refresh_rate,
            persist: false,
            path: None,
        }
    }

    fn seed_timestamp(store: &SharedStore, provider: CloudProvider, refreshed_at_ms: u64) {
        let raw = vec!["10.0.0.0/24".to_string()];
        store.write().unwrap().commit(
            provider,
            CacheEntry {
                ranges: normalize(provider, &raw),
                raw,
                refreshed_at_ms,
            },
        );
    }

    #[test]
    fn test_expiry_boundaries() {
        let store = shared_store();
        let max_age = Duration::from_secs(10);
        let controller = RefreshController::new(
            Arc::clone(&store),
            vec![],
            &cache_config(Some(max_age), Duration::from_secs(5)),
        );

        // no timestamp recorded
        assert!(controller.is_expired(CloudProvider::Gce));

        // just past max age
        seed_timestamp(&store, CloudProvider::Gce, epoch_millis() - 10_001);
        assert!(controller.is_expired(CloudProvider::Gce));

        // comfortably inside max age
        seed_timestamp(&store, CloudProvider::Gce, epoch_millis() - 9_000);
        assert!(!controller.is_expired(CloudProvider::Gce));
    }

    #[test]
    fn test_disabled_expiry_freezes_after_first_load() {
        let store = shared_store();
        let controller = RefreshController::new(
            Arc::clone(&store),
            vec![],
            &cache_config(None, Duration::from_secs(5)),
        );

        // never refreshed: still needs its first load
        assert!(controller.is_expired(CloudProvider::Aws));

        // any recorded refresh never expires
        seed_timestamp(&store, CloudProvider::Aws, 0);
        assert!(!controller.is_expired(CloudProvider::Aws));
    }

    #[tokio::test]
    async fn test_refresh_if_expired_fetches_and_commits() {
        let store = shared_store();
        let source = StubSource::new(CloudProvider::Azure, &["13.70.64.0/18"]);
        let controller = RefreshController::new(
            Arc::clone(&store),
            vec![source.clone()],
            &cache_config(Some(Duration::from_secs(10)), Duration::from_secs(5)),
        );

        controller.refresh_if_expired(CloudProvider::Azure).await;
        assert_eq!(source.calls(), 1);
        {
            let store = store.read().unwrap();
            let entry = store.entry(CloudProvider::Azure).unwrap();
            assert_eq!(entry.raw, vec!["13.70.64.0/18".to_string()]);
            assert!(entry.ranges.contains(&"13.70.64.1".parse().unwrap()));
        }

        // fresh now: no second fetch
        controller.refresh_if_expired(CloudProvider::Azure).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_stale_entry() {
        let store = shared_store();
        let source = StubSource::failing(CloudProvider::Aws);
        let controller = RefreshController::new(
            Arc::clone(&store),
            vec![source.clone()],
            &cache_config(Some(Duration::from_secs(10)), Duration::from_secs(5)),
        );

        let stale_ts = epoch_millis() - 60_000;
        seed_timestamp(&store, CloudProvider::Aws, stale_ts);

        controller.refresh_if_expired(CloudProvider::Aws).await;
        assert_eq!(source.calls(), 1);

        let store = store.read().unwrap();
        let entry = store.entry(CloudProvider::Aws).unwrap();
        assert_eq!(entry.refreshed_at_ms, stale_ts);
        assert!(entry.ranges.contains(&"10.0.0.1".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_empty_fetch_is_not_committed() {
        let store = shared_store();
        let source = StubSource::new(CloudProvider::Gce, &[]);
        let controller = RefreshController::new(
            Arc::clone(&store),
            vec![source.clone()],
            &cache_config(Some(Duration::from_secs(10)), Duration::from_secs(5)),
        );

        controller.force_refresh(CloudProvider::Gce).await;
        assert_eq!(source.calls(), 1);
        assert!(store.read().unwrap().entry(CloudProvider::Gce).is_none());
    }

    #[tokio::test]
    async fn test_missing_source_is_a_noop() {
        let store = shared_store();
        let controller = RefreshController::new(
            Arc::clone(&store),
            vec![],
            &cache_config(Some(Duration::from_secs(10)), Duration::from_secs(5)),
        );

        controller.force_refresh(CloudProvider::Azure).await;
        assert!(store.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_loop_refreshes_and_stop_halts_it() {
        let store = shared_store();
        let source = StubSource::new(CloudProvider::Gce, &["10.0.0.0/24"]);
        let mut controller = RefreshController::new(
            Arc::clone(&store),
            vec![source.clone()],
            // max age shorter than the tick, so every tick refetches
            &cache_config(Some(Duration::from_millis(1)), Duration::from_millis(25)),
        );

        controller.start_loop(CloudProvider::Gce);
        tokio::time::sleep(Duration::from_millis(120)).await;
        let while_running = source.calls();
        assert!(while_running >= 2, "expected repeated refreshes, got {while_running}");

        controller.stop();
        controller.stop(); // idempotent
        let after_stop = source.calls();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(source.calls(), after_stop, "refresh ran after stop");
    }

    #[tokio::test]
    async fn test_no_loop_started_when_expiry_disabled() {
        let store = shared_store();
        let source = StubSource::new(CloudProvider::Aws, &["10.0.0.0/24"]);
        let mut controller = RefreshController::new(
            Arc::clone(&store),
            vec![source.clone()],
            &cache_config(None, Duration::from_millis(10)),
        );

        controller.start_loop(CloudProvider::Aws);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(source.calls(), 0);
    }
}
