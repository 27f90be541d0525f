//! LRU-cached WHOIS fallback

use super::client::{OrgLookup, WhoisClient};
use crate::config::WhoisFallbackConfig;
use log::{debug, warn};
use lru::LruCache;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Bounded organization cache in front of a WHOIS client.
///
/// Failed and organization-less lookups are cached as `None` so
/// unattributable addresses do not trigger a network round-trip on every
/// query. Entries only ever leave the cache under LRU eviction pressure;
/// eviction itself never performs a lookup.
pub struct WhoisFallback {
    client: Arc<dyn OrgLookup>,
    cache: Mutex<LruCache<IpAddr, Option<String>>>,
    timeout: Duration,
}

impl WhoisFallback {
    /// Create a fallback using the default WHOIS client.
    pub fn new(config: &WhoisFallbackConfig) -> Self {
        Self::with_client(Arc::new(WhoisClient::new()), config)
    }

    /// Create a fallback over a custom lookup implementation.
    pub fn with_client(client: Arc<dyn OrgLookup>, config: &WhoisFallbackConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::new(1).expect("1 > 0"));
        Self {
            client,
            cache: Mutex::new(LruCache::new(capacity)),
            timeout: config.timeout,
        }
    }

    /// Resolve the owning organization for `ip`, consulting the cache first.
    pub async fn resolve(&self, ip: IpAddr) -> Option<String> {
        if let Some(cached) = self.cache.lock().expect("mutex poisoned").get(&ip) {
            return cached.clone();
        }

        debug!("{ip}: organization not cached, querying whois");
        let value = match self.client.lookup(ip, self.timeout).await {
            Ok(org) => org,
            Err(err) => {
                warn!("{ip}: whois lookup failed: {err}");
                None
            }
        };

        self.cache
            .lock()
            .expect("mutex poisoned")
            .put(ip, value.clone());
        value
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.cache.lock().expect("mutex poisoned").len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whois::client::WhoisError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubLookup {
        org: Option<String>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubLookup {
        fn returning(org: &str) -> Arc<Self> {
            Arc::new(Self {
                org: Some(org.to_string()),
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn empty() -> Arc<Self> {
            Arc::new(Self {
                org: None,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                org: None,
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OrgLookup for StubLookup {
        async fn lookup(
            &self,
            _ip: IpAddr,
            _timeout: Duration,
        ) -> Result<Option<String>, WhoisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(WhoisError::Timeout);
            }
            Ok(self.org.clone())
        }
    }

    fn config(capacity: usize) -> WhoisFallbackConfig {
        WhoisFallbackConfig {
            enabled: true,
            cache_capacity: capacity,
            timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_hit_skips_the_network() {
        let stub = StubLookup::returning("Acme Org");
        let fallback = WhoisFallback::with_client(stub.clone(), &config(10));
        let ip: IpAddr = "208.43.118.0".parse().unwrap();

        assert_eq!(fallback.resolve(ip).await, Some("Acme Org".to_string()));
        assert_eq!(fallback.resolve(ip).await, Some("Acme Org".to_string()));
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_negative_result_is_cached() {
        let stub = StubLookup::empty();
        let fallback = WhoisFallback::with_client(stub.clone(), &config(10));
        let ip: IpAddr = "192.0.2.10".parse().unwrap();

        assert_eq!(fallback.resolve(ip).await, None);
        assert_eq!(fallback.resolve(ip).await, None);
        assert_eq!(stub.calls(), 1);
        assert_eq!(fallback.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_resolves_to_cached_none() {
        let stub = StubLookup::failing();
        let fallback = WhoisFallback::with_client(stub.clone(), &config(10));
        let ip: IpAddr = "192.0.2.20".parse().unwrap();

        assert_eq!(fallback.resolve(ip).await, None);
        assert_eq!(fallback.resolve(ip).await, None);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_lru_eviction_at_capacity() {
        let stub = StubLookup::returning("Acme Org");
        let fallback = WhoisFallback::with_client(stub.clone(), &config(2));

        let a: IpAddr = "192.0.2.1".parse().unwrap();
        let b: IpAddr = "192.0.2.2".parse().unwrap();
        let c: IpAddr = "192.0.2.3".parse().unwrap();

        fallback.resolve(a).await;
        fallback.resolve(b).await;
        fallback.resolve(c).await; // evicts a
        assert_eq!(stub.calls(), 3);
        assert_eq!(fallback.len(), 2);

        fallback.resolve(b).await; // still cached
        assert_eq!(stub.calls(), 3);

        fallback.resolve(a).await; // evicted, looked up again
        assert_eq!(stub.calls(), 4);
    }

    #[tokio::test]
    async fn test_zero_capacity_clamps_to_one() {
        let stub = StubLookup::returning("Acme Org");
        let fallback = WhoisFallback::with_client(stub.clone(), &config(0));
        let ip: IpAddr = "192.0.2.30".parse().unwrap();

        assert_eq!(fallback.resolve(ip).await, Some("Acme Org".to_string()));
        assert_eq!(fallback.len(), 1);
    }
}
