//! Attribution engine orchestration

use crate::cache::{ProviderCacheStore, SharedStore};
use crate::config::IpCloudyConfig;
use crate::providers::{default_sources, CloudProvider, RangeSource};
use crate::public_ip::{self, PublicIpError};
use crate::ranges::matcher::{match_provider, parse_query_ip};
use crate::refresh::RefreshController;
use crate::whois::{OrgLookup, WhoisFallback};
use log::debug;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::{Arc, RwLock};

/// Outcome of an attribution query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    /// The matching provider, when the address is inside a known range.
    pub provider: Option<CloudProvider>,
    /// The owning organization from WHOIS, when no provider matched and the
    /// fallback is enabled.
    pub organization: Option<String>,
}

impl Attribution {
    fn none() -> Self {
        Self {
            provider: None,
            organization: None,
        }
    }
}

/// Cloud attribution engine.
///
/// Owns the provider range cache, its refresh loops, and the WHOIS
/// fallback. Engines are self-contained: several independent instances can
/// coexist in one process.
///
/// # Examples
///
/// ```no_run
/// use ipcloudy::{IpCloudy, IpCloudyConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let mut engine = IpCloudy::new(IpCloudyConfig::default());
///     engine.init(false).await;
///
///     let result = engine.check("13.70.64.1").await;
///     println!("{:?}", result.provider);
///
///     engine.shutdown();
/// }
/// ```
pub struct IpCloudy {
    store: SharedStore,
    refresh: RefreshController,
    whois: Option<WhoisFallback>,
    whois_config: crate::config::WhoisFallbackConfig,
}

impl IpCloudy {
    /// Create an engine with the default network-backed range sources.
    pub fn new(config: IpCloudyConfig) -> Self {
        Self::with_sources(config, default_sources())
    }

    /// Create an engine with custom range sources.
    ///
    /// Providers without a source simply never match; tests use this to
    /// substitute stub sources.
    pub fn with_sources(config: IpCloudyConfig, sources: Vec<Arc<dyn RangeSource>>) -> Self {
        let store = if config.provider_cache.persist {
            ProviderCacheStore::load(config.provider_cache.storage_path())
        } else {
            ProviderCacheStore::in_memory()
        };
        let store: SharedStore = Arc::new(RwLock::new(store));

        let refresh = RefreshController::new(Arc::clone(&store), sources, &config.provider_cache);
        let whois = config
            .whois_fallback
            .enabled
            .then(|| WhoisFallback::new(&config.whois_fallback));

        Self {
            store,
            refresh,
            whois,
            whois_config: config.whois_fallback,
        }
    }

    /// Replace the WHOIS collaborator (no-op unless the fallback is
    /// enabled). Tests use this to substitute a stub lookup.
    pub fn with_whois_client(mut self, client: Arc<dyn OrgLookup>) -> Self {
        if self.whois_config.enabled {
            self.whois = Some(WhoisFallback::with_client(client, &self.whois_config));
        }
        self
    }

    /// Bring every provider's cache up to date, then start the background
    /// refresh loops.
    ///
    /// Blocks on the initial refreshes only; the loops are non-blocking.
    /// With `force_refresh` every provider refetches even when its cache is
    /// fresh. Single-init contract: call once per engine instance, and call
    /// [`IpCloudy::shutdown`] before dropping it; re-initializing a running
    /// engine is unsupported.
    pub async fn init(&mut self, force_refresh: bool) {
        for provider in CloudProvider::ALL {
            if force_refresh {
                self.refresh.force_refresh(provider).await;
            } else {
                self.refresh.refresh_if_expired(provider).await;
            }
            self.refresh.start_loop(provider);
        }
    }

    /// Attribute an address given as a string.
    ///
    /// An unparsable address is a no-match, not an error: both fields come
    /// back `None` and the WHOIS fallback is skipped (an unparsable string
    /// has no registry record either).
    pub async fn check(&self, ip: &str) -> Attribution {
        match parse_query_ip(ip) {
            Ok(addr) => self.check_addr(addr).await,
            Err(err) => {
                debug!("check: {err}");
                Attribution::none()
            }
        }
    }

    /// Attribute a parsed address.
    ///
    /// Reads the last-committed cache snapshot; never waits on a refresh in
    /// progress.
    pub async fn check_addr(&self, ip: IpAddr) -> Attribution {
        let provider = {
            let store = self.store.read().expect("lock poisoned");
            match_provider(&store, ip)
        };

        if provider.is_some() {
            return Attribution {
                provider,
                organization: None,
            };
        }

        let organization = match &self.whois {
            Some(fallback) => fallback.resolve(ip).await,
            None => None,
        };

        Attribution {
            provider: None,
            organization,
        }
    }

    /// Attribute the caller's own public address.
    pub async fn check_own(&self) -> Result<Attribution, PublicIpError> {
        let ip = public_ip::own_ipv4(std::time::Duration::from_secs(5)).await?;
        Ok(self.check_addr(IpAddr::V4(ip)).await)
    }

    /// Stop all background refresh loops. Idempotent; also runs when the
    /// engine is dropped.
    pub fn shutdown(&mut self) {
        self.refresh.stop();
    }
}
