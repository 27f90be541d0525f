//! Configuration types for the attribution engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default snapshot location: `<platform cache dir>/ipcloudy/cidr-range-cache.json`.
pub fn default_storage_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ipcloudy")
        .join("cidr-range-cache.json")
}

/// WHOIS fallback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoisFallbackConfig {
    /// Run a WHOIS organization lookup for unmatched addresses (default: false).
    pub enabled: bool,
    /// Maximum number of cached organization results (default: 100).
    pub cache_capacity: usize,
    /// Timeout for a single WHOIS lookup (default: 5s).
    pub timeout: Duration,
}

impl Default for WhoisFallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cache_capacity: 100,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Provider range cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCacheConfig {
    /// Maximum age of cached ranges before a refresh is required
    /// (default: 1 week). `None` disables expiry entirely, freezing the
    /// cache after its first load.
    pub max_age: Option<Duration>,
    /// How often the background loops re-check freshness (default: 5s).
    /// This is the polling granularity; `max_age` is the actual freshness
    /// bound.
    pub refresh_rate: Duration,
    /// Persist the cache to disk after every refresh (default: true).
    pub persist: bool,
    /// Snapshot file location; `None` uses [`default_storage_path`].
    pub path: Option<PathBuf>,
}

impl Default for ProviderCacheConfig {
    fn default() -> Self {
        Self {
            max_age: Some(Duration::from_secs(7 * 24 * 60 * 60)),
            refresh_rate: Duration::from_secs(5),
            persist: true,
            path: None,
        }
    }
}

impl ProviderCacheConfig {
    /// The resolved snapshot path.
    pub fn storage_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_storage_path)
    }
}

/// Configuration for the attribution engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpCloudyConfig {
    /// WHOIS fallback settings.
    pub whois_fallback: WhoisFallbackConfig,
    /// Provider range cache settings.
    pub provider_cache: ProviderCacheConfig,
}

impl IpCloudyConfig {
    /// Create a new config builder.
    pub fn builder() -> IpCloudyConfigBuilder {
        IpCloudyConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.provider_cache.refresh_rate.is_zero() {
            return Err("refresh_rate must be greater than 0".to_string());
        }
        if let Some(max_age) = self.provider_cache.max_age {
            if max_age.is_zero() {
                return Err("max_age must be greater than 0 (use None to disable expiry)".to_string());
            }
        }
        if self.whois_fallback.enabled && self.whois_fallback.cache_capacity == 0 {
            return Err("whois cache_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Builder for [`IpCloudyConfig`]
pub struct IpCloudyConfigBuilder {
    config: IpCloudyConfig,
}

impl IpCloudyConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: IpCloudyConfig::default(),
        }
    }

    /// Enable or disable the WHOIS fallback.
    pub fn whois_fallback(mut self, enabled: bool) -> Self {
        self.config.whois_fallback.enabled = enabled;
        self
    }

    /// Set the WHOIS cache capacity.
    pub fn whois_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.whois_fallback.cache_capacity = capacity;
        self
    }

    /// Set the WHOIS lookup timeout.
    pub fn whois_timeout(mut self, timeout: Duration) -> Self {
        self.config.whois_fallback.timeout = timeout;
        self
    }

    /// Set the range cache max age; `None` disables expiry.
    pub fn max_age(mut self, max_age: Option<Duration>) -> Self {
        self.config.provider_cache.max_age = max_age;
        self
    }

    /// Set the freshness polling interval.
    pub fn refresh_rate(mut self, refresh_rate: Duration) -> Self {
        self.config.provider_cache.refresh_rate = refresh_rate;
        self
    }

    /// Enable or disable snapshot persistence.
    pub fn persist(mut self, persist: bool) -> Self {
        self.config.provider_cache.persist = persist;
        self
    }

    /// Set the snapshot file location.
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.provider_cache.path = Some(path.into());
        self
    }

    /// Build the config.
    pub fn build(self) -> IpCloudyConfig {
        self.config
    }
}

impl Default for IpCloudyConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = IpCloudyConfig::default();
        assert!(!config.whois_fallback.enabled);
        assert_eq!(config.whois_fallback.cache_capacity, 100);
        assert_eq!(config.whois_fallback.timeout, Duration::from_secs(5));
        assert_eq!(
            config.provider_cache.max_age,
            Some(Duration::from_secs(604_800))
        );
        assert_eq!(config.provider_cache.refresh_rate, Duration::from_secs(5));
        assert!(config.provider_cache.persist);
        assert!(config.provider_cache.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_sets_every_field() {
        let config = IpCloudyConfig::builder()
            .whois_fallback(true)
            .whois_cache_capacity(10)
            .whois_timeout(Duration::from_secs(2))
            .max_age(None)
            .refresh_rate(Duration::from_millis(250))
            .persist(false)
            .storage_path("/tmp/ranges.json")
            .build();

        assert!(config.whois_fallback.enabled);
        assert_eq!(config.whois_fallback.cache_capacity, 10);
        assert_eq!(config.whois_fallback.timeout, Duration::from_secs(2));
        assert_eq!(config.provider_cache.max_age, None);
        assert_eq!(config.provider_cache.refresh_rate, Duration::from_millis(250));
        assert!(!config.provider_cache.persist);
        assert_eq!(
            config.provider_cache.storage_path(),
            PathBuf::from("/tmp/ranges.json")
        );
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let config = IpCloudyConfig::builder()
            .refresh_rate(Duration::ZERO)
            .build();
        assert!(config.validate().is_err());

        let config = IpCloudyConfig::builder()
            .max_age(Some(Duration::ZERO))
            .build();
        assert!(config.validate().is_err());

        let config = IpCloudyConfig::builder()
            .whois_fallback(true)
            .whois_cache_capacity(0)
            .build();
        assert!(config.validate().is_err());
    }
}
