//! ipcloudy - cloud provider attribution for IP addresses
//!
//! This library determines whether an address belongs to a known public
//! cloud provider's published ranges (GCE, AWS, Azure), with an optional
//! WHOIS organization fallback for addresses no provider claims. Provider
//! ranges are cached locally and refreshed in the background on a
//! configurable max-age policy.

pub mod cache;
pub mod config;
pub mod engine;
pub mod providers;
pub mod public_ip;
pub mod ranges;
pub mod refresh;
pub mod whois;

// Re-export core types for library users
pub use config::{IpCloudyConfig, IpCloudyConfigBuilder, ProviderCacheConfig, WhoisFallbackConfig};
pub use engine::{Attribution, IpCloudy};
pub use providers::{CloudProvider, FetchError, RangeSource};
pub use public_ip::PublicIpError;
pub use ranges::{InvalidAddress, NormalizedRanges};
pub use whois::{OrgLookup, WhoisError};
