//! Cloud provider identities and published-range sources

pub mod aws;
pub mod azure;
pub mod gce;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use aws::AwsRangeSource;
pub use azure::AzureRangeSource;
pub use gce::GceRangeSource;

/// Known public cloud providers, in match priority order.
///
/// When more than one provider's ranges contain a queried address, the
/// provider listed first here wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    /// Google Compute Engine
    Gce,
    /// Amazon Web Services
    Aws,
    /// Microsoft Azure
    Azure,
}

impl CloudProvider {
    /// All providers in match priority order.
    pub const ALL: [CloudProvider; 3] = [CloudProvider::Gce, CloudProvider::Aws, CloudProvider::Azure];

    /// Lowercase provider name, as used in cache snapshots and CLI output.
    pub fn name(&self) -> &'static str {
        match self {
            CloudProvider::Gce => "gce",
            CloudProvider::Aws => "aws",
            CloudProvider::Azure => "azure",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error type for range fetch operations
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// DNS resolution failed
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// Response did not have the expected shape
    #[error("unexpected response format: {0}")]
    Format(String),
}

/// A source of published address ranges for one cloud provider.
///
/// Implementations perform pure I/O: they return the provider's current raw
/// range list (a mix of bare IPs and CIDR literals) and hold no shared
/// state. Failures are transient; the caller retries on its next refresh
/// cycle.
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// The provider whose ranges this source publishes.
    fn provider(&self) -> CloudProvider;

    /// Fetch the current raw range list.
    async fn fetch(&self) -> Result<Vec<String>, FetchError>;
}

/// Default network-backed sources for all known providers.
pub fn default_sources() -> Vec<Arc<dyn RangeSource>> {
    vec![
        Arc::new(GceRangeSource::new()),
        Arc::new(AwsRangeSource::new()),
        Arc::new(AzureRangeSource::new()),
    ]
}
