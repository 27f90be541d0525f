//! AWS range source backed by the published ip-ranges.json document

use super::{CloudProvider, FetchError, RangeSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const AWS_RANGES_URL: &str = "https://ip-ranges.amazonaws.com/ip-ranges.json";

#[derive(Debug, Deserialize)]
struct IpRangesDocument {
    #[serde(default)]
    prefixes: Vec<Ipv4Prefix>,
    #[serde(default)]
    ipv6_prefixes: Vec<Ipv6Prefix>,
}

#[derive(Debug, Deserialize)]
struct Ipv4Prefix {
    ip_prefix: String,
}

#[derive(Debug, Deserialize)]
struct Ipv6Prefix {
    ipv6_prefix: String,
}

impl IpRangesDocument {
    fn into_ranges(self) -> Vec<String> {
        let mut ranges: Vec<String> = self.prefixes.into_iter().map(|p| p.ip_prefix).collect();
        ranges.extend(self.ipv6_prefixes.into_iter().map(|p| p.ipv6_prefix));
        ranges
    }
}

/// Fetches the AWS address ranges from the official `ip-ranges.json`
/// endpoint.
pub struct AwsRangeSource {
    url: String,
    timeout: Duration,
}

impl AwsRangeSource {
    /// Create a source using the official endpoint.
    pub fn new() -> Self {
        Self {
            url: AWS_RANGES_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Create a source fetching from a custom URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for AwsRangeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RangeSource for AwsRangeSource {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Aws
    }

    async fn fetch(&self) -> Result<Vec<String>, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let document: IpRangesDocument = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| FetchError::Format(e.to_string()))?;

        Ok(document.into_ranges())
    }
}
