//! Public address detection for self-checks

use log::debug;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Error type for public IP detection
#[derive(Debug, thiserror::Error)]
pub enum PublicIpError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Response was not a parsable IPv4 address
    #[error("failed to parse address: {0}")]
    Parse(String),

    /// Every echo service failed
    #[error("all public IP providers failed")]
    AllProvidersFailed,
}

/// Echo services consulted to learn the caller's own address, in order.
const PROVIDER_URLS: &[&str] = &[
    "https://checkip.amazonaws.com",
    "https://api.ipify.org",
    "https://icanhazip.com",
];

/// Resolve the caller's public IPv4 address.
///
/// Each echo service is tried in turn until one returns a parsable address.
pub async fn own_ipv4(timeout: Duration) -> Result<Ipv4Addr, PublicIpError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PublicIpError::Http(e.to_string()))?;

    for url in PROVIDER_URLS {
        match fetch_from(&client, url).await {
            Ok(ip) => return Ok(ip),
            Err(err) => debug!("public IP provider {url} failed: {err}"),
        }
    }

    Err(PublicIpError::AllProvidersFailed)
}

async fn fetch_from(client: &reqwest::Client, url: &str) -> Result<Ipv4Addr, PublicIpError> {
    let text = client
        .get(url)
        .send()
        .await
        .map_err(|e| PublicIpError::Http(e.to_string()))?
        .text()
        .await
        .map_err(|e| PublicIpError::Http(e.to_string()))?;

    let trimmed = text.trim();
    trimmed
        .parse::<Ipv4Addr>()
        .map_err(|e| PublicIpError::Parse(format!("{e}: {trimmed:?}")))
}
