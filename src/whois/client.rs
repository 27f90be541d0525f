//! WHOIS client speaking the plain port-43 protocol

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const DEFAULT_WHOIS_SERVER: &str = "whois.arin.net:43";

// Registries label the owner as "Organization:", "network:Organization:" or
// "Organization;I:" depending on the database.
static ORG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?:network:)?Organization(?:;I)?:\s*(.+?)\s*$").expect("valid regex")
});

/// Error type for WHOIS lookups
#[derive(Debug, thiserror::Error)]
pub enum WhoisError {
    /// Connection or read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Lookup did not complete within the configured timeout
    #[error("request timed out")]
    Timeout,
}

/// Resolves the organization that owns an address.
#[async_trait]
pub trait OrgLookup: Send + Sync {
    /// Look up the owning organization.
    ///
    /// Returns `None` when the registry record carries no organization
    /// field; errors cover network failure and timeout only.
    async fn lookup(&self, ip: IpAddr, timeout: Duration) -> Result<Option<String>, WhoisError>;
}

/// WHOIS client querying a registry server over TCP port 43.
pub struct WhoisClient {
    server: String,
}

impl WhoisClient {
    /// Create a client for the default registry server.
    pub fn new() -> Self {
        Self {
            server: DEFAULT_WHOIS_SERVER.to_string(),
        }
    }

    /// Create a client for a specific `host:port` server.
    pub fn with_server(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
        }
    }

    async fn query(&self, ip: IpAddr) -> Result<Option<String>, WhoisError> {
        let mut stream = TcpStream::connect(self.server.as_str()).await?;
        stream.write_all(format!("{ip}\r\n").as_bytes()).await?;

        // whois servers close the connection after the response
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;

        Ok(extract_organization(&String::from_utf8_lossy(&response)))
    }
}

impl Default for WhoisClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrgLookup for WhoisClient {
    async fn lookup(&self, ip: IpAddr, timeout: Duration) -> Result<Option<String>, WhoisError> {
        tokio::time::timeout(timeout, self.query(ip))
            .await
            .map_err(|_| WhoisError::Timeout)?
    }
}

/// Pull the first organization field out of a raw WHOIS response.
pub(crate) fn extract_organization(response: &str) -> Option<String> {
    ORG_RE
        .captures(response)
        .map(|captures| captures[1].to_string())
}
