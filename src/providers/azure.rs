//! Azure range source backed by the PublicIPs XML download

use super::{CloudProvider, FetchError, RangeSource};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

const AZURE_DOWNLOAD_URL: &str =
    "https://www.microsoft.com/en-us/download/confirmation.aspx?id=41653";

static FILE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href="(https?://[^"]*?PublicIPs[^"]*?\.xml)""#).expect("valid regex"));

static SUBNET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"Subnet="([^"]+)""#).expect("valid regex"));

/// Fetches the Azure public address ranges.
///
/// Azure publishes its ranges as an XML file linked from a download
/// confirmation page, so the fetch is two requests: scrape the page for the
/// current file link, then pull the subnets out of the XML.
pub struct AzureRangeSource {
    url: String,
    timeout: Duration,
}

impl AzureRangeSource {
    /// Create a source using the official download page.
    pub fn new() -> Self {
        Self {
            url: AZURE_DOWNLOAD_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Create a source scraping a custom download page.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for AzureRangeSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the range-file link from the download confirmation page.
fn file_url_from_page(page: &str) -> Option<&str> {
    FILE_URL_RE
        .captures(page)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Extract every `Subnet="..."` attribute from the range XML.
fn subnets_from_xml(xml: &str) -> Vec<String> {
    SUBNET_RE
        .captures_iter(xml)
        .map(|captures| captures[1].to_string())
        .collect()
}

#[async_trait]
impl RangeSource for AzureRangeSource {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Azure
    }

    async fn fetch(&self) -> Result<Vec<String>, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let page = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?
            .text()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let file_url = file_url_from_page(&page).ok_or_else(|| {
            FetchError::Format(format!("no range file link found at {}", self.url))
        })?;

        let xml = client
            .get(file_url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?
            .text()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        Ok(subnets_from_xml(&xml))
    }
}
