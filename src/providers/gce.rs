//! GCE range source backed by Google's netblock DNS TXT records

use super::{CloudProvider, FetchError, RangeSource};
use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use std::collections::HashSet;
use std::sync::Arc;

const GCE_NETBLOCKS_ROOT: &str = "_cloud-netblocks.googleusercontent.com";

/// Fetches the GCE address ranges.
///
/// Google publishes its netblocks as SPF-style DNS TXT records: the root
/// record lists `include:` references to further records, each of which
/// carries `ip4:`/`ip6:` tokens.
pub struct GceRangeSource {
    root: String,
    resolver: Option<Arc<TokioResolver>>,
}

impl GceRangeSource {
    /// Create a source walking the official netblock records.
    pub fn new() -> Self {
        Self {
            root: GCE_NETBLOCKS_ROOT.to_string(),
            resolver: None,
        }
    }

    /// Use a specific DNS resolver instead of the built-in default.
    pub fn with_resolver(mut self, resolver: Arc<TokioResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

impl Default for GceRangeSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Split one SPF-style TXT payload into referenced record names and ranges.
fn parse_netblock_record(record: &str) -> (Vec<String>, Vec<String>) {
    let mut includes = Vec::new();
    let mut ranges = Vec::new();

    for token in record.split_whitespace() {
        if let Some(name) = token.strip_prefix("include:") {
            includes.push(name.to_string());
        } else if let Some(range) = token.strip_prefix("ip4:") {
            ranges.push(range.to_string());
        } else if let Some(range) = token.strip_prefix("ip6:") {
            ranges.push(range.to_string());
        }
    }

    (includes, ranges)
}

#[async_trait]
impl RangeSource for GceRangeSource {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Gce
    }

    async fn fetch(&self) -> Result<Vec<String>, FetchError> {
        let resolver = match &self.resolver {
            Some(r) => Arc::clone(r),
            None => Arc::new(
                TokioResolver::builder_with_config(
                    ResolverConfig::cloudflare(),
                    TokioConnectionProvider::default(),
                )
                .build(),
            ),
        };

        let mut pending = vec![self.root.clone()];
        let mut visited: HashSet<String> = pending.iter().cloned().collect();
        let mut ranges = Vec::new();

        while let Some(name) = pending.pop() {
            let lookup = resolver
                .txt_lookup(name)
                .await
                .map_err(|e| FetchError::Dns(e.to_string()))?;

            for record in lookup.iter() {
                let txt_data = record
                    .iter()
                    .map(|data| String::from_utf8_lossy(data))
                    .collect::<Vec<_>>()
                    .join("");

                let (includes, mut record_ranges) = parse_netblock_record(&txt_data);
                ranges.append(&mut record_ranges);
                for include in includes {
                    if visited.insert(include.clone()) {
                        pending.push(include);
                    }
                }
            }
        }

        Ok(ranges)
    }
}
