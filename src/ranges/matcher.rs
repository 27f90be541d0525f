//! Provider matching for query addresses

use crate::cache::ProviderCacheStore;
use crate::providers::CloudProvider;
use std::net::IpAddr;

/// Error type for an unparsable query address
#[derive(Debug, thiserror::Error)]
#[error("not a valid IPv4 or IPv6 address: {0:?}")]
pub struct InvalidAddress(pub String);

/// Parse a query string into a canonical address.
///
/// IPv4-mapped IPv6 input (`::ffff:13.70.64.1`) canonicalizes to IPv4 so it
/// can match IPv4 ranges.
pub fn parse_query_ip(ip: &str) -> Result<IpAddr, InvalidAddress> {
    let trimmed = ip.trim();
    trimmed
        .parse::<IpAddr>()
        .map(|addr| addr.to_canonical())
        .map_err(|_| InvalidAddress(trimmed.to_string()))
}

/// Find the first provider whose cached ranges contain `ip`.
///
/// Providers are consulted in [`CloudProvider::ALL`] priority order; an
/// earlier provider always wins even when a later provider's ranges also
/// contain the address. A provider with no cache entry simply cannot match.
pub fn match_provider(store: &ProviderCacheStore, ip: IpAddr) -> Option<CloudProvider> {
    CloudProvider::ALL
        .into_iter()
        .find(|provider| store.ranges(*provider).is_some_and(|ranges| ranges.contains(&ip)))
}
