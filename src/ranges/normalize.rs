//! Partitioning of raw provider range lists into typed collections

use crate::providers::CloudProvider;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Parsed address ranges for one provider, partitioned by family and kind.
///
/// Raw literals are parsed exactly once, at refresh time; match time only
/// ever compares parsed values. Storing parsed addresses also makes IPv6
/// comparison canonical for free — every textual spelling of an address
/// parses to the same value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRanges {
    /// Bare IPv4 addresses.
    pub singles_v4: HashSet<Ipv4Addr>,
    /// Bare IPv6 addresses.
    pub singles_v6: HashSet<Ipv6Addr>,
    /// IPv4 CIDR blocks, truncated to their network address.
    pub cidrs_v4: HashSet<Ipv4Net>,
    /// IPv6 CIDR blocks, truncated to their network address.
    pub cidrs_v6: HashSet<Ipv6Net>,
}

impl NormalizedRanges {
    /// Total number of entries across all four partitions.
    pub fn len(&self) -> usize {
        self.singles_v4.len() + self.singles_v6.len() + self.cidrs_v4.len() + self.cidrs_v6.len()
    }

    /// Whether all four partitions are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Test whether `ip` is one of the singles or inside one of the CIDR
    /// blocks of its family. Singles are checked first (cheap exact lookup).
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => {
                self.singles_v4.contains(v4) || self.cidrs_v4.iter().any(|net| net.contains(v4))
            }
            IpAddr::V6(v6) => {
                self.singles_v6.contains(v6) || self.cidrs_v6.iter().any(|net| net.contains(v6))
            }
        }
    }
}

/// Error type for a single malformed range literal
#[derive(Debug, thiserror::Error)]
pub enum RangeParseError {
    /// Not a valid bare address
    #[error("invalid address: {0}")]
    Address(#[from] std::net::AddrParseError),

    /// Not a valid CIDR block
    #[error("invalid CIDR block: {0}")]
    Cidr(#[from] ipnet::AddrParseError),
}

/// Parse a provider's raw range list into partitioned, typed ranges.
///
/// Malformed entries are logged and skipped; one bad entry never invalidates
/// the rest of the batch. Classification is by the parsed address family,
/// not the literal text, so an IPv4-mapped IPv6 literal lands in the IPv4
/// partition.
pub fn normalize(provider: CloudProvider, raw: &[String]) -> NormalizedRanges {
    let mut ranges = NormalizedRanges::default();

    for entry in raw {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if let Err(err) = classify(entry, &mut ranges) {
            warn!("{provider}: dropping malformed range entry {entry:?}: {err}");
        }
    }

    ranges
}

fn classify(entry: &str, out: &mut NormalizedRanges) -> Result<(), RangeParseError> {
    if entry.contains('/') {
        match entry.parse::<IpNet>()? {
            IpNet::V4(net) => {
                out.cidrs_v4.insert(net.trunc());
            }
            IpNet::V6(net) => {
                out.cidrs_v6.insert(net.trunc());
            }
        }
    } else {
        match entry.parse::<IpAddr>()?.to_canonical() {
            IpAddr::V4(addr) => {
                out.singles_v4.insert(addr);
            }
            IpAddr::V6(addr) => {
                out.singles_v6.insert(addr);
            }
        }
    }
    Ok(())
}
