//! WHOIS organization fallback for unmatched addresses

pub mod client;
pub mod fallback;

pub use client::{OrgLookup, WhoisClient, WhoisError};
pub use fallback::WhoisFallback;
