//! Range normalization and address matching

pub mod matcher;
pub mod normalize;

pub use matcher::{match_provider, parse_query_ip, InvalidAddress};
pub use normalize::{normalize, NormalizedRanges, RangeParseError};
