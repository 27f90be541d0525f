//! Durable per-provider range cache

use crate::providers::CloudProvider;
use crate::ranges::NormalizedRanges;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// The store as shared between the engine, refresh tasks, and `check`
/// callers. Guards are never held across await points.
pub type SharedStore = Arc<RwLock<ProviderCacheStore>>;

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One provider's committed range data.
///
/// Entries are replaced wholesale on refresh — a single map insert under the
/// store's write guard — so readers can never observe a fresh timestamp next
/// to stale partitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Raw range list exactly as returned by the provider's source.
    pub raw: Vec<String>,
    /// Partitioned, parsed ranges used for matching.
    pub ranges: NormalizedRanges,
    /// When this entry was committed, in epoch milliseconds.
    pub refreshed_at_ms: u64,
}

/// In-memory authoritative store of per-provider range data, with optional
/// JSON snapshot persistence.
///
/// The in-memory map is always authoritative; `save` is an explicit,
/// best-effort snapshot and a failed save leaves any prior snapshot on disk
/// untouched.
#[derive(Debug, Default)]
pub struct ProviderCacheStore {
    entries: HashMap<CloudProvider, CacheEntry>,
    path: Option<PathBuf>,
}

impl ProviderCacheStore {
    /// Create an empty store with no backing file.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Create a store backed by `path`, loading any existing snapshot.
    ///
    /// A missing snapshot is not an error (the store starts empty); an
    /// unreadable or corrupt snapshot is logged and ignored.
    pub fn load(path: PathBuf) -> Self {
        let entries = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => {
                    debug!("loaded range cache snapshot from {}", path.display());
                    entries
                }
                Err(err) => {
                    warn!("ignoring corrupt range cache {}: {err}", path.display());
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                warn!("failed to read range cache {}: {err}", path.display());
                HashMap::new()
            }
        };

        Self {
            entries,
            path: Some(path),
        }
    }

    /// Get a provider's full cache entry.
    pub fn entry(&self, provider: CloudProvider) -> Option<&CacheEntry> {
        self.entries.get(&provider)
    }

    /// Get a provider's normalized ranges.
    pub fn ranges(&self, provider: CloudProvider) -> Option<&NormalizedRanges> {
        self.entries.get(&provider).map(|entry| &entry.ranges)
    }

    /// Get the epoch-millisecond timestamp of a provider's last refresh.
    pub fn refreshed_at_ms(&self, provider: CloudProvider) -> Option<u64> {
        self.entries.get(&provider).map(|entry| entry.refreshed_at_ms)
    }

    /// Replace a provider's data with a freshly built entry.
    pub fn commit(&mut self, provider: CloudProvider, entry: CacheEntry) {
        self.entries.insert(provider, entry);
    }

    /// Drop every provider's data.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Number of providers with a committed entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no provider has a committed entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the whole store to its backing file.
    ///
    /// Failure is logged and non-fatal: the in-memory state stays
    /// authoritative and the next refresh retries the save. A store with no
    /// backing file is a no-op.
    pub fn save(&self) {
        let Some(path) = &self.path else { return };
        if let Err(err) = self.write_snapshot(path) {
            warn!("failed to persist range cache to {}: {err}", path.display());
        }
    }

    fn write_snapshot(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(&self.entries)?;
        fs::write(path, json)
    }
}
