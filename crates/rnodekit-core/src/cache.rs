//! Persistent device-address to transport-type cache.
//!
//! Once a board's transport family is confirmed (live BLE sighting or
//! explicit user selection), it is remembered across sessions so bonded
//! devices can be classified without a fresh scan hit. Writes are
//! idempotent and last-writer-wins per address; the flow guarantees a
//! single writer at a time, so no cross-process locking is needed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use rnodekit_types::TransportType;

use crate::error::Result;

/// Address to transport-type mapping, persisted across sessions.
pub trait DeviceTypeCache: Send + Sync {
    /// Look up the recorded transport type for an address.
    fn get(&self, address: &str) -> Option<TransportType>;

    /// Record the transport type for an address. Last writer wins.
    fn put(&self, address: &str, transport: TransportType);
}

/// In-memory cache, for tests and embedders with their own persistence.
#[derive(Debug, Default)]
pub struct MemoryCache {
    map: Mutex<HashMap<String, TransportType>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceTypeCache for MemoryCache {
    fn get(&self, address: &str) -> Option<TransportType> {
        self.map
            .lock()
            .ok()
            .and_then(|map| map.get(address).copied())
    }

    fn put(&self, address: &str, transport: TransportType) {
        if let Ok(mut map) = self.map.lock() {
            map.insert(address.to_string(), transport);
        }
    }
}

/// JSON-file backed cache.
///
/// The on-disk format is an address to string map; it is an implementation
/// detail, not a wire contract. Unreadable files start the cache empty
/// rather than failing discovery.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    map: Mutex<HashMap<String, String>>,
}

impl FileCache {
    /// Open a cache file, creating parent directories as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let map = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Device type cache at {} unreadable ({e}), starting empty", path.display());
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        debug!("Opened device type cache at {} ({} entries)", path.display(), map.len());
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    fn persist(&self, map: &HashMap<String, String>) {
        match serde_json::to_string_pretty(map) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    warn!("Failed to persist device type cache: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize device type cache: {e}"),
        }
    }
}

impl DeviceTypeCache for FileCache {
    fn get(&self, address: &str) -> Option<TransportType> {
        self.map
            .lock()
            .ok()
            .and_then(|map| map.get(address).map(|s| TransportType::from_cache_str(s)))
    }

    fn put(&self, address: &str, transport: TransportType) {
        if let Ok(mut map) = self.map.lock() {
            let previous = map.insert(address.to_string(), transport.as_str().to_string());
            // Skip the disk write when nothing changed.
            if previous.as_deref() != Some(transport.as_str()) {
                self.persist(&map);
            }
        }
    }
}
