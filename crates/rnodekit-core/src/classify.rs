//! Transport classification for bonded devices.
//!
//! A bonded device's transport family cannot be queried from the platform
//! bond list, so it is decided from evidence: a live BLE-scan sighting is
//! definitive (a board uses either BLE or Classic exclusively by hardware
//! design, never both), a cached type from a prior session is next best,
//! and with no evidence at all the user must choose manually.

use std::collections::HashSet;

use rnodekit_types::TransportType;

use crate::cache::DeviceTypeCache;

/// Result of classifying one address. Closed variant set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Seen in the current BLE scan. Live evidence always wins.
    ConfirmedBle,
    /// No live BLE evidence, but a prior session recorded a type.
    Cached(TransportType),
    /// No evidence; the user must choose manually.
    Unknown,
}

impl Classification {
    /// The transport type this classification implies.
    #[must_use]
    pub fn transport(&self) -> TransportType {
        match self {
            Classification::ConfirmedBle => TransportType::Ble,
            Classification::Cached(t) => *t,
            Classification::Unknown => TransportType::Unknown,
        }
    }

    /// Whether the user must confirm the transport manually.
    #[must_use]
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Classification::Unknown)
            || matches!(self, Classification::Cached(TransportType::Unknown))
    }
}

/// Classify a bonded device's transport from the addresses seen in the
/// current BLE scan and the persistent cache.
///
/// Pure decision: callers are responsible for writing confirmed types back
/// to the cache.
#[must_use]
pub fn classify(
    address: &str,
    ble_sightings: &HashSet<String>,
    cache: &dyn DeviceTypeCache,
) -> Classification {
    if ble_sightings.contains(address) {
        return Classification::ConfirmedBle;
    }
    match cache.get(address) {
        Some(transport) => Classification::Cached(transport),
        None => Classification::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn sightings(addresses: &[&str]) -> HashSet<String> {
        addresses.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_live_ble_sighting_is_definitive() {
        let cache = MemoryCache::new();
        let seen = sightings(&["AA:BB"]);
        assert_eq!(
            classify("AA:BB", &seen, &cache),
            Classification::ConfirmedBle
        );
    }

    #[test]
    fn test_live_sighting_overrides_conflicting_cache() {
        let cache = MemoryCache::new();
        cache.put("AA:BB", TransportType::Classic);
        let seen = sightings(&["AA:BB"]);
        assert_eq!(
            classify("AA:BB", &seen, &cache),
            Classification::ConfirmedBle
        );
    }

    #[test]
    fn test_cache_consulted_without_live_evidence() {
        let cache = MemoryCache::new();
        cache.put("AA:BB", TransportType::Classic);
        let classification = classify("AA:BB", &sightings(&[]), &cache);
        assert_eq!(classification, Classification::Cached(TransportType::Classic));
        assert_eq!(classification.transport(), TransportType::Classic);
    }

    #[test]
    fn test_no_evidence_is_unknown() {
        let cache = MemoryCache::new();
        let classification = classify("AA:BB", &sightings(&[]), &cache);
        assert_eq!(classification, Classification::Unknown);
        assert!(classification.needs_confirmation());
        assert_eq!(classification.transport(), TransportType::Unknown);
    }

    #[test]
    fn test_confirmed_needs_no_confirmation() {
        assert!(!Classification::ConfirmedBle.needs_confirmation());
        assert!(!Classification::Cached(TransportType::Ble).needs_confirmation());
        assert!(Classification::Cached(TransportType::Unknown).needs_confirmation());
    }
}
