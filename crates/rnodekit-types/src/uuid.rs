//! Bluetooth UUIDs and naming constants for RNode hardware.
//!
//! RNode boards expose their serial stream over the Nordic UART Service
//! (NUS) when running in BLE mode, and advertise a device name starting
//! with "RNode".

use uuid::{Uuid, uuid};

/// Nordic UART Service UUID advertised by BLE RNodes.
pub const RNODE_SERVICE: Uuid = uuid!("6e400001-b5a3-f393-e0a9-e50e24dcca9e");

/// NUS RX characteristic (host -> radio).
pub const RNODE_RX_CHAR: Uuid = uuid!("6e400002-b5a3-f393-e0a9-e50e24dcca9e");

/// NUS TX characteristic (radio -> host).
pub const RNODE_TX_CHAR: Uuid = uuid!("6e400003-b5a3-f393-e0a9-e50e24dcca9e");

/// Device name prefix shared by all RNode boards (e.g. "RNode 5A3F").
pub const DEVICE_NAME_PREFIX: &str = "RNode";

/// Check whether a Bluetooth device name identifies an RNode.
#[must_use]
pub fn is_rnode_name(name: &str) -> bool {
    name.starts_with(DEVICE_NAME_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_prefix_match() {
        assert!(is_rnode_name("RNode 5A3F"));
        assert!(is_rnode_name("RNode"));
        assert!(!is_rnode_name("openmodem 5A3F"));
        assert!(!is_rnode_name("my RNode"));
    }

    #[test]
    fn test_service_uuid_is_nus() {
        assert_eq!(
            RNODE_SERVICE.to_string(),
            "6e400001-b5a3-f393-e0a9-e50e24dcca9e"
        );
    }
}
