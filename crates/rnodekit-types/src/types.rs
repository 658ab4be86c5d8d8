//! Core types for Bluetooth transports and device identity.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bluetooth transport family of an RNode board.
///
/// A given board supports exactly one of BLE or Classic by hardware design.
/// `Unknown` means no live or cached evidence exists yet and the user must
/// choose manually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TransportType {
    /// Bluetooth Low Energy (GATT).
    Ble,
    /// Classic Bluetooth (SPP/RFCOMM).
    Classic,
    /// Transport not yet determined.
    Unknown,
}

impl TransportType {
    /// Stable string form used in the device-type cache file.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Ble => "ble",
            TransportType::Classic => "classic",
            TransportType::Unknown => "unknown",
        }
    }

    /// Parse the cache-file string form. Unrecognized strings map to
    /// `Unknown` so a corrupted cache entry degrades to manual selection
    /// instead of failing the scan.
    #[must_use]
    pub fn from_cache_str(s: &str) -> Self {
        match s {
            "ble" => TransportType::Ble,
            "classic" => TransportType::Classic,
            _ => TransportType::Unknown,
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Ble => write!(f, "BLE"),
            TransportType::Classic => write!(f, "Classic"),
            TransportType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Platform bond state for a Bluetooth device.
///
/// Mirrors the three states every platform bonding API exposes. The pairing
/// orchestrator treats `Bonding -> None` as a rejected PIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BondState {
    /// No bond exists.
    None,
    /// A bonding handshake is in progress.
    Bonding,
    /// The device is bonded.
    Bonded,
}

impl fmt::Display for BondState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BondState::None => write!(f, "none"),
            BondState::Bonding => write!(f, "bonding"),
            BondState::Bonded => write!(f, "bonded"),
        }
    }
}

/// An attached USB serial device, as reported by the serial bridge.
///
/// USB devices form a set disjoint from Bluetooth devices, keyed by `id`
/// rather than by Bluetooth address.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UsbDeviceInfo {
    /// Platform device identifier (port path on desktop systems).
    pub id: String,
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
    /// Product string from the USB descriptor, if available.
    pub product: Option<String>,
}

/// How a saved radio configuration reaches its RNode.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum TransportBinding {
    /// A bonded Bluetooth device, by name and transport family.
    Bluetooth {
        /// Bluetooth device name (e.g. "RNode 5A3F").
        name: String,
        /// Transport family the bond was established over.
        transport: TransportType,
    },
    /// A TCP-attached RNode.
    Tcp {
        /// Host name or address.
        host: String,
        /// TCP port.
        port: u16,
    },
    /// A USB-attached RNode.
    Usb {
        /// USB vendor id.
        vendor_id: u16,
        /// USB product id.
        product_id: u16,
        /// Platform device identifier.
        device_id: String,
    },
}
