//! Capability traits for the platform Bluetooth stack.
//!
//! The discovery engine and pairing orchestrator never talk to a platform
//! event bus directly; they consume cancellable event streams behind the
//! [`BluetoothApi`] trait. This keeps the state machines transport-agnostic
//! and testable against the scripted mocks in [`crate::mock`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use rnodekit_types::uuid::{DEVICE_NAME_PREFIX, RNODE_SERVICE};
use rnodekit_types::{BondState, TransportType};

use crate::error::{Error, Result};

/// Filter for BLE scans: advertised service UUID and device name prefix.
#[derive(Debug, Clone)]
pub struct ScanFilter {
    /// Only report devices advertising this service.
    pub service: Option<Uuid>,
    /// Only report devices whose name starts with this prefix.
    pub name_prefix: Option<String>,
}

impl ScanFilter {
    /// The standard RNode filter: Nordic UART service plus "RNode" prefix.
    #[must_use]
    pub fn rnode() -> Self {
        Self {
            service: Some(RNODE_SERVICE),
            name_prefix: Some(DEVICE_NAME_PREFIX.to_string()),
        }
    }

    /// Whether a device name passes the prefix filter. A missing name only
    /// passes when no prefix is set.
    #[must_use]
    pub fn name_matches(&self, name: Option<&str>) -> bool {
        match (&self.name_prefix, name) {
            (None, _) => true,
            (Some(prefix), Some(name)) => name.starts_with(prefix.as_str()),
            (Some(_), None) => false,
        }
    }
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self::rnode()
    }
}

/// One sighting from a BLE scan or Classic discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHit {
    /// Transport-specific stable address.
    pub address: String,
    /// Advertised device name, if present.
    pub name: Option<String>,
    /// Signal strength in dBm, if reported.
    pub rssi: Option<i16>,
    /// Whether the platform reports this device as bonded.
    pub bonded: bool,
}

/// An entry from the platform's bonded-device list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondedDevice {
    /// Bluetooth address.
    pub address: String,
    /// Device name, if known.
    pub name: Option<String>,
}

/// Stream of scan sightings. Dropping the stream does not stop the
/// underlying scanner; callers must invoke the matching stop method.
pub type ScanStream = BoxStream<'static, ScanHit>;

/// Stream of bond-state transitions for one address.
pub type BondStream = BoxStream<'static, BondState>;

/// Capability interface over the platform Bluetooth stack.
///
/// Every stream-producing method has a matching stop/cancel method, and the
/// engine guarantees the stop is called on completion, error, and
/// cancellation alike — no leaked scan sessions.
#[async_trait]
pub trait BluetoothApi: Send + Sync {
    /// Start a BLE scan. Sightings arrive on the returned stream until the
    /// scan is stopped.
    async fn start_ble_scan(&self, filter: ScanFilter) -> Result<ScanStream>;

    /// Stop the active BLE scan and release the platform scanner.
    async fn stop_ble_scan(&self);

    /// Enumerate platform-bonded devices.
    async fn bonded_devices(&self) -> Result<Vec<BondedDevice>>;

    /// Start Classic Bluetooth discovery.
    async fn start_classic_discovery(&self) -> Result<ScanStream>;

    /// Cancel the active Classic discovery.
    async fn cancel_classic_discovery(&self);

    /// Bind a pairing PIN to a specific address before bonding. The PIN is
    /// never applied globally, so a second radio in range cannot consume it.
    async fn set_pin(&self, address: &str, pin: &str) -> Result<()>;

    /// Initiate bonding with the platform's default transport selection.
    /// Bond-state transitions for this address arrive on the stream.
    async fn bond(&self, address: &str) -> Result<BondStream>;

    /// Initiate bonding over an explicitly selected transport.
    ///
    /// The default implementation reports [`Error::NotSupported`]; callers
    /// use [`crate::pairing::initiate_bond`], which falls back to the
    /// default [`BluetoothApi::bond`] call when transport selection is
    /// unavailable on the platform.
    async fn bond_with_transport(
        &self,
        address: &str,
        transport: TransportType,
    ) -> Result<BondStream> {
        let _ = (address, transport);
        Err(Error::not_supported("transport-selected bonding"))
    }
}
