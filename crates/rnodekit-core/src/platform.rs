//! Desktop Bluetooth backend on `btleplug`.
//!
//! Implements the BLE half of [`BluetoothApi`] over the platform adapter's
//! event stream. Desktop BLE stacks expose neither Classic Bluetooth
//! discovery nor a bonding API, so those operations report
//! [`Error::NotSupported`]; the discovery engine contains these as step
//! failures and the pairing orchestrator falls back where a fallback
//! exists.
//!
//! # Platform Notes
//!
//! | Platform | BLE Stack | Address Format |
//! |----------|-----------|----------------|
//! | Linux | BlueZ | MAC address |
//! | macOS | CoreBluetooth | per-host UUID (MACs are hidden) |
//! | Windows | WinRT | MAC address |
//!
//! On macOS the reported "address" is the CoreBluetooth peripheral UUID,
//! stable per host but not across hosts. The device-type cache keys on this
//! string, so cache entries are host-local there.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter as BtleScanFilter,
};
use btleplug::platform::{Adapter, Manager};
use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::{BluetoothApi, BondStream, BondedDevice, ScanFilter, ScanHit, ScanStream};

/// `BluetoothApi` backend over the first available platform adapter.
pub struct BtleplugBackend {
    adapter: Adapter,
}

impl BtleplugBackend {
    /// Connect to the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAdapter`] when the host has none, or a
    /// [`Error::Bluetooth`] when the platform manager fails.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::NoAdapter)?;
        Ok(Self { adapter })
    }

    /// Wrap an already-selected adapter.
    #[must_use]
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl BluetoothApi for BtleplugBackend {
    async fn start_ble_scan(&self, filter: ScanFilter) -> Result<ScanStream> {
        let events = self.adapter.events().await?;

        let btle_filter = match filter.service {
            Some(service) => BtleScanFilter {
                services: vec![service],
            },
            None => BtleScanFilter::default(),
        };
        self.adapter.start_scan(btle_filter).await?;
        debug!("BLE scan started");

        let adapter = self.adapter.clone();
        let stream = events
            .filter_map(move |event| {
                let adapter = adapter.clone();
                let filter = filter.clone();
                async move {
                    let id = match event {
                        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                        _ => return None,
                    };
                    let peripheral = adapter.peripheral(&id).await.ok()?;
                    let properties = peripheral.properties().await.ok().flatten()?;
                    let name = properties.local_name;
                    if !filter.name_matches(name.as_deref()) {
                        return None;
                    }
                    Some(ScanHit {
                        address: properties.address.to_string(),
                        name,
                        rssi: properties.rssi,
                        bonded: false,
                    })
                }
            })
            .boxed();
        Ok(stream)
    }

    async fn stop_ble_scan(&self) {
        if let Err(error) = self.adapter.stop_scan().await {
            warn!("Failed to stop BLE scan: {error}");
        }
    }

    /// btleplug exposes no bond list on any platform; the bonded step of a
    /// scan pass sees an empty set here.
    async fn bonded_devices(&self) -> Result<Vec<BondedDevice>> {
        debug!("Bonded-device enumeration unavailable on this backend");
        Ok(Vec::new())
    }

    async fn start_classic_discovery(&self) -> Result<ScanStream> {
        Err(Error::not_supported("Classic Bluetooth discovery"))
    }

    async fn cancel_classic_discovery(&self) {}

    async fn set_pin(&self, _address: &str, _pin: &str) -> Result<()> {
        Err(Error::not_supported("pairing PIN binding"))
    }

    async fn bond(&self, _address: &str) -> Result<BondStream> {
        Err(Error::not_supported("bonding"))
    }
}
