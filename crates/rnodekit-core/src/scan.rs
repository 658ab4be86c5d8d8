//! On-demand device discovery.
//!
//! A scan pass runs three independently fault-tolerant steps: a bounded BLE
//! scan window, enumeration of platform-bonded devices classified against
//! the live scan set, and USB serial enumeration. Bluetooth results merge
//! into one address-keyed set; USB devices are a disjoint set keyed by
//! device id. A failed step is recorded and the remaining steps still run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rnodekit_types::{TransportType, UsbDeviceInfo};

use crate::cache::DeviceTypeCache;
use crate::classify::classify;
use crate::error::Error;
use crate::serial::SerialBridge;
use crate::throttle::RssiThrottle;
use crate::transport::{BluetoothApi, ScanFilter, ScanHit};

/// A candidate radio found during a scan pass.
///
/// The address is the merge key: repeat sightings within one pass update
/// RSSI and the bonded flag in place instead of duplicating the entry.
/// Entries live for the duration of one scan and are rebuilt by the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Stable transport-specific address.
    pub address: String,
    /// Display name.
    pub name: Option<String>,
    /// Classified transport type.
    pub transport: TransportType,
    /// Last accepted RSSI in dBm.
    pub rssi: Option<i16>,
    /// Whether the platform reports the device as bonded.
    pub bonded: bool,
}

/// Options for a scan pass.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// BLE scan window.
    pub duration: Duration,
    /// BLE scan filter.
    pub filter: ScanFilter,
    /// Minimum interval between forwarded RSSI updates per device.
    pub rssi_interval: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
            filter: ScanFilter::rnode(),
            rssi_interval: crate::throttle::DEFAULT_RSSI_INTERVAL,
        }
    }
}

/// Which discovery step a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// The BLE scan window.
    BleScan,
    /// Enumeration of platform-bonded devices.
    BondedEnumeration,
    /// USB serial enumeration.
    UsbEnumeration,
}

/// A contained failure from one discovery step.
#[derive(Debug)]
pub struct ScanFailure {
    /// The step that failed.
    pub step: ScanStep,
    /// The underlying error.
    pub error: Error,
}

/// Result of one scan pass.
///
/// An empty device list with no failures is the user-facing "no devices
/// found" condition; it is distinct from a scan failure such as a denied
/// permission or unavailable adapter.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Bluetooth candidates, merged by address.
    pub devices: Vec<DiscoveredDevice>,
    /// Attached USB serial devices (disjoint set, keyed by device id).
    pub usb_devices: Vec<UsbDeviceInfo>,
    /// Contained step failures.
    pub failures: Vec<ScanFailure>,
    /// Whether the pass was cancelled before completing.
    pub cancelled: bool,
}

impl ScanReport {
    /// True when nothing was found and no step failed.
    #[must_use]
    pub fn found_nothing(&self) -> bool {
        self.devices.is_empty() && self.usb_devices.is_empty() && self.failures.is_empty()
    }
}

/// Runs on-demand scan passes over the platform Bluetooth and USB bridges.
pub struct DiscoveryEngine<B, S> {
    bluetooth: Arc<B>,
    serial: Arc<S>,
    cache: Arc<dyn DeviceTypeCache>,
    throttle: Mutex<RssiThrottle>,
    options: ScanOptions,
}

impl<B: BluetoothApi, S: SerialBridge> DiscoveryEngine<B, S> {
    /// Create an engine with default options.
    pub fn new(bluetooth: Arc<B>, serial: Arc<S>, cache: Arc<dyn DeviceTypeCache>) -> Self {
        Self::with_options(bluetooth, serial, cache, ScanOptions::default())
    }

    /// Create an engine with custom options.
    pub fn with_options(
        bluetooth: Arc<B>,
        serial: Arc<S>,
        cache: Arc<dyn DeviceTypeCache>,
        options: ScanOptions,
    ) -> Self {
        let throttle = Mutex::new(RssiThrottle::new(options.rssi_interval));
        Self {
            bluetooth,
            serial,
            cache,
            throttle,
            options,
        }
    }

    /// Run one scan pass to completion.
    pub async fn scan(&self) -> ScanReport {
        self.scan_with_cancel(&CancellationToken::new()).await
    }

    /// Run one scan pass, stopping early when the token is cancelled.
    /// Platform scan handles are released on cancellation, error, and
    /// normal completion alike.
    pub async fn scan_with_cancel(&self, cancel: &CancellationToken) -> ScanReport {
        let mut report = ScanReport::default();
        let mut devices: Vec<DiscoveredDevice> = Vec::new();
        let mut ble_sightings: HashSet<String> = HashSet::new();

        self.throttle.lock().await.reset();

        // Step 1: bounded BLE scan window.
        self.ble_scan_step(cancel, &mut report, &mut devices, &mut ble_sightings)
            .await;
        if report.cancelled {
            report.devices = devices;
            return report;
        }

        // Step 2: bonded devices, classified against the live scan set.
        self.bonded_step(&mut report, &mut devices, &ble_sightings)
            .await;
        if cancel.is_cancelled() {
            report.cancelled = true;
            report.devices = devices;
            return report;
        }

        // Step 3: USB enumeration, a disjoint set.
        match self.serial.enumerate().await {
            Ok(usb) => report.usb_devices = usb,
            Err(error) => {
                warn!("USB enumeration failed: {error}");
                report.failures.push(ScanFailure {
                    step: ScanStep::UsbEnumeration,
                    error,
                });
            }
        }

        report.devices = devices;
        info!(
            "Scan complete: {} Bluetooth device(s), {} USB device(s), {} step failure(s)",
            report.devices.len(),
            report.usb_devices.len(),
            report.failures.len()
        );
        report
    }

    async fn ble_scan_step(
        &self,
        cancel: &CancellationToken,
        report: &mut ScanReport,
        devices: &mut Vec<DiscoveredDevice>,
        ble_sightings: &mut HashSet<String>,
    ) {
        let mut stream = match self.bluetooth.start_ble_scan(self.options.filter.clone()).await {
            Ok(stream) => stream,
            Err(error) => {
                warn!("BLE scan failed to start: {error}");
                report.failures.push(ScanFailure {
                    step: ScanStep::BleScan,
                    error,
                });
                return;
            }
        };

        let window = sleep(self.options.duration);
        tokio::pin!(window);

        loop {
            tokio::select! {
                _ = &mut window => break,
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                hit = stream.next() => match hit {
                    Some(hit) => self.absorb_ble_hit(hit, devices, ble_sightings).await,
                    None => break,
                },
            }
        }

        // Release the platform scanner on every exit path.
        self.bluetooth.stop_ble_scan().await;
        debug!("BLE scan window closed, {} sighting(s)", ble_sightings.len());
    }

    async fn absorb_ble_hit(
        &self,
        hit: ScanHit,
        devices: &mut Vec<DiscoveredDevice>,
        ble_sightings: &mut HashSet<String>,
    ) {
        if !self.options.filter.name_matches(hit.name.as_deref()) {
            return;
        }

        if ble_sightings.insert(hit.address.clone()) {
            // First sighting this pass: confirmed BLE, write the cache back.
            self.cache.put(&hit.address, TransportType::Ble);
            self.throttle.lock().await.should_update(&hit.address);
            devices.push(DiscoveredDevice {
                address: hit.address,
                name: hit.name,
                transport: TransportType::Ble,
                rssi: hit.rssi,
                bonded: hit.bonded,
            });
        } else if let Some(device) = devices.iter_mut().find(|d| d.address == hit.address) {
            device.bonded |= hit.bonded;
            if hit.rssi.is_some() && self.throttle.lock().await.should_update(&hit.address) {
                device.rssi = hit.rssi;
            }
        }
    }

    async fn bonded_step(
        &self,
        report: &mut ScanReport,
        devices: &mut Vec<DiscoveredDevice>,
        ble_sightings: &HashSet<String>,
    ) {
        let bonded = match self.bluetooth.bonded_devices().await {
            Ok(bonded) => bonded,
            Err(error) => {
                warn!("Bonded device enumeration failed: {error}");
                report.failures.push(ScanFailure {
                    step: ScanStep::BondedEnumeration,
                    error,
                });
                return;
            }
        };

        for entry in bonded {
            if !self.options.filter.name_matches(entry.name.as_deref()) {
                continue;
            }
            if let Some(existing) = devices.iter_mut().find(|d| d.address == entry.address) {
                // Already seen live over BLE; just mark it bonded.
                existing.bonded = true;
                continue;
            }
            let classification = classify(&entry.address, ble_sightings, self.cache.as_ref());
            devices.push(DiscoveredDevice {
                address: entry.address,
                name: entry.name,
                transport: classification.transport(),
                rssi: None,
                bonded: true,
            });
        }
    }
}
