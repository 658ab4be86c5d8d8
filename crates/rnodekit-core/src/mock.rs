//! Scripted mock transports for testing.
//!
//! [`MockBluetooth`] and [`MockSerial`] implement the capability traits
//! against in-memory scripts, record every open/close so tests can assert
//! that no scan session or serial connection leaks, and support failure
//! injection for the error paths.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use tokio::sync::oneshot;

use rnodekit_types::{BondState, TransportType, UsbDeviceInfo};

use crate::error::{Error, Result};
use crate::serial::SerialBridge;
use crate::transport::{BluetoothApi, BondStream, BondedDevice, ScanFilter, ScanHit, ScanStream};

/// A scripted Bluetooth stack.
///
/// Scan streams yield their scripted hits immediately and then stay
/// pending, so bounded waits exercise their timeout paths under paused
/// time. Bond streams behave the same way per address; each `bond` call
/// consumes the next script in the queue.
#[derive(Default)]
pub struct MockBluetooth {
    ble_hits: Mutex<Vec<ScanHit>>,
    classic_hits: Mutex<Vec<ScanHit>>,
    bonded: Mutex<Vec<BondedDevice>>,
    bond_scripts: Mutex<HashMap<String, VecDeque<Vec<BondState>>>>,
    pins: Mutex<HashMap<String, String>>,
    fail_ble_scan: AtomicBool,
    fail_classic_discovery: AtomicBool,
    transport_aware_bonding: AtomicBool,
    bond_initiations: Mutex<Vec<(String, Option<TransportType>)>>,
    log: Mutex<Vec<&'static str>>,
}

impl MockBluetooth {
    /// Create a mock with no scripted devices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a BLE scan sighting.
    pub fn add_ble_hit(&self, hit: ScanHit) {
        self.ble_hits.lock().unwrap().push(hit);
    }

    /// Script a Classic discovery sighting.
    pub fn add_classic_hit(&self, hit: ScanHit) {
        self.classic_hits.lock().unwrap().push(hit);
    }

    /// Script a platform-bonded device.
    pub fn add_bonded(&self, address: &str, name: &str) {
        self.bonded.lock().unwrap().push(BondedDevice {
            address: address.to_string(),
            name: Some(name.to_string()),
        });
    }

    /// Queue a bond-state script for an address. Each `bond` call consumes
    /// one script; with none left the stream stays silent.
    pub fn script_bond(&self, address: &str, states: Vec<BondState>) {
        self.bond_scripts
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push_back(states);
    }

    /// Make BLE scans fail with `PermissionDenied`.
    pub fn fail_ble_scan(&self, fail: bool) {
        self.fail_ble_scan.store(fail, Ordering::SeqCst);
    }

    /// Make Classic discovery fail with `PermissionDenied`.
    pub fn fail_classic_discovery(&self, fail: bool) {
        self.fail_classic_discovery.store(fail, Ordering::SeqCst);
    }

    /// Enable the transport-aware bonding call (disabled by default, so the
    /// fallback path is what tests exercise unless they opt in).
    pub fn set_transport_aware_bonding(&self, enabled: bool) {
        self.transport_aware_bonding.store(enabled, Ordering::SeqCst);
    }

    /// PIN currently bound to an address via `set_pin`.
    #[must_use]
    pub fn pin_for(&self, address: &str) -> Option<String> {
        self.pins.lock().unwrap().get(address).cloned()
    }

    /// Every bond initiation, with the explicitly selected transport if the
    /// transport-aware call was used.
    #[must_use]
    pub fn bond_initiations(&self) -> Vec<(String, Option<TransportType>)> {
        self.bond_initiations.lock().unwrap().clone()
    }

    /// Ordered open/close log ("ble_start", "ble_stop", "classic_start",
    /// "classic_cancel").
    #[must_use]
    pub fn scan_log(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }

    /// Number of scans started minus scans stopped, per transport.
    /// Zero means every scan handle was released.
    #[must_use]
    pub fn open_scan_count(&self) -> i64 {
        let log = self.log.lock().unwrap();
        let mut open = 0i64;
        for entry in log.iter() {
            match *entry {
                "ble_start" | "classic_start" => open += 1,
                "ble_stop" | "classic_cancel" => open -= 1,
                _ => {}
            }
        }
        open
    }

    fn record(&self, event: &'static str) {
        self.log.lock().unwrap().push(event);
    }

    fn hits_stream(hits: Vec<ScanHit>) -> ScanStream {
        stream::iter(hits).chain(stream::pending()).boxed()
    }

    fn bond_stream(&self, address: &str) -> BondStream {
        let states = self
            .bond_scripts
            .lock()
            .unwrap()
            .get_mut(address)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_default();
        stream::iter(states).chain(stream::pending()).boxed()
    }
}

#[async_trait]
impl BluetoothApi for MockBluetooth {
    async fn start_ble_scan(&self, _filter: ScanFilter) -> Result<ScanStream> {
        if self.fail_ble_scan.load(Ordering::SeqCst) {
            return Err(Error::permission_denied("ble scan"));
        }
        self.record("ble_start");
        Ok(Self::hits_stream(self.ble_hits.lock().unwrap().clone()))
    }

    async fn stop_ble_scan(&self) {
        self.record("ble_stop");
    }

    async fn bonded_devices(&self) -> Result<Vec<BondedDevice>> {
        Ok(self.bonded.lock().unwrap().clone())
    }

    async fn start_classic_discovery(&self) -> Result<ScanStream> {
        if self.fail_classic_discovery.load(Ordering::SeqCst) {
            return Err(Error::permission_denied("classic discovery"));
        }
        self.record("classic_start");
        Ok(Self::hits_stream(self.classic_hits.lock().unwrap().clone()))
    }

    async fn cancel_classic_discovery(&self) {
        self.record("classic_cancel");
    }

    async fn set_pin(&self, address: &str, pin: &str) -> Result<()> {
        self.pins
            .lock()
            .unwrap()
            .insert(address.to_string(), pin.to_string());
        Ok(())
    }

    async fn bond(&self, address: &str) -> Result<BondStream> {
        self.bond_initiations
            .lock()
            .unwrap()
            .push((address.to_string(), None));
        Ok(self.bond_stream(address))
    }

    async fn bond_with_transport(
        &self,
        address: &str,
        transport: TransportType,
    ) -> Result<BondStream> {
        if !self.transport_aware_bonding.load(Ordering::SeqCst) {
            return Err(Error::not_supported("transport-selected bonding"));
        }
        self.bond_initiations
            .lock()
            .unwrap()
            .push((address.to_string(), Some(transport)));
        Ok(self.bond_stream(address))
    }
}

/// A scripted USB serial bridge.
pub struct MockSerial {
    devices: Mutex<Vec<UsbDeviceInfo>>,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    fail_enumerate: AtomicBool,
    short_write: AtomicBool,
    /// PIN delivered immediately after a pairing-mode frame is written.
    auto_pin: Mutex<Option<String>>,
    writes: Mutex<Vec<Vec<u8>>>,
    pin_tx: Mutex<Option<oneshot::Sender<String>>>,
    log: Mutex<Vec<&'static str>>,
}

impl MockSerial {
    /// Create a disconnected mock bridge with no devices.
    #[must_use]
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_enumerate: AtomicBool::new(false),
            short_write: AtomicBool::new(false),
            auto_pin: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            pin_tx: Mutex::new(None),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Script an attached USB device.
    pub fn add_device(&self, device: UsbDeviceInfo) {
        self.devices.lock().unwrap().push(device);
    }

    /// Deliver this PIN as soon as the pairing-mode frame is written,
    /// simulating firmware that echoes the PIN over serial.
    pub fn set_auto_pin(&self, pin: &str) {
        *self.auto_pin.lock().unwrap() = Some(pin.to_string());
    }

    /// Make the next writes return one byte short.
    pub fn set_short_write(&self, short: bool) {
        self.short_write.store(short, Ordering::SeqCst);
    }

    /// Make `connect` fail.
    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make `enumerate` fail.
    pub fn fail_enumerate(&self, fail: bool) {
        self.fail_enumerate.store(fail, Ordering::SeqCst);
    }

    /// All frames written so far.
    #[must_use]
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    /// Deliver a PIN to the current subscriber, as the platform layer would.
    pub fn deliver_pin(&self, pin: &str) {
        if let Some(tx) = self.pin_tx.lock().unwrap().take() {
            let _ = tx.send(pin.to_string());
        }
    }

    /// Whether a connection is currently held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Ordered connect/disconnect log.
    #[must_use]
    pub fn connection_log(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }
}

impl Default for MockSerial {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SerialBridge for MockSerial {
    async fn enumerate(&self) -> Result<Vec<UsbDeviceInfo>> {
        if self.fail_enumerate.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("usb enumeration failed")));
        }
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn has_permission(&self, _id: &str) -> bool {
        true
    }

    async fn request_permission(&self, _id: &str) -> Result<bool> {
        Ok(true)
    }

    async fn connect(&self, _id: &str) -> Result<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("port open failed")));
        }
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(Error::SerialBusy);
        }
        self.log.lock().unwrap().push("connect");
        Ok(())
    }

    async fn write(&self, bytes: &[u8]) -> Result<usize> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        self.writes.lock().unwrap().push(bytes.to_vec());

        if self.short_write.load(Ordering::SeqCst) {
            return Ok(bytes.len().saturating_sub(1));
        }

        // Firmware that echoes the PIN does so right after entering
        // pairing mode.
        if bytes == crate::kiss::bt_ctrl_frame(crate::kiss::BT_CTRL_PAIR) {
            let pin = self.auto_pin.lock().unwrap().clone();
            if let Some(pin) = pin {
                self.deliver_pin(&pin);
            }
        }
        Ok(bytes.len())
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.log.lock().unwrap().push("disconnect");
        }
    }

    fn take_pin_receiver(&self) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        *self.pin_tx.lock().unwrap() = Some(tx);
        rx
    }
}
