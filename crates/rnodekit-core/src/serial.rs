//! USB serial bridge to an attached RNode.
//!
//! The [`SerialBridge`] trait is the capability interface the engine drives:
//! enumeration, permission handling (a no-op on desktop, real on mobile
//! platforms), an exclusively-owned connection, raw writes, and a one-shot
//! PIN subscription. [`UsbSerialBridge`] is the desktop implementation on
//! top of the `serialport` crate.

use std::sync::Mutex;

use async_trait::async_trait;
use serialport::{SerialPort, SerialPortType};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use rnodekit_types::UsbDeviceInfo;

use crate::error::{Error, Result};

/// Baud rate RNode firmware uses on its USB serial port.
pub const RNODE_BAUD_RATE: u32 = 115_200;

/// Capability interface over the platform USB serial stack.
///
/// The serial connection is exclusively owned by whichever operation opened
/// it; [`SerialBridge::connect`] while connected reports
/// [`Error::SerialBusy`].
#[async_trait]
pub trait SerialBridge: Send + Sync {
    /// Enumerate attached USB serial devices.
    async fn enumerate(&self) -> Result<Vec<UsbDeviceInfo>>;

    /// Whether the host already holds permission to open this device.
    async fn has_permission(&self, id: &str) -> bool;

    /// Request permission to open this device. Resolves true when granted.
    async fn request_permission(&self, id: &str) -> Result<bool>;

    /// Open the device. Fails with [`Error::SerialBusy`] if a connection is
    /// already held.
    async fn connect(&self, id: &str) -> Result<()>;

    /// Write raw bytes, returning the number written. Callers compare the
    /// count against the frame length; a short write is a hard failure.
    async fn write(&self, bytes: &[u8]) -> Result<usize>;

    /// Release the connection. Idempotent.
    async fn disconnect(&self);

    /// Subscribe to the next PIN the radio sends over serial.
    ///
    /// One-shot per pairing session: taking a new receiver drops any
    /// previous sender, so a stale subscription can never fire into a
    /// superseded session.
    fn take_pin_receiver(&self) -> oneshot::Receiver<String>;
}

/// Desktop serial bridge backed by the `serialport` crate.
///
/// Desktop operating systems have no per-device permission prompt, so the
/// permission methods always succeed. PIN delivery comes from whatever
/// reads the serial stream; embedders call [`UsbSerialBridge::deliver_pin`]
/// when the radio echoes one.
pub struct UsbSerialBridge {
    port: Mutex<Option<Box<dyn SerialPort>>>,
    pin_tx: Mutex<Option<oneshot::Sender<String>>>,
}

impl UsbSerialBridge {
    /// Create an unconnected bridge.
    #[must_use]
    pub fn new() -> Self {
        Self {
            port: Mutex::new(None),
            pin_tx: Mutex::new(None),
        }
    }

    /// Forward a PIN received from the radio to the current subscriber.
    pub fn deliver_pin(&self, pin: impl Into<String>) {
        let sender = self.pin_tx.lock().ok().and_then(|mut tx| tx.take());
        match sender {
            Some(tx) => {
                // Receiver may already be gone if the session resolved.
                let _ = tx.send(pin.into());
            }
            None => debug!("PIN received with no active subscriber, dropping"),
        }
    }
}

impl Default for UsbSerialBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UsbSerialBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let connected = self.port.lock().map(|p| p.is_some()).unwrap_or(false);
        f.debug_struct("UsbSerialBridge")
            .field("connected", &connected)
            .finish()
    }
}

#[async_trait]
impl SerialBridge for UsbSerialBridge {
    async fn enumerate(&self) -> Result<Vec<UsbDeviceInfo>> {
        let ports = serialport::available_ports()?;
        let devices: Vec<UsbDeviceInfo> = ports
            .into_iter()
            .filter_map(|port| match port.port_type {
                SerialPortType::UsbPort(usb) => Some(UsbDeviceInfo {
                    id: port.port_name,
                    vendor_id: usb.vid,
                    product_id: usb.pid,
                    product: usb.product,
                }),
                _ => None,
            })
            .collect();
        debug!("Enumerated {} USB serial device(s)", devices.len());
        Ok(devices)
    }

    async fn has_permission(&self, _id: &str) -> bool {
        true
    }

    async fn request_permission(&self, _id: &str) -> Result<bool> {
        Ok(true)
    }

    async fn connect(&self, id: &str) -> Result<()> {
        let mut guard = self.port.lock().map_err(|_| Error::SerialBusy)?;
        if guard.is_some() {
            return Err(Error::SerialBusy);
        }
        let port = serialport::new(id, RNODE_BAUD_RATE)
            .timeout(std::time::Duration::from_millis(500))
            .open()?;
        debug!("Opened serial port {id}");
        *guard = Some(port);
        Ok(())
    }

    async fn write(&self, bytes: &[u8]) -> Result<usize> {
        let mut guard = self.port.lock().map_err(|_| Error::NotConnected)?;
        let port = guard.as_mut().ok_or(Error::NotConnected)?;
        // Control frames are 4 bytes, so the blocking write is negligible.
        let written = port.write(bytes)?;
        port.flush()?;
        Ok(written)
    }

    async fn disconnect(&self) {
        match self.port.lock() {
            Ok(mut guard) => {
                if guard.take().is_some() {
                    debug!("Released serial port");
                }
            }
            Err(_) => warn!("Serial port lock poisoned during disconnect"),
        }
    }

    fn take_pin_receiver(&self) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut guard) = self.pin_tx.lock() {
            // Replacing the sender cancels any previous subscription.
            *guard = Some(tx);
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_without_connection_fails() {
        let bridge = UsbSerialBridge::new();
        let err = bridge.write(&[0xC0]).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let bridge = UsbSerialBridge::new();
        bridge.disconnect().await;
        bridge.disconnect().await;
    }

    #[tokio::test]
    async fn test_pin_subscription_is_one_shot_per_session() {
        let bridge = UsbSerialBridge::new();
        let stale = bridge.take_pin_receiver();
        let mut fresh = bridge.take_pin_receiver();

        bridge.deliver_pin("123456");

        // The stale receiver was cancelled by the fresh subscription.
        assert!(stale.await.is_err());
        assert_eq!(fresh.try_recv().unwrap(), "123456");
    }

    #[tokio::test]
    async fn test_pin_without_subscriber_is_dropped() {
        let bridge = UsbSerialBridge::new();
        bridge.deliver_pin("123456");

        // A later subscriber must not receive the stale PIN.
        let mut rx = bridge.take_pin_receiver();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_desktop_permissions_always_granted() {
        let bridge = UsbSerialBridge::new();
        assert!(bridge.has_permission("/dev/ttyACM0").await);
        assert!(bridge.request_permission("/dev/ttyACM0").await.unwrap());
    }
}
