//! Error types for rnodekit-core.
//!
//! This module defines all error types that can occur while discovering,
//! pairing, and configuring RNode radios.
//!
//! # Recovery Guide
//!
//! | Error | Recoverable | Action |
//! |-------|-------------|--------|
//! | [`Error::DeviceNotFound`] | Yes | Rescan; the device may advertise again |
//! | [`Error::Timeout`] | Yes | Retry; distinguishable from not-found (a device was seen) |
//! | [`Error::PinRejected`] | Yes | Retry with a corrected PIN |
//! | [`Error::PermissionDenied`] | No | Surface to the user; do not auto-retry |
//! | [`Error::Io`] / [`Error::Serial`] | No | Tear down the connection; user reconnects the cable |
//! | [`Error::Cancelled`] | — | Terminal state, not an error for logging purposes |

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while commissioning RNode radios.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from the platform stack.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Serial port error from the USB bridge.
    #[error("Serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The platform rejected a scanner, bond, or adapter call.
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// The operation that was rejected.
        operation: String,
    },

    /// No Bluetooth adapter is available.
    #[error("No Bluetooth adapter available")]
    NoAdapter,

    /// No matching device was found within the bounded window.
    #[error("Device not found: {identifier}")]
    DeviceNotFound {
        /// The device name or address that was searched for.
        identifier: String,
    },

    /// A bounded wait elapsed. Distinct from [`Error::DeviceNotFound`]:
    /// a device was seen but the handshake stalled.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The bond state fell back to "none" from "bonding".
    #[error("Pairing PIN rejected by device")]
    PinRejected,

    /// Operation was cancelled by the user.
    #[error("Operation cancelled")]
    Cancelled,

    /// Not connected to a serial device.
    #[error("Not connected to serial device")]
    NotConnected,

    /// The serial connection is exclusively owned by another operation.
    #[error("Serial connection already in use")]
    SerialBusy,

    /// A serial write wrote fewer bytes than the frame length.
    #[error("Short write: wrote {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes the frame contains.
        expected: usize,
        /// Bytes actually written.
        written: usize,
    },

    /// The platform backend does not support this operation.
    #[error("Not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: String,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a permission-denied error with operation context.
    pub fn permission_denied(operation: impl Into<String>) -> Self {
        Self::PermissionDenied {
            operation: operation.into(),
        }
    }

    /// Create a device-not-found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            identifier: identifier.into(),
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a not-supported error with operation context.
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported {
            operation: operation.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using rnodekit-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("RNode 5A3F");
        assert!(err.to_string().contains("RNode 5A3F"));

        let err = Error::timeout("await_pin", Duration::from_secs(3));
        assert!(err.to_string().contains("await_pin"));
        assert!(err.to_string().contains("3s"));

        let err = Error::ShortWrite {
            expected: 4,
            written: 2,
        };
        assert!(err.to_string().contains("2 of 4"));

        let err = Error::permission_denied("ble scan");
        assert!(err.to_string().contains("ble scan"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }
}
