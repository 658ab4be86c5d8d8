//! Commissioning engine for RNode LoRa radios.
//!
//! This crate discovers RNode boards over BLE, Classic Bluetooth, and USB
//! serial, classifies their transport type, drives the Bluetooth pairing
//! handshake (USB-assisted or direct), and validates LoRa radio parameters
//! against hardware limits and the regulatory region table from
//! [`rnodekit_types`].
//!
//! # Architecture
//!
//! - **Capability traits**: the engine never talks to a platform event bus
//!   directly. [`BluetoothApi`] and [`SerialBridge`] expose cancellable
//!   event streams; [`platform::BtleplugBackend`] and
//!   [`serial::UsbSerialBridge`] are the desktop implementations, and
//!   [`mock`] provides scripted doubles for tests and embedders.
//! - **Discovery**: [`DiscoveryEngine`] runs a scan pass of three
//!   independently fault-tolerant steps and merges results by address.
//! - **Pairing**: [`PairingOrchestrator`] drives one session at a time
//!   through an observable phase machine with injectable timeouts.
//! - **Configuration**: [`validation`] checks a candidate [`rnodekit_types::RadioConfig`]
//!   in interactive or submit mode; [`CommissioningWizard`] sequences the
//!   whole flow from device selection to a submit-valid config.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rnodekit_core::cache::MemoryCache;
//! use rnodekit_core::platform::BtleplugBackend;
//! use rnodekit_core::serial::UsbSerialBridge;
//! use rnodekit_core::DiscoveryEngine;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bluetooth = Arc::new(BtleplugBackend::new().await?);
//!     let serial = Arc::new(UsbSerialBridge::new());
//!     let engine = DiscoveryEngine::new(bluetooth, serial, Arc::new(MemoryCache::new()));
//!
//!     let report = engine.scan().await;
//!     for device in &report.devices {
//!         println!("{} ({})", device.address, device.transport);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod classify;
pub mod error;
pub mod kiss;
pub mod mock;
pub mod pairing;
pub mod platform;
pub mod scan;
pub mod serial;
pub mod throttle;
pub mod transport;
pub mod validation;
pub mod wizard;

pub use cache::{DeviceTypeCache, FileCache, MemoryCache};
pub use classify::{Classification, classify};
pub use error::{Error, Result};
pub use pairing::{
    FoundTarget, PairingFailure, PairingOrchestrator, PairingOutcome, PairingPhase,
    PairingTimeouts,
};
pub use scan::{DiscoveredDevice, DiscoveryEngine, ScanOptions, ScanReport};
pub use serial::{RNODE_BAUD_RATE, SerialBridge, UsbSerialBridge};
pub use throttle::RssiThrottle;
pub use transport::{BluetoothApi, BondedDevice, ScanFilter, ScanHit};
pub use validation::{ValidationMode, ValidationOutcome, validate};
pub use wizard::{CommissioningWizard, WizardStep};
