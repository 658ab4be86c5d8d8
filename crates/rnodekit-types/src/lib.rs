//! Platform-agnostic types for RNode LoRa radio commissioning.
//!
//! This crate provides shared types used by the commissioning engine
//! (rnodekit-core) and any frontends built on top of it.
//!
//! # Contents
//!
//! - Transport and bond-state types for Bluetooth device handling
//! - The regulatory region table and frequency slot calculator
//! - Modem presets (bandwidth / spreading factor / coding rate combinations)
//! - The candidate radio configuration with its hardware bounds
//! - BLE UUID constants for RNode hardware
//!
//! # Example
//!
//! ```
//! use rnodekit_types::region;
//!
//! let eu = region::region_by_id("EU_868_M").unwrap();
//! let slots = eu.slot_count(125_000);
//! assert!(slots >= 1);
//! assert_eq!(eu.frequency_for_slot(125_000, 0).unwrap(), 868_000_000);
//! ```

pub mod config;
pub mod error;
pub mod region;
pub mod types;
pub mod uuid;

pub use config::{
    BANDWIDTH_MAX_HZ, BANDWIDTH_MIN_HZ, CODING_RATE_MAX, CODING_RATE_MIN, FREQUENCY_MAX_HZ,
    FREQUENCY_MIN_HZ, ModemPreset, RadioConfig, SPREADING_FACTOR_MAX, SPREADING_FACTOR_MIN,
    TX_POWER_CEILING_DBM,
};
pub use error::{RegionError, RegionResult};
pub use region::{FrequencyRegion, builtin_regions, region_by_id};
pub use types::{BondState, TransportBinding, TransportType, UsbDeviceInfo};
