//! Candidate radio configuration and modem presets.
//!
//! [`RadioConfig`] is the pre-save shape a frontend edits: numeric fields
//! are optional so a half-typed form can be validated in interactive mode
//! without flashing errors. The hard bounds here are hardware limits of the
//! SX126x/SX127x family; regulatory limits come from the selected
//! [`crate::FrequencyRegion`].

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::region::FrequencyRegion;
use crate::types::TransportBinding;

/// Minimum modem bandwidth supported by RNode hardware, in Hz.
pub const BANDWIDTH_MIN_HZ: u32 = 7_800;
/// Maximum modem bandwidth supported by RNode hardware, in Hz.
pub const BANDWIDTH_MAX_HZ: u32 = 1_625_000;
/// Minimum LoRa spreading factor.
pub const SPREADING_FACTOR_MIN: u8 = 7;
/// Maximum LoRa spreading factor.
pub const SPREADING_FACTOR_MAX: u8 = 12;
/// Minimum LoRa coding rate (4/5).
pub const CODING_RATE_MIN: u8 = 5;
/// Maximum LoRa coding rate (4/8).
pub const CODING_RATE_MAX: u8 = 8;
/// TX power ceiling applied when no region caps it, in dBm (SX126x PA limit).
pub const TX_POWER_CEILING_DBM: i16 = 22;
/// Lower edge of the tunable range when no region is selected, in Hz.
pub const FREQUENCY_MIN_HZ: u64 = 137_000_000;
/// Upper edge of the tunable range when no region is selected, in Hz.
pub const FREQUENCY_MAX_HZ: u64 = 1_020_000_000;

/// Named modem parameter combination, ordered from highest throughput to
/// longest range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ModemPreset {
    /// 500 kHz / SF7 / 4:5.
    Fastest,
    /// 250 kHz / SF7 / 4:5.
    Fast,
    /// 125 kHz / SF8 / 4:5.
    Balanced,
    /// 125 kHz / SF10 / 4:6.
    LongRange,
    /// 62.5 kHz / SF12 / 4:8.
    Furthest,
}

impl ModemPreset {
    /// All presets, fastest first.
    #[must_use]
    pub fn all() -> [ModemPreset; 5] {
        [
            ModemPreset::Fastest,
            ModemPreset::Fast,
            ModemPreset::Balanced,
            ModemPreset::LongRange,
            ModemPreset::Furthest,
        ]
    }

    /// Modem bandwidth in Hz.
    #[must_use]
    pub fn bandwidth_hz(&self) -> u32 {
        match self {
            ModemPreset::Fastest => 500_000,
            ModemPreset::Fast => 250_000,
            ModemPreset::Balanced | ModemPreset::LongRange => 125_000,
            ModemPreset::Furthest => 62_500,
        }
    }

    /// LoRa spreading factor.
    #[must_use]
    pub fn spreading_factor(&self) -> u8 {
        match self {
            ModemPreset::Fastest | ModemPreset::Fast => 7,
            ModemPreset::Balanced => 8,
            ModemPreset::LongRange => 10,
            ModemPreset::Furthest => 12,
        }
    }

    /// LoRa coding rate denominator (5 means 4:5).
    #[must_use]
    pub fn coding_rate(&self) -> u8 {
        match self {
            ModemPreset::Fastest | ModemPreset::Fast | ModemPreset::Balanced => 5,
            ModemPreset::LongRange => 6,
            ModemPreset::Furthest => 8,
        }
    }

    /// Approximate physical-layer bitrate in bits per second.
    #[must_use]
    pub fn bitrate_bps(&self) -> f64 {
        let sf = f64::from(self.spreading_factor());
        let cr = f64::from(self.coding_rate());
        let bw = f64::from(self.bandwidth_hz());
        sf * (4.0 / cr) * bw / 2f64.powi(i32::from(self.spreading_factor()))
    }
}

impl Default for ModemPreset {
    fn default() -> Self {
        ModemPreset::Balanced
    }
}

impl fmt::Display for ModemPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModemPreset::Fastest => write!(f, "Fastest"),
            ModemPreset::Fast => write!(f, "Fast"),
            ModemPreset::Balanced => write!(f, "Balanced"),
            ModemPreset::LongRange => write!(f, "Long range"),
            ModemPreset::Furthest => write!(f, "Furthest"),
        }
    }
}

/// Candidate (pre-save) radio configuration.
///
/// All numeric fields are optional: a blank field is valid while the user is
/// typing and only becomes an error at submit time. See
/// rnodekit-core's validator for the two modes.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RadioConfig {
    /// Interface name for the stored configuration.
    pub name: String,
    /// Center/channel frequency in Hz.
    pub frequency_hz: Option<u64>,
    /// Modem bandwidth in Hz.
    pub bandwidth_hz: Option<u32>,
    /// LoRa spreading factor.
    pub spreading_factor: Option<u8>,
    /// LoRa coding rate denominator.
    pub coding_rate: Option<u8>,
    /// Transmit power in dBm.
    pub tx_power_dbm: Option<i16>,
    /// Short-term airtime lock in percent, unset = unrestricted.
    pub st_airtime_pct: Option<f32>,
    /// Long-term airtime lock in percent, unset = unrestricted.
    pub lt_airtime_pct: Option<f32>,
    /// How the configuration reaches its radio.
    pub binding: Option<TransportBinding>,
}

impl RadioConfig {
    /// Create an empty draft with a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Build a draft from a region's defaults and a modem preset: the
    /// region's default channel slot, TX power clamped to the lower of the
    /// region limit and the hardware ceiling, airtime locks unset.
    #[must_use]
    pub fn for_region(name: impl Into<String>, region: &FrequencyRegion, preset: ModemPreset) -> Self {
        let bw = preset.bandwidth_hz();
        let slot = region.default_slot(bw);
        // default_slot is always within the enumerable set
        let frequency = region.frequency_for_slot(bw, slot).ok();
        Self {
            name: name.into(),
            frequency_hz: frequency,
            bandwidth_hz: Some(bw),
            spreading_factor: Some(preset.spreading_factor()),
            coding_rate: Some(preset.coding_rate()),
            tx_power_dbm: Some(region.max_tx_power_dbm.min(TX_POWER_CEILING_DBM)),
            st_airtime_pct: None,
            lt_airtime_pct: None,
            binding: None,
        }
    }
}
