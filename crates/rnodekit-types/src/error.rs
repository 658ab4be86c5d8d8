//! Error types for region and slot arithmetic in rnodekit-types.

use thiserror::Error;

/// Errors from region construction and slot lookups.
///
/// This error type is platform-agnostic and does not include transport
/// errors (those belong in rnodekit-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegionError {
    /// Region frequency bounds are inverted.
    #[error("invalid region bounds: start {start_hz} Hz > end {end_hz} Hz")]
    InvalidBounds {
        /// Lower bound of the band.
        start_hz: u64,
        /// Upper bound of the band.
        end_hz: u64,
    },

    /// Duty cycle outside [0, 100].
    #[error("invalid duty cycle: {0}% (must be 0-100)")]
    InvalidDutyCycle(u8),

    /// Slot index outside the enumerable set for this region and bandwidth.
    #[error("slot {slot} out of range (region has {count} slots at this bandwidth)")]
    InvalidSlot {
        /// The requested slot index.
        slot: u32,
        /// Number of slots available.
        count: u32,
    },

    /// Bandwidth of zero cannot partition a band.
    #[error("bandwidth must be non-zero")]
    ZeroBandwidth,
}

/// Result type alias using rnodekit-types' RegionError type.
pub type RegionResult<T> = std::result::Result<T, RegionError>;
