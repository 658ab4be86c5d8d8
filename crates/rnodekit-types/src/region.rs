//! Regulatory region table and frequency slot calculator.
//!
//! A [`FrequencyRegion`] describes one regulatory profile: the legal band,
//! the maximum transmit power, and the duty-cycle limit. The slot calculator
//! partitions the band into non-overlapping channels sized to a modem
//! bandwidth, so frontends can present a discrete channel picker instead of
//! a raw frequency field.

use std::sync::LazyLock;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{RegionError, RegionResult};

/// Duty-cycle value meaning "no regulatory airtime restriction".
pub const DUTY_CYCLE_UNRESTRICTED: u8 = 100;

/// A regulatory frequency region.
///
/// Invariants (enforced by [`FrequencyRegion::new`]): `start_hz <= end_hz`
/// and `duty_cycle_pct <= 100`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrequencyRegion {
    /// Stable identifier (e.g. "EU_868_M").
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Lower band edge in Hz.
    pub start_hz: u64,
    /// Upper band edge in Hz.
    pub end_hz: u64,
    /// Maximum legal TX power in dBm.
    pub max_tx_power_dbm: i16,
    /// Duty-cycle limit as a percentage; 100 means unrestricted.
    pub duty_cycle_pct: u8,
}

impl FrequencyRegion {
    /// Create a region, validating its invariants.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        start_hz: u64,
        end_hz: u64,
        max_tx_power_dbm: i16,
        duty_cycle_pct: u8,
    ) -> RegionResult<Self> {
        if start_hz > end_hz {
            return Err(RegionError::InvalidBounds { start_hz, end_hz });
        }
        if duty_cycle_pct > 100 {
            return Err(RegionError::InvalidDutyCycle(duty_cycle_pct));
        }
        Ok(Self {
            id: id.into(),
            name: name.into(),
            start_hz,
            end_hz,
            max_tx_power_dbm,
            duty_cycle_pct,
        })
    }

    /// Width of the band in Hz.
    #[must_use]
    pub fn span_hz(&self) -> u64 {
        self.end_hz - self.start_hz
    }

    /// Whether this region enforces a duty-cycle limit.
    #[must_use]
    pub fn is_duty_restricted(&self) -> bool {
        self.duty_cycle_pct < DUTY_CYCLE_UNRESTRICTED
    }

    /// Check that a frequency lies within the band (inclusive).
    #[must_use]
    pub fn contains(&self, frequency_hz: u64) -> bool {
        frequency_hz >= self.start_hz && frequency_hz <= self.end_hz
    }

    /// Number of channel slots available at the given bandwidth.
    ///
    /// Slots partition `[start_hz, end_hz]` into channels of `bandwidth_hz`
    /// width. A bandwidth wider than the band still yields a single slot at
    /// the band edge, so every supported bandwidth produces at least one
    /// usable channel.
    #[must_use]
    pub fn slot_count(&self, bandwidth_hz: u32) -> u32 {
        if bandwidth_hz == 0 {
            return 0;
        }
        let full = self.span_hz() / u64::from(bandwidth_hz);
        full.clamp(1, u64::from(u32::MAX)) as u32
    }

    /// Frequency of a slot. Slot 0 is the lowest channel, anchored at the
    /// band's lower edge.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::InvalidSlot`] if `slot` is outside
    /// `[0, slot_count)` and [`RegionError::ZeroBandwidth`] for a zero
    /// bandwidth.
    pub fn frequency_for_slot(&self, bandwidth_hz: u32, slot: u32) -> RegionResult<u64> {
        if bandwidth_hz == 0 {
            return Err(RegionError::ZeroBandwidth);
        }
        let count = self.slot_count(bandwidth_hz);
        if slot >= count {
            return Err(RegionError::InvalidSlot { slot, count });
        }
        Ok(self.start_hz + u64::from(slot) * u64::from(bandwidth_hz))
    }

    /// Default slot for a bandwidth: the median channel, keeping the default
    /// configuration away from the band edges where neighbouring services
    /// often sit.
    #[must_use]
    pub fn default_slot(&self, bandwidth_hz: u32) -> u32 {
        self.slot_count(bandwidth_hz) / 2
    }

    /// Inverse lookup: the slot whose frequency is nearest to the given
    /// frequency, clamped to the enumerable set.
    #[must_use]
    pub fn nearest_slot(&self, bandwidth_hz: u32, frequency_hz: u64) -> u32 {
        let count = self.slot_count(bandwidth_hz);
        if count == 0 || frequency_hz <= self.start_hz {
            return 0;
        }
        let bw = u64::from(bandwidth_hz);
        let offset = frequency_hz - self.start_hz;
        // Round to the nearest channel boundary.
        let slot = (offset + bw / 2) / bw;
        slot.min(u64::from(count) - 1) as u32
    }
}

/// Built-in regulatory regions.
///
/// Power limits and duty cycles follow the ISM/SRD allocations commonly used
/// for RNode deployments. NZ 864 carries the highest legal power in the
/// table (36 dBm).
static BUILTIN_REGIONS: LazyLock<Vec<FrequencyRegion>> = LazyLock::new(|| {
    let defs: [(&str, &str, u64, u64, i16, u8); 6] = [
        ("EU_868_M", "EU 868 MHz M-band", 868_000_000, 868_600_000, 14, 1),
        ("EU_868_P", "EU 868 MHz P-band", 869_400_000, 869_650_000, 27, 10),
        ("EU_433", "EU 433 MHz", 433_050_000, 434_790_000, 10, 10),
        ("US_902_928", "US 902-928 MHz", 902_000_000, 928_000_000, 30, DUTY_CYCLE_UNRESTRICTED),
        ("AU_915_928", "AU 915-928 MHz", 915_000_000, 928_000_000, 30, DUTY_CYCLE_UNRESTRICTED),
        ("NZ_864", "NZ 864-868 MHz", 864_000_000, 868_000_000, 36, DUTY_CYCLE_UNRESTRICTED),
    ];
    defs.into_iter()
        .map(|(id, name, start, end, power, duty)| {
            // Table entries are static and known-valid.
            FrequencyRegion::new(id, name, start, end, power, duty)
                .unwrap_or_else(|e| panic!("invalid builtin region {id}: {e}"))
        })
        .collect()
});

/// All built-in regulatory regions, in display order.
#[must_use]
pub fn builtin_regions() -> &'static [FrequencyRegion] {
    &BUILTIN_REGIONS
}

/// Look up a built-in region by its stable id.
#[must_use]
pub fn region_by_id(id: &str) -> Option<&'static FrequencyRegion> {
    BUILTIN_REGIONS.iter().find(|r| r.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eu_868_m() -> &'static FrequencyRegion {
        region_by_id("EU_868_M").unwrap()
    }

    #[test]
    fn test_builtin_regions_present() {
        assert!(builtin_regions().len() >= 6);
        assert!(region_by_id("US_902_928").is_some());
        assert!(region_by_id("NOWHERE").is_none());
    }

    #[test]
    fn test_region_invariants_enforced() {
        let err = FrequencyRegion::new("X", "x", 900, 800, 14, 1).unwrap_err();
        assert!(matches!(err, RegionError::InvalidBounds { .. }));

        let err = FrequencyRegion::new("X", "x", 800, 900, 14, 101).unwrap_err();
        assert_eq!(err, RegionError::InvalidDutyCycle(101));
    }

    #[test]
    fn test_slot_zero_is_band_start() {
        assert_eq!(
            eu_868_m().frequency_for_slot(125_000, 0).unwrap(),
            868_000_000
        );
    }

    #[test]
    fn test_all_slots_within_band_for_all_regions() {
        let bandwidths: [u32; 6] = [7_800, 62_500, 125_000, 250_000, 500_000, 1_625_000];
        for region in builtin_regions() {
            for bw in bandwidths {
                let count = region.slot_count(bw);
                assert!(count >= 1, "{} at {} Hz", region.id, bw);
                for slot in 0..count {
                    let freq = region.frequency_for_slot(bw, slot).unwrap();
                    assert!(
                        region.contains(freq),
                        "{} slot {slot} at {bw} Hz -> {freq} outside band",
                        region.id
                    );
                }
            }
        }
    }

    #[test]
    fn test_frequency_for_slot_injective() {
        let region = eu_868_m();
        let bw = 125_000;
        let count = region.slot_count(bw);
        let mut seen = std::collections::HashSet::new();
        for slot in 0..count {
            let freq = region.frequency_for_slot(bw, slot).unwrap();
            assert!(seen.insert(freq), "slot {slot} duplicates frequency {freq}");
        }
    }

    #[test]
    fn test_slot_out_of_range_rejected() {
        let region = eu_868_m();
        let count = region.slot_count(125_000);
        let err = region.frequency_for_slot(125_000, count).unwrap_err();
        assert!(matches!(err, RegionError::InvalidSlot { .. }));
    }

    #[test]
    fn test_oversized_bandwidth_still_yields_one_slot() {
        let region = eu_868_m();
        assert_eq!(region.slot_count(1_625_000), 1);
        let freq = region.frequency_for_slot(1_625_000, 0).unwrap();
        assert!(region.contains(freq));
    }

    #[test]
    fn test_nearest_slot_round_trip() {
        let region = eu_868_m();
        let bw = 125_000;
        for slot in 0..region.slot_count(bw) {
            let freq = region.frequency_for_slot(bw, slot).unwrap();
            assert_eq!(region.nearest_slot(bw, freq), slot);
        }
    }

    #[test]
    fn test_nearest_slot_clamps() {
        let region = eu_868_m();
        assert_eq!(region.nearest_slot(125_000, 100_000_000), 0);
        let count = region.slot_count(125_000);
        assert_eq!(region.nearest_slot(125_000, 2_000_000_000), count - 1);
    }

    #[test]
    fn test_default_slot_valid() {
        for region in builtin_regions() {
            let slot = region.default_slot(125_000);
            assert!(region.frequency_for_slot(125_000, slot).is_ok());
        }
    }

    #[test]
    fn test_duty_restriction() {
        assert!(eu_868_m().is_duty_restricted());
        assert!(!region_by_id("US_902_928").unwrap().is_duty_restricted());
    }
}
