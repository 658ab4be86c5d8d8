//! Candidate radio configuration validation.
//!
//! Two modes share one rule set. [`ValidationMode::Interactive`] treats a
//! blank numeric field as valid so a half-typed form never flashes errors;
//! [`ValidationMode::Submit`] requires every field a stored configuration
//! needs. Airtime locks are optional in both modes: absence means
//! unrestricted, presence out of range is an error.
//!
//! Validity is the conjunction of all field results. A duty-restricted
//! region with no airtime lock set additionally produces a regulatory
//! warning, which never affects validity.

use rnodekit_types::config::{
    BANDWIDTH_MAX_HZ, BANDWIDTH_MIN_HZ, CODING_RATE_MAX, CODING_RATE_MIN, FREQUENCY_MAX_HZ,
    FREQUENCY_MIN_HZ, SPREADING_FACTOR_MAX, SPREADING_FACTOR_MIN, TX_POWER_CEILING_DBM,
};
use rnodekit_types::{FrequencyRegion, RadioConfig};

/// How strictly to treat blank fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Blank numeric fields are valid; the user is still typing.
    Interactive,
    /// Every required field must be present and in range.
    Submit,
}

/// A validatable field of [`RadioConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    /// Interface name.
    Name,
    /// Channel frequency.
    Frequency,
    /// Modem bandwidth.
    Bandwidth,
    /// LoRa spreading factor.
    SpreadingFactor,
    /// LoRa coding rate.
    CodingRate,
    /// Transmit power.
    TxPower,
    /// Short-term airtime lock.
    StAirtime,
    /// Long-term airtime lock.
    LtAirtime,
}

/// A field-specific validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// The field the error belongs to.
    pub field: ConfigField,
    /// User-facing message.
    pub message: String,
}

/// A regulatory advisory that does not affect validity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegulatoryWarning {
    /// The region enforces a duty cycle but no airtime lock is configured.
    AirtimeLimitUnset {
        /// Display name of the duty-restricted region.
        region: String,
    },
}

/// Result of validating one configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    /// Field-specific errors; empty when valid.
    pub errors: Vec<FieldError>,
    /// Regulatory advisories, independent of validity.
    pub warnings: Vec<RegulatoryWarning>,
}

impl ValidationOutcome {
    /// Whether the configuration passed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The error for a specific field, if any.
    #[must_use]
    pub fn error_for(&self, field: ConfigField) -> Option<&FieldError> {
        self.errors.iter().find(|e| e.field == field)
    }

    fn reject(&mut self, field: ConfigField, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }
}

/// Validate a candidate configuration against hardware limits and, when a
/// region is selected, its regulatory limits.
#[must_use]
pub fn validate(
    config: &RadioConfig,
    region: Option<&FrequencyRegion>,
    mode: ValidationMode,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();
    let submit = mode == ValidationMode::Submit;

    if submit && config.name.trim().is_empty() {
        outcome.reject(ConfigField::Name, "name must not be empty");
    }

    let (freq_min, freq_max) = match region {
        Some(region) => (region.start_hz, region.end_hz),
        None => (FREQUENCY_MIN_HZ, FREQUENCY_MAX_HZ),
    };
    match config.frequency_hz {
        Some(freq) if freq < freq_min || freq > freq_max => {
            outcome.reject(
                ConfigField::Frequency,
                format!("frequency must be between {freq_min} and {freq_max} Hz"),
            );
        }
        None if submit => outcome.reject(ConfigField::Frequency, "frequency is required"),
        _ => {}
    }

    match config.bandwidth_hz {
        Some(bw) if !(BANDWIDTH_MIN_HZ..=BANDWIDTH_MAX_HZ).contains(&bw) => {
            outcome.reject(
                ConfigField::Bandwidth,
                format!("bandwidth must be between {BANDWIDTH_MIN_HZ} and {BANDWIDTH_MAX_HZ} Hz"),
            );
        }
        None if submit => outcome.reject(ConfigField::Bandwidth, "bandwidth is required"),
        _ => {}
    }

    match config.spreading_factor {
        Some(sf) if !(SPREADING_FACTOR_MIN..=SPREADING_FACTOR_MAX).contains(&sf) => {
            outcome.reject(
                ConfigField::SpreadingFactor,
                format!(
                    "spreading factor must be between {SPREADING_FACTOR_MIN} and {SPREADING_FACTOR_MAX}"
                ),
            );
        }
        None if submit => {
            outcome.reject(ConfigField::SpreadingFactor, "spreading factor is required");
        }
        _ => {}
    }

    match config.coding_rate {
        Some(cr) if !(CODING_RATE_MIN..=CODING_RATE_MAX).contains(&cr) => {
            outcome.reject(
                ConfigField::CodingRate,
                format!("coding rate must be between {CODING_RATE_MIN} and {CODING_RATE_MAX}"),
            );
        }
        None if submit => outcome.reject(ConfigField::CodingRate, "coding rate is required"),
        _ => {}
    }

    // The regulatory limit and the PA's hardware ceiling both hold; the
    // bound is inclusive.
    let tx_max = region
        .map(|r| r.max_tx_power_dbm.min(TX_POWER_CEILING_DBM))
        .unwrap_or(TX_POWER_CEILING_DBM);
    match config.tx_power_dbm {
        Some(tx) if tx < 0 || tx > tx_max => {
            outcome.reject(
                ConfigField::TxPower,
                format!("TX power must be between 0 and {tx_max} dBm"),
            );
        }
        None if submit => outcome.reject(ConfigField::TxPower, "TX power is required"),
        _ => {}
    }

    // Airtime locks are optional in both modes. Absence means unrestricted.
    let airtime_max = match region {
        Some(region) if region.is_duty_restricted() => f32::from(region.duty_cycle_pct),
        _ => 100.0,
    };
    for (field, value) in [
        (ConfigField::StAirtime, config.st_airtime_pct),
        (ConfigField::LtAirtime, config.lt_airtime_pct),
    ] {
        if let Some(pct) = value {
            if !(0.0..=airtime_max).contains(&pct) {
                outcome.reject(
                    field,
                    format!("airtime lock must be between 0 and {airtime_max} percent"),
                );
            }
        }
    }

    if let Some(region) = region {
        if region.is_duty_restricted()
            && config.st_airtime_pct.is_none()
            && config.lt_airtime_pct.is_none()
        {
            outcome.warnings.push(RegulatoryWarning::AirtimeLimitUnset {
                region: region.name.clone(),
            });
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use rnodekit_types::config::ModemPreset;
    use rnodekit_types::region::{builtin_regions, region_by_id};

    fn eu_868_m() -> &'static FrequencyRegion {
        region_by_id("EU_868_M").unwrap()
    }

    fn complete_config(region: &FrequencyRegion) -> RadioConfig {
        RadioConfig::for_region("lora0", region, ModemPreset::Balanced)
    }

    #[test]
    fn test_region_defaults_are_submit_valid() {
        for region in builtin_regions() {
            let config = RadioConfig {
                frequency_hz: Some((region.start_hz + region.end_hz) / 2),
                bandwidth_hz: Some(125_000),
                spreading_factor: Some(8),
                coding_rate: Some(5),
                tx_power_dbm: Some(region.max_tx_power_dbm.min(TX_POWER_CEILING_DBM)),
                st_airtime_pct: Some(0.0),
                lt_airtime_pct: Some(0.0),
                ..RadioConfig::named("lora0")
            };
            let outcome = validate(&config, Some(region), ValidationMode::Submit);
            assert!(outcome.is_valid(), "{}: {:?}", region.id, outcome.errors);
        }
    }

    #[test]
    fn test_tx_power_bound_is_inclusive() {
        let region = eu_868_m();
        let mut config = complete_config(region);

        config.tx_power_dbm = Some(region.max_tx_power_dbm);
        assert!(validate(&config, Some(region), ValidationMode::Submit).is_valid());

        config.tx_power_dbm = Some(region.max_tx_power_dbm + 1);
        let outcome = validate(&config, Some(region), ValidationMode::Submit);
        assert!(!outcome.is_valid());
        assert!(outcome.error_for(ConfigField::TxPower).is_some());
        assert!(outcome.error_for(ConfigField::Frequency).is_none());
    }

    #[test]
    fn test_eu_868_m_rejects_20_dbm_with_field_specific_error() {
        let region = eu_868_m();
        let mut config = complete_config(region);
        config.tx_power_dbm = Some(20);

        let outcome = validate(&config, Some(region), ValidationMode::Submit);
        assert!(!outcome.is_valid());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].field, ConfigField::TxPower);
    }

    #[test]
    fn test_unset_airtime_under_duty_restricted_region_warns_but_validates() {
        let region = eu_868_m();
        let config = complete_config(region);
        assert!(config.st_airtime_pct.is_none());

        let outcome = validate(&config, Some(region), ValidationMode::Submit);
        assert!(outcome.is_valid());
        assert_eq!(
            outcome.warnings,
            vec![RegulatoryWarning::AirtimeLimitUnset {
                region: region.name.clone()
            }]
        );
    }

    #[test]
    fn test_unrestricted_region_never_warns() {
        let region = region_by_id("US_902_928").unwrap();
        let config = complete_config(region);
        let outcome = validate(&config, Some(region), ValidationMode::Submit);
        assert!(outcome.is_valid());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_airtime_above_duty_cycle_rejected() {
        let region = eu_868_m();
        let mut config = complete_config(region);
        // EU 868 M-band allows 1 %.
        config.st_airtime_pct = Some(5.0);

        let outcome = validate(&config, Some(region), ValidationMode::Submit);
        assert!(!outcome.is_valid());
        assert!(outcome.error_for(ConfigField::StAirtime).is_some());
        // Setting a lock also clears the warning.
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_blank_fields_valid_interactively_but_not_at_submit() {
        let config = RadioConfig::named("lora0");

        let interactive = validate(&config, Some(eu_868_m()), ValidationMode::Interactive);
        assert!(interactive.is_valid());

        let submit = validate(&config, Some(eu_868_m()), ValidationMode::Submit);
        assert!(!submit.is_valid());
        for field in [
            ConfigField::Frequency,
            ConfigField::Bandwidth,
            ConfigField::SpreadingFactor,
            ConfigField::CodingRate,
            ConfigField::TxPower,
        ] {
            assert!(submit.error_for(field).is_some(), "{field:?} should be required");
        }
        // Airtime locks are optional even at submit.
        assert!(submit.error_for(ConfigField::StAirtime).is_none());
        assert!(submit.error_for(ConfigField::LtAirtime).is_none());
    }

    #[test]
    fn test_blank_name_rejected_at_submit_only() {
        let region = eu_868_m();
        let mut config = complete_config(region);
        config.name = "  ".to_string();

        assert!(validate(&config, Some(region), ValidationMode::Interactive).is_valid());
        let submit = validate(&config, Some(region), ValidationMode::Submit);
        assert!(submit.error_for(ConfigField::Name).is_some());
    }

    #[test]
    fn test_frequency_outside_region_rejected() {
        let region = eu_868_m();
        let mut config = complete_config(region);
        config.frequency_hz = Some(region.end_hz + 1);

        let outcome = validate(&config, Some(region), ValidationMode::Interactive);
        assert!(outcome.error_for(ConfigField::Frequency).is_some());

        // Region bounds are inclusive at both edges.
        config.frequency_hz = Some(region.end_hz);
        assert!(validate(&config, Some(region), ValidationMode::Interactive).is_valid());
        config.frequency_hz = Some(region.start_hz);
        assert!(validate(&config, Some(region), ValidationMode::Interactive).is_valid());
    }

    #[test]
    fn test_wide_default_range_without_region() {
        let mut config = complete_config(eu_868_m());
        config.frequency_hz = Some(915_000_000);
        config.tx_power_dbm = Some(TX_POWER_CEILING_DBM);
        assert!(validate(&config, None, ValidationMode::Submit).is_valid());

        config.frequency_hz = Some(FREQUENCY_MAX_HZ + 1);
        let outcome = validate(&config, None, ValidationMode::Submit);
        assert!(outcome.error_for(ConfigField::Frequency).is_some());
    }

    #[test]
    fn test_hardware_bounds() {
        let region = eu_868_m();
        let mut config = complete_config(region);
        config.bandwidth_hz = Some(7_000);
        config.spreading_factor = Some(13);
        config.coding_rate = Some(4);
        config.tx_power_dbm = Some(-1);

        let outcome = validate(&config, Some(region), ValidationMode::Submit);
        assert!(outcome.error_for(ConfigField::Bandwidth).is_some());
        assert!(outcome.error_for(ConfigField::SpreadingFactor).is_some());
        assert!(outcome.error_for(ConfigField::CodingRate).is_some());
        assert!(outcome.error_for(ConfigField::TxPower).is_some());
    }
}
