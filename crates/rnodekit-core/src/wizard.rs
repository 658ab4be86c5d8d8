//! Commissioning wizard step state machine.
//!
//! Gates forward navigation across Discovery, Region Selection, the optional
//! Modem Preset and Frequency Slot steps, and Review. Each forward step
//! requires the values the next step depends on; backward navigation always
//! succeeds and preserves everything captured so far. Region defaults
//! (default channel slot, clamped TX power, preset modem parameters) are
//! applied when the region is selected.

use rnodekit_types::config::ModemPreset;
use rnodekit_types::{FrequencyRegion, RadioConfig, TransportBinding, TransportType};

use crate::error::{Error, Result};
use crate::scan::DiscoveredDevice;
use crate::validation::{ValidationMode, ValidationOutcome, validate};

/// One step of the commissioning flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    /// Pick a device from the scan results.
    Discovery,
    /// Pick the regulatory region.
    Region,
    /// Pick a named modem preset (optional path).
    ModemPreset,
    /// Pick a channel slot within the region (optional path).
    FrequencySlot,
    /// Final acceptance of the assembled configuration.
    Review,
}

/// Drives one commissioning flow from device selection to a submit-valid
/// [`RadioConfig`].
#[derive(Debug, Clone)]
pub struct CommissioningWizard {
    step: WizardStep,
    use_presets: bool,
    device: Option<DiscoveredDevice>,
    region: Option<FrequencyRegion>,
    preset: ModemPreset,
    config: RadioConfig,
}

impl CommissioningWizard {
    /// Start a flow at the Discovery step. With `use_presets` the flow
    /// routes through the Modem Preset and Frequency Slot steps; without,
    /// Region leads straight to Review and the config is edited directly.
    #[must_use]
    pub fn new(config_name: impl Into<String>, use_presets: bool) -> Self {
        Self {
            step: WizardStep::Discovery,
            use_presets,
            device: None,
            region: None,
            preset: ModemPreset::default(),
            config: RadioConfig::named(config_name),
        }
    }

    /// Current step.
    #[must_use]
    pub fn step(&self) -> WizardStep {
        self.step
    }

    /// The selected device, if any.
    #[must_use]
    pub fn device(&self) -> Option<&DiscoveredDevice> {
        self.device.as_ref()
    }

    /// The selected region, if any.
    #[must_use]
    pub fn region(&self) -> Option<&FrequencyRegion> {
        self.region.as_ref()
    }

    /// The configuration assembled so far.
    #[must_use]
    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    /// Mutable access for direct field edits (the non-preset path).
    pub fn config_mut(&mut self) -> &mut RadioConfig {
        &mut self.config
    }

    /// Capture the device to commission and bind the config to it.
    pub fn select_device(&mut self, device: DiscoveredDevice) {
        self.config.binding = match &device {
            DiscoveredDevice {
                name: Some(name),
                transport,
                ..
            } if *transport != TransportType::Unknown => Some(TransportBinding::Bluetooth {
                name: name.clone(),
                transport: *transport,
            }),
            _ => None,
        };
        self.device = Some(device);
    }

    /// Capture the region and apply its defaults: the current preset's
    /// modem parameters, the region's default channel slot, TX power
    /// clamped to the region. The name and device binding are preserved.
    pub fn select_region(&mut self, region: &FrequencyRegion) {
        self.apply_region_defaults(region.clone(), self.preset);
    }

    /// Capture a modem preset and recompute the region defaults with it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when no region is selected yet.
    pub fn select_preset(&mut self, preset: ModemPreset) -> Result<()> {
        let region = self
            .region
            .clone()
            .ok_or_else(|| Error::invalid_config("select a region before a modem preset"))?;
        self.apply_region_defaults(region, preset);
        self.preset = preset;
        Ok(())
    }

    /// Capture a channel slot within the selected region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when no region or bandwidth is set,
    /// or when the slot index is outside the enumerable set.
    pub fn select_slot(&mut self, slot: u32) -> Result<()> {
        let region = self
            .region
            .as_ref()
            .ok_or_else(|| Error::invalid_config("select a region before a channel slot"))?;
        let bandwidth = self
            .config
            .bandwidth_hz
            .ok_or_else(|| Error::invalid_config("set a bandwidth before a channel slot"))?;
        let frequency = region
            .frequency_for_slot(bandwidth, slot)
            .map_err(|e| Error::invalid_config(e.to_string()))?;
        self.config.frequency_hz = Some(frequency);
        Ok(())
    }

    /// Validate the assembled configuration. Interactive mode while editing,
    /// submit mode as the Review gate.
    #[must_use]
    pub fn validate(&self, mode: ValidationMode) -> ValidationOutcome {
        validate(&self.config, self.region.as_ref(), mode)
    }

    /// Advance to the next step, gated on the values the step requires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the missing value or, at the
    /// Review gate, the first failing field.
    pub fn next(&mut self) -> Result<WizardStep> {
        let next = match self.step {
            WizardStep::Discovery => {
                if self.device.is_none() {
                    return Err(Error::invalid_config("no device selected"));
                }
                WizardStep::Region
            }
            WizardStep::Region => {
                if self.region.is_none() {
                    return Err(Error::invalid_config("no region selected"));
                }
                if self.use_presets {
                    WizardStep::ModemPreset
                } else {
                    self.review_gate()?;
                    WizardStep::Review
                }
            }
            WizardStep::ModemPreset => WizardStep::FrequencySlot,
            WizardStep::FrequencySlot => {
                self.review_gate()?;
                WizardStep::Review
            }
            WizardStep::Review => return Err(Error::invalid_config("already at review")),
        };
        self.step = next;
        Ok(next)
    }

    /// Go back one step. Captured values are preserved, so moving forward
    /// again does not re-ask for them. At Discovery this is a no-op.
    pub fn back(&mut self) -> WizardStep {
        self.step = match self.step {
            WizardStep::Discovery | WizardStep::Region => WizardStep::Discovery,
            WizardStep::ModemPreset => WizardStep::Region,
            WizardStep::FrequencySlot => WizardStep::ModemPreset,
            WizardStep::Review => {
                if self.use_presets {
                    WizardStep::FrequencySlot
                } else {
                    WizardStep::Region
                }
            }
        };
        self.step
    }

    /// Final acceptance: the submit-validated configuration, only available
    /// at the Review step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] outside Review or when the config
    /// no longer passes submit validation.
    pub fn finish(&self) -> Result<RadioConfig> {
        if self.step != WizardStep::Review {
            return Err(Error::invalid_config("not at the review step"));
        }
        self.review_gate()?;
        Ok(self.config.clone())
    }

    fn apply_region_defaults(&mut self, region: FrequencyRegion, preset: ModemPreset) {
        let binding = self.config.binding.take();
        let mut config = RadioConfig::for_region(self.config.name.clone(), &region, preset);
        config.binding = binding;
        self.config = config;
        self.region = Some(region);
    }

    fn review_gate(&self) -> Result<()> {
        let outcome = self.validate(ValidationMode::Submit);
        match outcome.errors.first() {
            Some(error) => Err(Error::invalid_config(error.message.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rnodekit_types::region::region_by_id;

    fn device() -> DiscoveredDevice {
        DiscoveredDevice {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            name: Some("RNode 5A3F".to_string()),
            transport: TransportType::Ble,
            rssi: Some(-60),
            bonded: true,
        }
    }

    #[test]
    fn test_forward_path_with_presets() {
        let mut wizard = CommissioningWizard::new("lora0", true);
        assert_eq!(wizard.step(), WizardStep::Discovery);

        wizard.select_device(device());
        assert_eq!(wizard.next().unwrap(), WizardStep::Region);

        wizard.select_region(region_by_id("EU_868_M").unwrap());
        assert_eq!(wizard.next().unwrap(), WizardStep::ModemPreset);

        wizard.select_preset(ModemPreset::LongRange).unwrap();
        assert_eq!(wizard.next().unwrap(), WizardStep::FrequencySlot);

        wizard.select_slot(0).unwrap();
        assert_eq!(wizard.next().unwrap(), WizardStep::Review);

        let config = wizard.finish().unwrap();
        assert_eq!(config.frequency_hz, Some(868_000_000));
        assert_eq!(config.spreading_factor, Some(10));
        assert_eq!(config.tx_power_dbm, Some(14));
        assert!(matches!(
            config.binding,
            Some(TransportBinding::Bluetooth { .. })
        ));
    }

    #[test]
    fn test_discovery_gated_on_device_selection() {
        let mut wizard = CommissioningWizard::new("lora0", true);
        assert!(wizard.next().is_err());
        wizard.select_device(device());
        assert!(wizard.next().is_ok());
    }

    #[test]
    fn test_region_gated_on_selection() {
        let mut wizard = CommissioningWizard::new("lora0", true);
        wizard.select_device(device());
        wizard.next().unwrap();
        assert!(wizard.next().is_err());
    }

    #[test]
    fn test_non_preset_path_goes_straight_to_review() {
        let mut wizard = CommissioningWizard::new("lora0", false);
        wizard.select_device(device());
        wizard.next().unwrap();
        wizard.select_region(region_by_id("US_902_928").unwrap());
        // Region defaults make the config submit-valid already.
        assert_eq!(wizard.next().unwrap(), WizardStep::Review);
        assert!(wizard.finish().is_ok());
    }

    #[test]
    fn test_review_gate_rejects_invalid_config() {
        let mut wizard = CommissioningWizard::new("lora0", false);
        wizard.select_device(device());
        wizard.next().unwrap();
        wizard.select_region(region_by_id("EU_868_M").unwrap());
        wizard.config_mut().tx_power_dbm = Some(20);
        assert!(wizard.next().is_err());
        assert_eq!(wizard.step(), WizardStep::Region);
    }

    #[test]
    fn test_back_preserves_captured_values() {
        let mut wizard = CommissioningWizard::new("lora0", true);
        wizard.select_device(device());
        wizard.next().unwrap();
        wizard.select_region(region_by_id("EU_868_M").unwrap());
        wizard.next().unwrap();

        assert_eq!(wizard.back(), WizardStep::Region);
        assert_eq!(wizard.back(), WizardStep::Discovery);
        // Backing out did not clear anything; forward is still open.
        assert!(wizard.device().is_some());
        assert!(wizard.region().is_some());
        assert_eq!(wizard.next().unwrap(), WizardStep::Region);
        assert_eq!(wizard.next().unwrap(), WizardStep::ModemPreset);
    }

    #[test]
    fn test_back_at_discovery_is_a_noop() {
        let mut wizard = CommissioningWizard::new("lora0", true);
        assert_eq!(wizard.back(), WizardStep::Discovery);
    }

    #[test]
    fn test_select_preset_requires_region() {
        let mut wizard = CommissioningWizard::new("lora0", true);
        assert!(wizard.select_preset(ModemPreset::Fast).is_err());
    }

    #[test]
    fn test_select_slot_bounds() {
        let mut wizard = CommissioningWizard::new("lora0", true);
        wizard.select_device(device());
        wizard.next().unwrap();
        let region = region_by_id("EU_868_M").unwrap();
        wizard.select_region(region);

        let count = region.slot_count(125_000);
        assert!(wizard.select_slot(count).is_err());
        assert!(wizard.select_slot(count - 1).is_ok());
    }

    #[test]
    fn test_region_defaults_preserve_binding_and_name() {
        let mut wizard = CommissioningWizard::new("lora0", true);
        wizard.select_device(device());
        wizard.select_region(region_by_id("EU_868_M").unwrap());

        assert_eq!(wizard.config().name, "lora0");
        assert!(matches!(
            wizard.config().binding,
            Some(TransportBinding::Bluetooth { .. })
        ));
    }

    #[test]
    fn test_finish_outside_review_rejected() {
        let wizard = CommissioningWizard::new("lora0", true);
        assert!(wizard.finish().is_err());
    }
}
