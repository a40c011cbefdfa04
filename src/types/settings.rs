//! Desired device state sent with every command frame

use serde::Serialize;

use crate::error::SettingsError;

/// Largest accepted percentage.
pub const MAX_PERCENT: u8 = 100;

/// Fans are driven in ten device steps of 10 %.
pub const FAN_STEP_PERCENT: u8 = 10;

/// Control state of the roaster.
///
/// Values can only be changed through the validating setters, so a
/// `RoastSettings` never holds an out-of-range percentage. Fan levels are
/// quantized to the device's 10 % steps when assigned, which makes every
/// stored value exactly representable on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct RoastSettings {
    heater: u8,
    fan: u8,
    main_fan: u8,
    drum_motor: bool,
    cooling_motor: bool,
    solenoid: bool,
}

impl RoastSettings {
    /// Canonical state used at roast start: everything off.
    pub const fn baseline() -> Self {
        Self {
            heater: 0,
            fan: 0,
            main_fan: 0,
            drum_motor: false,
            cooling_motor: false,
            solenoid: false,
        }
    }

    /// Heater level in percent.
    pub fn heater(&self) -> u8 {
        self.heater
    }

    /// Recirculation fan level in percent.
    pub fn fan(&self) -> u8 {
        self.fan
    }

    /// Exhaust fan level in percent.
    pub fn main_fan(&self) -> u8 {
        self.main_fan
    }

    pub fn drum_motor(&self) -> bool {
        self.drum_motor
    }

    pub fn cooling_motor(&self) -> bool {
        self.cooling_motor
    }

    /// Whether the drum door solenoid is open.
    pub fn solenoid(&self) -> bool {
        self.solenoid
    }

    pub fn set_heater(&mut self, percent: u16) -> Result<(), SettingsError> {
        self.heater = checked_percent("heater", percent)?;
        Ok(())
    }

    /// Set the recirculation fan, rounding to the nearest device step.
    pub fn set_fan(&mut self, percent: u16) -> Result<(), SettingsError> {
        self.fan = quantize_fan(checked_percent("fan", percent)?);
        Ok(())
    }

    /// Set the exhaust fan, rounding to the nearest device step.
    pub fn set_main_fan(&mut self, percent: u16) -> Result<(), SettingsError> {
        self.main_fan = quantize_fan(checked_percent("main_fan", percent)?);
        Ok(())
    }

    pub fn set_drum_motor(&mut self, on: bool) {
        self.drum_motor = on;
    }

    pub fn set_cooling_motor(&mut self, on: bool) {
        self.cooling_motor = on;
    }

    pub fn set_solenoid(&mut self, open: bool) {
        self.solenoid = open;
    }

    /// Settings applied when monitoring starts.
    ///
    /// Heater and fan levels chosen by the user survive; motors and the
    /// door solenoid are switched off.
    pub fn for_monitoring(self) -> Self {
        Self { drum_motor: false, cooling_motor: false, solenoid: false, ..self }
    }

    /// Settings forced on every tick while cooling.
    ///
    /// The drum keeps turning and the door stays open so the remaining beans
    /// are ejected into the cooling tray.
    pub fn with_cooling_override(self) -> Self {
        Self {
            heater: 0,
            main_fan: MAX_PERCENT,
            drum_motor: true,
            cooling_motor: true,
            solenoid: true,
            ..self
        }
    }

    /// Settings restored once cooling completes.
    pub fn with_idle_motors(self) -> Self {
        Self { heater: 0, drum_motor: false, cooling_motor: false, solenoid: false, ..self }
    }

    /// Fan level in device steps (0-10).
    pub(crate) fn fan_steps(&self) -> u8 {
        self.fan / FAN_STEP_PERCENT
    }

    pub(crate) fn main_fan_steps(&self) -> u8 {
        self.main_fan / FAN_STEP_PERCENT
    }

    /// Rebuild settings from raw frame bytes. Out-of-range bytes saturate.
    pub(crate) fn from_device(
        heater: u8,
        fan_steps: u8,
        main_fan_steps: u8,
        drum_motor: bool,
        cooling_motor: bool,
        solenoid: bool,
    ) -> Self {
        Self {
            heater: heater.min(MAX_PERCENT),
            fan: fan_steps.min(MAX_PERCENT / FAN_STEP_PERCENT) * FAN_STEP_PERCENT,
            main_fan: main_fan_steps.min(MAX_PERCENT / FAN_STEP_PERCENT) * FAN_STEP_PERCENT,
            drum_motor,
            cooling_motor,
            solenoid,
        }
    }
}

fn checked_percent(field: &'static str, percent: u16) -> Result<u8, SettingsError> {
    if percent > u16::from(MAX_PERCENT) {
        return Err(SettingsError::out_of_range(field, percent, u16::from(MAX_PERCENT)));
    }
    Ok(percent as u8)
}

fn quantize_fan(percent: u8) -> u8 {
    let steps = (percent + FAN_STEP_PERCENT / 2) / FAN_STEP_PERCENT;
    steps * FAN_STEP_PERCENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn setters_never_store_out_of_range_values(percent in 0u16..400) {
            let mut settings = RoastSettings::baseline();
            let heater = settings.set_heater(percent);
            let fan = settings.set_fan(percent);

            if percent <= 100 {
                prop_assert!(heater.is_ok() && fan.is_ok());
                prop_assert_eq!(u16::from(settings.heater()), percent);
            } else {
                prop_assert!(heater.is_err() && fan.is_err());
                prop_assert_eq!(settings, RoastSettings::baseline());
            }
            prop_assert!(settings.fan() <= MAX_PERCENT);
            prop_assert_eq!(settings.fan() % FAN_STEP_PERCENT, 0);
        }
    }

    #[test]
    fn fan_rounds_to_nearest_step() {
        let mut settings = RoastSettings::default();
        settings.set_fan(44).unwrap();
        assert_eq!(settings.fan(), 40);
        settings.set_fan(45).unwrap();
        assert_eq!(settings.fan(), 50);
        settings.set_main_fan(100).unwrap();
        assert_eq!(settings.main_fan_steps(), 10);
    }

    #[test]
    fn rejected_value_keeps_previous_setting() {
        let mut settings = RoastSettings::default();
        settings.set_heater(80).unwrap();

        let error = settings.set_heater(101).unwrap_err();
        assert_eq!(error, SettingsError::out_of_range("heater", 101, 100));
        assert_eq!(settings.heater(), 80);
    }

    #[test]
    fn monitoring_preset_keeps_levels_and_stops_motors() {
        let mut settings = RoastSettings::default();
        settings.set_heater(70).unwrap();
        settings.set_fan(30).unwrap();
        settings.set_drum_motor(true);
        settings.set_solenoid(true);

        let monitoring = settings.for_monitoring();
        assert_eq!(monitoring.heater(), 70);
        assert_eq!(monitoring.fan(), 30);
        assert!(!monitoring.drum_motor());
        assert!(!monitoring.solenoid());
    }

    #[test]
    fn cooling_override_forces_drum_and_cooling_motor() {
        let mut settings = RoastSettings::default();
        settings.set_heater(100).unwrap();
        settings.set_drum_motor(false);

        let cooling = settings.with_cooling_override();
        assert_eq!(cooling.heater(), 0);
        assert!(cooling.drum_motor());
        assert!(cooling.cooling_motor());
        assert!(cooling.solenoid());

        let idle = cooling.with_idle_motors();
        assert!(!idle.drum_motor() && !idle.cooling_motor() && !idle.solenoid());
    }
}
