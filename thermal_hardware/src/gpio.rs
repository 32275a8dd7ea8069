//! Heater outputs on Raspberry Pi GPIO pins driven by software PWM.
use rppal::gpio::{Gpio, OutputPin};
use thermal_traits::HeaterOutput;
use tracing::trace;

use crate::error::{HwError, Result};

pub struct GpioHeater {
    pins: Vec<OutputPin>,
    frequency_hz: f64,
    max_power: u8,
}

impl GpioHeater {
    /// One output pin per zone, in zone order. Pins start low.
    pub fn new(bcm_pins: &[u8], frequency_hz: f64, max_power: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut pins = Vec::with_capacity(bcm_pins.len());
        for &n in bcm_pins {
            let mut pin = gpio
                .get(n)
                .map_err(|e| HwError::Gpio(format!("pin {n}: {e}")))?
                .into_output();
            pin.set_low();
            pins.push(pin);
        }
        Ok(Self {
            pins,
            frequency_hz,
            max_power: max_power.max(1),
        })
    }

    fn drive(&mut self, zone: usize, power: u8) -> Result<()> {
        let pin = self.pins.get_mut(zone).ok_or(HwError::UnknownZone(zone))?;
        if power == 0 {
            pin.clear_pwm().map_err(|e| HwError::Gpio(e.to_string()))?;
            pin.set_low();
            return Ok(());
        }
        let duty = f64::from(power.min(self.max_power)) / f64::from(self.max_power);
        trace!(zone, power, duty, "heater pwm");
        pin.set_pwm_frequency(self.frequency_hz, duty)
            .map_err(|e| HwError::Gpio(e.to_string()))
    }
}

impl HeaterOutput for GpioHeater {
    fn set_power(
        &mut self,
        zone: usize,
        power: u8,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.drive(zone, power)?)
    }
}

impl Drop for GpioHeater {
    fn drop(&mut self) {
        for pin in &mut self.pins {
            let _ = pin.clear_pwm();
            pin.set_low();
        }
    }
}
