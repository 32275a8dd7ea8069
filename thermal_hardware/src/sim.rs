//! First-order thermal plant for running the controller without hardware.
//!
//! Each zone integrates
//!
//! ```text
//! dT/dt = heat_rate * u(t - lag) - loss * (T - ambient)
//! ```
//!
//! where `u` is the commanded duty in `0..=1`. The model advances one control
//! period each time the zone is read, so a controller reading once per tick
//! sees a plant running at the same cadence.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thermal_traits::{HeaterOutput, Reading, TemperatureSensor};

use crate::error::HwError;

/// Reading reported by a disconnected thermistor.
pub const OPEN_SENSOR_C: f32 = -14.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantParams {
    pub ambient_c: f32,
    /// Heating rate at full power, °C per second.
    pub heat_rate_c_per_s: f32,
    /// Fraction of the excess over ambient lost per second.
    pub loss_per_s: f32,
    /// Ticks between a power change and its effect.
    pub lag_ticks: usize,
    pub period_ms: u64,
    pub max_power: u8,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            ambient_c: 22.0,
            heat_rate_c_per_s: 4.0,
            loss_per_s: 0.01,
            lag_ticks: 20,
            period_ms: 100,
            max_power: 255,
        }
    }
}

/// Failure modes the plant can be told to exhibit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    /// Reads keep returning the value seen when the fault was injected.
    FrozenSensor,
    /// Reads fail with `HwError::SensorTimeout`.
    FailingReads,
    /// Reads return `OPEN_SENSOR_C`.
    OpenSensor,
    /// Power writes succeed but no longer heat the zone.
    HeaterDisconnected,
}

#[derive(Debug, Clone)]
struct PlantZone {
    temp_c: f32,
    power: u8,
    delay: VecDeque<u8>,
    fault: Option<SimFault>,
    frozen_c: f32,
    /// Offset of the redundant channel; `None` when the zone has only one sensor.
    redundant_offset: Option<f32>,
}

impl PlantZone {
    fn new(ambient_c: f32) -> Self {
        Self {
            temp_c: ambient_c,
            power: 0,
            delay: VecDeque::new(),
            fault: None,
            frozen_c: ambient_c,
            redundant_offset: None,
        }
    }

    fn advance(&mut self, p: &PlantParams) {
        self.delay.push_back(self.power);
        let applied = if self.delay.len() > p.lag_ticks {
            self.delay.pop_front().unwrap_or(0)
        } else {
            0
        };
        let duty = if self.fault == Some(SimFault::HeaterDisconnected) {
            0.0
        } else {
            f32::from(applied) / f32::from(p.max_power.max(1))
        };
        let dt = p.period_ms as f32 / 1000.0;
        let d_temp = p.heat_rate_c_per_s * duty - p.loss_per_s * (self.temp_c - p.ambient_c);
        self.temp_c += d_temp * dt;
    }

    fn observe(&self) -> Result<Reading, HwError> {
        let celsius = match self.fault {
            Some(SimFault::FailingReads) => return Err(HwError::SensorTimeout),
            Some(SimFault::OpenSensor) => OPEN_SENSOR_C,
            Some(SimFault::FrozenSensor) => self.frozen_c,
            Some(SimFault::HeaterDisconnected) | None => self.temp_c,
        };
        Ok(match self.redundant_offset {
            Some(off) => Reading::with_redundant(celsius, celsius + off),
            None => Reading::new(celsius),
        })
    }
}

#[derive(Debug)]
struct PlantState {
    params: PlantParams,
    zones: Vec<PlantZone>,
}

/// Shared simulated plant; hand out `sensor()` and `heater()` to a controller
/// and keep a clone to inspect or disturb it.
#[derive(Debug, Clone)]
pub struct SimulatedPlant {
    inner: Arc<Mutex<PlantState>>,
}

impl SimulatedPlant {
    pub fn new(zones: usize, params: PlantParams) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlantState {
                params,
                zones: vec![PlantZone::new(params.ambient_c); zones],
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, PlantState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_zone<T>(&self, zone: usize, f: impl FnOnce(&mut PlantZone) -> T) -> Option<T> {
        self.state().zones.get_mut(zone).map(f)
    }

    pub fn sensor(&self) -> SimSensor {
        SimSensor {
            plant: self.clone(),
        }
    }

    pub fn heater(&self) -> SimHeater {
        SimHeater {
            plant: self.clone(),
        }
    }

    pub fn params(&self) -> PlantParams {
        self.state().params
    }

    /// True temperature, regardless of injected sensor faults.
    pub fn temperature(&self, zone: usize) -> Option<f32> {
        self.with_zone(zone, |z| z.temp_c)
    }

    pub fn set_temperature(&self, zone: usize, celsius: f32) {
        self.with_zone(zone, |z| z.temp_c = celsius);
    }

    /// Last power written to the zone.
    pub fn power(&self, zone: usize) -> Option<u8> {
        self.with_zone(zone, |z| z.power)
    }

    /// Give the zone a second sensor reading `offset_c` above the primary.
    pub fn set_redundant_offset(&self, zone: usize, offset_c: Option<f32>) {
        self.with_zone(zone, |z| z.redundant_offset = offset_c);
    }

    pub fn inject(&self, zone: usize, fault: SimFault) {
        self.with_zone(zone, |z| {
            tracing::debug!(zone, ?fault, "sim fault injected");
            z.frozen_c = z.temp_c;
            z.fault = Some(fault);
        });
    }

    pub fn clear_fault(&self, zone: usize) {
        self.with_zone(zone, |z| z.fault = None);
    }

    /// Advance every zone by `ticks` periods without reading.
    pub fn settle(&self, ticks: usize) {
        let mut st = self.state();
        let params = st.params;
        for z in &mut st.zones {
            for _ in 0..ticks {
                z.advance(&params);
            }
        }
    }
}

/// Sensor side of a `SimulatedPlant`.
#[derive(Debug, Clone)]
pub struct SimSensor {
    plant: SimulatedPlant,
}

impl TemperatureSensor for SimSensor {
    fn read(&mut self, zone: usize) -> Result<Reading, Box<dyn std::error::Error + Send + Sync>> {
        let mut st = self.plant.state();
        let params = st.params;
        let z = st.zones.get_mut(zone).ok_or(HwError::UnknownZone(zone))?;
        z.advance(&params);
        Ok(z.observe()?)
    }
}

/// Heater side of a `SimulatedPlant`.
#[derive(Debug, Clone)]
pub struct SimHeater {
    plant: SimulatedPlant,
}

impl HeaterOutput for SimHeater {
    fn set_power(
        &mut self,
        zone: usize,
        power: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut st = self.plant.state();
        let max = st.params.max_power;
        let z = st.zones.get_mut(zone).ok_or(HwError::UnknownZone(zone))?;
        z.power = power.min(max);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_power_heats_after_lag() {
        let plant = SimulatedPlant::new(1, PlantParams::default());
        let mut s = plant.sensor();
        let mut h = plant.heater();
        h.set_power(0, 255).unwrap();
        for _ in 0..20 {
            s.read(0).unwrap();
        }
        assert!((plant.temperature(0).unwrap() - 22.0).abs() < 1e-3);
        for _ in 0..100 {
            s.read(0).unwrap();
        }
        let t = plant.temperature(0).unwrap();
        assert!(t > 55.0 && t < 62.5, "got {t}");
    }

    #[test]
    fn cools_toward_ambient() {
        let plant = SimulatedPlant::new(1, PlantParams::default());
        plant.set_temperature(0, 200.0);
        plant.settle(100);
        let t = plant.temperature(0).unwrap();
        assert!(t < 200.0 && t > 22.0);
    }

    #[test]
    fn unknown_zone_is_an_error() {
        let plant = SimulatedPlant::new(1, PlantParams::default());
        assert!(plant.sensor().read(3).is_err());
        assert!(plant.heater().set_power(3, 10).is_err());
    }
}
