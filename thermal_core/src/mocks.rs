//! Test and helper mocks for thermal_core.
//!
//! Both mocks are cheap to clone; clones share state so a test can keep a
//! handle after moving the original into the controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thermal_traits::{HeaterOutput, Reading, TemperatureSensor};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Value(Reading),
    Fail,
}

/// Sensor returning whatever the test last set per zone.
#[derive(Debug, Clone)]
pub struct ScriptedSensor {
    slots: Arc<Mutex<Vec<Slot>>>,
}

impl ScriptedSensor {
    pub fn new(zones: usize, celsius: f32) -> Self {
        Self {
            slots: Arc::new(Mutex::new(vec![Slot::Value(Reading::new(celsius)); zones])),
        }
    }

    pub fn set(&self, zone: usize, celsius: f32) {
        self.set_reading(zone, Reading::new(celsius));
    }

    pub fn set_reading(&self, zone: usize, reading: Reading) {
        if let Some(s) = lock(&self.slots).get_mut(zone) {
            *s = Slot::Value(reading);
        }
    }

    /// Make reads of `zone` fail until the next `set`.
    pub fn fail(&self, zone: usize) {
        if let Some(s) = lock(&self.slots).get_mut(zone) {
            *s = Slot::Fail;
        }
    }
}

impl TemperatureSensor for ScriptedSensor {
    fn read(&mut self, zone: usize) -> Result<Reading, BoxError> {
        match lock(&self.slots).get(zone) {
            Some(Slot::Value(r)) => Ok(*r),
            Some(Slot::Fail) => Err(Box::new(std::io::Error::other("scripted read timeout"))),
            None => Err(Box::new(std::io::Error::other(format!(
                "no sensor for zone {zone}"
            )))),
        }
    }
}

/// Heater that records every write.
#[derive(Debug, Clone, Default)]
pub struct RecordingHeater {
    writes: Arc<Mutex<Vec<(usize, u8)>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingHeater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last power written to `zone`, 0 if never written.
    pub fn power(&self, zone: usize) -> u8 {
        lock(&self.writes)
            .iter()
            .rev()
            .find(|(z, _)| *z == zone)
            .map_or(0, |(_, p)| *p)
    }

    /// Every power written to `zone`, oldest first.
    pub fn history(&self, zone: usize) -> Vec<u8> {
        lock(&self.writes)
            .iter()
            .filter(|(z, _)| *z == zone)
            .map(|(_, p)| *p)
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.writes).clear();
    }

    pub fn set_failing(&self, on: bool) {
        self.failing.store(on, Ordering::Relaxed);
    }
}

impl HeaterOutput for RecordingHeater {
    fn set_power(&mut self, zone: usize, power: u8) -> Result<(), BoxError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(Box::new(std::io::Error::other("heater driver not responding")));
        }
        lock(&self.writes).push((zone, power));
        Ok(())
    }
}
