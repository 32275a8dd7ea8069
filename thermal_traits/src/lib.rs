pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// One converted sample for a heater zone.
///
/// `redundant` carries the second sensor's value for zones that have one;
/// sensors without a redundant channel return `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub celsius: f32,
    pub redundant: Option<f32>,
}

impl Reading {
    pub fn new(celsius: f32) -> Self {
        Self {
            celsius,
            redundant: None,
        }
    }

    pub fn with_redundant(celsius: f32, redundant: f32) -> Self {
        Self {
            celsius,
            redundant: Some(redundant),
        }
    }
}

/// Supplies already-converted, filtered temperatures per zone index.
pub trait TemperatureSensor {
    fn read(&mut self, zone: usize) -> Result<Reading, Box<dyn std::error::Error + Send + Sync>>;
}

/// Drives a heater with a duty value in `0..=max_power`.
pub trait HeaterOutput {
    fn set_power(
        &mut self,
        zone: usize,
        power: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: TemperatureSensor + ?Sized> TemperatureSensor for Box<T> {
    fn read(&mut self, zone: usize) -> Result<Reading, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read(zone)
    }
}

impl<T: HeaterOutput + ?Sized> HeaterOutput for Box<T> {
    fn set_power(
        &mut self,
        zone: usize,
        power: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_power(zone, power)
    }
}
