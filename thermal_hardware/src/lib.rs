//! Heater and sensor backends for the thermal controller.
//!
//! - `sim`: a first-order thermal plant with fault injection, used by the CLI
//!   and by tests.
//! - `gpio` (feature `hardware`, Linux only): PWM heater outputs on GPIO pins.
pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
pub mod sim;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::GpioHeater;
pub use sim::{OPEN_SENSOR_C, PlantParams, SimFault, SimHeater, SimSensor, SimulatedPlant};
