use thiserror::Error;

/// Why a zone was latched into its fault state.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FaultReason {
    #[error("temperature above max limit")]
    MaxTemp,
    #[error("temperature below min floor (open sensor?)")]
    MinTemp,
    #[error("redundant sensor disagrees with primary")]
    RedundantMismatch,
    #[error("sensor reported a non-finite value")]
    SensorFault,
    #[error("sensor stopped answering")]
    SensorTimeout,
    #[error("heater driven without temperature rise")]
    HeatingStalled,
    #[error("autotune exceeded its temperature ceiling")]
    AutotuneOverheat,
}

#[derive(Debug, Error, Clone)]
pub enum ThermalError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("zone {zone} faulted: {reason}")]
    Fault { zone: usize, reason: FaultReason },
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing zone configuration")]
    MissingZones,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Terminal failure of an autotune session.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum AutotuneError {
    #[error("zone index {0} is out of range")]
    InvalidZone(usize),
    #[error("zone {0} is disabled or faulted")]
    ZoneUnavailable(usize),
    #[error("autotune already running on zone {0}")]
    Busy(usize),
    #[error("temperature too high: {celsius:.1} C exceeds {ceiling:.1} C")]
    TemperatureTooHigh { celsius: f32, ceiling: f32 },
    #[error("timed out after {cycles} of {requested} cycles")]
    Timeout { cycles: u32, requested: u32 },
    #[error("autotune cancelled")]
    Cancelled,
    #[error("zone faulted during autotune: {0}")]
    ZoneFaulted(FaultReason),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
