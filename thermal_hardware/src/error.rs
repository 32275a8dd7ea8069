use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("driver timeout")]
    Timeout,
    #[error("temperature sensor did not answer")]
    SensorTimeout,
    #[error("no channel configured for zone {0}")]
    UnknownZone(usize),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
