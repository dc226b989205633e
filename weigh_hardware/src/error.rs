use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("load cell timeout")]
    Timeout,
    #[error("adc data-ready timeout")]
    DataReadyTimeout,
    #[error("adc saturated at {0:#08x}")]
    Saturated(i32),
    #[error("no such channel: {0}")]
    NoChannel(u8),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
