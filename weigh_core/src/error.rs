use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum WeighError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
    #[error("zero rejected: {0}")]
    Zero(#[from] ZeroError),
    #[error("tare rejected: {0}")]
    Tare(#[from] TareError),
    #[error("calibration rejected: {0}")]
    Calibration(#[from] CalibrationError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("out of range: {0}")]
    OutOfRange(String),
}

impl WeighError {
    /// True when the request failed only because the scale was moving.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Self::Zero(ZeroError::InMotion) | Self::Tare(TareError::InMotion)
        )
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ZeroError {
    #[error("scale in motion")]
    InMotion,
    #[error("net mode active")]
    NetMode,
    #[error("above push-button zero limit")]
    OutOfPositiveRange,
    #[error("below push-button zero limit")]
    OutOfNegativeRange,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TareError {
    #[error("scale in motion")]
    InMotion,
    #[error("tare must be > 0")]
    NotPositive,
    #[error("tare exceeds capacity")]
    OverCapacity,
    #[error("tare is not a multiple of the increment")]
    NotMultipleOfIncrement,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("test point {0} is not in use")]
    TestPointOutOfRange(u8),
    #[error("calibration load must be > 0, got {0}")]
    InvalidLoad(f64),
    #[error("calibration counts must be finite")]
    NonFiniteCounts,
    #[error("calibration capture already in progress")]
    CaptureBusy,
    #[error("no calibration capture in progress")]
    NoCapture,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("block {block} checksum mismatch (stored {stored:#06x}, computed {computed:#06x})")]
    Checksum { block: u16, stored: u16, computed: u16 },
    #[error("block {block} has length {len}, expected {expected}")]
    BlockLength { block: u16, len: usize, expected: usize },
    #[error("read block {block}: {reason}")]
    Read { block: u16, reason: String },
    #[error("write block {block}: {reason}")]
    Write { block: u16, reason: String },
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing sample source")]
    MissingSource,
    #[error("missing calibration")]
    MissingCalibration,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
