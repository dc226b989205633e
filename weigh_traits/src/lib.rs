//! Collaborator traits for the weighing pipeline.
//!
//! The core never talks to an ADC or an EEPROM directly: samples arrive through
//! [`SampleSource`] and persisted parameter blocks go through [`BlockStore`].
pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Boxed error used at collaborator boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Periodic source of raw load-cell counts.
///
/// `read_channel` returns a signed count already normalised to the channel's
/// bit width (24-bit raw right-shifted by 4 or 5 bits on most boards).
pub trait SampleSource {
    fn read_channel(&mut self, channel: u8) -> Result<i32, BoxError>;

    /// Number of physical load-cell channels behind this source.
    fn channels(&self) -> u8 {
        1
    }
}

/// Raw storage of fixed-size parameter blocks.
///
/// Checksums are owned by the caller; a backend only moves bytes.
pub trait BlockStore {
    fn read_block(&mut self, block: u16) -> Result<Vec<u8>, BoxError>;
    fn write_block(&mut self, block: u16, bytes: &[u8]) -> Result<(), BoxError>;
}

impl<T: SampleSource + ?Sized> SampleSource for Box<T> {
    fn read_channel(&mut self, channel: u8) -> Result<i32, BoxError> {
        (**self).read_channel(channel)
    }

    fn channels(&self) -> u8 {
        (**self).channels()
    }
}

impl<T: BlockStore + ?Sized> BlockStore for Box<T> {
    fn read_block(&mut self, block: u16) -> Result<Vec<u8>, BoxError> {
        (**self).read_block(block)
    }

    fn write_block(&mut self, block: u16, bytes: &[u8]) -> Result<(), BoxError> {
        (**self).write_block(block, bytes)
    }
}
