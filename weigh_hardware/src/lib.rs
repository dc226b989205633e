//! Sample sources and block stores behind the `weigh_traits` seams.
//!
//! - [`sim::SimulatedLoadCell`]: deterministic load cell with noise and hum
//! - [`store::MemoryBlockStore`] and [`store::FileBlockStore`]: parameter blocks
//! - `hx711::Hx711` (feature `hardware`): the real ADC on Raspberry Pi GPIO
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hx711;
pub mod sim;
pub mod store;
pub mod util;

pub use error::HwError;
pub use sim::{LoadHandle, SimulatedLoadCell};
pub use store::{FileBlockStore, MemoryBlockStore};
