//! Maps `Box<dyn Error>` from trait boundaries to typed `WeighError`.
//!
//! The traits in `weigh_traits` use `Box<dyn Error + Send + Sync>` so sample
//! sources and block stores can fail however they like; this module converts
//! those to our typed error enum, with an optional feature-gated path for
//! `weigh_hardware::HwError` downcasting.

use crate::error::{StorageError, WeighError};

/// Map a sample-source error to a typed `WeighError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> WeighError {
    #[cfg(feature = "hardware-errors")]
    {
        use weigh_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::DataReadyTimeout => WeighError::Timeout,
                other => WeighError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        WeighError::Timeout
    } else {
        WeighError::Hardware(s)
    }
}

/// Map a block-store error to a `StorageError` for the given block.
pub fn map_store_error(
    block: u16,
    e: &(dyn std::error::Error + 'static),
    writing: bool,
) -> StorageError {
    let reason = e.to_string();
    if writing {
        StorageError::Write { block, reason }
    } else {
        StorageError::Read { block, reason }
    }
}
