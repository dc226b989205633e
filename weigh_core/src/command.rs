//! Operator and host commands accepted by the scale.

use crate::error::WeighError;

/// Lowest and highest accepted low-pass cutoff, in Hz.
pub const FILTER_CUTOFF_RANGE_HZ: (f64, f64) = (0.1, 9.9);
/// Lowest and highest accepted pole count.
pub const FILTER_POLES_RANGE: (u8, u8) = (2, 8);

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Push-button zero.
    Zero,
    /// Push-button tare of the current gross.
    Tare,
    /// Tare typed in by the operator, in calibration units.
    KeyboardTare(f64),
    /// Stored tare preset, in calibration units.
    MemoryTare(f64),
    ClearTare,
    SetFilter { cutoff_hz: f64, poles: u8 },
    SetCapacity { capacity: f64, increment: f64 },
    /// Toggle between the primary and secondary unit.
    SwitchUnit,
    ToggleExpand,
    /// Start capturing test point `testpoint` (0 = zero) under `load`.
    BeginCapture { testpoint: u8, load: f64 },
    CancelCapture,
}

impl Command {
    /// Reject arguments that are out of range regardless of scale state.
    pub fn check_args(&self) -> Result<(), WeighError> {
        match *self {
            Command::SetFilter { cutoff_hz, poles } => {
                let (lo, hi) = FILTER_CUTOFF_RANGE_HZ;
                if !(lo..=hi).contains(&cutoff_hz) {
                    return Err(WeighError::OutOfRange(format!(
                        "filter cutoff {cutoff_hz} Hz not in {lo}..={hi}"
                    )));
                }
                let (plo, phi) = FILTER_POLES_RANGE;
                if !(plo..=phi).contains(&poles) {
                    return Err(WeighError::OutOfRange(format!(
                        "filter poles {poles} not in {plo}..={phi}"
                    )));
                }
            }
            Command::KeyboardTare(v) | Command::MemoryTare(v) if !v.is_finite() => {
                return Err(WeighError::OutOfRange(format!("tare {v} is not a number")));
            }
            _ => {}
        }
        Ok(())
    }
}
