use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Largest positive 24-bit two's complement reading.
pub const ADC_MAX_24: i32 = 0x7F_FFFF;
/// Most negative 24-bit two's complement reading.
pub const ADC_MIN_24: i32 = -0x80_0000;

/// Wait until the provided `is_high` predicate becomes false (i.e., line goes low),
/// or a timeout expires. Sleeps in small intervals to avoid CPU spinning.
pub fn wait_until_low_with_timeout(
    mut is_high: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while is_high() {
        if Instant::now() >= deadline {
            return Err(HwError::DataReadyTimeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}

/// Sign-extend the low 24 bits of `word`.
#[inline]
pub fn sign_extend_24(word: u32) -> i32 {
    ((word << 8) as i32) >> 8
}

/// Drop the `shift` noisiest bits of a 24-bit reading, keeping the sign.
///
/// Boards deliver 20-bit (`shift = 4`) or 19-bit (`shift = 5`) counts.
#[inline]
pub fn normalize(raw24: i32, shift: u8) -> i32 {
    raw24 >> shift.min(23)
}

/// A converter pinned at either rail has lost the signal.
#[inline]
pub fn is_saturated(raw24: i32) -> bool {
    raw24 == ADC_MAX_24 || raw24 == ADC_MIN_24
}
