//! Period helpers shared by the sampler and the run loop.

pub const MICROS_PER_SEC: u64 = 1_000_000;
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Weight-cycle period in microseconds; `hz` is clamped to at least 1 and the
/// result to at least 1 us.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Weight-cycle period in whole milliseconds, at least 1 ms.
#[inline]
pub fn period_ms(hz: u32) -> u64 {
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Number of weight cycles that fit in `ms` at `hz`, rounded up.
#[inline]
pub fn cycles_in_ms(ms: u64, hz: u32) -> u64 {
    (ms.saturating_mul(u64::from(hz.max(1)))).div_ceil(MILLIS_PER_SEC)
}
