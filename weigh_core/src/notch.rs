//! Mains/motor interference rejection ahead of the low-pass cascade.
//!
//! The notch stage also widens integer counts by `W = 1 << shift` so the
//! following floating-point filters start with extra fractional precision.

use crate::reinit::{Reinit, Reinitializable};

/// Fixed size of the delay line. Windows longer than this are rejected.
pub const NOTCH_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotchMode {
    #[default]
    None,
    /// Sum of the current and a delayed sample; nulls `fn` and its odd harmonics.
    Comb,
    /// Moving average over one interference period.
    Averager,
}

/// Window length for the given mode, sampling and interference frequencies.
pub fn notch_sample(mode: NotchMode, sample_hz: f64, notch_hz: f64) -> usize {
    if !(sample_hz > 0.0 && notch_hz > 0.0) {
        return 0;
    }
    let ratio = sample_hz / notch_hz;
    let n = match mode {
        NotchMode::None => return 0,
        NotchMode::Comb => (0.5 * (ratio + 1.0)).round(),
        NotchMode::Averager => ratio.round(),
    };
    if n.is_finite() && n >= 0.0 {
        n as usize
    } else {
        usize::MAX
    }
}

#[derive(Debug, Clone)]
pub struct NotchFilter {
    mode: NotchMode,
    requested: NotchMode,
    shift: u8,
    window: usize,
    buf: [i64; NOTCH_CAPACITY],
    head: usize,
    sum: i64,
}

impl NotchFilter {
    /// Build a notch stage. Falls back to `NotchMode::None` (and logs a warning)
    /// when the derived window is empty or longer than [`NOTCH_CAPACITY`].
    pub fn new(mode: NotchMode, sample_hz: f64, notch_hz: f64, shift: u8) -> Self {
        let window = notch_sample(mode, sample_hz, notch_hz);
        let fits = (1..=NOTCH_CAPACITY).contains(&window);
        let active = if mode == NotchMode::None || fits {
            mode
        } else {
            tracing::warn!(
                ?mode,
                sample_hz,
                notch_hz,
                window,
                capacity = NOTCH_CAPACITY,
                "notch window does not fit delay line; notch disabled"
            );
            NotchMode::None
        };
        tracing::debug!(?active, window, shift, "notch configured");
        Self {
            mode: active,
            requested: mode,
            shift: shift.clamp(1, 5),
            window: if active == NotchMode::None { 0 } else { window },
            buf: [0; NOTCH_CAPACITY],
            head: 0,
            sum: 0,
        }
    }

    pub fn mode(&self) -> NotchMode {
        self.mode
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Widening factor applied to every output.
    pub fn widen(&self) -> i64 {
        1_i64 << self.shift
    }

    /// True when the requested mode could not be honoured.
    pub fn fell_back(&self) -> bool {
        self.mode != self.requested
    }

    /// Push one raw count and return the widened, notched value.
    pub fn process(&mut self, raw: i32) -> i64 {
        let cur = i64::from(raw);
        let w = self.widen();
        match self.mode {
            NotchMode::None => cur * w,
            NotchMode::Comb => {
                let delayed = self.buf[self.tail()];
                self.push(cur);
                // The +1 is an intended half-count offset. It is the same for
                // every reading, so it drops out of zero-referenced weights.
                (cur + delayed + 1) * (w / 2)
            }
            NotchMode::Averager => {
                let leaving = self.buf[self.tail()];
                self.sum += cur - leaving;
                self.push(cur);
                self.sum * w / self.window as i64
            }
        }
    }

    #[inline]
    fn tail(&self) -> usize {
        (self.head + NOTCH_CAPACITY - self.window) % NOTCH_CAPACITY
    }

    #[inline]
    fn push(&mut self, v: i64) {
        self.buf[self.head] = v;
        self.head = (self.head + 1) % NOTCH_CAPACITY;
    }
}

impl Reinitializable for NotchFilter {
    fn reinitialize(&mut self, mode: Reinit) {
        let fill = match mode {
            Reinit::Clear => 0,
            Reinit::Prime(x) => x.round() as i64,
        };
        self.buf = [fill; NOTCH_CAPACITY];
        self.head = 0;
        self.sum = fill * self.window as i64;
    }
}
