//! Calibration point capture: average a run of stable readings before anything
//! is committed.
//!
//! `Idle -> Sampling -> Averaging -> Committed | Aborted`. Motion restarts the
//! run; exceeding the cycle budget or calling `cancel()` aborts it. Only a
//! `Committed` capture may be applied to the calibration.

use crate::config::CaptureCfg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Cancelled,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureState {
    Idle,
    Sampling { count: u32, sum: f64 },
    Averaging { count: u32, sum: f64 },
    Committed(f64),
    Aborted(AbortReason),
}

impl CaptureState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Committed(_) | Self::Aborted(_))
    }
}

/// One calibration point being captured.
#[derive(Debug, Clone)]
pub struct CalibrationCapture {
    testpoint: u8,
    load: f64,
    samples: u32,
    timeout_cycles: u32,
    cycles: u32,
    state: CaptureState,
}

impl CalibrationCapture {
    pub fn new(testpoint: u8, load: f64, cfg: &CaptureCfg) -> Self {
        Self {
            testpoint,
            load,
            samples: cfg.samples.max(1),
            timeout_cycles: cfg.timeout_cycles.max(cfg.samples.max(1)),
            cycles: 0,
            state: CaptureState::Idle,
        }
    }

    pub fn testpoint(&self) -> u8 {
        self.testpoint
    }

    pub fn load(&self) -> f64 {
        self.load
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Feed one filtered reading (counts).
    pub fn feed(&mut self, sample: f64, in_motion: bool) -> CaptureState {
        if self.state.is_finished() || matches!(self.state, CaptureState::Averaging { .. }) {
            return self.state;
        }
        self.cycles += 1;
        if self.cycles > self.timeout_cycles {
            tracing::warn!(testpoint = self.testpoint, cycles = self.cycles, "calibration capture timed out");
            self.state = CaptureState::Aborted(AbortReason::Timeout);
            return self.state;
        }
        let (count, sum) = match self.state {
            CaptureState::Sampling { count, sum } if !in_motion => (count + 1, sum + sample),
            _ if in_motion => (0, 0.0),
            _ => (1, sample),
        };
        self.state = if count >= self.samples {
            CaptureState::Averaging { count, sum }
        } else {
            CaptureState::Sampling { count, sum }
        };
        self.state
    }

    /// Finish an `Averaging` capture. Returns the averaged counts once committed.
    pub fn commit(&mut self) -> Option<f64> {
        match self.state {
            CaptureState::Averaging { count, sum } => {
                let avg = sum / f64::from(count);
                self.state = CaptureState::Committed(avg);
                tracing::debug!(testpoint = self.testpoint, avg, count, "capture averaged");
                Some(avg)
            }
            CaptureState::Committed(avg) => Some(avg),
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        if !self.state.is_finished() {
            tracing::info!(testpoint = self.testpoint, "calibration capture cancelled");
            self.state = CaptureState::Aborted(AbortReason::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(samples: u32, timeout_cycles: u32) -> CaptureCfg {
        CaptureCfg {
            samples,
            timeout_cycles,
        }
    }

    #[test]
    fn averages_after_enough_samples() {
        let mut c = CalibrationCapture::new(1, 50.0, &cfg(3, 10));
        assert_eq!(c.state(), CaptureState::Idle);
        c.feed(10.0, false);
        c.feed(20.0, false);
        assert!(matches!(c.feed(30.0, false), CaptureState::Averaging { count: 3, .. }));
        assert_eq!(c.commit(), Some(20.0));
        assert_eq!(c.state(), CaptureState::Committed(20.0));
    }

    #[test]
    fn motion_restarts_accumulation() {
        let mut c = CalibrationCapture::new(1, 50.0, &cfg(2, 10));
        c.feed(100.0, false);
        assert_eq!(c.feed(500.0, true), CaptureState::Sampling { count: 0, sum: 0.0 });
        c.feed(10.0, false);
        c.feed(12.0, false);
        assert_eq!(c.commit(), Some(11.0));
    }

    #[test]
    fn timeout_aborts_without_value() {
        let mut c = CalibrationCapture::new(2, 50.0, &cfg(3, 4));
        for _ in 0..4 {
            c.feed(1.0, true);
        }
        assert_eq!(c.feed(1.0, false), CaptureState::Aborted(AbortReason::Timeout));
        assert_eq!(c.commit(), None);
    }

    #[test]
    fn cancel_is_final() {
        let mut c = CalibrationCapture::new(0, 0.0, &cfg(3, 10));
        c.feed(1.0, false);
        c.cancel();
        assert_eq!(c.state(), CaptureState::Aborted(AbortReason::Cancelled));
        assert_eq!(c.feed(1.0, false), CaptureState::Aborted(AbortReason::Cancelled));
        assert_eq!(c.commit(), None);
    }
}
