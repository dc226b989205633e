//! Zero tracking: calibrated, power-up and current zero references.
//!
//! All references are in raw counts. Limits configured as a percentage of
//! capacity or in increments are turned into counts through [`ZeroEngine::rescale`],
//! which the scale calls whenever calibration or capacity changes.

use crate::config::ZeroCfg;
use crate::error::ZeroError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerUpZeroStatus {
    #[default]
    NoZero,
    InProgress,
    Success,
    /// Power-up reading was above the allowed window.
    Over,
    /// Power-up reading was below the allowed window.
    Under,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZeroState {
    pub(crate) calibrated_zero: f64,
    pub(crate) powerup_zero: Option<f64>,
    pub(crate) current_zero: f64,
    pub(crate) status: PowerUpZeroStatus,
    pub(crate) needs_operator_zero: bool,
    pub(crate) under_zero: bool,
    pub(crate) center_of_zero: bool,
    pub(crate) over_zero: bool,
}

impl ZeroState {
    pub fn new(calibrated_zero: f64) -> Self {
        Self {
            calibrated_zero,
            powerup_zero: None,
            current_zero: calibrated_zero,
            status: PowerUpZeroStatus::NoZero,
            needs_operator_zero: false,
            under_zero: false,
            center_of_zero: false,
            over_zero: false,
        }
    }

    pub fn calibrated_zero(&self) -> f64 {
        self.calibrated_zero
    }
    pub fn powerup_zero(&self) -> Option<f64> {
        self.powerup_zero
    }
    pub fn current_zero(&self) -> f64 {
        self.current_zero
    }
    pub fn status(&self) -> PowerUpZeroStatus {
        self.status
    }
    pub fn needs_operator_zero(&self) -> bool {
        self.needs_operator_zero
    }
    pub fn under_zero(&self) -> bool {
        self.under_zero
    }
    pub fn center_of_zero(&self) -> bool {
        self.center_of_zero
    }
    pub fn over_zero(&self) -> bool {
        self.over_zero
    }

    /// Reference the push-button limits are measured from.
    pub fn reference(&self) -> f64 {
        self.powerup_zero.unwrap_or(self.calibrated_zero)
    }

    /// A new calibrated zero was captured with the scale empty.
    ///
    /// Current zero follows it; a power-up zero that had been flagged over or
    /// under is resolved by the new reference.
    pub(crate) fn recalibrated(&mut self, new_zero: f64) {
        self.calibrated_zero = new_zero;
        self.current_zero = new_zero;
        match self.status {
            PowerUpZeroStatus::NoZero | PowerUpZeroStatus::InProgress => {}
            PowerUpZeroStatus::Success | PowerUpZeroStatus::Over | PowerUpZeroStatus::Under => {
                self.powerup_zero = Some(new_zero);
                self.status = PowerUpZeroStatus::Success;
                self.needs_operator_zero = false;
            }
        }
    }
}

/// What a committed zero means for the tare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroOutcome {
    pub clear_tare: bool,
}

#[derive(Debug, Clone)]
pub struct ZeroEngine {
    cfg: ZeroCfg,
    state: ZeroState,
    capacity_counts: f64,
    increment_counts: f64,
}

impl ZeroEngine {
    pub fn new(cfg: ZeroCfg, calibrated_zero: f64) -> Self {
        Self {
            cfg,
            state: ZeroState::new(calibrated_zero),
            capacity_counts: 0.0,
            increment_counts: 0.0,
        }
    }

    pub fn state(&self) -> &ZeroState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ZeroState {
        &mut self.state
    }

    pub fn cfg(&self) -> &ZeroCfg {
        &self.cfg
    }

    /// Update the count equivalents of capacity and one display increment.
    pub fn rescale(&mut self, capacity_counts: f64, increment_counts: f64) {
        self.capacity_counts = capacity_counts.abs();
        self.increment_counts = increment_counts.abs();
    }

    fn pct_counts(&self, pct: f64) -> f64 {
        self.capacity_counts * pct / 100.0
    }

    /// Allowed push-button zero band, in counts, around the current reference.
    pub fn pushbutton_limits(&self) -> (f64, f64) {
        let r = self.state.reference();
        (
            r - self.pct_counts(self.cfg.pushbutton_negative_pct),
            r + self.pct_counts(self.cfg.pushbutton_positive_pct),
        )
    }

    /// Try to latch the power-up zero from a filtered reading.
    pub fn process_powerup_zero(&mut self, counts: f64, in_motion: bool) -> PowerUpZeroStatus {
        let st = &mut self.state;
        if st.status == PowerUpZeroStatus::Success {
            return st.status;
        }
        if in_motion {
            if st.status == PowerUpZeroStatus::NoZero {
                st.status = PowerUpZeroStatus::InProgress;
            }
            return st.status;
        }
        let above = counts - st.calibrated_zero;
        let pos = self.capacity_counts * self.cfg.powerup_positive_pct / 100.0;
        let neg = self.capacity_counts * self.cfg.powerup_negative_pct / 100.0;
        st.status = if above > pos {
            PowerUpZeroStatus::Over
        } else if -above > neg {
            PowerUpZeroStatus::Under
        } else {
            PowerUpZeroStatus::Success
        };
        if st.status == PowerUpZeroStatus::Success {
            st.powerup_zero = Some(counts);
            st.current_zero = counts;
            st.needs_operator_zero = false;
            tracing::info!(counts, calibrated = st.calibrated_zero, "power-up zero captured");
        } else if !st.needs_operator_zero {
            st.needs_operator_zero = true;
            tracing::warn!(
                counts,
                calibrated = st.calibrated_zero,
                status = ?st.status,
                "power-up zero out of range; operator zero required"
            );
        }
        st.status
    }

    /// Push-button zero request. `range` is the active weighing range (0-based);
    /// zeroing is only allowed in the first range.
    pub fn process_zero(
        &mut self,
        counts: f64,
        net_mode: bool,
        range: usize,
        in_motion: bool,
    ) -> Result<ZeroOutcome, ZeroError> {
        if in_motion {
            return Err(ZeroError::InMotion);
        }
        if net_mode && !self.cfg.clears_tare {
            return Err(ZeroError::NetMode);
        }
        if range > 0 {
            return Err(ZeroError::OutOfPositiveRange);
        }
        let (lo, hi) = self.pushbutton_limits();
        if counts > hi {
            return Err(ZeroError::OutOfPositiveRange);
        }
        if counts < lo {
            return Err(ZeroError::OutOfNegativeRange);
        }

        let st = &mut self.state;
        st.current_zero = counts;
        if st.status != PowerUpZeroStatus::Success {
            st.powerup_zero = Some(counts);
            st.status = PowerUpZeroStatus::Success;
            st.needs_operator_zero = false;
        }
        tracing::info!(counts, net_mode, "zero committed");
        Ok(ZeroOutcome {
            clear_tare: net_mode,
        })
    }

    /// Auto-zero maintenance: pull current zero toward a quiet reading near zero.
    /// Returns the correction applied, in counts.
    pub fn azm(&mut self, counts: f64, in_motion: bool) -> f64 {
        if !self.cfg.azm_enabled
            || in_motion
            || self.state.status != PowerUpZeroStatus::Success
        {
            return 0.0;
        }
        let window = self.cfg.azm_window_inc * self.increment_counts;
        let delta = counts - self.state.current_zero;
        if delta.abs() > window {
            return 0.0;
        }
        let step = delta.clamp(-self.cfg.azm_adjust_counts, self.cfg.azm_adjust_counts);
        let (lo, hi) = self.pushbutton_limits();
        let before = self.state.current_zero;
        let after = (before + step).clamp(lo, hi);
        self.state.current_zero = after;
        after - before
    }

    /// Refresh the per-cycle zero flags from the gross weight.
    pub fn update_flags(&mut self, gross: f64, increment: f64) {
        let band = self.cfg.center_band_inc * increment;
        let st = &mut self.state;
        st.center_of_zero = gross.abs() <= band;
        st.over_zero = gross > band;
        st.under_zero = gross < -self.cfg.under_zero_inc * increment;
    }
}
