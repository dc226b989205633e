//! Adaptive "fill-noise" stage: a stiff coefficient set while the load is quiet
//! or sitting near zero, the standard set otherwise.

use std::collections::VecDeque;

use crate::coefficients::{FilterChain, lookup};
use crate::config::StabilityCfg;
use crate::error::WeighError;
use crate::reinit::{Reinit, Reinitializable};
use crate::zero::ZeroState;

/// Recent raw counts with cached extremes.
#[derive(Debug, Clone)]
pub struct MotionWindow {
    cap: usize,
    buf: VecDeque<i32>,
    min: i32,
    max: i32,
}

impl MotionWindow {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            buf: VecDeque::with_capacity(cap),
            min: i32::MAX,
            max: i32::MIN,
        }
    }

    pub fn push(&mut self, raw: i32) {
        let mut rescan = false;
        if self.buf.len() == self.cap
            && let Some(old) = self.buf.pop_front()
        {
            rescan = old == self.min || old == self.max;
        }
        self.buf.push_back(raw);
        if rescan {
            self.min = self.buf.iter().copied().min().unwrap_or(raw);
            self.max = self.buf.iter().copied().max().unwrap_or(raw);
        } else {
            self.min = self.min.min(raw);
            self.max = self.max.max(raw);
        }
    }

    /// `max - min` over the window, 0 when empty.
    pub fn spread(&self) -> i64 {
        if self.buf.is_empty() {
            0
        } else {
            i64::from(self.max) - i64::from(self.min)
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.min = i32::MAX;
        self.max = i32::MIN;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSet {
    Standard,
    FillNoise,
}

#[derive(Debug, Clone)]
pub struct StabilityFilter {
    cfg: StabilityCfg,
    window: MotionWindow,
    standard: FilterChain,
    fill: FilterChain,
    active: ActiveSet,
    switches: u64,
}

impl StabilityFilter {
    pub fn new(cfg: StabilityCfg) -> Result<Self, WeighError> {
        let standard = FilterChain::new(lookup(cfg.standard_cutoff_pct, cfg.standard_poles)?);
        let fill = FilterChain::new(lookup(cfg.fill_cutoff_pct, cfg.fill_poles)?);
        Ok(Self {
            window: MotionWindow::new(cfg.window),
            cfg,
            standard,
            fill,
            active: ActiveSet::Standard,
            switches: 0,
        })
    }

    pub fn active(&self) -> ActiveSet {
        self.active
    }

    /// Number of set switches since construction.
    pub fn switches(&self) -> u64 {
        self.switches
    }

    /// Filter `x` (already widened and low-passed) using the set chosen from the
    /// raw sample and the current zero.
    pub fn process(&mut self, raw: i32, x: f64, zero: &ZeroState) -> f64 {
        self.window.push(raw);
        let quiet = (self.window.spread() as f64) < self.cfg.spread_counts;
        let near_zero = (f64::from(raw) - zero.current_zero()).abs() <= self.cfg.zero_band_counts;
        let want = if quiet || near_zero {
            ActiveSet::FillNoise
        } else {
            ActiveSet::Standard
        };
        if want != self.active {
            tracing::debug!(from = ?self.active, to = ?want, spread = self.window.spread(), "stability set switch");
            self.active = want;
            self.switches += 1;
            // Both chains restart from the current input so the output stays continuous.
            self.standard.reinitialize(Reinit::Prime(x));
            self.fill.reinitialize(Reinit::Prime(x));
        }
        match self.active {
            ActiveSet::Standard => self.standard.process(x),
            ActiveSet::FillNoise => self.fill.process(x),
        }
    }
}

impl Reinitializable for StabilityFilter {
    fn reinitialize(&mut self, mode: Reinit) {
        self.window.clear();
        self.standard.reinitialize(mode);
        self.fill.reinitialize(mode);
    }
}
