//! Motion detection on consecutive filtered readings.

use crate::config::MotionCfg;
use crate::reinit::{Reinit, Reinitializable};

#[derive(Debug, Clone)]
pub struct MotionDetector {
    cfg: MotionCfg,
    previous: Option<f64>,
    quiet_cycles: u32,
    in_motion: bool,
}

impl MotionDetector {
    pub fn new(cfg: MotionCfg) -> Self {
        Self {
            cfg,
            previous: None,
            quiet_cycles: 0,
            // Unsettled until enough quiet readings have been seen.
            in_motion: true,
        }
    }

    /// True while the scale is in motion.
    ///
    /// A delta above `motion_range` starts motion immediately; the scale only
    /// settles after `settling_cycles` consecutive quiet readings.
    pub fn detect(
        &mut self,
        current: f64,
        previous: f64,
        motion_range: f64,
        settling_cycles: u32,
    ) -> bool {
        if (current - previous).abs() > motion_range {
            self.quiet_cycles = 0;
            self.in_motion = true;
        } else {
            self.quiet_cycles = self.quiet_cycles.saturating_add(1);
            if self.quiet_cycles >= settling_cycles {
                self.in_motion = false;
            }
        }
        self.in_motion
    }

    /// Feed the next reading using the configured range and settling count.
    pub fn update(&mut self, current: f64) -> bool {
        let previous = self.previous.replace(current).unwrap_or(current);
        let (range, settling) = (self.cfg.range_counts, self.cfg.settling_cycles);
        self.detect(current, previous, range, settling)
    }

    pub fn in_motion(&self) -> bool {
        self.in_motion
    }
}

impl Reinitializable for MotionDetector {
    fn reinitialize(&mut self, mode: Reinit) {
        self.previous = match mode {
            Reinit::Clear => None,
            Reinit::Prime(x) => Some(x),
        };
        self.quiet_cycles = 0;
        self.in_motion = true;
    }
}
