//! Weight reading returned from each weight cycle.

use crate::capture::CaptureState;
use crate::units::Unit;
use crate::zero::PowerUpZeroStatus;

/// Status flags of a single weight cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags {
    pub over_capacity: bool,
    pub under_zero: bool,
    pub center_of_zero: bool,
    pub over_zero: bool,
    pub motion: bool,
    pub net: bool,
    pub expanded: bool,
    /// Negative net reported with gross and tare swapped.
    pub swapped: bool,
    pub needs_zero: bool,
    pub calibrated: bool,
}

/// Public result of one weight cycle, in the display unit.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightReading {
    pub gross: f64,
    pub net: f64,
    pub tare: f64,
    pub gross_text: String,
    pub net_text: String,
    pub tare_text: String,
    pub unit: Unit,
    /// Display increment the values were rounded to.
    pub increment: f64,
    /// Weighing range (0-based) selected by the gross weight.
    pub range: usize,
    /// Filtered counts the reading was computed from.
    pub counts: f64,
    pub powerup: PowerUpZeroStatus,
    pub flags: StatusFlags,
    /// Calibration capture progress, reported until it finishes.
    pub capture: Option<CaptureState>,
}

impl WeightReading {
    /// Value shown on the display: net in net mode, gross otherwise.
    pub fn displayed(&self) -> f64 {
        if self.flags.net { self.net } else { self.gross }
    }

    pub fn displayed_text(&self) -> &str {
        if self.flags.net {
            &self.net_text
        } else {
            &self.gross_text
        }
    }

    /// Stable, centred and inside the weighing range.
    pub fn is_reportable(&self) -> bool {
        !self.flags.motion && !self.flags.over_capacity && !self.flags.under_zero
    }
}
