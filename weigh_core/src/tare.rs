//! Tare weight, its source, and the gross/net view built from it.
//!
//! Tare is held in calibration units. Every entry path validates against motion,
//! capacity and the display increment before the state changes.

use crate::config::{NetSignCorrection, TareCfg};
use crate::error::TareError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TareSource {
    #[default]
    None,
    PushButton,
    Keyboard,
    Auto,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TareMode {
    #[default]
    Gross,
    Net,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TareState {
    pub(crate) tare: f64,
    pub(crate) source: TareSource,
    pub(crate) mode: TareMode,
    pub(crate) changed: bool,
    pub(crate) auto_clear_armed: bool,
}

impl TareState {
    pub fn tare(&self) -> f64 {
        self.tare
    }
    pub fn source(&self) -> TareSource {
        self.source
    }
    pub fn mode(&self) -> TareMode {
        self.mode
    }
    pub fn is_net(&self) -> bool {
        self.mode == TareMode::Net
    }
    /// Set on every tare change; cleared by [`TareEngine::take_changed`].
    pub fn changed(&self) -> bool {
        self.changed
    }
}

/// Gross, net and tare as they should be reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetView {
    pub gross: f64,
    pub net: f64,
    pub tare: f64,
    /// Gross and tare were swapped to keep net positive.
    pub swapped: bool,
}

/// Limits a tare entry is checked against.
#[derive(Debug, Clone, Copy)]
pub struct TareLimits {
    pub capacity: f64,
    pub increment: f64,
}

#[derive(Debug, Clone)]
pub struct TareEngine {
    cfg: TareCfg,
    state: TareState,
}

fn round_to(value: f64, increment: f64) -> f64 {
    if increment > 0.0 {
        (value / increment).round() * increment
    } else {
        value
    }
}

impl TareEngine {
    pub fn new(cfg: TareCfg) -> Self {
        Self {
            cfg,
            state: TareState::default(),
        }
    }

    pub fn state(&self) -> &TareState {
        &self.state
    }

    pub fn cfg(&self) -> &TareCfg {
        &self.cfg
    }

    /// Returns and resets the change flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.state.changed)
    }

    fn check_bounds(value: f64, limits: TareLimits) -> Result<(), TareError> {
        if !(value > 0.0) {
            return Err(TareError::NotPositive);
        }
        if value > limits.capacity {
            return Err(TareError::OverCapacity);
        }
        Ok(())
    }

    fn commit(&mut self, tare: f64, source: TareSource) {
        self.state.tare = tare;
        self.state.source = source;
        self.state.mode = TareMode::Net;
        self.state.changed = true;
        self.state.auto_clear_armed = false;
        tracing::info!(tare, ?source, "tare set");
    }

    /// Push-button tare: the current gross weight becomes the tare.
    pub fn take_tare(
        &mut self,
        gross: f64,
        in_motion: bool,
        limits: TareLimits,
    ) -> Result<f64, TareError> {
        self.tare_from_gross(gross, in_motion, limits, TareSource::PushButton)
    }

    fn tare_from_gross(
        &mut self,
        gross: f64,
        in_motion: bool,
        limits: TareLimits,
        source: TareSource,
    ) -> Result<f64, TareError> {
        if in_motion {
            return Err(TareError::InMotion);
        }
        let tare = round_to(gross, limits.increment);
        Self::check_bounds(tare, limits)?;
        self.commit(tare, source);
        Ok(tare)
    }

    fn entered_tare(
        &mut self,
        value: f64,
        limits: TareLimits,
        source: TareSource,
    ) -> Result<f64, TareError> {
        Self::check_bounds(value, limits)?;
        let rounded = round_to(value, limits.increment);
        if (rounded - value).abs() > limits.increment * 1e-6 {
            return Err(TareError::NotMultipleOfIncrement);
        }
        self.commit(rounded, source);
        Ok(rounded)
    }

    /// Tare typed in by the operator.
    pub fn keyboard_tare(&mut self, value: f64, limits: TareLimits) -> Result<f64, TareError> {
        self.entered_tare(value, limits, TareSource::Keyboard)
    }

    /// Tare recalled from a stored preset.
    pub fn memory_tare(&mut self, value: f64, limits: TareLimits) -> Result<f64, TareError> {
        self.entered_tare(value, limits, TareSource::Memory)
    }

    /// Tare automatically once a stable load above the threshold appears in gross mode.
    /// Returns true when a tare was taken.
    pub fn auto_tare(&mut self, gross: f64, in_motion: bool, limits: TareLimits) -> bool {
        let threshold = self.cfg.auto_tare_threshold;
        if threshold <= 0.0 || self.state.mode == TareMode::Net || in_motion || gross < threshold {
            return false;
        }
        match self.tare_from_gross(gross, false, limits, TareSource::Auto) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(gross, error = %e, "auto tare skipped");
                false
            }
        }
    }

    pub fn clear_tare(&mut self) {
        if self.state.mode == TareMode::Net || self.state.tare != 0.0 {
            tracing::info!(tare = self.state.tare, "tare cleared");
        }
        self.state = TareState {
            changed: true,
            ..TareState::default()
        };
    }

    /// Clear the tare once the load has been removed.
    ///
    /// Arms when gross reaches the threshold while in net mode, then clears when
    /// gross falls back below it. Returns true when the tare was cleared.
    pub fn auto_clear(&mut self, gross: f64, in_motion: bool) -> bool {
        let threshold = self.cfg.auto_clear_threshold;
        if threshold <= 0.0 || self.state.mode != TareMode::Net {
            return false;
        }
        if gross >= threshold {
            self.state.auto_clear_armed = true;
            return false;
        }
        if !self.state.auto_clear_armed || (self.cfg.auto_clear_requires_stable && in_motion) {
            return false;
        }
        self.clear_tare();
        true
    }

    /// Gross/net/tare view of a gross weight, honouring net sign correction.
    pub fn view(&self, gross: f64) -> NetView {
        let tare = if self.state.mode == TareMode::Net {
            self.state.tare
        } else {
            0.0
        };
        let net = gross - tare;
        if net < 0.0
            && self.state.mode == TareMode::Net
            && self.cfg.net_sign_correction == NetSignCorrection::SwapGrossAndTare
        {
            return NetView {
                gross: tare,
                net: -net,
                tare: gross,
                swapped: true,
            };
        }
        NetView {
            gross,
            net,
            tare,
            swapped: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const LIMITS: TareLimits = TareLimits {
        capacity: 100.0,
        increment: 0.5,
    };

    #[test]
    fn push_button_rounds_to_increment() {
        let mut t = TareEngine::new(TareCfg::default());
        assert_eq!(t.take_tare(12.3, false, LIMITS), Ok(12.5));
        assert_eq!(t.state().source(), TareSource::PushButton);
        assert!(t.state().is_net());
        assert!(t.take_changed());
        assert!(!t.take_changed());
    }

    #[rstest]
    #[case(10.0, true, Err(TareError::InMotion))]
    #[case(0.1, false, Err(TareError::NotPositive))]
    #[case(-3.0, false, Err(TareError::NotPositive))]
    #[case(101.0, false, Err(TareError::OverCapacity))]
    fn push_button_validation(
        #[case] gross: f64,
        #[case] motion: bool,
        #[case] expect: Result<f64, TareError>,
    ) {
        let mut t = TareEngine::new(TareCfg::default());
        assert_eq!(t.take_tare(gross, motion, LIMITS), expect);
        assert!(!t.state().is_net());
    }

    #[test]
    fn keyboard_tare_must_sit_on_increment() {
        let mut t = TareEngine::new(TareCfg::default());
        assert_eq!(
            t.keyboard_tare(2.3, LIMITS),
            Err(TareError::NotMultipleOfIncrement)
        );
        assert_eq!(t.keyboard_tare(2.5, LIMITS), Ok(2.5));
        assert_eq!(t.memory_tare(4.0, LIMITS), Ok(4.0));
        assert_eq!(t.state().source(), TareSource::Memory);
    }

    #[test]
    fn auto_tare_only_from_gross_mode() {
        let cfg = TareCfg {
            auto_tare_threshold: 5.0,
            ..TareCfg::default()
        };
        let mut t = TareEngine::new(cfg);
        assert!(!t.auto_tare(4.0, false, LIMITS));
        assert!(!t.auto_tare(8.0, true, LIMITS));
        assert!(t.auto_tare(8.0, false, LIMITS));
        assert_eq!(t.state().source(), TareSource::Auto);
        assert!(!t.auto_tare(20.0, false, LIMITS));
        assert_eq!(t.state().tare(), 8.0);
    }

    #[test]
    fn auto_clear_arms_then_clears() {
        let cfg = TareCfg {
            auto_clear_threshold: 2.0,
            ..TareCfg::default()
        };
        let mut t = TareEngine::new(cfg);
        t.take_tare(10.0, false, LIMITS).unwrap();
        // Not armed yet: dropping below does nothing.
        assert!(!t.auto_clear(1.0, false));
        assert!(!t.auto_clear(12.0, false));
        // Armed; motion holds the clear off.
        assert!(!t.auto_clear(0.5, true));
        assert!(t.auto_clear(0.5, false));
        assert_eq!(t.state().mode(), TareMode::Gross);
        assert_eq!(t.state().source(), TareSource::None);
    }

    #[test]
    fn sign_correction_swaps_gross_and_tare() {
        let cfg = TareCfg {
            net_sign_correction: NetSignCorrection::SwapGrossAndTare,
            ..TareCfg::default()
        };
        let mut t = TareEngine::new(cfg);
        t.keyboard_tare(10.0, LIMITS).unwrap();
        let v = t.view(4.0);
        assert!(v.swapped);
        assert_eq!((v.gross, v.net, v.tare), (10.0, 6.0, 4.0));

        let plain = TareEngine::new(TareCfg::default());
        let v = plain.view(4.0);
        assert_eq!((v.gross, v.net, v.tare), (4.0, 4.0, 0.0));
    }
}
