//! `From` implementations bridging `weigh_config` types to `weigh_core` types.

use crate::calibration::CalibrationPoints;
use crate::config::{
    CaptureCfg, FilterCfg, MotionCfg, NetSignCorrection, NotchCfg, PipelineCfg, SamplingCfg,
    StabilityCfg, TareCfg, ZeroCfg,
};
use crate::error::WeighError;
use crate::notch::NotchMode;
use crate::params::{ScaleParams, TradeMode, UnitSet};
use crate::units::Unit;

impl From<&weigh_config::SamplingCfg> for SamplingCfg {
    fn from(c: &weigh_config::SamplingCfg) -> Self {
        Self {
            rate_hz: c.rate_hz,
            widen_shift: c.widen_shift,
            channel: c.channel,
        }
    }
}

impl From<weigh_config::NotchKind> for NotchMode {
    fn from(k: weigh_config::NotchKind) -> Self {
        match k {
            weigh_config::NotchKind::None => NotchMode::None,
            weigh_config::NotchKind::Comb => NotchMode::Comb,
            weigh_config::NotchKind::Averager => NotchMode::Averager,
        }
    }
}

impl From<&weigh_config::NotchCfg> for NotchCfg {
    fn from(c: &weigh_config::NotchCfg) -> Self {
        Self {
            mode: c.kind.into(),
            frequency_hz: c.frequency_hz,
        }
    }
}

impl From<&weigh_config::FilterCfg> for FilterCfg {
    fn from(c: &weigh_config::FilterCfg) -> Self {
        Self {
            cutoff_hz: c.cutoff_hz,
            poles: c.poles,
        }
    }
}

impl From<&weigh_config::StabilityCfg> for StabilityCfg {
    fn from(c: &weigh_config::StabilityCfg) -> Self {
        Self {
            window: c.window,
            spread_counts: c.spread_counts as f64,
            zero_band_counts: c.zero_band_counts as f64,
            standard_cutoff_pct: c.standard_cutoff_pct,
            standard_poles: c.standard_poles,
            fill_cutoff_pct: c.fill_cutoff_pct,
            fill_poles: c.fill_poles,
        }
    }
}

impl From<&weigh_config::MotionCfg> for MotionCfg {
    fn from(c: &weigh_config::MotionCfg) -> Self {
        Self {
            range_counts: c.range_counts as f64,
            settling_cycles: c.settling_cycles,
        }
    }
}

impl From<&weigh_config::ZeroCfg> for ZeroCfg {
    fn from(c: &weigh_config::ZeroCfg) -> Self {
        Self {
            powerup_positive_pct: c.powerup_positive_pct,
            powerup_negative_pct: c.powerup_negative_pct,
            pushbutton_positive_pct: c.pushbutton_positive_pct,
            pushbutton_negative_pct: c.pushbutton_negative_pct,
            azm_enabled: c.azm_enabled,
            azm_window_inc: c.azm_window_inc,
            azm_adjust_counts: c.azm_adjust_counts,
            center_band_inc: c.center_band_inc,
            under_zero_inc: c.under_zero_inc,
            clears_tare: c.clears_tare,
        }
    }
}

impl From<&weigh_config::TareCfg> for TareCfg {
    fn from(c: &weigh_config::TareCfg) -> Self {
        Self {
            auto_tare_threshold: c.auto_tare_threshold,
            auto_clear_threshold: c.auto_clear_threshold,
            auto_clear_requires_stable: c.auto_clear_requires_stable,
            net_sign_correction: match c.net_sign_correction {
                weigh_config::NetSignCorrection::Off => NetSignCorrection::Off,
                weigh_config::NetSignCorrection::Swap => NetSignCorrection::SwapGrossAndTare,
            },
        }
    }
}

impl From<&weigh_config::CalibrationCfg> for CaptureCfg {
    fn from(c: &weigh_config::CalibrationCfg) -> Self {
        Self {
            samples: c.capture_samples,
            timeout_cycles: c.capture_timeout_cycles,
        }
    }
}

impl From<&weigh_config::Config> for PipelineCfg {
    fn from(c: &weigh_config::Config) -> Self {
        Self {
            sampling: (&c.sampling).into(),
            notch: (&c.notch).into(),
            filter: (&c.filter).into(),
            stability: (&c.stability).into(),
            motion: (&c.motion).into(),
            zero: (&c.zero).into(),
            tare: (&c.tare).into(),
            capture: (&c.calibration).into(),
        }
    }
}

impl From<weigh_config::UnitToml> for Unit {
    fn from(u: weigh_config::UnitToml) -> Self {
        match u {
            weigh_config::UnitToml::G => Unit::Gram,
            weigh_config::UnitToml::Kg => Unit::Kilogram,
            weigh_config::UnitToml::Lb => Unit::Pound,
            weigh_config::UnitToml::Oz => Unit::Ounce,
            weigh_config::UnitToml::T => Unit::Tonne,
            weigh_config::UnitToml::Ton => Unit::Ton,
            weigh_config::UnitToml::Custom => Unit::Custom,
        }
    }
}

impl From<&weigh_config::ScaleCfg> for UnitSet {
    fn from(c: &weigh_config::ScaleCfg) -> Self {
        Self {
            calibration: c.calibration_unit.into(),
            primary: c.primary_unit.into(),
            secondary: c.secondary_unit.into(),
            custom_grams: c.custom_grams_per_unit,
        }
    }
}

impl TryFrom<&weigh_config::ScaleCfg> for ScaleParams {
    type Error = WeighError;

    fn try_from(c: &weigh_config::ScaleCfg) -> Result<Self, Self::Error> {
        let trade_mode = match c.trade_mode {
            weigh_config::TradeMode::Industrial => TradeMode::Industrial,
            weigh_config::TradeMode::Legal => TradeMode::LegalForTrade,
        };
        ScaleParams::new(
            c.capacity,
            c.increment,
            c.ranges,
            trade_mode,
            c.into(),
            c.over_capacity_inc,
        )
    }
}

/// Calibration given inline in the config, if any, with the configured geo codes
/// and number of test points.
pub fn calibration_from_config(
    c: &weigh_config::Config,
) -> Result<Option<CalibrationPoints>, WeighError> {
    let Some(p) = c.cal_points.as_ref() else {
        return Ok(None);
    };
    let mut cal =
        CalibrationPoints::from_points(p.zero_counts, &p.points, c.geo.cal_code, c.geo.usr_code)?;
    if c.calibration.upscale_test_points != cal.upscale_test_points() {
        cal.set_upscale_test_points(c.calibration.upscale_test_points);
    }
    Ok(Some(cal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_converts() {
        let cfg = weigh_config::load_toml(
            r#"
            [notch]
            kind = "comb"
            frequency_hz = 60.0
            [tare]
            net_sign_correction = "swap"
            [scale]
            capacity = 30.0
            increment = 0.005
            ranges = 3
            trade_mode = "legal"
            primary_unit = "g"
            [calibration]
            upscale_test_points = 2
            [cal_points]
            zero_counts = 100.0
            points = [[5100.0, 15.0], [10100.0, 30.0]]
            "#,
        )
        .unwrap();
        let p = PipelineCfg::from(&cfg);
        assert_eq!(p.notch.mode, NotchMode::Comb);
        assert_eq!(p.tare.net_sign_correction, NetSignCorrection::SwapGrossAndTare);
        let params = ScaleParams::try_from(&cfg.scale).unwrap();
        assert_eq!(params.trade_mode(), TradeMode::LegalForTrade);
        assert_eq!(params.units().primary, Unit::Gram);
        assert_eq!(params.increments(), &[0.005, 0.01, 0.02]);
        let cal = calibration_from_config(&cfg).unwrap().unwrap();
        assert_eq!(cal.upscale_test_points(), 2);
        assert_eq!(cal.base_span(), 15.0 / 5_000.0);
    }

    #[test]
    fn missing_cal_points_is_none() {
        let cfg = weigh_config::load_toml("").unwrap();
        assert!(calibration_from_config(&cfg).unwrap().is_none());
    }
}
