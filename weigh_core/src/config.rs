//! Runtime configuration for the weighing pipeline.
//!
//! These are the structs the scale actually runs on. They are separate from the
//! TOML-deserialized config in `weigh_config`; see `conversions` for the bridge.

use crate::notch::NotchMode;

/// Sampling and widening.
#[derive(Debug, Clone)]
pub struct SamplingCfg {
    /// Weight cycles per second.
    pub rate_hz: u32,
    /// Notch widening shift: 4 (x16) or 5 (x32).
    pub widen_shift: u8,
    /// Channel read from the sample source.
    pub channel: u8,
}

impl Default for SamplingCfg {
    fn default() -> Self {
        Self {
            rate_hz: 80,
            widen_shift: 4,
            channel: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotchCfg {
    pub mode: NotchMode,
    pub frequency_hz: f64,
}

impl Default for NotchCfg {
    fn default() -> Self {
        Self {
            mode: NotchMode::None,
            frequency_hz: 50.0,
        }
    }
}

/// Mayer low-pass request.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCfg {
    /// Overall cutoff in Hz (0.1..=9.9).
    pub cutoff_hz: f64,
    /// Requested poles (2..=8).
    pub poles: u8,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            cutoff_hz: 2.0,
            poles: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StabilityCfg {
    pub window: usize,
    /// Raw spread (counts) under which the fill-noise set engages.
    pub spread_counts: f64,
    /// Raw distance from current zero (counts) within which the fill-noise set engages.
    pub zero_band_counts: f64,
    pub standard_cutoff_pct: f64,
    pub standard_poles: u8,
    pub fill_cutoff_pct: f64,
    pub fill_poles: u8,
}

impl Default for StabilityCfg {
    fn default() -> Self {
        Self {
            window: 20,
            spread_counts: 40.0,
            zero_band_counts: 20.0,
            standard_cutoff_pct: 5.0,
            standard_poles: 2,
            fill_cutoff_pct: 0.5,
            fill_poles: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MotionCfg {
    pub range_counts: f64,
    pub settling_cycles: u32,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            range_counts: 30.0,
            settling_cycles: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZeroCfg {
    pub powerup_positive_pct: f64,
    pub powerup_negative_pct: f64,
    pub pushbutton_positive_pct: f64,
    pub pushbutton_negative_pct: f64,
    pub azm_enabled: bool,
    /// AZM capture window, in increments.
    pub azm_window_inc: f64,
    /// Largest AZM step per cycle, in counts.
    pub azm_adjust_counts: f64,
    pub center_band_inc: f64,
    pub under_zero_inc: f64,
    pub clears_tare: bool,
}

impl Default for ZeroCfg {
    fn default() -> Self {
        Self {
            powerup_positive_pct: 10.0,
            powerup_negative_pct: 10.0,
            pushbutton_positive_pct: 2.0,
            pushbutton_negative_pct: 2.0,
            azm_enabled: true,
            azm_window_inc: 0.5,
            azm_adjust_counts: 1.0,
            center_band_inc: 0.25,
            under_zero_inc: 20.0,
            clears_tare: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetSignCorrection {
    #[default]
    Off,
    /// Report a negative net as positive with gross and tare swapped.
    SwapGrossAndTare,
}

#[derive(Debug, Clone)]
pub struct TareCfg {
    /// 0 disables auto tare.
    pub auto_tare_threshold: f64,
    /// 0 disables auto clear.
    pub auto_clear_threshold: f64,
    pub auto_clear_requires_stable: bool,
    pub net_sign_correction: NetSignCorrection,
}

impl Default for TareCfg {
    fn default() -> Self {
        Self {
            auto_tare_threshold: 0.0,
            auto_clear_threshold: 0.0,
            auto_clear_requires_stable: true,
            net_sign_correction: NetSignCorrection::Off,
        }
    }
}

/// Calibration point capture.
#[derive(Debug, Clone)]
pub struct CaptureCfg {
    pub samples: u32,
    pub timeout_cycles: u32,
}

impl Default for CaptureCfg {
    fn default() -> Self {
        Self {
            samples: 30,
            timeout_cycles: 300,
        }
    }
}

/// Everything the pipeline needs besides scale parameters and calibration.
#[derive(Debug, Clone, Default)]
pub struct PipelineCfg {
    pub sampling: SamplingCfg,
    pub notch: NotchCfg,
    pub filter: FilterCfg,
    pub stability: StabilityCfg,
    pub motion: MotionCfg,
    pub zero: ZeroCfg,
    pub tare: TareCfg,
    pub capture: CaptureCfg,
}
