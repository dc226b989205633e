#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and calibration parsing for the weighing instrument.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The calibration CSV loader enforces headers and point ordering before the
//!   points are handed to the calibration engine.
use serde::Deserialize;

/// Calibration CSV schema.
///
/// Expected headers:
/// counts,weight
///
/// The row with `weight == 0` is the zero point; every other row is an upscale
/// test point in ascending load order.
///
/// Example:
/// counts,weight
/// 1000,0.0
/// 5000,50.0
/// 9000,100.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub counts: f64,
    pub weight: f64,
}

/// Most test points a calibration may carry.
pub const MAX_TEST_POINTS: usize = 4;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SamplingCfg {
    /// Weight cycles per second.
    pub rate_hz: u32,
    /// Precision widening applied by the notch stage: 4 (x16) or 5 (x32).
    pub widen_shift: u8,
    /// Load-cell channel read by the pipeline.
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

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotchKind {
    #[default]
    None,
    Comb,
    Averager,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NotchCfg {
    pub kind: NotchKind,
    /// Interference frequency to suppress (mains, motor hum).
    pub frequency_hz: f64,
}

impl Default for NotchCfg {
    fn default() -> Self {
        Self {
            kind: NotchKind::None,
            frequency_hz: 50.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FilterCfg {
    /// Low-pass cutoff in Hz (0.1..=9.9).
    pub cutoff_hz: f64,
    /// Requested pole count (2..=8); quantised to 4, 6 or 8.
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StabilityCfg {
    /// Raw samples tracked for the spread test.
    pub window: usize,
    /// Spread (max - min, counts) below which the fill-noise set is used.
    pub spread_counts: i64,
    /// Distance from current zero (counts) within which the fill-noise set is used.
    pub zero_band_counts: i64,
    /// Standard chain cutoff as a percentage of the sampling rate.
    pub standard_cutoff_pct: f64,
    pub standard_poles: u8,
    /// Fill-noise chain cutoff as a percentage of the sampling rate.
    pub fill_cutoff_pct: f64,
    pub fill_poles: u8,
}

impl Default for StabilityCfg {
    fn default() -> Self {
        Self {
            window: 20,
            spread_counts: 40,
            zero_band_counts: 20,
            standard_cutoff_pct: 5.0,
            standard_poles: 2,
            fill_cutoff_pct: 0.5,
            fill_poles: 4,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotionCfg {
    /// Consecutive-reading delta (counts) that counts as motion.
    pub range_counts: i64,
    /// Consecutive quiet readings required before the scale is settled.
    pub settling_cycles: u32,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            range_counts: 30,
            settling_cycles: 8,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ZeroCfg {
    /// Power-up zero window above calibrated zero, percent of capacity.
    pub powerup_positive_pct: f64,
    /// Power-up zero window below calibrated zero, percent of capacity.
    pub powerup_negative_pct: f64,
    /// Push-button zero limit above power-up zero, percent of capacity.
    pub pushbutton_positive_pct: f64,
    /// Push-button zero limit below power-up zero, percent of capacity.
    pub pushbutton_negative_pct: f64,
    pub azm_enabled: bool,
    /// AZM capture window around current zero, in increments.
    pub azm_window_inc: f64,
    /// Largest AZM correction per cycle, in counts.
    pub azm_adjust_counts: f64,
    /// Center-of-zero band, in increments.
    pub center_band_inc: f64,
    /// Gross weight below -N increments raises the under-zero flag.
    pub under_zero_inc: f64,
    /// A zero command in net mode clears the tare instead of failing.
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

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetSignCorrection {
    #[default]
    Off,
    Swap,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TareCfg {
    /// Gross weight that triggers an auto tare (0 disables).
    pub auto_tare_threshold: f64,
    /// Gross weight below which an armed tare is cleared (0 disables).
    pub auto_clear_threshold: f64,
    /// Only auto-clear when the scale is settled.
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

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnitToml {
    G,
    Kg,
    Lb,
    Oz,
    T,
    Ton,
    Custom,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    #[default]
    Industrial,
    Legal,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScaleCfg {
    /// Capacity in calibration units.
    pub capacity: f64,
    /// Display increment of the first range, in calibration units.
    pub increment: f64,
    /// Weighing ranges (1..=3).
    pub ranges: u8,
    pub trade_mode: TradeMode,
    pub calibration_unit: UnitToml,
    pub primary_unit: UnitToml,
    pub secondary_unit: UnitToml,
    /// Grams per custom unit; required when any unit is `custom`.
    pub custom_grams_per_unit: Option<f64>,
    /// Increments above capacity before the over-capacity flag is raised.
    pub over_capacity_inc: f64,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            capacity: 100.0,
            increment: 0.02,
            ranges: 1,
            trade_mode: TradeMode::Industrial,
            calibration_unit: UnitToml::Kg,
            primary_unit: UnitToml::Kg,
            secondary_unit: UnitToml::Lb,
            custom_grams_per_unit: None,
            over_capacity_inc: 9.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeoCfg {
    /// Geo code the calibration was performed at (0..=31).
    pub cal_code: u8,
    /// Geo code of the installation site (0..=31).
    pub usr_code: u8,
}

impl Default for GeoCfg {
    fn default() -> Self {
        Self {
            cal_code: 16,
            usr_code: 16,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Upscale test points in use (1..=4).
    pub upscale_test_points: u8,
    /// Stable samples averaged per captured point.
    pub capture_samples: u32,
    /// Cycles a capture may take before it aborts.
    pub capture_timeout_cycles: u32,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            upscale_test_points: 1,
            capture_samples: 30,
            capture_timeout_cycles: 300,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HardwareCfg {
    /// HX711 data pin (BCM numbering).
    pub dt_pin: u8,
    /// HX711 clock pin (BCM numbering).
    pub sck_pin: u8,
    /// Noise bits dropped from each 24-bit conversion.
    pub data_shift: u8,
    /// Longest wait for one conversion before the read is a timeout.
    pub sensor_read_timeout_ms: u64,
}

impl Default for HardwareCfg {
    fn default() -> Self {
        Self {
            dt_pin: 5,
            sck_pin: 6,
            data_shift: 4,
            sensor_read_timeout_ms: 150,
        }
    }
}

/// Simulated load cell used when the binary is built without hardware.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationCfg {
    pub zero_counts: i32,
    /// Counts per calibration unit of load.
    pub counts_per_unit: f64,
    /// Peak uniform noise in counts.
    pub noise_counts: f64,
    /// Peak mains hum in counts, at `notch.frequency_hz`.
    pub hum_counts: f64,
}

impl Default for SimulationCfg {
    fn default() -> Self {
        Self {
            zero_counts: 500,
            counts_per_unit: 100.0,
            noise_counts: 2.0,
            hum_counts: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct StorageCfg {
    /// Directory holding parameter blocks; in-memory store when absent.
    pub dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sampling: SamplingCfg,
    #[serde(default)]
    pub notch: NotchCfg,
    #[serde(default)]
    pub filter: FilterCfg,
    #[serde(default)]
    pub stability: StabilityCfg,
    #[serde(default)]
    pub motion: MotionCfg,
    #[serde(default)]
    pub zero: ZeroCfg,
    #[serde(default)]
    pub tare: TareCfg,
    #[serde(default)]
    pub scale: ScaleCfg,
    #[serde(default)]
    pub geo: GeoCfg,
    #[serde(default)]
    pub calibration: CalibrationCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub storage: StorageCfg,
    #[serde(default)]
    pub hardware: HardwareCfg,
    #[serde(default)]
    pub simulation: SimulationCfg,
    /// Optional calibration points; preferred at start-up over an empty store.
    #[serde(default)]
    pub cal_points: Option<PersistedCalibration>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PersistedCalibration {
    /// Zero reference in raw counts.
    pub zero_counts: f64,
    /// Upscale test points as `[counts, weight]`, ascending.
    #[serde(default)]
    pub points: Vec<(f64, f64)>,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl PersistedCalibration {
    /// Build calibration points from CSV rows.
    ///
    /// Exactly one row must carry `weight == 0` (the zero point); the remaining
    /// rows must be strictly increasing in both counts and weight.
    pub fn from_rows(rows: Vec<CalibrationRow>) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires a zero row and at least one test point, got {} rows", rows.len());
        }
        for (i, r) in rows.iter().enumerate() {
            if !r.counts.is_finite() || !r.weight.is_finite() {
                eyre::bail!("calibration row {} has a non-finite value", i);
            }
            if r.weight < 0.0 {
                eyre::bail!("calibration row {} has a negative weight", i);
            }
        }

        let zeros: Vec<&CalibrationRow> = rows.iter().filter(|r| r.weight == 0.0).collect();
        let zero_counts = match zeros.as_slice() {
            [z] => z.counts,
            [] => eyre::bail!("calibration requires one zero row (weight = 0)"),
            _ => eyre::bail!("calibration has {} zero rows, expected one", zeros.len()),
        };

        let points: Vec<(f64, f64)> = rows
            .iter()
            .filter(|r| r.weight > 0.0)
            .map(|r| (r.counts, r.weight))
            .collect();
        if points.len() > MAX_TEST_POINTS {
            eyre::bail!(
                "calibration supports at most {} test points, got {}",
                MAX_TEST_POINTS,
                points.len()
            );
        }

        let mut prev = (zero_counts, 0.0);
        for (i, &(counts, weight)) in points.iter().enumerate() {
            if counts == prev.0 {
                eyre::bail!("calibration rows have duplicate counts at test point {}", i + 1);
            }
            if counts < prev.0 {
                eyre::bail!("calibration counts must increase with load (test point {})", i + 1);
            }
            if weight <= prev.1 {
                eyre::bail!("calibration weights must increase (test point {})", i + 1);
            }
            prev = (counts, weight);
        }

        Ok(Self {
            zero_counts,
            points,
        })
    }
}

// Ergonomic conversions for building calibration points
impl TryFrom<Vec<CalibrationRow>> for PersistedCalibration {
    type Error = eyre::Report;
    fn try_from(rows: Vec<CalibrationRow>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl TryFrom<&[CalibrationRow]> for PersistedCalibration {
    type Error = eyre::Report;
    fn try_from(rows: &[CalibrationRow]) -> Result<Self, Self::Error> {
        Self::from_rows(rows.to_vec())
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<PersistedCalibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["counts", "weight"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'counts,weight', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    PersistedCalibration::try_from(rows)
}

impl ScaleCfg {
    fn uses_custom_unit(&self) -> bool {
        [self.calibration_unit, self.primary_unit, self.secondary_unit].contains(&UnitToml::Custom)
    }
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Sampling
        if self.sampling.rate_hz == 0 {
            eyre::bail!("sampling.rate_hz must be > 0");
        }
        if !(4..=5).contains(&self.sampling.widen_shift) {
            eyre::bail!("sampling.widen_shift must be 4 or 5");
        }

        // Notch
        if self.notch.kind != NotchKind::None
            && !(self.notch.frequency_hz.is_finite() && self.notch.frequency_hz > 0.0)
        {
            eyre::bail!("notch.frequency_hz must be > 0 when a notch is enabled");
        }

        // Filter
        if !(0.1..=9.9).contains(&self.filter.cutoff_hz) {
            eyre::bail!("filter.cutoff_hz must be in [0.1, 9.9]");
        }
        if !(2..=8).contains(&self.filter.poles) {
            eyre::bail!("filter.poles must be in [2, 8]");
        }

        // Stability
        if self.stability.window == 0 {
            eyre::bail!("stability.window must be >= 1");
        }
        if self.stability.spread_counts < 0 || self.stability.zero_band_counts < 0 {
            eyre::bail!("stability thresholds must be >= 0");
        }
        for (name, poles) in [
            ("stability.standard_poles", self.stability.standard_poles),
            ("stability.fill_poles", self.stability.fill_poles),
        ] {
            if !matches!(poles, 2 | 4 | 6 | 8) {
                eyre::bail!("{name} must be one of 2, 4, 6, 8");
            }
        }
        for (name, pct) in [
            ("stability.standard_cutoff_pct", self.stability.standard_cutoff_pct),
            ("stability.fill_cutoff_pct", self.stability.fill_cutoff_pct),
        ] {
            if !(pct > 0.0 && pct < 50.0) {
                eyre::bail!("{name} must be in (0.0, 50.0)");
            }
        }

        // Motion
        if self.motion.range_counts < 0 {
            eyre::bail!("motion.range_counts must be >= 0");
        }

        // Zero
        for (name, v) in [
            ("zero.powerup_positive_pct", self.zero.powerup_positive_pct),
            ("zero.powerup_negative_pct", self.zero.powerup_negative_pct),
            ("zero.pushbutton_positive_pct", self.zero.pushbutton_positive_pct),
            ("zero.pushbutton_negative_pct", self.zero.pushbutton_negative_pct),
        ] {
            if !(0.0..=100.0).contains(&v) {
                eyre::bail!("{name} must be in [0.0, 100.0]");
            }
        }
        if self.zero.azm_window_inc < 0.0 || self.zero.azm_adjust_counts < 0.0 {
            eyre::bail!("zero.azm_* values must be >= 0");
        }
        if self.zero.center_band_inc < 0.0 || self.zero.under_zero_inc < 0.0 {
            eyre::bail!("zero band values must be >= 0");
        }

        // Tare
        if self.tare.auto_tare_threshold < 0.0 || self.tare.auto_clear_threshold < 0.0 {
            eyre::bail!("tare thresholds must be >= 0");
        }

        // Scale
        if !(self.scale.capacity.is_finite() && self.scale.capacity > 0.0) {
            eyre::bail!("scale.capacity must be > 0");
        }
        if !(self.scale.increment.is_finite() && self.scale.increment > 0.0) {
            eyre::bail!("scale.increment must be > 0");
        }
        if !(1..=3).contains(&self.scale.ranges) {
            eyre::bail!("scale.ranges must be in [1, 3]");
        }
        if self.scale.uses_custom_unit() {
            match self.scale.custom_grams_per_unit {
                Some(g) if g.is_finite() && g > 0.0 => {}
                _ => eyre::bail!("scale.custom_grams_per_unit must be > 0 when a custom unit is used"),
            }
        }
        if self.scale.over_capacity_inc < 0.0 {
            eyre::bail!("scale.over_capacity_inc must be >= 0");
        }

        // Geo
        if self.geo.cal_code > 31 || self.geo.usr_code > 31 {
            eyre::bail!("geo codes must be in [0, 31]");
        }

        // Hardware
        if self.hardware.sensor_read_timeout_ms == 0 {
            eyre::bail!("hardware.sensor_read_timeout_ms must be > 0");
        }
        if self.hardware.data_shift > 8 {
            eyre::bail!("hardware.data_shift must be in [0, 8]");
        }
        if !(self.simulation.counts_per_unit.is_finite() && self.simulation.counts_per_unit > 0.0) {
            eyre::bail!("simulation.counts_per_unit must be > 0");
        }
        if self.simulation.noise_counts < 0.0 || self.simulation.hum_counts < 0.0 {
            eyre::bail!("simulation amplitudes must be >= 0");
        }

        // Calibration
        if !(1..=MAX_TEST_POINTS as u8).contains(&self.calibration.upscale_test_points) {
            eyre::bail!("calibration.upscale_test_points must be in [1, 4]");
        }
        if self.calibration.capture_samples == 0 {
            eyre::bail!("calibration.capture_samples must be >= 1");
        }
        if self.calibration.capture_timeout_cycles < self.calibration.capture_samples {
            eyre::bail!("calibration.capture_timeout_cycles must be >= capture_samples");
        }
        if let Some(cal) = &self.cal_points {
            let rows: Vec<CalibrationRow> = std::iter::once(CalibrationRow {
                counts: cal.zero_counts,
                weight: 0.0,
            })
            .chain(cal.points.iter().map(|&(counts, weight)| CalibrationRow { counts, weight }))
            .collect();
            PersistedCalibration::from_rows(rows)
                .map_err(|e| eyre::eyre!("cal_points invalid: {e}"))?;
        }

        Ok(())
    }
}
