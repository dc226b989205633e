//! Scale parameters: capacity, increments, weighing ranges and display formatting.
//!
//! Capacity and increments are held in calibration units. Multi-range scales
//! step the increment along the 1-2-5 sequence and give every range the same
//! number of divisions, so `limit[i] = divisions * increment[i]`.

use crate::error::WeighError;
use crate::units::{Unit, next_1_2_5, round_to_nearest_1_2_5};

pub const MAX_RANGES: usize = 3;
/// Division limit for legal-for-trade instruments.
pub const LEGAL_MAX_DIVISIONS: f64 = 10_000.0;
/// Width of every formatted weight string.
pub const WEIGHT_FIELD_WIDTH: usize = 8;

const MIN_DIVISIONS: f64 = 100.0;
const MAX_DIVISIONS: f64 = 300_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TradeMode {
    #[default]
    Industrial,
    LegalForTrade,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitSet {
    pub calibration: Unit,
    pub primary: Unit,
    pub secondary: Unit,
    pub custom_grams: Option<f64>,
}

impl Default for UnitSet {
    fn default() -> Self {
        Self {
            calibration: Unit::Kilogram,
            primary: Unit::Kilogram,
            secondary: Unit::Pound,
            custom_grams: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleParams {
    capacity: f64,
    increment: f64,
    ranges: u8,
    trade_mode: TradeMode,
    units: UnitSet,
    over_capacity_inc: f64,
    increments: [f64; MAX_RANGES],
    limits: [f64; MAX_RANGES],
    divisions: f64,
}

impl Default for ScaleParams {
    fn default() -> Self {
        let mut p = Self {
            capacity: 100.0,
            increment: 0.02,
            ranges: 1,
            trade_mode: TradeMode::Industrial,
            units: UnitSet::default(),
            over_capacity_inc: 9.0,
            increments: [0.0; MAX_RANGES],
            limits: [0.0; MAX_RANGES],
            divisions: 0.0,
        };
        p.derive_tables();
        p
    }
}

/// Decimal places needed to show `inc` exactly (0..=6).
pub fn decimals_for(inc: f64) -> usize {
    for d in 0..=6 {
        let scaled = inc * 10f64.powi(d as i32);
        if (scaled - scaled.round()).abs() < 1e-6 * scaled.abs().max(1.0) {
            return d;
        }
    }
    6
}

/// Right-aligned fixed-width weight string; overflow shows a row of `#`.
pub fn format_weight(value: f64, decimals: usize) -> String {
    let s = format!("{:>width$.prec$}", value, width = WEIGHT_FIELD_WIDTH, prec = decimals);
    if s.len() > WEIGHT_FIELD_WIDTH {
        "#".repeat(WEIGHT_FIELD_WIDTH)
    } else {
        s
    }
}

/// Round `value` to a multiple of `inc`.
pub fn round_to_increment(value: f64, inc: f64) -> f64 {
    if inc > 0.0 {
        let r = (value / inc).round() * inc;
        // Avoid printing "-0.00".
        if r == 0.0 { 0.0 } else { r }
    } else {
        value
    }
}

impl ScaleParams {
    pub fn new(
        capacity: f64,
        increment: f64,
        ranges: u8,
        trade_mode: TradeMode,
        units: UnitSet,
        over_capacity_inc: f64,
    ) -> Result<Self, WeighError> {
        let mut p = Self {
            trade_mode,
            units,
            over_capacity_inc: over_capacity_inc.max(0.0),
            ..Self::default()
        };
        p.set_ranges(ranges)?;
        p.set_capacity_and_increment(capacity, increment)?;
        Ok(p)
    }

    /// Validate and apply a capacity/increment pair. The increment is snapped to
    /// the 1-2-5 sequence first; on error nothing changes.
    pub fn set_capacity_and_increment(&mut self, capacity: f64, increment: f64) -> Result<(), WeighError> {
        let inc = round_to_nearest_1_2_5(increment);
        if !(capacity.is_finite() && inc.is_finite() && inc > 0.0) {
            return Err(WeighError::OutOfRange(format!(
                "capacity {capacity} / increment {increment} must be positive"
            )));
        }
        if !(MIN_DIVISIONS * inc < capacity && capacity < MAX_DIVISIONS * inc) {
            return Err(WeighError::OutOfRange(format!(
                "capacity {capacity} must be between {} and {} increments of {inc}",
                MIN_DIVISIONS, MAX_DIVISIONS
            )));
        }
        let top = Self::stepped(inc, self.ranges)[usize::from(self.ranges) - 1];
        let divisions = capacity / top;
        if self.trade_mode == TradeMode::LegalForTrade && divisions > LEGAL_MAX_DIVISIONS {
            return Err(WeighError::OutOfRange(format!(
                "{divisions:.0} divisions exceed the legal-for-trade limit of {LEGAL_MAX_DIVISIONS}"
            )));
        }
        self.capacity = capacity;
        self.increment = inc;
        self.derive_tables();
        tracing::info!(capacity, increment = inc, ranges = self.ranges, "capacity and increment set");
        Ok(())
    }

    pub fn set_ranges(&mut self, ranges: u8) -> Result<(), WeighError> {
        if !(1..=MAX_RANGES as u8).contains(&ranges) {
            return Err(WeighError::OutOfRange(format!("ranges {ranges} not in 1..=3")));
        }
        self.ranges = ranges;
        self.derive_tables();
        Ok(())
    }

    fn stepped(inc: f64, ranges: u8) -> [f64; MAX_RANGES] {
        let mut out = [inc; MAX_RANGES];
        for i in 1..usize::from(ranges.clamp(1, MAX_RANGES as u8)) {
            out[i] = next_1_2_5(out[i - 1]);
        }
        out
    }

    fn derive_tables(&mut self) {
        let n = usize::from(self.ranges);
        self.increments = Self::stepped(self.increment, self.ranges);
        self.divisions = self.capacity / self.increments[n - 1];
        for i in 0..MAX_RANGES {
            self.limits[i] = if i < n {
                self.divisions * self.increments[i]
            } else {
                self.capacity
            };
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
    pub fn increment(&self) -> f64 {
        self.increment
    }
    pub fn ranges(&self) -> u8 {
        self.ranges
    }
    pub fn trade_mode(&self) -> TradeMode {
        self.trade_mode
    }
    pub fn units(&self) -> &UnitSet {
        &self.units
    }
    pub fn divisions(&self) -> f64 {
        self.divisions
    }
    pub fn over_capacity_inc(&self) -> f64 {
        self.over_capacity_inc
    }

    pub fn set_units(&mut self, units: UnitSet) {
        self.units = units;
    }

    /// Increments of the ranges in use.
    pub fn increments(&self) -> &[f64] {
        &self.increments[..usize::from(self.ranges)]
    }

    /// Upper limits of the ranges in use.
    pub fn limits(&self) -> &[f64] {
        &self.limits[..usize::from(self.ranges)]
    }

    /// Range (0-based) a gross weight falls into.
    pub fn range_for(&self, gross: f64) -> usize {
        let n = usize::from(self.ranges);
        self.limits[..n]
            .iter()
            .position(|&l| gross <= l)
            .unwrap_or(n - 1)
    }

    pub fn increment_for(&self, range: usize) -> f64 {
        self.increments[range.min(usize::from(self.ranges) - 1)]
    }

    /// Gross above capacity plus the configured allowance.
    pub fn is_over_capacity(&self, gross: f64) -> bool {
        let top = self.increments[usize::from(self.ranges) - 1];
        gross > self.capacity + self.over_capacity_inc * top
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn params() -> ScaleParams {
        ScaleParams::default()
    }

    #[rstest]
    #[case(20.0, 0.1, true)]
    #[case(5.0, 0.1, false)]
    #[case(10.0, 0.1, false)]
    #[case(30_000.0, 0.1, false)]
    #[case(29_999.0, 0.1, true)]
    fn capacity_increment_acceptance(#[case] cap: f64, #[case] inc: f64, #[case] ok: bool) {
        let mut p = params();
        assert_eq!(p.set_capacity_and_increment(cap, inc).is_ok(), ok);
    }

    #[test]
    fn rejection_leaves_params_unchanged() {
        let mut p = params();
        let before = p.clone();
        assert!(p.set_capacity_and_increment(5.0, 0.1).is_err());
        assert_eq!(p, before);
    }

    #[test]
    fn increment_is_snapped() {
        let mut p = params();
        p.set_capacity_and_increment(60.0, 0.03).unwrap();
        assert_eq!(p.increment(), 0.02);
    }

    #[test]
    fn legal_for_trade_caps_divisions() {
        let mut p = ScaleParams::new(10.0, 0.01, 1, TradeMode::LegalForTrade, UnitSet::default(), 9.0)
            .unwrap();
        assert!(p.set_capacity_and_increment(200.0, 0.01).is_err());
        assert!(p.set_capacity_and_increment(100.0, 0.01).is_ok());
    }

    #[test]
    fn multi_range_tables() {
        let p = ScaleParams::new(30.0, 0.005, 3, TradeMode::Industrial, UnitSet::default(), 9.0)
            .unwrap();
        assert_eq!(p.increments(), &[0.005, 0.01, 0.02]);
        assert_eq!(p.divisions(), 1_500.0);
        assert_eq!(p.limits(), &[7.5, 15.0, 30.0]);
        assert_eq!(p.range_for(3.0), 0);
        assert_eq!(p.range_for(10.0), 1);
        assert_eq!(p.range_for(29.0), 2);
        assert_eq!(p.range_for(40.0), 2);
    }

    #[test]
    fn over_capacity_allows_nine_increments() {
        let p = params();
        assert!(!p.is_over_capacity(100.18));
        assert!(p.is_over_capacity(100.2));
    }

    #[rstest]
    #[case(0.02, 2)]
    #[case(0.5, 1)]
    #[case(5.0, 0)]
    #[case(0.001, 3)]
    fn decimals_from_increment(#[case] inc: f64, #[case] d: usize) {
        assert_eq!(decimals_for(inc), d);
    }

    #[test]
    fn strings_are_fixed_width() {
        assert_eq!(format_weight(12.34, 2), "   12.34");
        assert_eq!(format_weight(-0.5, 1), "    -0.5");
        assert_eq!(format_weight(123_456_789.0, 0), "########");
        assert_eq!(round_to_increment(-0.004, 0.02), 0.0);
        assert_eq!(format_weight(round_to_increment(-0.004, 0.02), 2), "    0.00");
    }
}
