//! Weight units and increment normalisation.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Gram,
    Kilogram,
    Pound,
    Ounce,
    Tonne,
    /// US short ton.
    Ton,
    Custom,
}

impl Unit {
    pub const ALL: [Unit; 7] = [
        Unit::Gram,
        Unit::Kilogram,
        Unit::Pound,
        Unit::Ounce,
        Unit::Tonne,
        Unit::Ton,
        Unit::Custom,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Pound => "lb",
            Unit::Ounce => "oz",
            Unit::Tonne => "t",
            Unit::Ton => "ton",
            Unit::Custom => "cu",
        }
    }

    /// Stable code used when the unit is persisted.
    pub fn code(self) -> i32 {
        match self {
            Unit::Gram => 0,
            Unit::Kilogram => 1,
            Unit::Pound => 2,
            Unit::Ounce => 3,
            Unit::Tonne => 4,
            Unit::Ton => 5,
            Unit::Custom => 6,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|u| u.code() == code)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unit ratios, with the custom unit's size supplied by configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    custom_grams: f64,
}

impl Default for UnitConverter {
    fn default() -> Self {
        Self { custom_grams: 1.0 }
    }
}

impl UnitConverter {
    pub fn new(custom_grams: Option<f64>) -> Self {
        Self {
            custom_grams: custom_grams.filter(|g| g.is_finite() && *g > 0.0).unwrap_or(1.0),
        }
    }

    pub fn grams_per_unit(&self, unit: Unit) -> f64 {
        match unit {
            Unit::Gram => 1.0,
            Unit::Kilogram => 1_000.0,
            Unit::Pound => 453.592_37,
            Unit::Ounce => 28.349_523_125,
            Unit::Tonne => 1_000_000.0,
            Unit::Ton => 907_184.74,
            Unit::Custom => self.custom_grams,
        }
    }

    pub fn convert(&self, src: Unit, dst: Unit, weight: f64) -> f64 {
        if src == dst {
            return weight;
        }
        weight * self.grams_per_unit(src) / self.grams_per_unit(dst)
    }
}

fn pow10(k: i32) -> f64 {
    if k >= 0 {
        10f64.powi(k)
    } else {
        1.0 / 10f64.powi(-k)
    }
}

/// Largest power of ten not above `x` (x > 0).
fn floor_pow10(x: f64) -> i32 {
    let mut k = x.log10().floor() as i32;
    // log10 can land one off near exact powers of ten.
    if pow10(k) > x {
        k -= 1;
    }
    if pow10(k + 1) <= x {
        k += 1;
    }
    k
}

/// Snap an increment to the nearest of `{1, 2, 5, 10} x 10^k` where `10^k` is
/// the largest power of ten not above it. Ties go to the smaller candidate.
/// Non-positive or non-finite input is returned unchanged.
pub fn round_to_nearest_1_2_5(inc: f64) -> f64 {
    if !(inc.is_finite() && inc > 0.0) {
        return inc;
    }
    let k = floor_pow10(inc);
    let p = pow10(k);
    let candidates = [p, 2.0 * p, 5.0 * p, pow10(k + 1)];
    let mut best = candidates[0];
    let mut best_dist = (inc - best).abs();
    for &c in &candidates[1..] {
        let d = (inc - c).abs();
        if d < best_dist {
            best = c;
            best_dist = d;
        }
    }
    best
}

/// Next step in the 1-2-5 sequence above a normalised increment.
pub fn next_1_2_5(inc: f64) -> f64 {
    let inc = round_to_nearest_1_2_5(inc);
    if !(inc.is_finite() && inc > 0.0) {
        return inc;
    }
    let k = floor_pow10(inc);
    let p = pow10(k);
    let mantissa = (inc / p).round();
    if mantissa < 2.0 {
        2.0 * p
    } else if mantissa < 5.0 {
        5.0 * p
    } else {
        pow10(k + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.02, 0.02)]
    #[case(0.03, 0.02)]
    #[case(0.04, 0.05)]
    #[case(0.5, 0.5)]
    #[case(7.0, 5.0)]
    #[case(8.0, 10.0)]
    #[case(1.5, 1.0)]
    #[case(3.5, 2.0)]
    #[case(1_000.0, 1_000.0)]
    #[case(0.001, 0.001)]
    fn rounds_to_sequence(#[case] inc: f64, #[case] expect: f64) {
        assert_eq!(round_to_nearest_1_2_5(inc), expect);
    }

    #[rstest]
    #[case(0.01, 0.02)]
    #[case(0.02, 0.05)]
    #[case(0.05, 0.1)]
    #[case(5.0, 10.0)]
    fn next_step(#[case] inc: f64, #[case] expect: f64) {
        assert_eq!(next_1_2_5(inc), expect);
    }

    #[test]
    fn same_unit_is_identity() {
        let u = UnitConverter::default();
        assert_eq!(u.convert(Unit::Pound, Unit::Pound, 1.234), 1.234);
        assert_eq!(u.convert(Unit::Kilogram, Unit::Gram, 2.0), 2_000.0);
    }

    #[test]
    fn custom_unit_uses_configured_ratio() {
        let u = UnitConverter::new(Some(250.0));
        assert_eq!(u.convert(Unit::Kilogram, Unit::Custom, 1.0), 4.0);
        assert_eq!(UnitConverter::new(Some(-1.0)).grams_per_unit(Unit::Custom), 1.0);
    }

    #[test]
    fn unit_codes_round_trip() {
        for u in Unit::ALL {
            assert_eq!(Unit::from_code(u.code()), Some(u));
        }
        assert_eq!(Unit::from_code(42), None);
    }

    proptest! {
        #[test]
        fn rounding_is_idempotent(inc in 1.0e-6f64..1.0e6) {
            let once = round_to_nearest_1_2_5(inc);
            prop_assert_eq!(round_to_nearest_1_2_5(once), once);
        }

        #[test]
        fn conversion_round_trips(a in 0usize..7, b in 0usize..7, w in -1.0e6f64..1.0e6) {
            let u = UnitConverter::new(Some(123.45));
            let (ua, ub) = (Unit::ALL[a], Unit::ALL[b]);
            let back = u.convert(ub, ua, u.convert(ua, ub, w));
            prop_assert!((back - w).abs() <= 1e-9 * w.abs().max(1.0));
        }
    }
}
