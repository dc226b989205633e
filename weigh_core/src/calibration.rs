//! Calibration engine: zero, span and multi-point linearity.
//!
//! A calibration is a zero reference plus up to four upscale test points, all
//! in raw counts. Spans are weight per count measured from the zero. Between
//! consecutive test points a second-order correction is fitted so the curve
//! passes exactly through zero and through both points of the interval:
//!
//! ```text
//! wt1 = w_lo / s ; wt2 = w_hi / s ; R1 = c_lo - zero     (s = span of the upper point)
//! L   = (R1 - wt1) / (wt1 * wt2 - R1^2)
//! S   = 1 / (1 + L * wt2)
//! weight(R) = R * (1 + L * R) * S * s
//! ```

use crate::error::CalibrationError;
use crate::zero::ZeroState;

/// Most upscale test points a calibration holds.
pub const MAX_TEST_POINTS: usize = 4;
/// Span values kept: low, mid and high.
pub const MAX_SPANS: usize = 3;

/// Gravity at geo code 0 and 31 (m/s^2); codes in between are evenly spaced.
pub const GEO_G_MIN: f64 = 9.780_318;
pub const GEO_G_MAX: f64 = 9.832_186;
pub const GEO_CODES: u8 = 32;

/// Local gravity for a geo code (clamped to 0..=31).
pub fn geo_gravity(code: u8) -> f64 {
    let code = code.min(GEO_CODES - 1);
    GEO_G_MIN + f64::from(code) * (GEO_G_MAX - GEO_G_MIN) / f64::from(GEO_CODES - 1)
}

/// Multiplier turning a weight computed with the calibration-site gravity into
/// the weight at the user site.
pub fn geo_factor(cal_geo: u8, usr_geo: u8) -> f64 {
    geo_gravity(cal_geo) / geo_gravity(usr_geo)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestPoint {
    pub counts: f64,
    pub weight: f64,
}

/// Second-order correction for one interval between consecutive test points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinearFactors {
    pub linear_factor: f64,
    pub scale_factor: f64,
    /// Span of the interval's upper point.
    pub span: f64,
    /// Counts (above zero) of the interval's upper point.
    pub upper_counts: f64,
}

impl LinearFactors {
    /// True when the interval was degenerate and the base span applies.
    pub fn is_passthrough(&self) -> bool {
        self.scale_factor == 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationPoints {
    zero_counts: f64,
    points: [Option<TestPoint>; MAX_TEST_POINTS],
    upscale_test_points: u8,
    cal_geo: u8,
    usr_geo: u8,
    base_span: f64,
    spans: Vec<f64>,
    intervals: Vec<LinearFactors>,
}

impl Default for CalibrationPoints {
    fn default() -> Self {
        Self::new(0.0, 1)
    }
}

impl CalibrationPoints {
    pub fn new(zero_counts: f64, upscale_test_points: u8) -> Self {
        Self {
            zero_counts,
            points: [None; MAX_TEST_POINTS],
            upscale_test_points: upscale_test_points.clamp(1, MAX_TEST_POINTS as u8),
            cal_geo: 16,
            usr_geo: 16,
            base_span: 0.0,
            spans: Vec::new(),
            intervals: Vec::new(),
        }
    }

    /// Build from a zero and ascending `(counts, weight)` points; spans and
    /// linearity are computed before returning.
    pub fn from_points(
        zero_counts: f64,
        points: &[(f64, f64)],
        cal_geo: u8,
        usr_geo: u8,
    ) -> Result<Self, CalibrationError> {
        let n = points.len().clamp(1, MAX_TEST_POINTS);
        let mut cal = Self::new(zero_counts, n as u8);
        cal.usr_geo = usr_geo.min(GEO_CODES - 1);
        let mut zero = ZeroState::new(zero_counts);
        for (i, &(counts, weight)) in points.iter().enumerate() {
            cal.adjust_calibration(i as u8 + 1, weight, counts, &mut zero)?;
        }
        cal.cal_geo = cal_geo.min(GEO_CODES - 1);
        Ok(cal)
    }

    pub fn zero_counts(&self) -> f64 {
        self.zero_counts
    }
    pub fn upscale_test_points(&self) -> u8 {
        self.upscale_test_points
    }
    pub fn cal_geo(&self) -> u8 {
        self.cal_geo
    }
    pub fn usr_geo(&self) -> u8 {
        self.usr_geo
    }
    pub fn base_span(&self) -> f64 {
        self.base_span
    }
    /// Spans of the points in use, lowest point first.
    pub fn spans(&self) -> &[f64] {
        &self.spans
    }
    pub fn intervals(&self) -> &[LinearFactors] {
        &self.intervals
    }

    /// Stored test point `testpoint` (1-based), if captured.
    pub fn point(&self, testpoint: u8) -> Option<TestPoint> {
        let i = usize::from(testpoint).checked_sub(1)?;
        self.points.get(i).copied().flatten()
    }

    /// Points in use, ascending by index.
    pub fn active_points(&self) -> impl Iterator<Item = TestPoint> + '_ {
        self.points
            .iter()
            .take(usize::from(self.upscale_test_points))
            .filter_map(|p| *p)
    }

    pub fn is_calibrated(&self) -> bool {
        self.base_span != 0.0
    }

    pub fn geo_factor(&self) -> f64 {
        geo_factor(self.cal_geo, self.usr_geo)
    }

    pub fn set_usr_geo(&mut self, code: u8) {
        self.usr_geo = code.min(GEO_CODES - 1);
    }

    pub(crate) fn set_cal_geo(&mut self, code: u8) {
        self.cal_geo = code.min(GEO_CODES - 1);
    }

    /// Change the number of test points in use. Points above `n` are kept but ignored.
    pub fn set_upscale_test_points(&mut self, n: u8) {
        let n = n.clamp(1, MAX_TEST_POINTS as u8);
        let captured_above = self.points[usize::from(n)..].iter().flatten().count();
        if captured_above > 0 {
            tracing::warn!(
                in_use = n,
                ignored = captured_above,
                "test points above the configured count are ignored"
            );
        }
        self.upscale_test_points = n;
        self.recompute();
    }

    /// Record a calibration capture.
    ///
    /// `testpoint == 0` replaces the zero and shifts every test point by the
    /// same delta, so spans survive a zero recalibration. `1..=N` records the
    /// `(cal_counts, add_load)` pair for that point and syncs `cal_geo` to `usr_geo`.
    pub fn adjust_calibration(
        &mut self,
        testpoint: u8,
        add_load: f64,
        cal_counts: f64,
        zero: &mut ZeroState,
    ) -> Result<(), CalibrationError> {
        if !cal_counts.is_finite() {
            return Err(CalibrationError::NonFiniteCounts);
        }
        if testpoint == 0 {
            let delta = cal_counts - self.zero_counts;
            for p in self.points.iter_mut().flatten() {
                p.counts += delta;
            }
            self.zero_counts = cal_counts;
            zero.recalibrated(cal_counts);
            tracing::info!(zero = cal_counts, delta, "zero calibrated");
        } else {
            if testpoint > self.upscale_test_points {
                return Err(CalibrationError::TestPointOutOfRange(testpoint));
            }
            if !(add_load.is_finite() && add_load > 0.0) {
                return Err(CalibrationError::InvalidLoad(add_load));
            }
            self.points[usize::from(testpoint - 1)] = Some(TestPoint {
                counts: cal_counts,
                weight: add_load,
            });
            self.cal_geo = self.usr_geo;
            tracing::info!(testpoint, counts = cal_counts, load = add_load, "test point calibrated");
        }
        self.recompute();
        Ok(())
    }

    fn recompute(&mut self) {
        self.calculate_span();
        self.calculate_linear();
    }

    /// Span (weight per count) of the low, mid and high points in use; the
    /// lowest present point supplies the base span. A fourth point adds no span
    /// of its own and only takes part in linearity.
    pub fn calculate_span(&mut self) {
        let zero = self.zero_counts;
        self.spans = self
            .active_points()
            .take(MAX_SPANS)
            .map(|p| p.weight / (p.counts - zero))
            .collect();
        self.base_span = self
            .spans
            .first()
            .copied()
            .filter(|s| s.is_finite())
            .unwrap_or(0.0);
        if self.spans.iter().any(|s| !s.is_finite()) {
            tracing::warn!(zero, "test point at zero counts; span undefined");
        }
    }

    /// Linearity factors for each consecutive pair of points in use.
    pub fn calculate_linear(&mut self) {
        let zero = self.zero_counts;
        let pts: Vec<TestPoint> = self.active_points().collect();
        self.intervals = pts
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let (lo, hi) = (pair[0], pair[1]);
                let r1 = lo.counts - zero;
                let r2 = hi.counts - zero;
                // Span of the pair's upper point.
                let s = hi.weight / r2;
                let passthrough = LinearFactors {
                    linear_factor: 0.0,
                    scale_factor: 0.0,
                    span: s,
                    upper_counts: r2,
                };
                if !(r1 > 0.0 && r2 > r1 && s.is_finite() && s != 0.0) {
                    tracing::warn!(interval = i, r1, r2, "degenerate calibration interval; using base span");
                    return passthrough;
                }
                let wt1 = lo.weight / s;
                let wt2 = hi.weight / s;
                let den = wt1 * wt2 - r1 * r1;
                let linear_factor = (r1 - wt1) / den;
                let scale_factor = 1.0 / (1.0 + linear_factor * wt2);
                if !(den != 0.0 && linear_factor.is_finite() && scale_factor.is_finite() && scale_factor != 0.0) {
                    tracing::warn!(interval = i, "calibration interval has no finite fit; using base span");
                    return passthrough;
                }
                LinearFactors {
                    linear_factor,
                    scale_factor,
                    span: s,
                    upper_counts: r2,
                }
            })
            .collect();
    }

    /// Weight (calibration units, before geo) for counts measured above zero.
    pub fn counts_to_weight(&self, net_counts: f64) -> f64 {
        // The first interval also covers the range below its lower point and the
        // last one is extended above the top point.
        let interval = self
            .intervals
            .iter()
            .find(|f| net_counts <= f.upper_counts)
            .or_else(|| self.intervals.last());
        match interval {
            Some(f) if !f.is_passthrough() => {
                net_counts * (1.0 + f.linear_factor * net_counts) * f.scale_factor * f.span
            }
            _ => net_counts * self.base_span,
        }
    }

    /// Counts above zero that read as `weight`, using the base span only.
    pub fn weight_to_counts(&self, weight: f64) -> f64 {
        if self.base_span == 0.0 {
            0.0
        } else {
            weight / self.base_span
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_point() -> CalibrationPoints {
        CalibrationPoints::from_points(1_000.0, &[(5_000.0, 50.0), (9_000.0, 100.0)], 16, 16)
            .unwrap()
    }

    #[test]
    fn two_point_golden_values() {
        let cal = two_point();
        let s = 100.0 / (9_000.0 - 1_000.0);
        assert_eq!(cal.spans(), &[50.0 / 4_000.0, s]);
        assert_eq!(cal.base_span(), 0.0125);
        let f = cal.intervals()[0];
        let wt1 = 50.0 / s;
        let wt2 = 100.0 / s;
        let r1 = 4_000.0;
        let l = (r1 - wt1) / (wt1 * wt2 - r1 * r1);
        assert_eq!(f.linear_factor, l);
        assert_eq!(f.scale_factor, 1.0 / (1.0 + l * wt2));
        assert_eq!(f.linear_factor, 0.0);
        assert_eq!(f.scale_factor, 1.0);
    }

    #[test]
    fn curve_passes_through_every_point() {
        let cal = CalibrationPoints::from_points(
            -200.0,
            &[(3_900.0, 25.0), (8_100.0, 50.0), (12_500.0, 75.0), (17_000.0, 100.0)],
            16,
            16,
        )
        .unwrap();
        assert_eq!(cal.intervals().len(), 3);
        assert_eq!(cal.intervals()[2].span, 100.0 / 17_200.0);
        assert_eq!(cal.counts_to_weight(0.0), 0.0);
        for p in cal.active_points() {
            let w = cal.counts_to_weight(p.counts - cal.zero_counts());
            assert!((w - p.weight).abs() < 1e-9, "{w} vs {}", p.weight);
        }
    }

    #[test]
    fn span_values_follow_the_point_count() {
        let all = [(1_000.0, 10.0), (2_000.0, 20.0), (3_000.0, 30.0), (4_000.0, 40.0)];
        for n in 1..=4 {
            let cal = CalibrationPoints::from_points(0.0, &all[..n], 16, 16).unwrap();
            assert_eq!(cal.spans().len(), n.min(3), "{n} points");
        }
        let cal = CalibrationPoints::from_points(0.0, &all, 16, 16).unwrap();
        assert_eq!(cal.spans(), &[0.01, 0.01, 0.01]);
        assert_eq!(cal.base_span(), 0.01);
    }

    #[test]
    fn single_point_is_linear() {
        let cal = CalibrationPoints::from_points(100.0, &[(2_100.0, 10.0)], 16, 16).unwrap();
        assert!(cal.intervals().is_empty());
        assert_eq!(cal.counts_to_weight(1_000.0), 5.0);
    }

    #[test]
    fn degenerate_interval_falls_back_to_base_span() {
        let mut cal = CalibrationPoints::new(0.0, 2);
        let mut z = ZeroState::new(0.0);
        cal.adjust_calibration(1, 50.0, 5_000.0, &mut z).unwrap();
        cal.adjust_calibration(2, 100.0, 4_000.0, &mut z).unwrap();
        assert!(cal.intervals()[0].is_passthrough());
        assert_eq!(cal.counts_to_weight(2_000.0), 20.0);
    }

    #[test]
    fn zero_recalibration_shifts_points() {
        let mut cal = two_point();
        let mut z = ZeroState::new(1_000.0);
        let span_before = cal.base_span();
        cal.adjust_calibration(0, 0.0, 1_400.0, &mut z).unwrap();
        assert_eq!(cal.zero_counts(), 1_400.0);
        assert_eq!(cal.point(1).map(|p| p.counts), Some(5_400.0));
        assert_eq!(cal.point(2).map(|p| p.counts), Some(9_400.0));
        assert_eq!(cal.base_span(), span_before);
        assert_eq!(z.current_zero(), 1_400.0);
    }

    #[test]
    fn rejects_bad_captures_without_change() {
        let mut cal = two_point();
        let before = cal.clone();
        let mut z = ZeroState::new(1_000.0);
        assert_eq!(
            cal.adjust_calibration(3, 10.0, 100.0, &mut z),
            Err(CalibrationError::TestPointOutOfRange(3))
        );
        assert_eq!(
            cal.adjust_calibration(1, 0.0, 100.0, &mut z),
            Err(CalibrationError::InvalidLoad(0.0))
        );
        assert_eq!(
            cal.adjust_calibration(1, 10.0, f64::NAN, &mut z),
            Err(CalibrationError::NonFiniteCounts)
        );
        assert_eq!(cal, before);
    }

    #[test]
    fn span_point_syncs_cal_geo() {
        let mut cal = CalibrationPoints::new(0.0, 1);
        cal.set_usr_geo(20);
        let mut z = ZeroState::new(0.0);
        cal.adjust_calibration(1, 10.0, 1_000.0, &mut z).unwrap();
        assert_eq!(cal.cal_geo(), 20);
        assert_eq!(cal.geo_factor(), 1.0);
        cal.set_usr_geo(0);
        assert!(cal.geo_factor() > 1.0);
    }

    #[test]
    fn reducing_point_count_ignores_upper_points() {
        let mut cal = two_point();
        cal.set_upscale_test_points(1);
        assert_eq!(cal.spans().len(), 1);
        assert!(cal.intervals().is_empty());
        assert!(cal.point(2).is_some());
    }

    #[test]
    fn geo_table_endpoints() {
        assert_eq!(geo_gravity(0), GEO_G_MIN);
        assert!((geo_gravity(31) - GEO_G_MAX).abs() < 1e-12);
        assert_eq!(geo_gravity(200), geo_gravity(31));
    }
}
