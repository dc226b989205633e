//! Mayer low-pass cascade: 2, 4, 6 or 8 poles built from identical 2-pole cells.
//!
//! Every cell shares one numerator `a` taken from a table of power-of-two ratios.
//! Selection expresses the requested cutoff as a percentage of the sampling
//! rate and snaps it to the nearest tabulated breakpoint.

use crate::reinit::{Reinit, Reinitializable};

/// Cell numerators. Entry 0 bypasses the filter; entries 1..=28 ascend from
/// `3/2^16` to `1/2`, alternating `2^-k` and `3*2^-k`.
pub const NUMERATORS: [f64; 29] = [
    1.0,
    4.577_636_718_75e-5,
    6.103_515_625e-5,
    9.155_273_437_5e-5,
    1.220_703_125e-4,
    1.831_054_687_5e-4,
    2.441_406_25e-4,
    3.662_109_375e-4,
    4.882_812_5e-4,
    7.324_218_75e-4,
    9.765_625e-4,
    1.464_843_75e-3,
    1.953_125e-3,
    2.929_687_5e-3,
    3.906_25e-3,
    5.859_375e-3,
    7.812_5e-3,
    1.171_875e-2,
    1.562_5e-2,
    2.343_75e-2,
    3.125e-2,
    4.687_5e-2,
    6.25e-2,
    9.375e-2,
    0.125,
    0.1875,
    0.25,
    0.375,
    0.5,
];

/// Cutoff breakpoints, in percent of the sampling rate, realised by `NUMERATORS[i + 1]`.
pub const FILTER_PERCENT: [f64; 28] = [
    0.000_728_57,
    0.000_971_434,
    0.001_457_17,
    0.001_942_93,
    0.002_914_48,
    0.003_886_09,
    0.005_829_5,
    0.007_773_14,
    0.011_661_1,
    0.015_550_1,
    0.023_330_8,
    0.031_115_3,
    0.046_695_9,
    0.062_291_6,
    0.093_529_1,
    0.124_828,
    0.187_611,
    0.250_643,
    0.377_46,
    0.505_296,
    0.764_09,
    1.027_16,
    1.566_72,
    2.125_22,
    3.304_68,
    4.578_6,
    7.480_34,
    11.031_8,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoleCount {
    Two,
    Four,
    Six,
    Eight,
}

impl PoleCount {
    /// Quantise a requested pole count the way the cascade is wired:
    /// anything below 5 runs four poles, below 7 six, otherwise eight.
    pub fn quantize(requested: u8) -> Self {
        match requested {
            0..=4 => Self::Four,
            5..=6 => Self::Six,
            _ => Self::Eight,
        }
    }

    pub fn poles(self) -> u8 {
        match self {
            Self::Two => 2,
            Self::Four => 4,
            Self::Six => 6,
            Self::Eight => 8,
        }
    }

    pub fn cells(self) -> usize {
        usize::from(self.poles() / 2)
    }
}

/// Result of mapping a cutoff request onto the numerator table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub numerator_index: usize,
    pub poles: PoleCount,
    /// Requested cutoff, percent of the sampling rate.
    pub requested_pct: f64,
}

impl Selection {
    pub fn numerator(&self) -> f64 {
        NUMERATORS[self.numerator_index]
    }
}

/// Index into [`FILTER_PERCENT`] nearest to `pct`; the first (stiffer) wins a tie.
fn nearest_breakpoint(pct: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, bp) in FILTER_PERCENT.iter().enumerate() {
        let d = (bp - pct).abs();
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}

/// Pick the numerator for an overall cutoff of `cutoff_hz` with `poles` poles at
/// `sample_hz`. Equal distance to two breakpoints resolves to the stiffer one.
pub fn select(cutoff_hz: f64, poles: u8, sample_hz: f64) -> Selection {
    let poles = PoleCount::quantize(poles);
    let pct = 100.0 * cutoff_hz / sample_hz;

    let best = nearest_breakpoint(pct);
    let sel = Selection {
        numerator_index: best + 1,
        poles,
        requested_pct: pct,
    };
    tracing::debug!(
        cutoff_hz,
        poles = poles.poles(),
        pct,
        numerator = sel.numerator(),
        index = sel.numerator_index,
        "low-pass selected"
    );
    sel
}

#[derive(Debug, Clone, Copy, Default)]
struct MayerCell {
    y: f64,
    v: f64,
}

#[derive(Debug, Clone)]
pub struct LowPassFilter {
    a: f64,
    poles: PoleCount,
    cells: Vec<MayerCell>,
}

impl LowPassFilter {
    pub fn new(cutoff_hz: f64, poles: u8, sample_hz: f64) -> Self {
        Self::from_selection(select(cutoff_hz, poles, sample_hz))
    }

    pub fn from_selection(sel: Selection) -> Self {
        Self {
            a: sel.numerator(),
            poles: sel.poles,
            cells: vec![MayerCell::default(); sel.poles.cells()],
        }
    }

    /// Pass-through filter with the given number of (inactive) cells.
    pub fn bypass(poles: PoleCount) -> Self {
        Self {
            a: NUMERATORS[0],
            poles,
            cells: vec![MayerCell::default(); poles.cells()],
        }
    }

    pub fn numerator(&self) -> f64 {
        self.a
    }

    pub fn poles(&self) -> PoleCount {
        self.poles
    }

    pub fn process(&mut self, x: f64) -> f64 {
        let a = self.a;
        let mut x = x;
        for c in &mut self.cells {
            let v = a * (x - c.y + c.v);
            let v = c.v + a * (v - 2.0 * c.v);
            c.y += v;
            c.v = v;
            x = c.y;
        }
        x
    }
}

impl Reinitializable for LowPassFilter {
    fn reinitialize(&mut self, mode: Reinit) {
        let y = match mode {
            Reinit::Clear => 0.0,
            Reinit::Prime(x) => x,
        };
        for c in &mut self.cells {
            *c = MayerCell { y, v: 0.0 };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn tables_are_ascending_and_consistent() {
        for w in NUMERATORS[1..].windows(2) {
            assert!(w[0] < w[1]);
        }
        for w in FILTER_PERCENT.windows(2) {
            assert!(w[0] < w[1]);
        }
        for (i, &pct) in FILTER_PERCENT.iter().enumerate() {
            let a = NUMERATORS[i + 1];
            let expect = 100.0 * -(1.0 - a).ln() / (2.0 * std::f64::consts::PI);
            assert!(((pct - expect) / expect).abs() < 1e-4, "entry {i}");
        }
    }

    #[rstest]
    #[case(1, PoleCount::Four)]
    #[case(4, PoleCount::Four)]
    #[case(5, PoleCount::Six)]
    #[case(6, PoleCount::Six)]
    #[case(7, PoleCount::Eight)]
    #[case(8, PoleCount::Eight)]
    fn pole_quantization(#[case] requested: u8, #[case] expect: PoleCount) {
        assert_eq!(PoleCount::quantize(requested), expect);
    }

    #[test]
    fn two_hz_four_pole_at_80_hz() {
        let sel = select(2.0, 4, 80.0);
        assert_eq!(sel.requested_pct, 2.5);
        // 2.5 % sits closer to 2.125 % than to 3.305 %.
        assert_eq!(sel.numerator(), 0.125);
        assert_eq!(sel.poles, PoleCount::Four);
    }

    #[rstest]
    #[case(0.1, 80.0, 0.125)]
    #[case(1.0, 10.0, 10.0)]
    #[case(9.9, 80.0, 12.375)]
    fn percent_is_cutoff_over_sampling_rate(#[case] hz: f64, #[case] fs: f64, #[case] pct: f64) {
        assert_eq!(select(hz, 8, fs).requested_pct, pct);
    }

    #[test]
    fn wide_cutoff_saturates_at_half() {
        assert_eq!(select(9.9, 4, 10.0).numerator(), 0.5);
    }

    #[test]
    fn nearest_breakpoint_snaps() {
        assert_eq!(nearest_breakpoint(FILTER_PERCENT[10]), 10);
        assert_eq!(nearest_breakpoint(0.0), 0);
        assert_eq!(nearest_breakpoint(100.0), 27);
        let just_below_mid = 0.5 * (FILTER_PERCENT[3] + FILTER_PERCENT[4]) - 1e-9;
        assert_eq!(nearest_breakpoint(just_below_mid), 3);
    }

    #[test]
    fn bypass_passes_input_through() {
        let mut f = LowPassFilter::bypass(PoleCount::Eight);
        for x in [0.0, 5.0, -3.25, 1e6] {
            assert_eq!(f.process(x), x);
        }
    }

    #[test]
    fn step_settles_without_overshoot() {
        let mut f = LowPassFilter::new(2.0, 4, 80.0);
        let mut prev = 0.0;
        for _ in 0..5_000 {
            let y = f.process(1_000.0);
            assert!(y <= 1_000.0 + 1e-9);
            assert!(y >= prev - 1e-9);
            prev = y;
        }
        assert!((prev - 1_000.0).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn primed_cascade_is_identity(idx in 1usize..29, poles in 2u8..=8, x in -1.0e7f64..1.0e7) {
            let mut f = LowPassFilter::from_selection(Selection {
                numerator_index: idx,
                poles: PoleCount::quantize(poles),
                requested_pct: 0.0,
            });
            f.reinitialize(Reinit::Prime(x));
            for _ in 0..50 {
                prop_assert_eq!(f.process(x), x);
            }
        }
    }
}
