//! Precomputed 2-pole coefficient sets for the stability filter chains.
//!
//! Each set is a cascade of Butterworth sections obtained by matched-z mapping of
//! the analog prototype poles. The catalog is built once on first use and every
//! entry is validated before it can be handed out.

use std::f64::consts::PI;
use std::sync::LazyLock;

use crate::error::WeighError;
use crate::reinit::{Reinit, Reinitializable};

/// Cutoff frequencies in the catalog, as a percentage of the sampling rate.
pub const CATALOG_CUTOFFS_PCT: [f64; 14] = [
    0.05, 0.1, 0.2, 0.3, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 4.0, 5.0, 7.5, 10.0,
];

/// Total pole counts available for every catalog cutoff.
pub const CATALOG_POLES: [u8; 4] = [2, 4, 6, 8];

const DC_GAIN_TOLERANCE: f64 = 1e-12;

/// One 2-pole section: `v = d3*v_prev + amplification*(x - y_prev); y = y_prev + v`.
///
/// Equivalent to `y = -d2*y1 - d3*y2 + amplification*x` with unity DC gain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub amplification: f64,
    pub d2: f64,
    pub d3: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCoefficientSet {
    cutoff_pct: f64,
    poles: u8,
    cells: Vec<Cell>,
}

impl FilterCoefficientSet {
    /// Design a Butterworth cascade for `poles` total poles at `cutoff_pct`
    /// percent of the sampling rate.
    pub fn butterworth(cutoff_pct: f64, poles: u8) -> Result<Self, WeighError> {
        if !(cutoff_pct > 0.0 && cutoff_pct < 50.0) {
            return Err(WeighError::Config(format!(
                "cutoff {cutoff_pct}% outside (0, 50)"
            )));
        }
        if poles == 0 || poles % 2 != 0 {
            return Err(WeighError::Config(format!(
                "pole count {poles} must be even and > 0"
            )));
        }
        let n = f64::from(poles);
        let wc = 2.0 * PI * cutoff_pct / 100.0;
        let cells = (0..poles / 2)
            .map(|k| {
                let theta = PI * (2.0 * f64::from(k) + 1.0) / (2.0 * n);
                let sigma = -wc * theta.sin();
                let omega = wc * theta.cos();
                let d2 = -2.0 * sigma.exp() * omega.cos();
                let d3 = (2.0 * sigma).exp();
                Cell {
                    amplification: 1.0 + d2 + d3,
                    d2,
                    d3,
                }
            })
            .collect();
        let set = Self {
            cutoff_pct,
            poles,
            cells,
        };
        set.validate()?;
        Ok(set)
    }

    /// Unity DC gain and poles strictly inside the unit circle.
    pub fn validate(&self) -> Result<(), WeighError> {
        if self.cells.len() != usize::from(self.poles / 2) {
            return Err(WeighError::Config(format!(
                "{} cells for {} poles",
                self.cells.len(),
                self.poles
            )));
        }
        for (i, c) in self.cells.iter().enumerate() {
            let gain_err = (c.amplification - (1.0 + c.d2 + c.d3)).abs();
            if !(gain_err <= DC_GAIN_TOLERANCE) || c.amplification <= 0.0 {
                return Err(WeighError::Config(format!(
                    "cell {i} at {}%/{}p has non-unity DC gain",
                    self.cutoff_pct, self.poles
                )));
            }
            // Complex pair radius is sqrt(d3); real pairs satisfy the same bound.
            if !(c.d3 >= 0.0 && c.d3 < 1.0 && c.d2.abs() < 1.0 + c.d3) {
                return Err(WeighError::Config(format!(
                    "cell {i} at {}%/{}p is unstable",
                    self.cutoff_pct, self.poles
                )));
            }
        }
        Ok(())
    }

    pub fn cutoff_pct(&self) -> f64 {
        self.cutoff_pct
    }

    pub fn poles(&self) -> u8 {
        self.poles
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

static CATALOG: LazyLock<Result<Vec<FilterCoefficientSet>, WeighError>> = LazyLock::new(|| {
    let mut sets = Vec::with_capacity(CATALOG_CUTOFFS_PCT.len() * CATALOG_POLES.len());
    for &pct in &CATALOG_CUTOFFS_PCT {
        for &poles in &CATALOG_POLES {
            sets.push(FilterCoefficientSet::butterworth(pct, poles)?);
        }
    }
    tracing::debug!(sets = sets.len(), "coefficient catalog built");
    Ok(sets)
});

/// Every validated set in the catalog.
pub fn catalog() -> Result<&'static [FilterCoefficientSet], WeighError> {
    CATALOG.as_deref().map_err(Clone::clone)
}

/// Set with the catalog cutoff nearest to `cutoff_pct` (ties go to the stiffer
/// cutoff) and exactly `poles` poles.
pub fn lookup(cutoff_pct: f64, poles: u8) -> Result<&'static FilterCoefficientSet, WeighError> {
    if !CATALOG_POLES.contains(&poles) {
        return Err(WeighError::Config(format!(
            "no coefficient sets with {poles} poles"
        )));
    }
    if !cutoff_pct.is_finite() {
        return Err(WeighError::Config("cutoff must be finite".into()));
    }
    let mut best: Option<&'static FilterCoefficientSet> = None;
    for set in catalog()?.iter().filter(|s| s.poles == poles) {
        let better = match best {
            None => true,
            Some(b) => (set.cutoff_pct - cutoff_pct).abs() < (b.cutoff_pct - cutoff_pct).abs(),
        };
        if better {
            best = Some(set);
        }
    }
    best.ok_or_else(|| WeighError::Config(format!("no set for {cutoff_pct}%/{poles}p")))
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CellState {
    y: f64,
    v: f64,
}

/// A coefficient set together with its running history.
#[derive(Debug, Clone)]
pub struct FilterChain {
    set: &'static FilterCoefficientSet,
    history: Vec<CellState>,
}

impl FilterChain {
    pub fn new(set: &'static FilterCoefficientSet) -> Self {
        Self {
            set,
            history: vec![CellState::default(); set.cells.len()],
        }
    }

    pub fn set(&self) -> &'static FilterCoefficientSet {
        self.set
    }

    pub fn process(&mut self, x: f64) -> f64 {
        let mut x = x;
        for (c, h) in self.set.cells.iter().zip(self.history.iter_mut()) {
            let v = c.d3 * h.v + c.amplification * (x - h.y);
            h.y += v;
            h.v = v;
            x = h.y;
        }
        x
    }
}

impl Reinitializable for FilterChain {
    fn reinitialize(&mut self, mode: Reinit) {
        let y = match mode {
            Reinit::Clear => 0.0,
            Reinit::Prime(x) => x,
        };
        for h in &mut self.history {
            *h = CellState { y, v: 0.0 };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn catalog_is_complete_and_valid() {
        let sets = catalog().unwrap();
        assert_eq!(sets.len(), 56);
        for s in sets {
            assert_eq!(s.cells().len(), usize::from(s.poles() / 2));
            s.validate().unwrap();
        }
    }

    #[test]
    fn lookup_snaps_to_nearest_cutoff() {
        assert_eq!(lookup(0.8, 4).unwrap().cutoff_pct(), 0.75);
        assert_eq!(lookup(12.0, 2).unwrap().cutoff_pct(), 10.0);
        // Midway between 0.1 and 0.2 picks the stiffer one.
        assert_eq!(lookup(0.15, 6).unwrap().cutoff_pct(), 0.1);
        assert!(lookup(1.0, 3).is_err());
    }

    #[test]
    fn rejects_bad_designs() {
        assert!(FilterCoefficientSet::butterworth(60.0, 2).is_err());
        assert!(FilterCoefficientSet::butterworth(1.0, 5).is_err());
    }

    #[test]
    fn cleared_chain_converges_to_step() {
        let mut ch = FilterChain::new(lookup(5.0, 4).unwrap());
        let mut y = 0.0;
        for _ in 0..2_000 {
            y = ch.process(1_000.0);
        }
        assert!((y - 1_000.0).abs() < 1e-6, "y = {y}");
    }

    proptest! {
        #[test]
        fn primed_chain_is_identity(idx in 0usize..56, x in -1.0e7f64..1.0e7) {
            let set = &catalog().unwrap()[idx];
            let mut ch = FilterChain::new(set);
            ch.reinitialize(Reinit::Prime(x));
            for _ in 0..50 {
                prop_assert_eq!(ch.process(x), x);
            }
        }
    }
}
