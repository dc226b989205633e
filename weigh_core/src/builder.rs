//! Type-state builder for `WeighScale` and the generic `build_scale` constructor.
//!
//! `build()` is only available once a sample source and a calibration have been
//! supplied. `try_build()` is always available and may instead pick the
//! calibration up from the parameter store.

use std::marker::PhantomData;

use weigh_traits::{BlockStore, SampleSource};

use crate::calibration::CalibrationPoints;
use crate::capture::CaptureState;
use crate::command::{Command, FILTER_CUTOFF_RANGE_HZ, FILTER_POLES_RANGE};
use crate::config::{FilterCfg, PipelineCfg};
use crate::core::{DynStore, ScaleCore};
use crate::error::{BuildError, Result, WeighError};
use crate::params::ScaleParams;
use crate::status::WeightReading;
use crate::store::ParamCache;
use crate::tare::TareState;
use crate::units::Unit;
use crate::zero::ZeroState;

/// Boxed sample source used by the dynamic scale.
pub type DynSource = Box<dyn SampleSource + Send>;

/// Scale with a boxed sample source.
pub struct WeighScale {
    pub(crate) inner: ScaleCore<DynSource>,
}

impl core::fmt::Debug for WeighScale {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WeighScale")
            .field("inner", &self.inner)
            .finish()
    }
}

impl WeighScale {
    pub fn builder() -> ScaleBuilder<Missing, Missing> {
        ScaleBuilder::default()
    }

    pub fn step(&mut self) -> Result<WeightReading> {
        self.inner.step()
    }

    /// Run a weight cycle on a pre-sampled raw count (for sampler integration).
    pub fn process_sample(&mut self, raw: i32) -> Result<WeightReading> {
        self.inner.process_sample(raw)
    }

    pub fn post_process(&mut self, counts: f64) -> WeightReading {
        self.inner.post_process(counts)
    }

    pub fn execute(&mut self, cmd: Command) -> std::result::Result<(), WeighError> {
        self.inner.execute(cmd)
    }

    pub fn set_usr_geo(&mut self, code: u8) -> std::result::Result<(), WeighError> {
        self.inner.set_usr_geo(code)
    }

    pub fn params(&self) -> &ScaleParams {
        self.inner.params()
    }
    pub fn calibration(&self) -> &CalibrationPoints {
        self.inner.calibration()
    }
    pub fn filter_cfg(&self) -> &FilterCfg {
        self.inner.filter_cfg()
    }
    pub fn zero_state(&self) -> &ZeroState {
        self.inner.zero_state()
    }
    pub fn tare_state(&self) -> &TareState {
        self.inner.tare_state()
    }
    pub fn display_unit(&self) -> Unit {
        self.inner.display_unit()
    }
    pub fn in_motion(&self) -> bool {
        self.inner.in_motion()
    }
    pub fn capture_state(&self) -> Option<CaptureState> {
        self.inner.capture_state()
    }
    pub fn cycles(&self) -> u64 {
        self.inner.cycles()
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct ScaleBuilder<S, C> {
    source: Option<DynSource>,
    pipeline: Option<PipelineCfg>,
    params: Option<ScaleParams>,
    calibration: Option<CalibrationPoints>,
    store: Option<DynStore>,
    restore_params: bool,
    _s: PhantomData<S>,
    _c: PhantomData<C>,
}

impl Default for ScaleBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            source: None,
            pipeline: None,
            params: None,
            calibration: None,
            store: None,
            restore_params: false,
            _s: PhantomData,
            _c: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn check_pipeline(cfg: &PipelineCfg) -> Result<()> {
    if cfg.sampling.rate_hz == 0 {
        return Err(invalid("sampling rate must be > 0"));
    }
    if !(4..=5).contains(&cfg.sampling.widen_shift) {
        return Err(invalid("widen shift must be 4 or 5"));
    }
    let (lo, hi) = FILTER_CUTOFF_RANGE_HZ;
    if !(lo..=hi).contains(&cfg.filter.cutoff_hz) {
        return Err(invalid("filter cutoff out of range"));
    }
    let (plo, phi) = FILTER_POLES_RANGE;
    if !(plo..=phi).contains(&cfg.filter.poles) {
        return Err(invalid("filter poles out of range"));
    }
    if !(cfg.notch.frequency_hz.is_finite() && cfg.notch.frequency_hz > 0.0) {
        return Err(invalid("notch frequency must be > 0"));
    }
    if cfg.stability.window == 0 {
        return Err(invalid("stability window must be >= 1"));
    }
    if cfg.motion.range_counts.is_sign_negative() {
        return Err(invalid("motion range must be >= 0"));
    }
    if cfg.capture.samples == 0 {
        return Err(invalid("capture samples must be >= 1"));
    }
    Ok(())
}

/// Validate configuration and wire up a `ScaleCore`.
///
/// Shared by `ScaleBuilder::try_build()` and `build_scale()`.
fn validate_and_build<S: SampleSource>(
    source: S,
    pipeline: PipelineCfg,
    params: ScaleParams,
    calibration: CalibrationPoints,
    store: Option<ParamCache<DynStore>>,
) -> Result<ScaleCore<S>> {
    check_pipeline(&pipeline)?;
    if !calibration.is_calibrated() {
        tracing::warn!("scale is not calibrated; weights will read zero");
    }
    let core = ScaleCore::assemble(source, pipeline, params, calibration, store)?;
    tracing::info!(
        capacity = core.params().capacity(),
        increment = core.params().increment(),
        ranges = core.params().ranges(),
        notch = ?core.notch.mode(),
        "scale ready"
    );
    Ok(core)
}

/// Resolve calibration and parameters, consulting the store where asked.
fn resolve(
    mut pipeline: PipelineCfg,
    params: Option<ScaleParams>,
    calibration: Option<CalibrationPoints>,
    store: Option<DynStore>,
    restore_params: bool,
) -> Result<(PipelineCfg, ScaleParams, CalibrationPoints, Option<ParamCache<DynStore>>)> {
    let mut cache = store.map(ParamCache::new);
    let mut params = params;
    if restore_params && let Some(c) = cache.as_mut() {
        match c.load_scale() {
            Ok(Some((p, filter))) => {
                tracing::info!(capacity = p.capacity(), "restored scale parameters");
                params = Some(p);
                pipeline.filter = filter;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "stored scale parameters ignored"),
        }
    }
    let calibration = match calibration {
        Some(cal) => cal,
        None => {
            let stored = match cache.as_mut() {
                Some(c) => c
                    .load_calibration()
                    .map_err(|e| eyre::Report::new(WeighError::from(e)))?,
                None => None,
            };
            stored.ok_or_else(|| eyre::Report::new(BuildError::MissingCalibration))?
        }
    };
    Ok((pipeline, params.unwrap_or_default(), calibration, cache))
}

impl<S, C> ScaleBuilder<S, C> {
    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<WeighScale> {
        let source = self
            .source
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSource))?;
        let (pipeline, params, calibration, cache) = resolve(
            self.pipeline.unwrap_or_default(),
            self.params,
            self.calibration,
            self.store,
            self.restore_params,
        )?;
        let inner = validate_and_build(source, pipeline, params, calibration, cache)?;
        Ok(WeighScale { inner })
    }

    pub fn with_pipeline(mut self, pipeline: PipelineCfg) -> Self {
        self.pipeline = Some(pipeline);
        self
    }
    pub fn with_params(mut self, params: ScaleParams) -> Self {
        self.params = Some(params);
        self
    }
    pub fn with_store(mut self, store: impl BlockStore + Send + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }
    /// Prefer persisted scale and filter parameters over the supplied ones.
    pub fn restore_params(mut self, yes: bool) -> Self {
        self.restore_params = yes;
        self
    }
}

impl<C> ScaleBuilder<Missing, C> {
    pub fn with_source(self, source: impl SampleSource + Send + 'static) -> ScaleBuilder<Set, C> {
        ScaleBuilder {
            source: Some(Box::new(source)),
            pipeline: self.pipeline,
            params: self.params,
            calibration: self.calibration,
            store: self.store,
            restore_params: self.restore_params,
            _s: PhantomData,
            _c: PhantomData,
        }
    }
}

impl<S> ScaleBuilder<S, Missing> {
    pub fn with_calibration(self, calibration: CalibrationPoints) -> ScaleBuilder<S, Set> {
        ScaleBuilder {
            source: self.source,
            pipeline: self.pipeline,
            params: self.params,
            calibration: Some(calibration),
            store: self.store,
            restore_params: self.restore_params,
            _s: PhantomData,
            _c: PhantomData,
        }
    }
}

impl ScaleBuilder<Set, Set> {
    pub fn build(self) -> Result<WeighScale> {
        self.try_build()
    }
}

/// Generic, statically-dispatched scale.
pub type ScaleG<S> = ScaleCore<S>;

/// Build a `ScaleG` around a concrete source. Validation is shared with the builder.
pub fn build_scale<S: SampleSource>(
    source: S,
    pipeline: PipelineCfg,
    params: ScaleParams,
    calibration: CalibrationPoints,
    store: Option<DynStore>,
) -> Result<ScaleG<S>> {
    validate_and_build(source, pipeline, params, calibration, store.map(ParamCache::new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weigh_traits::BoxError;

    struct Flat;
    impl SampleSource for Flat {
        fn read_channel(&mut self, _channel: u8) -> std::result::Result<i32, BoxError> {
            Ok(0)
        }
    }

    fn cal() -> CalibrationPoints {
        CalibrationPoints::from_points(0.0, &[(10_000.0, 100.0)], 16, 16).unwrap()
    }

    #[test]
    fn try_build_without_source_fails() {
        let err = WeighScale::builder().try_build().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingSource)
        ));
    }

    #[test]
    fn try_build_without_calibration_fails() {
        let err = WeighScale::builder().with_source(Flat).try_build().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingCalibration)
        ));
    }

    #[test]
    fn rejects_bad_widen_shift() {
        let mut p = PipelineCfg::default();
        p.sampling.widen_shift = 7;
        let err = WeighScale::builder()
            .with_source(Flat)
            .with_calibration(cal())
            .with_pipeline(p)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("widen shift"));
    }

    #[test]
    fn generic_build_runs_a_cycle() {
        let mut s = build_scale(Flat, PipelineCfg::default(), ScaleParams::default(), cal(), None)
            .unwrap();
        let r = s.step().unwrap();
        assert_eq!(r.gross, 0.0);
    }
}
