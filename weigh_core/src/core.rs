//! The per-cycle weighing driver (`ScaleCore`).
//!
//! One weight cycle runs the raw sample through notch, low-pass and stability
//! filtering, updates motion, zero and tare state, feeds an active calibration
//! capture and finally turns the filtered counts into a [`WeightReading`].
//!
//! Counts domains: the notch widens samples by `2^widen_shift`; low-pass and
//! stability chains run on widened values and the result is scaled back to raw
//! counts before motion, zero and calibration see it.

use eyre::WrapErr;
use weigh_traits::{BlockStore, SampleSource};

use crate::calibration::CalibrationPoints;
use crate::capture::{CalibrationCapture, CaptureState};
use crate::command::Command;
use crate::config::{FilterCfg, PipelineCfg};
use crate::error::{CalibrationError, Result, WeighError};
use crate::hw_error::map_hw_error;
use crate::lowpass::LowPassFilter;
use crate::motion::MotionDetector;
use crate::notch::NotchFilter;
use crate::params::{ScaleParams, decimals_for, format_weight, round_to_increment};
use crate::reinit::{Reinit, Reinitializable};
use crate::stability::StabilityFilter;
use crate::status::{StatusFlags, WeightReading};
use crate::store::ParamCache;
use crate::tare::{TareEngine, TareLimits, TareState};
use crate::units::{Unit, UnitConverter, round_to_nearest_1_2_5};
use crate::zero::{ZeroEngine, ZeroState};

/// Boxed parameter store shared by every scale flavour.
pub type DynStore = Box<dyn BlockStore + Send>;

/// Resolution gain of the expanded display.
const EXPAND_FACTOR: f64 = 10.0;

pub struct ScaleCore<S: SampleSource> {
    pub(crate) source: S,
    pub(crate) cfg: PipelineCfg,
    pub(crate) params: ScaleParams,
    pub(crate) cal: CalibrationPoints,
    pub(crate) units: UnitConverter,
    pub(crate) notch: NotchFilter,
    pub(crate) lowpass: LowPassFilter,
    pub(crate) stability: StabilityFilter,
    pub(crate) motion: MotionDetector,
    pub(crate) zero: ZeroEngine,
    pub(crate) tare: TareEngine,
    pub(crate) store: Option<ParamCache<DynStore>>,
    pub(crate) capture: Option<CalibrationCapture>,
    pub(crate) display_unit: Unit,
    pub(crate) expanded: bool,
    pub(crate) primed: bool,
    pub(crate) last_counts: f64,
    /// Gross before tare, calibration units.
    pub(crate) last_gross: f64,
    pub(crate) last_range: usize,
    pub(crate) cycles: u64,
}

impl<S: SampleSource> core::fmt::Debug for ScaleCore<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScaleCore")
            .field("cycles", &self.cycles)
            .field("last_counts", &self.last_counts)
            .field("last_gross", &self.last_gross)
            .field("unit", &self.display_unit)
            .field("in_motion", &self.motion.in_motion())
            .finish_non_exhaustive()
    }
}

impl<S: SampleSource> ScaleCore<S> {
    /// Wire up every stage. Configuration must already be validated.
    pub(crate) fn assemble(
        source: S,
        cfg: PipelineCfg,
        params: ScaleParams,
        cal: CalibrationPoints,
        store: Option<ParamCache<DynStore>>,
    ) -> std::result::Result<Self, WeighError> {
        let rate = f64::from(cfg.sampling.rate_hz);
        let notch = NotchFilter::new(
            cfg.notch.mode,
            rate,
            cfg.notch.frequency_hz,
            cfg.sampling.widen_shift,
        );
        let lowpass = LowPassFilter::new(cfg.filter.cutoff_hz, cfg.filter.poles, rate);
        let stability = StabilityFilter::new(cfg.stability.clone())?;
        let motion = MotionDetector::new(cfg.motion.clone());
        let zero = ZeroEngine::new(cfg.zero.clone(), cal.zero_counts());
        let tare = TareEngine::new(cfg.tare.clone());
        let units = UnitConverter::new(params.units().custom_grams);
        let display_unit = params.units().primary;
        let mut core = Self {
            source,
            cfg,
            params,
            cal,
            units,
            notch,
            lowpass,
            stability,
            motion,
            zero,
            tare,
            store,
            capture: None,
            display_unit,
            expanded: false,
            primed: false,
            last_counts: 0.0,
            last_gross: 0.0,
            last_range: 0,
            cycles: 0,
        };
        core.rescale_zero();
        Ok(core)
    }

    pub fn source(&self) -> &S {
        &self.source
    }
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
    pub fn pipeline_cfg(&self) -> &PipelineCfg {
        &self.cfg
    }
    pub fn filter_cfg(&self) -> &FilterCfg {
        &self.cfg.filter
    }
    pub fn params(&self) -> &ScaleParams {
        &self.params
    }
    pub fn calibration(&self) -> &CalibrationPoints {
        &self.cal
    }
    pub fn zero_state(&self) -> &ZeroState {
        self.zero.state()
    }
    pub fn tare_state(&self) -> &TareState {
        self.tare.state()
    }
    pub fn display_unit(&self) -> Unit {
        self.display_unit
    }
    pub fn expanded(&self) -> bool {
        self.expanded
    }
    pub fn in_motion(&self) -> bool {
        self.motion.in_motion()
    }
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
    pub fn last_counts(&self) -> f64 {
        self.last_counts
    }
    pub fn capture_state(&self) -> Option<CaptureState> {
        self.capture.as_ref().map(CalibrationCapture::state)
    }

    /// Read one sample from the source and run a weight cycle on it.
    pub fn step(&mut self) -> Result<WeightReading> {
        let raw = self
            .source
            .read_channel(self.cfg.sampling.channel)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading load cell")?;
        self.process_sample(raw)
    }

    /// Run a weight cycle on a pre-sampled raw count.
    ///
    /// Only a capture commit can fail here (persisting the calibration); the
    /// new calibration is already in effect when that error is returned.
    pub fn process_sample(&mut self, raw: i32) -> Result<WeightReading> {
        if !self.primed {
            self.prime(f64::from(raw));
        }
        let widen = self.widen();
        let notched = self.notch.process(raw) as f64;
        let smooth = self.lowpass.process(notched);
        let stable = self.stability.process(raw, smooth, self.zero.state());
        let counts = stable / widen;

        let in_motion = self.motion.update(counts);
        self.zero.process_powerup_zero(counts, in_motion);
        self.zero.azm(counts, in_motion);

        let gross = self.gross_weight(counts);
        let limits = self.tare_limits(self.params.range_for(gross));
        self.tare.auto_tare(gross, in_motion, limits);
        self.tare.auto_clear(gross, in_motion);

        let capture = self.feed_capture(counts, in_motion)?;
        let mut reading = self.post_process(counts);
        reading.capture = capture;
        self.cycles += 1;
        Ok(reading)
    }

    /// Turn filtered counts into gross/net/tare values, strings and flags.
    pub fn post_process(&mut self, counts: f64) -> WeightReading {
        let gross = self.gross_weight(counts);
        let range = self.params.range_for(gross);
        let inc = self.params.increment_for(range);
        self.zero.update_flags(gross, inc);
        let view = self.tare.view(gross);

        let unit = self.display_unit;
        let display_inc = self.display_increment(inc);
        let decimals = decimals_for(display_inc);
        let gross_d = self.to_display(view.gross, display_inc);
        let net_d = self.to_display(view.net, display_inc);
        let tare_d = self.to_display(view.tare, display_inc);

        let zs = self.zero.state();
        let flags = StatusFlags {
            over_capacity: self.params.is_over_capacity(gross),
            under_zero: zs.under_zero(),
            center_of_zero: zs.center_of_zero(),
            over_zero: zs.over_zero(),
            motion: self.motion.in_motion(),
            net: self.tare.state().is_net(),
            expanded: self.expanded,
            swapped: view.swapped,
            needs_zero: zs.needs_operator_zero(),
            calibrated: self.cal.is_calibrated(),
        };
        let powerup = zs.status();

        self.last_counts = counts;
        self.last_gross = gross;
        self.last_range = range;

        WeightReading {
            gross: gross_d,
            net: net_d,
            tare: tare_d,
            gross_text: format_weight(gross_d, decimals),
            net_text: format_weight(net_d, decimals),
            tare_text: format_weight(tare_d, decimals),
            unit,
            increment: display_inc,
            range,
            counts,
            powerup,
            flags,
            capture: None,
        }
    }

    /// Apply one command. Nothing changes when an error is returned.
    pub fn execute(&mut self, cmd: Command) -> std::result::Result<(), WeighError> {
        cmd.check_args()?;
        match cmd {
            Command::Zero => self.zero_now()?,
            Command::Tare => {
                self.require_reading()?;
                let limits = self.tare_limits(self.last_range);
                self.tare
                    .take_tare(self.last_gross, self.motion.in_motion(), limits)?;
            }
            Command::KeyboardTare(v) => {
                let limits = self.tare_limits(self.params.range_for(v));
                self.tare.keyboard_tare(v, limits)?;
            }
            Command::MemoryTare(v) => {
                let limits = self.tare_limits(self.params.range_for(v));
                self.tare.memory_tare(v, limits)?;
            }
            Command::ClearTare => self.tare.clear_tare(),
            Command::SetFilter { cutoff_hz, poles } => self.set_filter(cutoff_hz, poles)?,
            Command::SetCapacity { capacity, increment } => {
                let mut params = self.params.clone();
                params.set_capacity_and_increment(capacity, increment)?;
                save_scale(self.store.as_mut(), &params, &self.cfg.filter)?;
                self.params = params;
                self.rescale_zero();
            }
            Command::SwitchUnit => {
                let u = *self.params.units();
                self.display_unit = if self.display_unit == u.primary {
                    u.secondary
                } else {
                    u.primary
                };
                tracing::info!(unit = %self.display_unit, "display unit switched");
            }
            Command::ToggleExpand => {
                self.expanded = !self.expanded;
                tracing::debug!(expanded = self.expanded, "expand display toggled");
            }
            Command::BeginCapture { testpoint, load } => self.begin_capture(testpoint, load)?,
            Command::CancelCapture => {
                let Some(mut cap) = self.capture.take() else {
                    return Err(CalibrationError::NoCapture.into());
                };
                cap.cancel();
            }
        }
        Ok(())
    }

    /// Change the user-site geo code and persist it.
    pub fn set_usr_geo(&mut self, code: u8) -> std::result::Result<(), WeighError> {
        self.cal.set_usr_geo(code);
        if let Some(store) = self.store.as_mut() {
            store.save_calibration(&self.cal)?;
        }
        Ok(())
    }

    fn widen(&self) -> f64 {
        self.notch.widen() as f64
    }

    /// Seed every history with `raw` so the first readings start settled.
    fn prime(&mut self, raw: f64) {
        let widened = raw * self.widen();
        self.notch.reinitialize(Reinit::Prime(raw));
        self.lowpass.reinitialize(Reinit::Prime(widened));
        self.stability.reinitialize(Reinit::Prime(widened));
        self.motion.reinitialize(Reinit::Clear);
        self.primed = true;
        tracing::debug!(raw, "filters primed");
    }

    fn gross_weight(&self, counts: f64) -> f64 {
        let net_counts = counts - self.zero.state().current_zero();
        self.cal.counts_to_weight(net_counts) * self.cal.geo_factor()
    }

    fn display_increment(&self, inc: f64) -> f64 {
        let cal_unit = self.params.units().calibration;
        let d = round_to_nearest_1_2_5(self.units.convert(cal_unit, self.display_unit, inc));
        if self.expanded { d / EXPAND_FACTOR } else { d }
    }

    fn to_display(&self, weight: f64, display_inc: f64) -> f64 {
        let cal_unit = self.params.units().calibration;
        round_to_increment(
            self.units.convert(cal_unit, self.display_unit, weight),
            display_inc,
        )
    }

    fn tare_limits(&self, range: usize) -> TareLimits {
        TareLimits {
            capacity: self.params.capacity(),
            increment: self.params.increment_for(range),
        }
    }

    fn require_reading(&self) -> std::result::Result<(), WeighError> {
        if self.primed {
            Ok(())
        } else {
            Err(WeighError::State("no weight reading yet".into()))
        }
    }

    /// Keep the zero engine's count limits in step with capacity and span.
    fn rescale_zero(&mut self) {
        let capacity_counts = self.cal.weight_to_counts(self.params.capacity());
        let increment_counts = self.cal.weight_to_counts(self.params.increment());
        self.zero.rescale(capacity_counts, increment_counts);
    }

    fn zero_now(&mut self) -> std::result::Result<(), WeighError> {
        self.require_reading()?;
        let outcome = self.zero.process_zero(
            self.last_counts,
            self.tare.state().is_net(),
            self.last_range,
            self.motion.in_motion(),
        )?;
        if outcome.clear_tare {
            self.tare.clear_tare();
        }
        Ok(())
    }

    fn set_filter(&mut self, cutoff_hz: f64, poles: u8) -> std::result::Result<(), WeighError> {
        let filter = FilterCfg { cutoff_hz, poles };
        save_scale(self.store.as_mut(), &self.params, &filter)?;

        let rate = f64::from(self.cfg.sampling.rate_hz);
        let mut lowpass = LowPassFilter::new(cutoff_hz, poles, rate);
        if self.primed {
            let seed = self.last_counts * self.widen();
            lowpass.reinitialize(Reinit::Prime(seed));
            self.stability.reinitialize(Reinit::Prime(seed));
        }
        self.lowpass = lowpass;
        self.cfg.filter = filter;
        tracing::info!(
            cutoff_hz,
            poles = self.lowpass.poles().poles(),
            numerator = self.lowpass.numerator(),
            "low-pass filter changed"
        );
        Ok(())
    }

    fn begin_capture(&mut self, testpoint: u8, load: f64) -> std::result::Result<(), WeighError> {
        if self
            .capture
            .as_ref()
            .is_some_and(|c| !c.state().is_finished())
        {
            return Err(CalibrationError::CaptureBusy.into());
        }
        if testpoint > self.cal.upscale_test_points() {
            return Err(CalibrationError::TestPointOutOfRange(testpoint).into());
        }
        if testpoint > 0 && !(load.is_finite() && load > 0.0) {
            return Err(CalibrationError::InvalidLoad(load).into());
        }
        self.capture = Some(CalibrationCapture::new(testpoint, load, &self.cfg.capture));
        tracing::info!(testpoint, load, "calibration capture started");
        Ok(())
    }

    fn feed_capture(&mut self, counts: f64, in_motion: bool) -> Result<Option<CaptureState>> {
        let Some(cap) = self.capture.as_mut() else {
            return Ok(None);
        };
        let state = cap.feed(counts, in_motion);
        if let CaptureState::Averaging { .. } = state {
            let (testpoint, load) = (cap.testpoint(), cap.load());
            let committed = cap.commit();
            self.capture = None;
            if let Some(avg) = committed {
                self.apply_capture(testpoint, load, avg)?;
                return Ok(Some(CaptureState::Committed(avg)));
            }
            return Ok(Some(state));
        }
        if state.is_finished() {
            self.capture = None;
        }
        Ok(Some(state))
    }

    fn apply_capture(&mut self, testpoint: u8, load: f64, counts: f64) -> Result<()> {
        self.cal
            .adjust_calibration(testpoint, load, counts, self.zero.state_mut())
            .map_err(|e| eyre::Report::new(WeighError::from(e)))?;
        self.rescale_zero();
        if let Some(store) = self.store.as_mut() {
            store
                .save_calibration(&self.cal)
                .map_err(|e| eyre::Report::new(WeighError::from(e)))
                .wrap_err("saving calibration")?;
        }
        Ok(())
    }

}

/// Persist setup parameters. Callers apply them only once this succeeds.
fn save_scale(
    store: Option<&mut ParamCache<DynStore>>,
    params: &ScaleParams,
    filter: &FilterCfg,
) -> std::result::Result<(), WeighError> {
    if let Some(store) = store {
        store.save_scale(params, filter)?;
    }
    Ok(())
}
