//! Scale assembly from config, and the run / calibrate / self-check flows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use eyre::{Report, WrapErr};
use serde_json::json;
use weigh_config::{Config, PersistedCalibration};
use weigh_core::error::{BuildError, Result};
use weigh_core::hw_error::map_hw_error;
use weigh_core::mocks::NoopSource;
use weigh_core::store::BLOCK_BYTES;
use weigh_core::{
    AbortReason, CalibrationPoints, CaptureState, Command, DynSource, DynStore, ParamCache,
    PipelineCfg, RunOptions, RunSummary, SamplingMode, ScaleParams, SharedScale, WeighError,
    WeighScale, WeightReading, calibration_from_config, run_cycles,
};
use weigh_hardware::{FileBlockStore, HwError, LoadHandle, MemoryBlockStore};
use weigh_traits::clock::MonotonicClock;
use weigh_traits::{BoxError, SampleSource};

use crate::cli::{LoopArgs, json_mode};

/// Set to make the simulated load cell stop answering (tests).
const SIM_TIMEOUT_ENV: &str = "WEIGH_TEST_SIM_TIMEOUT";

/// Load cell that never signals data-ready.
struct StalledCell;

impl SampleSource for StalledCell {
    fn read_channel(&mut self, _channel: u8) -> std::result::Result<i32, BoxError> {
        Err(HwError::DataReadyTimeout.into())
    }
}

pub struct Device {
    pub source: DynSource,
    /// Platter of the simulated cell; `None` on real hardware.
    pub platter: Option<LoadHandle>,
    pub kind: &'static str,
}

pub fn open_device(cfg: &Config) -> Result<Device> {
    if std::env::var_os(SIM_TIMEOUT_ENV).is_some() {
        return Ok(Device {
            source: Box::new(StalledCell),
            platter: None,
            kind: "stalled",
        });
    }

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        let hx = weigh_hardware::hx711::Hx711::open(
            cfg.hardware.dt_pin,
            cfg.hardware.sck_pin,
            cfg.hardware.data_shift,
            std::time::Duration::from_millis(cfg.hardware.sensor_read_timeout_ms),
        )
        .wrap_err("open hx711")?;
        Ok(Device {
            source: Box::new(hx),
            platter: None,
            kind: "hx711",
        })
    }

    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        let sim = &cfg.simulation;
        let cell = weigh_hardware::SimulatedLoadCell::new(sim.zero_counts, sim.counts_per_unit)
            .with_noise(sim.noise_counts)
            .with_hum(
                sim.hum_counts,
                cfg.notch.frequency_hz,
                f64::from(cfg.sampling.rate_hz),
            );
        let platter = Some(cell.load());
        Ok(Device {
            source: Box::new(cell),
            platter,
            kind: "simulated",
        })
    }
}

pub fn open_store(cfg: &Config) -> DynStore {
    match &cfg.storage.dir {
        Some(dir) => Box::new(FileBlockStore::new(dir, BLOCK_BYTES)),
        None => Box::new(MemoryBlockStore::new(BLOCK_BYTES)),
    }
}

/// Pick the calibration: CSV, then `[cal_points]`, then the parameter store.
///
/// With `allow_blank` an uncalibrated scale is returned instead of an error,
/// so the first points can be captured.
fn resolve_calibration(
    cfg: &Config,
    csv: Option<&PersistedCalibration>,
    store: DynStore,
    allow_blank: bool,
) -> Result<(CalibrationPoints, DynStore)> {
    let geo = &cfg.geo;
    if let Some(p) = csv {
        let cal = CalibrationPoints::from_points(p.zero_counts, &p.points, geo.cal_code, geo.usr_code)
            .map_err(|e| Report::new(WeighError::from(e)))
            .wrap_err("calibration CSV")?;
        return Ok((cal, store));
    }
    if let Some(cal) = calibration_from_config(cfg).map_err(Report::new)? {
        return Ok((cal, store));
    }
    let mut cache = ParamCache::new(store);
    let stored = cache
        .load_calibration()
        .map_err(|e| Report::new(WeighError::from(e)))
        .wrap_err("loading stored calibration")?;
    let store = cache.into_inner();
    match stored {
        Some(cal) => Ok((cal, store)),
        None if allow_blank => {
            let mut cal = CalibrationPoints::from_points(0.0, &[], geo.cal_code, geo.usr_code)
                .map_err(|e| Report::new(WeighError::from(e)))?;
            cal.set_upscale_test_points(cfg.calibration.upscale_test_points);
            tracing::warn!("no calibration found; starting uncalibrated");
            Ok((cal, store))
        }
        None => Err(Report::new(BuildError::MissingCalibration)),
    }
}

/// Build the shared scale. Samples are fed by `run_cycles`, so the scale
/// itself holds no source.
pub fn build_scale(
    cfg: &Config,
    csv: Option<&PersistedCalibration>,
    allow_blank: bool,
) -> Result<SharedScale> {
    let params = ScaleParams::try_from(&cfg.scale).map_err(Report::new)?;
    let (cal, store) = resolve_calibration(cfg, csv, open_store(cfg), allow_blank)?;
    let scale = WeighScale::builder()
        .with_source(NoopSource)
        .with_pipeline(PipelineCfg::from(cfg))
        .with_params(params)
        .with_store(store)
        .restore_params(cfg.storage.dir.is_some())
        .with_calibration(cal)
        .build()?;
    Ok(SharedScale::new(scale))
}

pub fn run_options(cfg: &Config, args: LoopArgs, cycles: Option<u64>) -> RunOptions {
    let mode = if args.direct {
        SamplingMode::Direct
    } else if cfg!(all(feature = "hardware", target_os = "linux")) {
        SamplingMode::Event
    } else {
        SamplingMode::Paced(cfg.sampling.rate_hz)
    };
    RunOptions {
        mode,
        rate_hz: cfg.sampling.rate_hz,
        channel: cfg.sampling.channel,
        cycles,
        sensor_timeout_ms: cfg.hardware.sensor_read_timeout_ms,
        max_run_ms: args.max_run_ms,
    }
}

fn timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Stable name for an error, used as `abort_reason` in JSON output.
pub fn reason_name(err: &Report) -> &'static str {
    if let Some(e) = err.downcast_ref::<WeighError>() {
        return match e {
            WeighError::Hardware(_) | WeighError::HardwareFault(_) => "Hardware",
            WeighError::Config(_) => "Config",
            WeighError::Timeout => "Timeout",
            WeighError::State(_) => "State",
            WeighError::Zero(_) => "Zero",
            WeighError::Tare(_) => "Tare",
            WeighError::Calibration(_) => "Calibration",
            WeighError::Storage(_) => "Storage",
            WeighError::OutOfRange(_) => "OutOfRange",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    "Error"
}

fn flags_text(r: &WeightReading) -> String {
    let f = &r.flags;
    let mut out = String::new();
    for (on, tag) in [
        (f.motion, " M"),
        (f.center_of_zero, " >0<"),
        (f.over_capacity, " OVER"),
        (f.under_zero, " UNDER"),
        (f.needs_zero, " ZERO?"),
    ] {
        if on {
            out.push_str(tag);
        }
    }
    out
}

fn print_reading(cycle: u64, r: &WeightReading) {
    if json_mode() {
        let line = json!({
            "timestamp": timestamp(),
            "cycle": cycle,
            "gross": r.gross,
            "net": r.net,
            "tare": r.tare,
            "display": r.displayed_text().trim(),
            "unit": r.unit.symbol(),
            "net_mode": r.flags.net,
            "motion": r.flags.motion,
            "center_of_zero": r.flags.center_of_zero,
            "over_capacity": r.flags.over_capacity,
            "under_zero": r.flags.under_zero,
        });
        println!("{line}");
    } else {
        let mode = if r.flags.net { "N" } else { "G" };
        println!(
            "{cycle:>8} {} {} {mode}{}",
            r.displayed_text(),
            r.unit.symbol(),
            flags_text(r)
        );
    }
}

fn print_summary(summary: Option<&RunSummary>, started: Instant, abort: Option<&str>) {
    let last = summary.and_then(|s| s.last.as_ref());
    if json_mode() {
        let line = json!({
            "timestamp": timestamp(),
            "cycles": summary.map_or(0, |s| s.cycles),
            "duration_ms": elapsed_ms(started),
            "final": last.map(WeightReading::displayed),
            "unit": last.map(|r| r.unit.symbol()),
            "storage_faults": summary.map_or(0, |s| s.storage_faults),
            "abort_reason": abort,
        });
        println!("{line}");
        return;
    }
    if let (Some(s), Some(r)) = (summary, last) {
        println!(
            "stopped after {} cycles: {} {}{}",
            s.cycles,
            r.displayed_text(),
            r.unit.symbol(),
            if r.flags.net { " NET" } else { "" }
        );
    }
}

pub struct RunRequest {
    pub cycles: Option<u64>,
    pub every: u64,
    pub load: Option<f64>,
    pub secondary: bool,
    pub expand: bool,
    pub run: LoopArgs,
}

pub fn run(
    cfg: &Config,
    csv: Option<&PersistedCalibration>,
    req: &RunRequest,
    stop: &AtomicBool,
) -> Result<()> {
    let device = open_device(cfg)?;
    if let Some(load) = req.load {
        match &device.platter {
            Some(p) => p.set(load),
            None => tracing::warn!("--load only applies to the simulated load cell"),
        }
    }
    let scale = build_scale(cfg, csv, false)?;
    if req.secondary {
        scale.execute(Command::SwitchUnit)?;
    }
    if req.expand {
        scale.execute(Command::ToggleExpand)?;
    }

    let opts = run_options(cfg, req.run, req.cycles);
    let started = Instant::now();
    let mut seen = 0u64;
    let result = run_cycles(
        &scale,
        device.source,
        &opts,
        MonotonicClock::new(),
        stop,
        |r| {
            seen += 1;
            if req.every > 0 && seen % req.every == 0 {
                print_reading(seen, r);
            }
        },
    );
    match result {
        Ok(summary) => {
            print_summary(Some(&summary), started, None);
            Ok(())
        }
        Err(e) => {
            if json_mode() {
                print_summary(None, started, Some(reason_name(&e)));
            }
            Err(e)
        }
    }
}

pub fn calibrate(
    cfg: &Config,
    csv: Option<&PersistedCalibration>,
    testpoint: u8,
    load: f64,
    args: LoopArgs,
    stop: &AtomicBool,
) -> Result<()> {
    let device = open_device(cfg)?;
    if let Some(p) = &device.platter {
        p.set(load);
    }
    let scale = build_scale(cfg, csv, true)?;
    scale.execute(Command::BeginCapture { testpoint, load })?;
    tracing::info!(testpoint, load, "capturing calibration point");

    let opts = run_options(cfg, args, None);
    let mut outcome = None;
    let mut sampling = false;
    let summary = run_cycles(
        &scale,
        device.source,
        &opts,
        MonotonicClock::new(),
        stop,
        |r| match r.capture {
            Some(state) if state.is_finished() => {
                outcome = Some(state);
                stop.store(true, Ordering::Relaxed);
            }
            Some(_) => sampling = true,
            // Capture ended on a cycle whose reading was not delivered.
            None if sampling => stop.store(true, Ordering::Relaxed),
            None => {}
        },
    )?;

    let (cal, unit) = scale.with(|s| (s.calibration().clone(), s.params().units().calibration))?;
    let counts = match outcome {
        Some(CaptureState::Committed(counts)) => Some(counts),
        Some(CaptureState::Aborted(AbortReason::Timeout)) => {
            return Err(Report::new(WeighError::State(
                "calibration capture timed out; keep the platter still".into(),
            )));
        }
        Some(_) => {
            return Err(Report::new(WeighError::State("calibration capture cancelled".into())));
        }
        None if summary.storage_faults > 0 => None,
        None => {
            return Err(Report::new(WeighError::State("calibration capture interrupted".into())));
        }
    };
    let saved = summary.storage_faults == 0 && cfg.storage.dir.is_some();
    if cfg.storage.dir.is_none() {
        tracing::warn!("no [storage] dir configured; calibration is not persisted");
    }

    if json_mode() {
        let line = json!({
            "timestamp": timestamp(),
            "testpoint": testpoint,
            "load": load,
            "counts": counts,
            "zero_counts": cal.zero_counts(),
            "span": cal.base_span(),
            "unit": unit.symbol(),
            "saved": saved,
        });
        println!("{line}");
    } else {
        match counts {
            Some(c) => println!("test point {testpoint} captured at {c:.1} counts"),
            None => println!("test point {testpoint} captured"),
        }
        println!(
            "zero {:.1} counts, span {:.6} {}/count{}",
            cal.zero_counts(),
            cal.base_span(),
            unit.symbol(),
            if saved { ", saved" } else { "" }
        );
    }
    if summary.storage_faults > 0 {
        return Err(Report::new(WeighError::State(
            "calibration applied but could not be saved".into(),
        )));
    }
    Ok(())
}

/// Samples read by `self-check`.
const SELF_CHECK_READS: usize = 5;

pub fn self_check(cfg: &Config, csv: Option<&PersistedCalibration>) -> Result<()> {
    let mut device = open_device(cfg)?;
    let mut samples = Vec::with_capacity(SELF_CHECK_READS);
    for _ in 0..SELF_CHECK_READS {
        let raw = device
            .source
            .read_channel(cfg.sampling.channel)
            .map_err(|e| Report::new(map_hw_error(&*e)))
            .wrap_err("reading load cell")?;
        samples.push(raw);
    }
    let calibration = match build_scale(cfg, csv, false) {
        Ok(_) => "present",
        Err(e) if matches!(e.downcast_ref::<BuildError>(), Some(BuildError::MissingCalibration)) => {
            "missing"
        }
        Err(e) => return Err(e),
    };
    let storage = if cfg.storage.dir.is_some() { "file" } else { "memory" };

    if json_mode() {
        let line = json!({
            "source": device.kind,
            "samples": samples,
            "calibration": calibration,
            "storage": storage,
        });
        println!("{line}");
    } else {
        println!(
            "OK: source={} samples={samples:?} calibration={calibration} storage={storage}",
            device.kind
        );
    }
    Ok(())
}
