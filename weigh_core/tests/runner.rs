//! `run_cycles` over scripted sources: cycle budgets, stop flag, run-time cap,
//! stall detection and storage faults on capture commit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use weigh_core::error::WeighError;
use weigh_core::mocks::{NoopSource, ScriptedSource};
use weigh_core::store::BLOCK_BYTES;
use weigh_core::{
    CalibrationPoints, Command, RunOptions, SamplingMode, SharedScale, WeighScale, run_cycles,
};
use weigh_traits::clock::{ManualClock, MonotonicClock};
use weigh_traits::{BlockStore, BoxError};

fn shared() -> SharedScale {
    let cal = CalibrationPoints::from_points(500.0, &[(10_500.0, 100.0)], 16, 16).unwrap();
    SharedScale::new(
        WeighScale::builder()
            .with_source(NoopSource)
            .with_calibration(cal)
            .build()
            .unwrap(),
    )
}

fn opts(mode: SamplingMode, cycles: Option<u64>) -> RunOptions {
    RunOptions {
        mode,
        cycles,
        ..RunOptions::default()
    }
}

#[test]
fn direct_mode_runs_the_cycle_budget_at_the_configured_rate() {
    let scale = shared();
    let clock = ManualClock::new();
    let stop = AtomicBool::new(false);
    let mut seen = 0u64;

    let summary = run_cycles(
        &scale,
        ScriptedSource::new(vec![500]),
        &opts(SamplingMode::Direct, Some(50)),
        clock.clone(),
        &stop,
        |_| seen += 1,
    )
    .unwrap();

    assert_eq!(summary.cycles, 50);
    assert_eq!(seen, 50);
    // 80 Hz: 12.5 ms per cycle.
    assert_eq!(clock.elapsed(), Duration::from_micros(50 * 12_500));
    let last = summary.last.unwrap();
    assert_eq!(last.gross_text, "    0.00");
    assert_eq!(scale.with(|s| s.cycles()).unwrap(), 50);
}

#[test]
fn raised_stop_flag_runs_nothing() {
    let stop = AtomicBool::new(true);
    let summary = run_cycles(
        &shared(),
        ScriptedSource::new(vec![500]),
        &opts(SamplingMode::Direct, None),
        ManualClock::new(),
        &stop,
        |_| {},
    )
    .unwrap();
    assert_eq!(summary.cycles, 0);
    assert!(summary.last.is_none());
}

#[test]
fn max_run_time_ends_an_open_run() {
    let stop = AtomicBool::new(false);
    let o = RunOptions {
        max_run_ms: Some(100),
        ..opts(SamplingMode::Direct, None)
    };
    let mut seen = 0u64;
    let err = run_cycles(
        &shared(),
        ScriptedSource::new(vec![500]),
        &o,
        ManualClock::new(),
        &stop,
        |_| seen += 1,
    )
    .unwrap_err();
    assert!(matches!(err.downcast_ref::<WeighError>(), Some(WeighError::State(_))));
    assert_eq!(seen, 8);
}

#[test]
fn direct_read_failure_ends_the_run() {
    let stop = AtomicBool::new(false);
    let err = run_cycles(
        &shared(),
        NoopSource,
        &opts(SamplingMode::Direct, Some(5)),
        ManualClock::new(),
        &stop,
        |_| {},
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<WeighError>(),
        Some(WeighError::Hardware(_))
    ));
}

#[test]
fn paced_sampler_feeds_every_cycle() {
    let stop = AtomicBool::new(false);
    let summary = run_cycles(
        &shared(),
        ScriptedSource::new(vec![500]),
        &opts(SamplingMode::Paced(500), Some(20)),
        MonotonicClock::new(),
        &stop,
        |_| {},
    )
    .unwrap();
    assert_eq!(summary.cycles, 20);
}

#[test]
fn stalled_sampler_times_out() {
    let stop = AtomicBool::new(false);
    let o = RunOptions {
        sensor_timeout_ms: 10,
        max_run_ms: Some(5_000),
        ..opts(SamplingMode::Paced(1_000), None)
    };
    let err = run_cycles(
        &shared(),
        NoopSource,
        &o,
        MonotonicClock::new(),
        &stop,
        |_| {},
    )
    .unwrap_err();
    assert!(matches!(err.downcast_ref::<WeighError>(), Some(WeighError::Timeout)));
}

#[test]
fn stop_flag_from_the_callback_ends_the_run() {
    let stop = AtomicBool::new(false);
    let mut n = 0;
    let summary = run_cycles(
        &shared(),
        ScriptedSource::new(vec![500]),
        &opts(SamplingMode::Direct, None),
        ManualClock::new(),
        &stop,
        |_| {
            n += 1;
            if n == 12 {
                stop.store(true, Ordering::Relaxed);
            }
        },
    )
    .unwrap();
    assert_eq!(summary.cycles, 12);
}

struct ReadOnlyStore;

impl BlockStore for ReadOnlyStore {
    fn read_block(&mut self, _block: u16) -> Result<Vec<u8>, BoxError> {
        Ok(vec![0; BLOCK_BYTES])
    }
    fn write_block(&mut self, _block: u16, _bytes: &[u8]) -> Result<(), BoxError> {
        Err("write protected".into())
    }
}

#[test]
fn unsaved_calibration_is_counted_and_the_run_continues() {
    let cal = CalibrationPoints::from_points(500.0, &[(10_500.0, 100.0)], 16, 16).unwrap();
    let scale = SharedScale::new(
        WeighScale::builder()
            .with_source(NoopSource)
            .with_calibration(cal)
            .with_store(ReadOnlyStore)
            .build()
            .unwrap(),
    );
    scale
        .execute(Command::BeginCapture { testpoint: 1, load: 50.0 })
        .unwrap();

    let stop = AtomicBool::new(false);
    let summary = run_cycles(
        &scale,
        ScriptedSource::new(vec![4_500]),
        &opts(SamplingMode::Direct, Some(100)),
        ManualClock::new(),
        &stop,
        |_| {},
    )
    .unwrap();

    assert_eq!(summary.cycles, 100);
    assert_eq!(summary.storage_faults, 1);
    let span = scale.with(|s| s.calibration().base_span()).unwrap();
    assert_eq!(span, 50.0 / 4_000.0);
    assert_eq!(summary.last.unwrap().gross_text, "   50.00");
}
