use crate::error::{Report, Result, WeighError};
use crate::hw_error::map_hw_error;
use crate::sampler::Sampler;
use crate::shared::SharedScale;
use crate::status::WeightReading;
use eyre::WrapErr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use weigh_traits::SampleSource;
use weigh_traits::clock::Clock;

/// How samples reach the weighing loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// Read inside the loop, sleeping one period between cycles
    Direct,
    /// Event-driven: a sampler thread blocks on the source's data-ready
    Event,
    /// Sampler thread paced at the given rate
    Paced(u32),
}

/// Knobs for [`run_cycles`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: SamplingMode,
    /// Weight cycles per second.
    pub rate_hz: u32,
    pub channel: u8,
    /// Stop after this many cycles; `None` runs until `stop` is raised.
    pub cycles: Option<u64>,
    /// Per-read sensor timeout, used for stall detection.
    pub sensor_timeout_ms: u64,
    /// Hard cap on the whole run.
    pub max_run_ms: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: SamplingMode::Direct,
            rate_hz: 80,
            channel: 0,
            cycles: None,
            sensor_timeout_ms: 150,
            max_run_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub cycles: u64,
    pub last: Option<WeightReading>,
    /// Capture commits whose calibration could not be persisted.
    pub storage_faults: u64,
}

/// Compute the stall watchdog threshold in milliseconds.
///
/// Starts from four sensor timeouts, never shorter than two sampling periods so a
/// single missed sample does not trip it, and always strictly below `max_run_ms`.
#[inline]
fn compute_stall_threshold_ms(sensor_timeout_ms: u64, period_ms: u64, max_run_ms: u64) -> u64 {
    debug_assert!((1..=crate::util::MILLIS_PER_SEC).contains(&period_ms));

    let fast = fast_threshold_ms(sensor_timeout_ms);
    let two_p = two_periods_ms(period_ms);

    if max_run_ms < two_p {
        return cap_below_max_run(fast, max_run_ms);
    }

    let safe = std::cmp::max(fast, two_p);
    cap_below_max_run(safe, max_run_ms)
}

#[inline]
fn fast_threshold_ms(sensor_timeout_ms: u64) -> u64 {
    sensor_timeout_ms.saturating_mul(4)
}

#[inline]
fn two_periods_ms(period_ms: u64) -> u64 {
    period_ms.saturating_mul(2)
}

/// Cap a threshold to be strictly below `max_run_ms` and at least 1ms.
#[inline]
fn cap_below_max_run(threshold: u64, max_run_ms: u64) -> u64 {
    threshold.min(max_run_ms.saturating_sub(1)).max(1)
}

#[inline]
fn stalled_now(elapsed_ms: u64, stalled_ms: u64, threshold_ms: u64) -> bool {
    elapsed_ms >= threshold_ms && stalled_ms > threshold_ms
}

/// Feed one raw sample to the scale; storage faults on capture commit are
/// logged and counted, everything else ends the run.
fn cycle(
    scale: &SharedScale,
    raw: i32,
    summary: &mut RunSummary,
    on_reading: &mut impl FnMut(&WeightReading),
) -> Result<()> {
    match scale.process_sample(raw) {
        Ok(r) => {
            on_reading(&r);
            summary.cycles += 1;
            summary.last = Some(r);
            Ok(())
        }
        Err(e) if matches!(e.downcast_ref::<WeighError>(), Some(WeighError::Storage(_))) => {
            tracing::warn!(error = %e, "calibration applied but not persisted");
            summary.storage_faults += 1;
            summary.cycles += 1;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn done(opts: &RunOptions, summary: &RunSummary, stop: &AtomicBool) -> bool {
    stop.load(Ordering::Relaxed) || opts.cycles.is_some_and(|n| summary.cycles >= n)
}

/// Drive weight cycles from `source` into `scale` until `stop` is raised, the
/// cycle budget is used up, the run exceeds `max_run_ms`, or samples stall.
///
/// `scale` must not read its own source: every sample comes from `source`.
pub fn run_cycles<S, C>(
    scale: &SharedScale,
    source: S,
    opts: &RunOptions,
    clock: C,
    stop: &AtomicBool,
    mut on_reading: impl FnMut(&WeightReading),
) -> Result<RunSummary>
where
    S: SampleSource + Send + 'static,
    C: Clock + Clone + Send + Sync + 'static,
{
    tracing::info!(mode = ?opts.mode, rate_hz = opts.rate_hz, cycles = ?opts.cycles, "weighing start");
    let summary = match opts.mode {
        SamplingMode::Direct => run_direct(scale, source, opts, &clock, stop, &mut on_reading)?,
        SamplingMode::Event | SamplingMode::Paced(_) => {
            run_with_sampler(scale, source, opts, clock, stop, &mut on_reading)?
        }
    };
    tracing::info!(cycles = summary.cycles, "weighing stopped");
    Ok(summary)
}

fn run_direct<S: SampleSource, C: Clock>(
    scale: &SharedScale,
    mut source: S,
    opts: &RunOptions,
    clock: &C,
    stop: &AtomicBool,
    on_reading: &mut impl FnMut(&WeightReading),
) -> Result<RunSummary> {
    let period = Duration::from_micros(crate::util::period_us(opts.rate_hz));
    let max_run_ms = opts.max_run_ms.unwrap_or(u64::MAX);
    let epoch = clock.now();
    let mut summary = RunSummary::default();
    while !done(opts, &summary, stop) {
        if clock.ms_since(epoch) >= max_run_ms {
            return Err(Report::new(WeighError::State("max run time exceeded".into())));
        }
        let raw = source
            .read_channel(opts.channel)
            .map_err(|e| Report::new(map_hw_error(&*e)))
            .wrap_err("reading load cell")?;
        cycle(scale, raw, &mut summary, on_reading)?;
        clock.sleep(period);
    }
    Ok(summary)
}

fn run_with_sampler<S, C>(
    scale: &SharedScale,
    source: S,
    opts: &RunOptions,
    clock: C,
    stop: &AtomicBool,
    on_reading: &mut impl FnMut(&WeightReading),
) -> Result<RunSummary>
where
    S: SampleSource + Send + 'static,
    C: Clock + Clone + Send + Sync + 'static,
{
    let period_us = crate::util::period_us(opts.rate_hz);
    let period_ms = crate::util::period_ms(opts.rate_hz);
    let max_run_ms = opts.max_run_ms.unwrap_or(u64::MAX);
    let stall_threshold_ms = compute_stall_threshold_ms(opts.sensor_timeout_ms, period_ms, max_run_ms);

    let sampler = match opts.mode {
        SamplingMode::Paced(hz) => Sampler::spawn(source, opts.channel, hz, clock.clone()),
        _ => Sampler::spawn_event(source, opts.channel, clock.clone()),
    };
    let epoch = clock.now();
    let wait = Duration::from_micros(period_us);
    let mut summary = RunSummary::default();

    while !done(opts, &summary, stop) {
        let elapsed_ms = clock.ms_since(epoch);
        if elapsed_ms >= max_run_ms {
            return Err(Report::new(WeighError::State("max run time exceeded".into())));
        }
        match sampler.recv_timeout(wait) {
            Some(raw) => cycle(scale, raw, &mut summary, on_reading)?,
            None => {
                let stalled_ms = sampler.stalled_for(clock.ms_since(epoch));
                if stalled_now(elapsed_ms, stalled_ms, stall_threshold_ms) {
                    tracing::error!(stalled_ms, threshold_ms = stall_threshold_ms, "samples stalled");
                    return Err(Report::new(WeighError::Timeout));
                }
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::{cap_below_max_run, compute_stall_threshold_ms, fast_threshold_ms, stalled_now, two_periods_ms};

    #[test]
    fn fast_threshold_scales_by_four() {
        assert_eq!(fast_threshold_ms(0), 0);
        assert_eq!(fast_threshold_ms(150), 600);
    }

    #[test]
    fn two_periods_is_double_period() {
        assert_eq!(two_periods_ms(12), 24);
    }

    #[test]
    fn cap_below_max_run_enforces_bounds() {
        assert_eq!(cap_below_max_run(5000, 100), 99);
        assert_eq!(cap_below_max_run(10, 1), 1);
        assert_eq!(cap_below_max_run(5, 100), 5);
    }

    #[test]
    fn threshold_covers_two_periods_at_low_rates() {
        // 1 Hz: two periods (2000 ms) beat four 150 ms timeouts.
        assert_eq!(compute_stall_threshold_ms(150, 1_000, u64::MAX), 2_000);
        // 80 Hz: the sensor timeout dominates.
        assert_eq!(compute_stall_threshold_ms(150, 12, u64::MAX), 600);
        assert_eq!(compute_stall_threshold_ms(10, 100, 50), 40);
    }

    #[test]
    fn stall_needs_both_elapsed_and_stalled() {
        assert!(!stalled_now(10, 1_000, 600));
        assert!(!stalled_now(1_000, 100, 600));
        assert!(stalled_now(1_000, 700, 600));
    }
}
