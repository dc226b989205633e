//! Simulated load cell for bench runs and tests.
use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use weigh_traits::{BoxError, SampleSource};

use crate::error::HwError;

/// Shared handle to the load sitting on a [`SimulatedLoadCell`].
///
/// Clones point at the same platter; the cell may live on a sampler thread.
#[derive(Debug, Clone, Default)]
pub struct LoadHandle(Arc<AtomicU64>);

impl LoadHandle {
    pub fn set(&self, load: f64) {
        self.0.store(load.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Load cell producing `zero + load * counts_per_unit` plus uniform noise
/// and mains hum.
#[derive(Debug)]
pub struct SimulatedLoadCell {
    zero: i32,
    counts_per_unit: f64,
    load: LoadHandle,
    noise: f64,
    hum: f64,
    hum_hz: f64,
    rate_hz: f64,
    rng: u64,
    tick: u64,
}

impl SimulatedLoadCell {
    pub fn new(zero: i32, counts_per_unit: f64) -> Self {
        Self {
            zero,
            counts_per_unit,
            load: LoadHandle::default(),
            noise: 0.0,
            hum: 0.0,
            hum_hz: 50.0,
            rate_hz: 80.0,
            rng: 0x2545_F491_4F6C_DD1D,
            tick: 0,
        }
    }

    /// Peak amplitude of the uniform noise, in counts.
    pub fn with_noise(mut self, counts: f64) -> Self {
        self.noise = counts.abs();
        self
    }

    /// Mains hum of `counts` peak at `hum_hz`, sampled at `rate_hz`.
    pub fn with_hum(mut self, counts: f64, hum_hz: f64, rate_hz: f64) -> Self {
        self.hum = counts.abs();
        self.hum_hz = hum_hz;
        self.rate_hz = rate_hz.max(1.0);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = seed.max(1);
        self
    }

    pub fn load(&self) -> LoadHandle {
        self.load.clone()
    }

    fn next_unit(&mut self) -> f64 {
        // xorshift64
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    fn sample(&mut self) -> i32 {
        let phase = TAU * self.hum_hz * self.tick as f64 / self.rate_hz;
        self.tick = self.tick.wrapping_add(1);
        let noise = if self.noise > 0.0 {
            (self.next_unit() * 2.0 - 1.0) * self.noise
        } else {
            0.0
        };
        let v = f64::from(self.zero)
            + self.load.get() * self.counts_per_unit
            + noise
            + self.hum * phase.sin();
        v.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
    }
}

impl SampleSource for SimulatedLoadCell {
    fn read_channel(&mut self, channel: u8) -> Result<i32, BoxError> {
        if channel != 0 {
            return Err(HwError::NoChannel(channel).into());
        }
        Ok(self.sample())
    }
}
