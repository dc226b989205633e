//! Background acquisition thread.
//!
//! Spawns a thread that owns the `SampleSource`, hands every reading to the
//! weighing loop through a bounded channel, and records the last good read for
//! stall detection. Paced and event-driven variants are provided.
//!
//! Each `Sampler` owns exactly one thread; dropping the `Sampler` signals it and
//! joins it.
use crossbeam_channel as xch;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use weigh_traits::SampleSource;
use weigh_traits::clock::Clock;

pub struct Sampler {
    rx: xch::Receiver<i32>,
    last_ok: Arc<AtomicU64>,
    read_errors: Arc<AtomicU64>,
    epoch: Instant,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

struct Shared {
    shutdown: Arc<AtomicBool>,
    last_ok: Arc<AtomicU64>,
    read_errors: Arc<AtomicU64>,
}

impl Sampler {
    /// Read `channel` every `1/hz` seconds.
    pub fn spawn<S, C>(source: S, channel: u8, hz: u32, clock: C) -> Self
    where
        S: SampleSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let period = Duration::from_micros(crate::util::period_us(hz));
        Self::start(source, channel, Some(period), clock)
    }

    /// Event-driven: the source blocks until its data-ready line fires, so no
    /// extra sleep is added between reads.
    pub fn spawn_event<S, C>(source: S, channel: u8, clock: C) -> Self
    where
        S: SampleSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        Self::start(source, channel, None, clock)
    }

    fn start<S, C>(mut source: S, channel: u8, period: Option<Duration>, clock: C) -> Self
    where
        S: SampleSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let (tx, rx) = xch::bounded(1);
        let shared = Shared {
            shutdown: Arc::new(AtomicBool::new(false)),
            last_ok: Arc::new(AtomicU64::new(0)),
            read_errors: Arc::new(AtomicU64::new(0)),
        };
        let (shutdown, last_ok, read_errors) = (
            shared.shutdown.clone(),
            shared.last_ok.clone(),
            shared.read_errors.clone(),
        );
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shared.shutdown.load(Ordering::Relaxed) {
                    tracing::debug!("sampler received shutdown signal");
                    break;
                }
                match source.read_channel(channel) {
                    Ok(v) => {
                        // Block until the weighing loop takes it; exit if it is gone.
                        if tx.send(v).is_err() {
                            tracing::debug!("sampler consumer disconnected");
                            break;
                        }
                        shared
                            .last_ok
                            .store(clock.ms_since(epoch), Ordering::Relaxed);
                    }
                    Err(e) => {
                        let n = shared.read_errors.fetch_add(1, Ordering::Relaxed) + 1;
                        tracing::debug!(channel, errors = n, error = %e, "sample read failed");
                    }
                }
                if shared.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if let Some(p) = period {
                    clock.sleep(p);
                }
            }
            tracing::trace!("sampler thread exiting");
        });

        Self {
            rx,
            last_ok,
            read_errors,
            epoch,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Next reading in arrival order, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<i32> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Most recent queued reading, dropping older ones.
    pub fn latest(&self) -> Option<i32> {
        self.rx.try_iter().last()
    }

    pub fn read_errors(&self) -> u64 {
        self.read_errors.load(Ordering::Relaxed)
    }

    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }

    /// Stall age measured against this sampler's epoch on the wall clock.
    pub fn stalled_for_now(&self) -> u64 {
        let ms = Instant::now().saturating_duration_since(self.epoch).as_millis();
        self.stalled_for(u64::try_from(ms).unwrap_or(u64::MAX))
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // Unblock a pending send so the thread can see the flag.
        while self.rx.try_recv().is_ok() {}
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("sampler thread joined"),
                Err(e) => tracing::warn!(?e, "sampler thread panicked during shutdown"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weigh_traits::{BoxError, MonotonicClock};

    struct Counter(i32);
    impl SampleSource for Counter {
        fn read_channel(&mut self, _channel: u8) -> Result<i32, BoxError> {
            self.0 += 1;
            Ok(self.0)
        }
    }

    struct Broken;
    impl SampleSource for Broken {
        fn read_channel(&mut self, _channel: u8) -> Result<i32, BoxError> {
            std::thread::sleep(Duration::from_millis(1));
            Err("adc not ready".into())
        }
    }

    #[test]
    fn delivers_readings_in_order() {
        let s = Sampler::spawn_event(Counter(0), 0, MonotonicClock::new());
        let a = s.recv_timeout(Duration::from_secs(1)).unwrap();
        let b = s.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn counts_read_errors() {
        let s = Sampler::spawn(Broken, 0, 1_000, MonotonicClock::new());
        assert_eq!(s.recv_timeout(Duration::from_millis(50)), None);
        assert!(s.read_errors() > 0);
    }

    #[test]
    fn drop_joins_thread() {
        let s = Sampler::spawn(Counter(0), 0, 500, MonotonicClock::new());
        let _ = s.recv_timeout(Duration::from_millis(100));
        drop(s);
    }
}
