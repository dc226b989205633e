//! A scale shared between the weighing loop and command handlers.
//!
//! One lock covers one full weight cycle or one full command, so commands never
//! observe a half-processed sample.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::builder::WeighScale;
use crate::command::Command;
use crate::error::{Result, WeighError};
use crate::status::WeightReading;

#[derive(Clone)]
pub struct SharedScale {
    inner: Arc<Mutex<WeighScale>>,
}

impl core::fmt::Debug for SharedScale {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedScale").finish_non_exhaustive()
    }
}

impl SharedScale {
    pub fn new(scale: WeighScale) -> Self {
        Self {
            inner: Arc::new(Mutex::new(scale)),
        }
    }

    fn lock(&self) -> std::result::Result<MutexGuard<'_, WeighScale>, WeighError> {
        self.inner
            .lock()
            .map_err(|_| WeighError::State("scale lock poisoned".into()))
    }

    pub fn process_sample(&self, raw: i32) -> Result<WeightReading> {
        self.lock().map_err(eyre::Report::new)?.process_sample(raw)
    }

    pub fn step(&self) -> Result<WeightReading> {
        self.lock().map_err(eyre::Report::new)?.step()
    }

    pub fn execute(&self, cmd: Command) -> std::result::Result<(), WeighError> {
        self.lock()?.execute(cmd)
    }

    /// Run `f` with exclusive access to the scale.
    pub fn with<R>(&self, f: impl FnOnce(&mut WeighScale) -> R) -> std::result::Result<R, WeighError> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }
}
