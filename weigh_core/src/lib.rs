#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Weighing pipeline core (hardware-agnostic).
//!
//! Raw load-cell counts come in through `weigh_traits::SampleSource`; persisted
//! parameters go through `weigh_traits::BlockStore`. Everything in between lives
//! here.
//!
//! ## Pipeline
//!
//! - **Filtering**: mains notch (`notch`), Mayer low-pass cascade (`lowpass`),
//!   fill-noise stability switching over a validated coefficient catalog
//!   (`stability`, `coefficients`)
//! - **State**: motion (`motion`), zero and AZM (`zero`), tare (`tare`)
//! - **Calibration**: span and multi-point linearity (`calibration`), point
//!   capture (`capture`), persistence (`store`)
//! - **Presentation**: units and 1-2-5 increments (`units`), ranges and
//!   fixed-width strings (`params`)
//! - **Driver**: per-cycle orchestration (`ScaleCore`), commands, the shared
//!   scale, background sampling and the paced run loop
//!
//! Weights are computed in the calibration unit and converted to the display
//! unit only when a reading is produced.

pub mod builder;
pub mod calibration;
pub mod capture;
pub mod coefficients;
pub mod command;
pub mod config;
pub mod conversions;
pub mod core;
pub mod error;
pub mod hw_error;
pub mod lowpass;
pub mod mocks;
pub mod motion;
pub mod notch;
pub mod params;
pub mod reinit;
pub mod runner;
pub mod sampler;
pub mod shared;
pub mod stability;
pub mod status;
pub mod store;
pub mod tare;
pub mod units;
pub mod util;
pub mod zero;

pub use builder::{DynSource, Missing, ScaleBuilder, ScaleG, Set, WeighScale, build_scale};
pub use calibration::{CalibrationPoints, LinearFactors, TestPoint};
pub use capture::{AbortReason, CalibrationCapture, CaptureState};
pub use command::Command;
pub use config::{
    CaptureCfg, FilterCfg, MotionCfg, NetSignCorrection, NotchCfg, PipelineCfg, SamplingCfg,
    StabilityCfg, TareCfg, ZeroCfg,
};
pub use conversions::calibration_from_config;
pub use crate::core::{DynStore, ScaleCore};
pub use error::{
    BuildError, CalibrationError, Report, Result, StorageError, TareError, WeighError, ZeroError,
};
pub use notch::NotchMode;
pub use params::{ScaleParams, TradeMode, UnitSet};
pub use reinit::{Reinit, Reinitializable};
pub use runner::{RunOptions, RunSummary, SamplingMode, run_cycles};
pub use shared::SharedScale;
pub use status::{StatusFlags, WeightReading};
pub use store::ParamCache;
pub use tare::{TareMode, TareSource};
pub use units::{Unit, UnitConverter};
pub use zero::PowerUpZeroStatus;
