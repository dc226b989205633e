//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "weigh", version, about = "Weighing scale CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/weigh_config.toml")]
    pub config: PathBuf,

    /// Optional calibration CSV (strict header); takes precedence over the
    /// config and the parameter store
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Print readings and errors as JSON lines; console logs become JSON too
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging] level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct LoopArgs {
    /// Hard cap on the run time in ms
    #[arg(long, value_name = "MS")]
    pub max_run_ms: Option<u64>,
    /// Read the load cell inside the weighing loop instead of on a sampler thread
    #[arg(long, action = ArgAction::SetTrue)]
    pub direct: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Weigh continuously and print readings
    Run {
        /// Stop after this many weight cycles (default: until Ctrl-C)
        #[arg(long, value_name = "N")]
        cycles: Option<u64>,
        /// Print every Nth reading; 0 prints only the final one
        #[arg(long, value_name = "N", default_value_t = 0)]
        every: u64,
        /// Load placed on the simulated platter, in calibration units
        #[arg(long, value_name = "LOAD")]
        load: Option<f64>,
        /// Display in the secondary unit
        #[arg(long, action = ArgAction::SetTrue)]
        secondary: bool,
        /// Show one extra decimal place
        #[arg(long, action = ArgAction::SetTrue)]
        expand: bool,
        #[command(flatten)]
        run: LoopArgs,
    },
    /// Capture one calibration point and save it to the parameter store
    Calibrate {
        /// Test point to capture: 0 is zero, 1..=4 are upscale points
        #[arg(long, value_name = "N")]
        testpoint: u8,
        /// Known load on the platter, in calibration units (0 for zero)
        #[arg(long, value_name = "LOAD", default_value_t = 0.0)]
        load: f64,
        #[command(flatten)]
        run: LoopArgs,
    },
    /// Quick health check (load cell answers, calibration available)
    SelfCheck,
}
