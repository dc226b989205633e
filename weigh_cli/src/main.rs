#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `weigh`: run, calibrate and check a weighing scale from a TOML config.

mod cli;
mod error_fmt;
mod weigh;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn file_layer(logging: &weigh_config::Logging) -> Option<BoxedLayer> {
    let path = Path::new(logging.file.as_deref()?);
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path.file_name()?.to_string_lossy().into_owned();
    let rotation = match logging.rotation.as_deref() {
        Some("daily") => Rotation::DAILY,
        Some("hourly") => Rotation::HOURLY,
        _ => Rotation::NEVER,
    };
    let appender = match RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(name)
        .build(dir)
    {
        Ok(a) => a,
        Err(e) => {
            eprintln!("log file disabled: {e}");
            return None;
        }
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);
    Some(
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .boxed(),
    )
}

/// Console logs go to stderr so stdout carries only readings.
fn init_tracing(json: bool, level: Option<&str>, logging: &weigh_config::Logging) {
    let level = level
        .or(logging.level.as_deref())
        .unwrap_or("info")
        .to_string();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console: BoxedLayer = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };
    let mut layers = vec![console];
    layers.extend(file_layer(logging));

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
}

fn real_main(cli: Cli, stop: &AtomicBool) -> Result<()> {
    let text = std::fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("read config {}", cli.config.display()))?;
    let cfg = weigh_config::load_toml(&text).wrap_err("invalid configuration")?;
    cfg.validate().wrap_err("invalid configuration")?;

    init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging);
    tracing::debug!(config = %cli.config.display(), "config loaded");

    let csv = cli
        .calibration
        .as_deref()
        .map(weigh_config::load_calibration_csv)
        .transpose()?;

    match cli.cmd {
        Commands::Run {
            cycles,
            every,
            load,
            secondary,
            expand,
            run,
        } => {
            let req = weigh::RunRequest {
                cycles,
                every,
                load,
                secondary,
                expand,
                run,
            };
            weigh::run(&cfg, csv.as_ref(), &req, stop)
        }
        Commands::Calibrate {
            testpoint,
            load,
            run,
        } => weigh::calibrate(&cfg, csv.as_ref(), testpoint, load, run, stop),
        Commands::SelfCheck => weigh::self_check(&cfg, csv.as_ref()),
    }
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("error reports without color: {e}");
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)) {
            eprintln!("Ctrl-C handler not installed: {e}");
        }
    }

    let code = match real_main(cli, &stop) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "weigh failed");
            if cli::json_mode() {
                println!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}
