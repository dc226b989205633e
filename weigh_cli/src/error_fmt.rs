//! Human-readable error descriptions and structured JSON error formatting.

use weigh_core::error::{BuildError, StorageError, TareError, WeighError, ZeroError};

use crate::weigh::reason_name;

fn explain(what: &str, causes: &str, fix: &str) -> String {
    format!("What happened: {what}.\nLikely causes: {causes}.\nHow to fix: {fix}.")
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSource => explain(
                "No load cell was provided to the scale",
                "The load cell failed to initialize or was not wired into the builder",
                "Ensure the source is created successfully and passed via with_source(...)",
            ),
            BuildError::MissingCalibration => explain(
                "The scale has no calibration",
                "No --calibration CSV, no [cal_points] in the config and nothing in the parameter store",
                "Run `weigh calibrate --testpoint 0` then `weigh calibrate --testpoint 1 --load <known>`, or supply a CSV",
            ),
            BuildError::InvalidConfig(msg) => explain(
                &format!("Invalid configuration ({msg})"),
                "Out-of-range values in the TOML",
                "Edit the config file, then rerun",
            ),
        };
    }

    if let Some(we) = err.downcast_ref::<WeighError>() {
        return match we {
            WeighError::Timeout => explain(
                "Scale read timed out",
                "HX711 not wired correctly, no power/ground, or timeout too low",
                "Verify DT/SCK pins and power, and consider increasing hardware.sensor_read_timeout_ms in the config",
            ),
            WeighError::Hardware(msg) | WeighError::HardwareFault(msg) => explain(
                &format!("The load cell reported an error ({msg})"),
                "A saturated or disconnected load cell, or a GPIO permission problem",
                "Check the load cell cable and excitation, then rerun with --log-level=debug",
            ),
            WeighError::Storage(se) => {
                let causes = match se {
                    StorageError::Checksum { .. } | StorageError::BlockLength { .. } => {
                        "A parameter block was corrupted or written by another build"
                    }
                    _ => "The [storage] dir is missing, read-only or full",
                };
                explain(
                    &format!("Parameter storage failed ({se})"),
                    causes,
                    "Fix the storage directory, or remove the damaged block file and recalibrate",
                )
            }
            WeighError::Zero(ZeroError::InMotion) | WeighError::Tare(TareError::InMotion) => explain(
                "The request was refused because the scale is in motion",
                "Vibration, air draft, or a load still settling",
                "Wait for the reading to settle and try again",
            ),
            WeighError::Calibration(ce) => explain(
                &format!("Calibration rejected ({ce})"),
                "A test point outside the configured upscale points, or a non-positive load",
                "Check calibration.upscale_test_points and the --load value",
            ),
            other => explain(
                &other.to_string(),
                "See logs",
                "Re-run with --log-level=debug or set RUST_LOG for more detail",
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open hx711") {
        return explain(
            "Failed to initialize the HX711 pins",
            "Incorrect pin numbers or insufficient GPIO permissions",
            "Fix hardware.dt_pin / hardware.sck_pin; ensure the process may access GPIO",
        );
    }

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'counts,weight'.".to_string();
    }

    if lower.contains("invalid configuration") || lower.contains("read config") {
        let cause = err.root_cause().to_string();
        return explain(
            &format!("Configuration is invalid or unreadable ({cause})"),
            "A missing file, a TOML syntax error, or an out-of-range value",
            "Edit the TOML config and try again",
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per failure class; everything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<WeighError>() {
        Some(WeighError::Timeout) => 3,
        Some(WeighError::Hardware(_) | WeighError::HardwareFault(_)) => 4,
        Some(WeighError::Storage(_)) => 5,
        Some(WeighError::Calibration(_)) => 6,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_through_context_is_recognised() {
        let err = eyre::Report::new(WeighError::Timeout).wrap_err("reading load cell");
        assert!(humanize(&err).starts_with("What happened: Scale read timed out"));
        assert_eq!(exit_code_for_error(&err), 3);
    }

    #[test]
    fn json_error_carries_reason() {
        let err = eyre::Report::new(BuildError::MissingCalibration);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Build");
        assert!(v["message"].as_str().unwrap().contains("no calibration"));
    }

    #[test]
    fn plain_errors_fall_back() {
        let err = eyre::eyre!("boom");
        assert!(humanize(&err).contains("Original: boom"));
        assert_eq!(exit_code_for_error(&err), 1);
    }
}
