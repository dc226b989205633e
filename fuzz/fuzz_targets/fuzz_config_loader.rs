#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are both fine; panics are not.
    if let Ok(cfg) = weigh_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // A config that validates must convert without panicking.
            let _ = weigh_core::PipelineCfg::from(&cfg);
            let _ = weigh_core::ScaleParams::try_from(&cfg.scale);
            let _ = weigh_core::calibration_from_config(&cfg);
        }
    }
});
