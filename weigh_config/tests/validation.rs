use rstest::rstest;
use weigh_config::{NotchKind, UnitToml, load_toml};

fn base_toml() -> String {
    r#"
[sampling]
rate_hz = 80
widen_shift = 4

[notch]
kind = "comb"
frequency_hz = 50.0

[filter]
cutoff_hz = 2.0
poles = 4

[scale]
capacity = 100.0
increment = 0.02
ranges = 1
calibration_unit = "kg"
primary_unit = "kg"
secondary_unit = "lb"
"#
    .to_string()
}

#[test]
fn accepts_minimal_config() {
    let cfg = load_toml(&base_toml()).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.notch.kind, NotchKind::Comb);
    assert_eq!(cfg.scale.secondary_unit, UnitToml::Lb);
}

#[test]
fn empty_document_uses_defaults() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults should validate");
    assert_eq!(cfg.sampling.rate_hz, 80);
    assert_eq!(cfg.stability.window, 20);
    assert_eq!(cfg.calibration.capture_samples, 30);
}

#[test]
fn rejects_zero_sample_rate_hz() {
    let toml = base_toml().replace("rate_hz = 80", "rate_hz = 0");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject rate_hz=0");
    assert!(format!("{err}").contains("sampling.rate_hz must be > 0"));
}

#[rstest]
#[case("cutoff_hz = 2.0", "cutoff_hz = 0.05", "filter.cutoff_hz")]
#[case("cutoff_hz = 2.0", "cutoff_hz = 10.0", "filter.cutoff_hz")]
#[case("poles = 4", "poles = 1", "filter.poles")]
#[case("poles = 4", "poles = 9", "filter.poles")]
#[case("widen_shift = 4", "widen_shift = 6", "sampling.widen_shift")]
#[case("capacity = 100.0", "capacity = 0.0", "scale.capacity")]
#[case("increment = 0.02", "increment = -1.0", "scale.increment")]
#[case("ranges = 1", "ranges = 4", "scale.ranges")]
#[case("frequency_hz = 50.0", "frequency_hz = 0.0", "notch.frequency_hz")]
fn rejects_out_of_range_values(#[case] from: &str, #[case] to: &str, #[case] needle: &str) {
    let toml = base_toml().replace(from, to);
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "expected '{needle}' in '{err}'"
    );
}

#[test]
fn custom_unit_requires_ratio() {
    let toml = base_toml().replace("secondary_unit = \"lb\"", "secondary_unit = \"custom\"");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("custom unit without ratio");
    assert!(format!("{err}").contains("custom_grams_per_unit"));

    let toml = format!("{toml}custom_grams_per_unit = 250.0\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("custom ratio supplied");
}

#[test]
fn rejects_unknown_unit_at_parse_time() {
    let toml = base_toml().replace("primary_unit = \"kg\"", "primary_unit = \"stone\"");
    assert!(load_toml(&toml).is_err());
}

#[test]
fn rejects_geo_code_above_31() {
    let toml = format!("{}\n[geo]\ncal_code = 32\nusr_code = 0\n", base_toml());
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("geo code out of range");
    assert!(format!("{err}").contains("geo codes"));
}

#[test]
fn rejects_capture_timeout_shorter_than_samples() {
    let toml = format!(
        "{}\n[calibration]\ncapture_samples = 30\ncapture_timeout_cycles = 10\n",
        base_toml()
    );
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("timeout too short");
    assert!(format!("{err}").contains("capture_timeout_cycles"));
}

#[test]
fn validates_inline_cal_points() {
    let good = format!(
        "{}\n[cal_points]\nzero_counts = 1000.0\npoints = [[5000.0, 50.0], [9000.0, 100.0]]\n",
        base_toml()
    );
    let cfg = load_toml(&good).expect("parse TOML");
    cfg.validate().expect("ascending points accepted");
    let cal = cfg.cal_points.expect("cal points present");
    assert_eq!(cal.points.len(), 2);

    let bad = format!(
        "{}\n[cal_points]\nzero_counts = 1000.0\npoints = [[9000.0, 50.0], [5000.0, 100.0]]\n",
        base_toml()
    );
    let cfg = load_toml(&bad).expect("parse TOML");
    let err = cfg.validate().expect_err("descending counts rejected");
    assert!(format!("{err}").contains("cal_points invalid"));
}

#[rstest]
#[case("[hardware]\nsensor_read_timeout_ms = 0\n", "hardware.sensor_read_timeout_ms")]
#[case("[simulation]\ncounts_per_unit = 0.0\n", "simulation.counts_per_unit")]
#[case("[simulation]\nnoise_counts = -1.0\n", "simulation amplitudes")]
fn rejects_bad_device_sections(#[case] extra: &str, #[case] needle: &str) {
    let cfg = load_toml(&format!("{}\n{extra}", base_toml())).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(format!("{err}").contains(needle), "expected '{needle}' in '{err}'");
}

#[test]
fn device_sections_default_when_absent() {
    let cfg = load_toml(&base_toml()).expect("parse TOML");
    assert_eq!(cfg.hardware.dt_pin, 5);
    assert_eq!(cfg.hardware.sensor_read_timeout_ms, 150);
    assert_eq!(cfg.simulation.zero_counts, 500);
    assert!(cfg.storage.dir.is_none());
}

#[test]
fn shipped_config_validates() {
    let cfg = load_toml(include_str!("../../etc/weigh_config.toml")).expect("parse shipped TOML");
    cfg.validate().expect("shipped config is valid");
    assert_eq!(cfg.notch.kind, NotchKind::Comb);
    assert_eq!(cfg.storage.dir.as_deref(), Some("var/weigh"));
    assert!(cfg.cal_points.is_none());
}
