use weigh_core::error::{CalibrationError, StorageError, TareError, WeighError, ZeroError};
use weigh_core::{CalibrationPoints, WeighScale};
use weigh_traits::{BoxError, SampleSource};

/// A source that returns OK once, then errors with the given message.
struct FlakySource {
    ok_sent: bool,
    message: &'static str,
}

impl FlakySource {
    fn new(message: &'static str) -> Self {
        Self {
            ok_sent: false,
            message,
        }
    }
}

impl SampleSource for FlakySource {
    fn read_channel(&mut self, _channel: u8) -> Result<i32, BoxError> {
        if self.ok_sent {
            Err(self.message.into())
        } else {
            self.ok_sent = true;
            Ok(0)
        }
    }
}

fn scale(source: FlakySource) -> WeighScale {
    WeighScale::builder()
        .with_source(source)
        .with_calibration(CalibrationPoints::from_points(0.0, &[(10_000.0, 100.0)], 16, 16).unwrap())
        .build()
        .unwrap()
}

#[test]
fn sensor_timeout_maps_to_timeout() {
    let mut s = scale(FlakySource::new("sensor timeout"));
    s.step().expect("first read succeeds");
    let err = s.step().expect_err("second read fails");
    assert!(matches!(err.downcast_ref::<WeighError>(), Some(WeighError::Timeout)));
    assert_eq!(err.to_string(), "reading load cell");
    assert_eq!(s.cycles(), 1);
}

#[test]
fn other_source_errors_map_to_hardware() {
    let mut s = scale(FlakySource::new("spi bus fault"));
    s.step().unwrap();
    let err = s.step().unwrap_err();
    match err.downcast_ref::<WeighError>() {
        Some(WeighError::Hardware(msg)) => assert_eq!(msg, "spi bus fault"),
        other => panic!("expected Hardware, got {other:?}"),
    }
}

#[test]
fn nested_errors_render_with_their_cause() {
    let e = WeighError::from(ZeroError::OutOfNegativeRange);
    assert_eq!(e.to_string(), "zero rejected: below push-button zero limit");
    let e = WeighError::from(StorageError::Checksum {
        block: 1,
        stored: 0x1234,
        computed: 0x00ff,
    });
    assert_eq!(
        e.to_string(),
        "storage error: block 1 checksum mismatch (stored 0x1234, computed 0x00ff)"
    );
}

#[test]
fn motion_rejections_are_recognised() {
    assert!(WeighError::Zero(ZeroError::InMotion).is_motion());
    assert!(WeighError::Tare(TareError::InMotion).is_motion());
    assert!(!WeighError::Calibration(CalibrationError::CaptureBusy).is_motion());
    assert!(!WeighError::Zero(ZeroError::NetMode).is_motion());
    assert!(!WeighError::Timeout.is_motion());
}
