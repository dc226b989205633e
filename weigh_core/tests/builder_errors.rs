use std::collections::HashMap;

use rstest::rstest;
use weigh_core::error::BuildError;
use weigh_core::mocks::{NoopSource, ScriptedSource};
use weigh_core::store::BLOCK_BYTES;
use weigh_core::{
    CalibrationPoints, FilterCfg, ParamCache, PipelineCfg, ScaleParams, TradeMode, UnitSet,
    WeighScale,
};
use weigh_traits::{BlockStore, BoxError};

#[derive(Default)]
struct MemStore {
    blocks: HashMap<u16, Vec<u8>>,
}

impl BlockStore for MemStore {
    fn read_block(&mut self, block: u16) -> Result<Vec<u8>, BoxError> {
        Ok(self
            .blocks
            .get(&block)
            .cloned()
            .unwrap_or_else(|| vec![0; BLOCK_BYTES]))
    }
    fn write_block(&mut self, block: u16, bytes: &[u8]) -> Result<(), BoxError> {
        self.blocks.insert(block, bytes.to_vec());
        Ok(())
    }
}

fn cal() -> CalibrationPoints {
    CalibrationPoints::from_points(1_000.0, &[(5_000.0, 50.0), (9_000.0, 100.0)], 16, 20).unwrap()
}

#[rstest]
fn builder_missing_source_yields_typed_build_error() {
    let err = WeighScale::builder()
        .with_calibration(cal())
        .try_build()
        .expect_err("should fail with MissingSource");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingSource) => {}
        other => panic!("expected MissingSource, got: {other:?}"),
    }
}

#[rstest]
fn builder_without_calibration_or_store_fails() {
    let err = WeighScale::builder()
        .with_source(NoopSource)
        .try_build()
        .expect_err("should fail with MissingCalibration");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingCalibration)
    ));
}

#[rstest]
fn blank_store_is_not_a_calibration() {
    let err = WeighScale::builder()
        .with_source(NoopSource)
        .with_store(MemStore::default())
        .try_build()
        .expect_err("blank store holds no calibration");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingCalibration)
    ));
}

#[rstest]
fn calibration_is_picked_up_from_the_store() {
    let mut cache = ParamCache::new(MemStore::default());
    cache.save_calibration(&cal()).unwrap();

    let scale = WeighScale::builder()
        .with_source(ScriptedSource::new(vec![1_000]))
        .with_store(cache.into_inner())
        .try_build()
        .unwrap();
    assert_eq!(scale.calibration(), &cal());
    assert_eq!(scale.calibration().usr_geo(), 20);
}

#[rstest]
#[case(false, 100.0, 4)]
#[case(true, 20.0, 6)]
fn stored_scale_params_apply_only_when_asked(
    #[case] restore: bool,
    #[case] capacity: f64,
    #[case] poles: u8,
) {
    let stored =
        ScaleParams::new(20.0, 0.1, 1, TradeMode::Industrial, UnitSet::default(), 9.0).unwrap();
    let mut cache = ParamCache::new(MemStore::default());
    cache
        .save_scale(&stored, &FilterCfg { cutoff_hz: 1.0, poles: 6 })
        .unwrap();

    let scale = WeighScale::builder()
        .with_source(NoopSource)
        .with_calibration(cal())
        .with_store(cache.into_inner())
        .restore_params(restore)
        .build()
        .unwrap();
    assert_eq!(scale.params().capacity(), capacity);
    assert_eq!(scale.filter_cfg().poles, poles);
}

#[rstest]
#[case::rate(|p: &mut PipelineCfg| p.sampling.rate_hz = 0, "sampling rate")]
#[case::widen(|p: &mut PipelineCfg| p.sampling.widen_shift = 3, "widen shift")]
#[case::cutoff(|p: &mut PipelineCfg| p.filter.cutoff_hz = 12.0, "filter cutoff")]
#[case::poles(|p: &mut PipelineCfg| p.filter.poles = 1, "filter poles")]
#[case::notch(|p: &mut PipelineCfg| p.notch.frequency_hz = 0.0, "notch frequency")]
#[case::window(|p: &mut PipelineCfg| p.stability.window = 0, "stability window")]
#[case::motion(|p: &mut PipelineCfg| p.motion.range_counts = -1.0, "motion range")]
#[case::capture(|p: &mut PipelineCfg| p.capture.samples = 0, "capture samples")]
fn invalid_pipeline_is_rejected(#[case] tweak: fn(&mut PipelineCfg), #[case] needle: &str) {
    let mut p = PipelineCfg::default();
    tweak(&mut p);
    let err = WeighScale::builder()
        .with_source(NoopSource)
        .with_calibration(cal())
        .with_pipeline(p)
        .build()
        .expect_err("invalid pipeline must not build");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[rstest]
fn uncalibrated_scale_still_builds() {
    let mut scale = WeighScale::builder()
        .with_source(ScriptedSource::new(vec![4_000]))
        .with_calibration(CalibrationPoints::new(0.0, 1))
        .build()
        .unwrap();
    let r = scale.step().unwrap();
    assert!(!r.flags.calibrated);
    assert_eq!(r.gross, 0.0);
}
