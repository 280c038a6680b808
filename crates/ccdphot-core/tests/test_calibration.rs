#[allow(dead_code)]
mod common;

use approx::assert_relative_eq;
use ndarray::Array2;

use ccdphot_core::calibration::{
    calibrate, create_master_bias, create_master_dark, create_master_flat, flat_correct, subtract_bias,
    subtract_dark, CalibrationConfig, MasterSet,
};
use ccdphot_core::combine::CombineConfig;
use ccdphot_core::error::CcdError;
use ccdphot_core::frame::{Frame, FrameType, MasterFrame};

const H: usize = 6;
const W: usize = 8;

/// Flat of 0.8 on the left half and 1.2 on the right half (mean 1).
fn split_flat() -> Array2<f32> {
    Array2::from_shape_fn((H, W), |(_, c)| if c < W / 2 { 0.8 } else { 1.2 })
}

fn masters() -> (MasterFrame, MasterFrame, MasterFrame) {
    let bias = MasterFrame::from_frame(common::constant_frame(H, W, 100.0), FrameType::Bias);
    let dark = MasterFrame::from_frame(
        common::constant_frame(H, W, 20.0).with_metadata(common::metadata(Some(10.0), None)),
        FrameType::Dark,
    );
    let flat = MasterFrame::from_frame(Frame::new(split_flat()), FrameType::Flat);
    (bias, dark, flat)
}

fn science() -> Frame {
    let flat = split_flat();
    Frame::new(flat.mapv(|f| 120.0 + 50.0 * f)).with_metadata(common::metadata(Some(10.0), Some("V")))
}

#[test]
fn test_full_calibration_recovers_signal() {
    let (bias, dark, flat) = masters();
    let masters = MasterSet::new(&bias).with_dark(&dark).with_flat(&flat);

    let out = calibrate(&science(), &masters, &CalibrationConfig::default()).unwrap();
    for &v in out.data.iter() {
        assert_relative_eq!(v, 50.0, epsilon = 1e-4);
    }
    assert!(out.provenance.is_calibrated);
    assert_eq!(out.metadata.filter.as_deref(), Some("V"));
}

#[test]
fn test_calibration_order_matters() {
    let (bias, dark, flat) = masters();

    // Flat before dark gives a different result at every non-unit flat pixel.
    let debiased = subtract_bias(&science(), &bias).unwrap();
    let flat_first = flat_correct(&debiased, &flat, None).unwrap();
    let wrong = subtract_dark(&flat_first, &dark, false).unwrap();

    let right = calibrate(
        &science(),
        &MasterSet::new(&bias).with_dark(&dark).with_flat(&flat),
        &CalibrationConfig::default(),
    )
    .unwrap();

    let diff = (wrong.data[[0, 0]] - right.data[[0, 0]]).abs();
    assert!(diff > 1.0, "flat-first result should differ, diff={diff}");
}

#[test]
fn test_bias_only_calibration() {
    let (bias, _, _) = masters();
    let out = calibrate(
        &common::constant_frame(H, W, 150.0),
        &MasterSet::new(&bias),
        &CalibrationConfig::default(),
    )
    .unwrap();
    assert_relative_eq!(out.data[[2, 3]], 50.0);
}

#[test]
fn test_dark_scaling_by_exposure() {
    let dark = MasterFrame::from_frame(
        common::constant_frame(H, W, 40.0).with_metadata(common::metadata(Some(20.0), None)),
        FrameType::Dark,
    );
    let frame = common::constant_frame(H, W, 100.0).with_metadata(common::metadata(Some(10.0), None));

    let scaled = subtract_dark(&frame, &dark, true).unwrap();
    assert_relative_eq!(scaled.data[[0, 0]], 80.0, epsilon = 1e-5);

    let unscaled = subtract_dark(&frame, &dark, false).unwrap();
    assert_relative_eq!(unscaled.data[[0, 0]], 60.0, epsilon = 1e-5);
}

#[test]
fn test_dark_scaling_requires_exposure() {
    let dark = MasterFrame::from_frame(common::constant_frame(H, W, 40.0), FrameType::Dark);
    let frame = common::constant_frame(H, W, 100.0).with_metadata(common::metadata(Some(10.0), None));
    assert!(matches!(subtract_dark(&frame, &dark, true), Err(CcdError::InvalidInput(_))));
}

#[test]
fn test_flat_nonpositive_pixels_are_masked() {
    let mut flat_data = Array2::from_elem((H, W), 1.0f32);
    flat_data[[2, 2]] = 0.0;
    let flat = MasterFrame::from_frame(Frame::new(flat_data), FrameType::Flat);
    let frame = common::constant_frame(H, W, 10.0);

    let out = flat_correct(&frame, &flat, None).unwrap();
    let mask = out.mask.as_ref().unwrap();
    assert!(mask[[2, 2]]);
    assert_eq!(out.data[[2, 2]], 0.0);
    assert!(!mask[[0, 0]]);
    assert!(out.data.iter().all(|v| v.is_finite()));
}

#[test]
fn test_flat_min_value_replaces_low_pixels() {
    let mut flat_data = Array2::from_elem((H, W), 1.0f32);
    flat_data[[2, 2]] = 0.0;
    let flat = MasterFrame::from_frame(Frame::new(flat_data), FrameType::Flat);
    let frame = common::constant_frame(H, W, 10.0);

    let out = flat_correct(&frame, &flat, Some(0.5)).unwrap();
    assert!(out.mask.is_none());
    // Mean of the floored flat: (47 * 1.0 + 0.5) / 48.
    let norm = (47.0 + 0.5) / 48.0;
    assert_relative_eq!(out.data[[2, 2]], 10.0 / (0.5 / norm), epsilon = 1e-4);
}

#[test]
fn test_flat_with_nonpositive_mean_fails() {
    let flat = MasterFrame::from_frame(common::constant_frame(H, W, 0.0), FrameType::Flat);
    let frame = common::constant_frame(H, W, 10.0);
    assert!(matches!(flat_correct(&frame, &flat, None), Err(CcdError::InvalidInput(_))));
}

#[test]
fn test_subtraction_propagates_uncertainty() {
    let bias = MasterFrame::from_frame(
        common::constant_frame(H, W, 100.0)
            .with_uncertainty(Array2::from_elem((H, W), 4.0))
            .unwrap(),
        FrameType::Bias,
    );
    let frame = common::constant_frame(H, W, 200.0)
        .with_uncertainty(Array2::from_elem((H, W), 3.0))
        .unwrap();

    let out = subtract_bias(&frame, &bias).unwrap();
    assert_relative_eq!(out.uncertainty.unwrap()[[1, 1]], 5.0, epsilon = 1e-5);
}

#[test]
fn test_shape_mismatch_on_subtract() {
    let bias = MasterFrame::from_frame(common::constant_frame(H, W + 1, 100.0), FrameType::Bias);
    let frame = common::constant_frame(H, W, 200.0);
    assert!(matches!(subtract_bias(&frame, &bias), Err(CcdError::ShapeMismatch { .. })));
}

#[test]
fn test_master_dark_is_bias_subtracted() {
    let bias_set = common::frame_set(FrameType::Bias, 5, H, W, 100.0, Default::default());
    let dark_set = common::frame_set(FrameType::Dark, 5, H, W, 130.0, common::metadata(Some(30.0), None));

    let bias = create_master_bias(&bias_set, &CombineConfig::default()).unwrap();
    let dark = create_master_dark(&dark_set, &bias, &CombineConfig::default()).unwrap();

    assert_eq!(dark.master_type(), FrameType::Dark);
    assert_relative_eq!(dark.frame().data[[0, 0]], 30.0, epsilon = 1e-3);
    assert_eq!(dark.frame().metadata.exposure_time, Some(30.0));
}

#[test]
fn test_master_flat_is_normalised() {
    let bias = MasterFrame::from_frame(common::constant_frame(H, W, 100.0), FrameType::Bias);
    let frames = [1000.0f32, 2000.0, 1500.0]
        .iter()
        .map(|&level| Frame::new(split_flat().mapv(|f| 100.0 + level * f)))
        .collect();
    let flats = ccdphot_core::frame::FrameSet::new(FrameType::Flat, frames);

    let master = create_master_flat(
        &flats,
        &bias,
        None,
        &CombineConfig::default(),
        &CalibrationConfig::default(),
    )
    .unwrap();

    // Each flat is divided by its own median (exactly 1.0 for the split pattern).
    assert_relative_eq!(master.frame().data[[0, 0]], 0.8, epsilon = 1e-4);
    assert_relative_eq!(master.frame().data[[0, W - 1]], 1.2, epsilon = 1e-4);
}

#[test]
fn test_master_requires_matching_frame_type() {
    let darks = common::frame_set(FrameType::Dark, 3, H, W, 10.0, Default::default());
    assert!(matches!(
        create_master_bias(&darks, &CombineConfig::default()),
        Err(CcdError::InvalidInput(_))
    ));
}
