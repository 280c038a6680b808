use tracing::debug;

use super::ops::{subtract_bias, subtract_dark};
use super::CalibrationConfig;
use crate::combine::sigma_clip::median_in_place;
use crate::combine::{combine, CombineConfig};
use crate::error::{CcdError, Result};
use crate::frame::{Frame, FrameSet, FrameType, MasterFrame};

/// Combine raw bias frames.
pub fn create_master_bias(frames: &FrameSet, config: &CombineConfig) -> Result<MasterFrame> {
    ensure_type(frames, FrameType::Bias)?;
    combine(frames, config)
}

/// Subtract the master bias from every raw dark, then combine.
pub fn create_master_dark(
    frames: &FrameSet,
    bias: &MasterFrame,
    config: &CombineConfig,
) -> Result<MasterFrame> {
    ensure_type(frames, FrameType::Dark)?;
    frames.validate_shapes()?;

    let debiased = frames
        .frames
        .iter()
        .map(|f| subtract_bias(f, bias))
        .collect::<Result<Vec<_>>>()?;
    debug!(n_frames = debiased.len(), "Bias-subtracted raw darks");

    combine(&FrameSet::new(FrameType::Dark, debiased), config)
}

/// Remove bias (and dark, if given) from every raw flat, normalise each by
/// its median, then combine.
pub fn create_master_flat(
    frames: &FrameSet,
    bias: &MasterFrame,
    dark: Option<&MasterFrame>,
    config: &CombineConfig,
    calibration: &CalibrationConfig,
) -> Result<MasterFrame> {
    ensure_type(frames, FrameType::Flat)?;
    frames.validate_shapes()?;

    let prepared = frames
        .frames
        .iter()
        .map(|f| {
            let mut frame = subtract_bias(f, bias)?;
            if let Some(dark) = dark {
                frame = subtract_dark(&frame, dark, calibration.scale_dark)?;
            }
            normalize_by_median(frame)
        })
        .collect::<Result<Vec<_>>>()?;
    debug!(n_frames = prepared.len(), "Normalised raw flats");

    combine(&FrameSet::new(FrameType::Flat, prepared), config)
}

fn normalize_by_median(mut frame: Frame) -> Result<Frame> {
    let mut values: Vec<f32> = frame
        .data
        .indexed_iter()
        .filter(|((r, c), _)| !frame.is_masked(*r, *c))
        .map(|(_, &v)| v)
        .collect();
    let median = median_in_place(&mut values);
    if !(median.is_finite() && median > 0.0) {
        return Err(CcdError::InvalidInput(format!(
            "flat frame median must be positive after bias/dark removal, got {median}"
        )));
    }
    frame.data.mapv_inplace(|v| v / median);
    if let Some(err) = frame.uncertainty.as_mut() {
        err.mapv_inplace(|e| e / median);
    }
    Ok(frame)
}

fn ensure_type(frames: &FrameSet, expected: FrameType) -> Result<()> {
    if frames.frame_type != expected {
        return Err(CcdError::InvalidInput(format!(
            "expected {expected} frames, got {}",
            frames.frame_type
        )));
    }
    Ok(())
}
