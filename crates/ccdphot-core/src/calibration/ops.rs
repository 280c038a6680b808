use ndarray::{Array2, Zip};

use crate::error::{CcdError, Result};
use crate::frame::{Frame, MasterFrame};

/// Subtract a master bias pixel-wise.
pub fn subtract_bias(frame: &Frame, bias: &MasterFrame) -> Result<Frame> {
    subtract(frame, bias.frame(), 1.0, "bias subtraction")
}

/// Subtract a master dark pixel-wise.
///
/// With `scale` set the dark is multiplied by the ratio of the frame's
/// exposure time to the dark's before subtracting; both exposure times must
/// then be known.
pub fn subtract_dark(frame: &Frame, dark: &MasterFrame, scale: bool) -> Result<Frame> {
    let factor = if scale {
        let frame_exp = frame.metadata.exposure_time.ok_or_else(|| {
            CcdError::InvalidInput("dark scaling requires the frame exposure time".into())
        })?;
        let dark_exp = dark.frame().metadata.exposure_time.ok_or_else(|| {
            CcdError::InvalidInput("dark scaling requires the dark exposure time".into())
        })?;
        if dark_exp <= 0.0 {
            return Err(CcdError::InvalidInput(format!(
                "dark exposure time must be positive, got {dark_exp}"
            )));
        }
        (frame_exp / dark_exp) as f32
    } else {
        1.0
    };
    subtract(frame, dark.frame(), factor, "dark subtraction")
}

/// Divide by a flat field normalised to unit mean.
///
/// Flat values below `min_value` are raised to it before normalising.
/// Pixels whose normalised flat is not positive are set to zero and masked.
pub fn flat_correct(frame: &Frame, flat: &MasterFrame, min_value: Option<f32>) -> Result<Frame> {
    let flat = flat.frame();
    check_shape("flat correction", frame, flat)?;

    let mut flat_data = flat.data.clone();
    if let Some(min) = min_value {
        flat_data.mapv_inplace(|v| v.max(min));
    }

    let (sum, count) = Zip::from(&flat_data)
        .and(&mask_or_none(flat))
        .fold((0.0f64, 0usize), |(s, c), &v, &m| {
            if m { (s, c) } else { (s + v as f64, c + 1) }
        });
    let norm = if count > 0 { sum / count as f64 } else { 0.0 };
    if !(norm.is_finite() && norm > 0.0) {
        return Err(CcdError::InvalidInput(format!(
            "flat field mean must be positive, got {norm}"
        )));
    }
    let norm = norm as f32;
    let normalized = flat_data.mapv(|v| v / norm);

    let mut data = frame.data.clone();
    let mut mask = merged_mask(frame, flat);
    let mut bad = false;
    Zip::from(&mut data)
        .and(&mut mask)
        .and(&normalized)
        .for_each(|d, m, &f| {
            if f > 0.0 {
                *d /= f;
            } else {
                *d = 0.0;
                *m = true;
                bad = true;
            }
        });

    let uncertainty = match (&frame.uncertainty, &flat.uncertainty) {
        (None, None) => None,
        (ea, ef) => {
            let mut err = Array2::<f32>::zeros(frame.shape());
            Zip::indexed(&mut err).for_each(|(r, c), e| {
                let f = normalized[[r, c]];
                if f > 0.0 {
                    let a = frame.data[[r, c]];
                    let ea = ea.as_ref().map_or(0.0, |u| u[[r, c]]);
                    let ef = ef.as_ref().map_or(0.0, |u| u[[r, c]]) / norm;
                    *e = ((ea / f).powi(2) + (a * ef / (f * f)).powi(2)).sqrt();
                }
            });
            Some(err)
        }
    };

    let mut out = frame.clone();
    out.data = data;
    out.uncertainty = uncertainty;
    out.mask = if bad || frame.mask.is_some() || flat.mask.is_some() {
        Some(mask)
    } else {
        None
    };
    Ok(out)
}

pub(crate) fn subtract(frame: &Frame, other: &Frame, factor: f32, context: &str) -> Result<Frame> {
    check_shape(context, frame, other)?;
    if frame.unit != other.unit {
        return Err(CcdError::InvalidInput(format!(
            "{context}: unit {:?} does not match {:?}",
            other.unit, frame.unit
        )));
    }

    let data = &frame.data - &other.data.mapv(|v| v * factor);

    let uncertainty = match (&frame.uncertainty, &other.uncertainty) {
        (None, None) => None,
        (Some(a), None) => Some(a.clone()),
        (None, Some(b)) => Some(b.mapv(|e| (e * factor).abs())),
        (Some(a), Some(b)) => Some(Zip::from(a).and(b).map_collect(|&ea, &eb| {
            (ea * ea + (eb * factor).powi(2)).sqrt()
        })),
    };

    let mut out = frame.clone();
    out.data = data;
    out.uncertainty = uncertainty;
    if frame.mask.is_some() || other.mask.is_some() {
        out.mask = Some(merged_mask(frame, other));
    }
    Ok(out)
}

fn check_shape(context: &str, frame: &Frame, other: &Frame) -> Result<()> {
    if frame.shape() != other.shape() {
        return Err(CcdError::shape_mismatch(
            context,
            vec![frame.shape(), other.shape()],
        ));
    }
    Ok(())
}

fn mask_or_none(frame: &Frame) -> Array2<bool> {
    frame
        .mask
        .clone()
        .unwrap_or_else(|| Array2::from_elem(frame.shape(), false))
}

fn merged_mask(a: &Frame, b: &Frame) -> Array2<bool> {
    let mut mask = mask_or_none(a);
    if let Some(mb) = &b.mask {
        Zip::from(&mut mask).and(mb).for_each(|m, &o| *m |= o);
    }
    mask
}
