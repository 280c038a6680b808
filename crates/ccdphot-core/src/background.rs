use ndarray::Array2;
use serde::Serialize;
use tracing::debug;

use crate::calibration::ops::subtract;
use crate::combine::sigma_clip::{clip, mean_stddev, median_kept};
use crate::combine::{ClipCenter, SigmaClipParams};
use crate::detection::segmentation::{dilate_disk, label_segments};
use crate::error::{CcdError, Result};
use crate::frame::Frame;

/// Sigma-clipped summary statistics of an image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SigmaClippedStats {
    pub mean: f32,
    pub median: f32,
    pub std: f32,
}

/// Mean, median and standard deviation of the unmasked pixels after
/// iterative symmetric clipping at `sigma` about the median.
pub fn sigma_clipped_stats(
    data: &Array2<f32>,
    mask: Option<&Array2<bool>>,
    sigma: f32,
    max_iters: usize,
) -> Result<SigmaClippedStats> {
    if let Some(m) = mask {
        if m.dim() != data.dim() {
            return Err(CcdError::shape_mismatch(
                "sigma-clipped statistics mask",
                vec![data.dim(), m.dim()],
            ));
        }
    }

    let values: Vec<f32> = match mask {
        Some(m) => data
            .iter()
            .zip(m.iter())
            .filter(|(v, &masked)| !masked && v.is_finite())
            .map(|(&v, _)| v)
            .collect(),
        None => data.iter().copied().filter(|v| v.is_finite()).collect(),
    };
    if values.is_empty() {
        return Err(CcdError::InvalidImage(
            "no unmasked finite pixels for background statistics".into(),
        ));
    }

    let params = SigmaClipParams {
        low: sigma,
        high: sigma,
        iterations: max_iters,
        center: ClipCenter::Median,
    };
    let mut keep = vec![true; values.len()];
    let mut scratch = Vec::with_capacity(values.len());
    clip(&values, &mut keep, &params, &mut scratch);

    let (mean, std) = mean_stddev(&values, &keep);
    let median = median_kept(&values, &keep, &mut scratch);
    Ok(SigmaClippedStats { mean, median, std })
}

/// Subtract an explicit background frame.
pub fn subtract_background(frame: &Frame, background: &Frame) -> Result<Frame> {
    subtract(frame, background, 1.0, "background subtraction")
}

/// Subtract the sigma-clipped median of the frame from every pixel.
pub fn subtract_median_background(frame: &Frame, sigma: f32, max_iters: usize) -> Result<(Frame, SigmaClippedStats)> {
    let stats = sigma_clipped_stats(&frame.data, frame.mask.as_ref(), sigma, max_iters)?;
    let mut out = frame.clone();
    out.data.mapv_inplace(|v| v - stats.median);
    debug!(median = stats.median, std = stats.std, "Subtracted median background");
    Ok((out, stats))
}

/// Mask of pixels belonging to sources.
///
/// Pixels above `median + nsigma * std` are grouped into 8-connected
/// segments; segments smaller than `npixels` are dropped and the rest are
/// grown by a disk of `dilate_radius` pixels.
pub fn source_mask(frame: &Frame, nsigma: f32, npixels: usize, dilate_radius: usize) -> Result<Array2<bool>> {
    let stats = sigma_clipped_stats(&frame.data, frame.mask.as_ref(), nsigma, 10)?;
    let threshold = stats.median + nsigma * stats.std;

    let mut above = frame.data.mapv(|v| v > threshold);
    if let Some(m) = &frame.mask {
        ndarray::Zip::from(&mut above).and(m).for_each(|a, &masked| *a &= !masked);
    }

    let (labels, segments) = label_segments(&above);
    let mask = labels.mapv(|l| l > 0 && segments[l as usize - 1].area >= npixels);
    let kept = segments.iter().filter(|s| s.area >= npixels).count();
    debug!(segments = segments.len(), kept, threshold, "Built source mask");

    Ok(dilate_disk(&mask, dilate_radius))
}
