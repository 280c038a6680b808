use ndarray::Array2;
use rayon::prelude::*;

use super::sigma_clip::{clip, mean_stddev, median_kept};
use super::{CombineConfig, CombineMethod};
use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::frame::Frame;

#[derive(Clone, Copy, Debug, Default)]
struct PixelResult {
    value: f32,
    uncertainty: f32,
    masked: bool,
}

/// Per-row scratch buffers, reused across columns.
struct Scratch {
    values: Vec<f32>,
    keep: Vec<bool>,
    sort: Vec<f32>,
}

impl Scratch {
    fn new(n: usize) -> Self {
        Self {
            values: Vec::with_capacity(n),
            keep: Vec::with_capacity(n),
            sort: Vec::with_capacity(n),
        }
    }
}

/// Reduce a validated, same-shaped stack to one frame.
///
/// Row-parallel above `PARALLEL_PIXEL_THRESHOLD` pixels; both paths produce
/// identical results. Metadata and unit come from the first frame.
pub(crate) fn reduce_stack(frames: &[Frame], config: &CombineConfig) -> Frame {
    let (h, w) = frames[0].shape();
    let n = frames.len();

    let rows: Vec<Vec<PixelResult>> = if h * w >= PARALLEL_PIXEL_THRESHOLD && n > 1 {
        (0..h)
            .into_par_iter()
            .map(|row| reduce_row(frames, row, w, config))
            .collect()
    } else {
        (0..h).map(|row| reduce_row(frames, row, w, config)).collect()
    };

    let mut data = Array2::<f32>::zeros((h, w));
    let mut uncertainty = Array2::<f32>::zeros((h, w));
    let mut mask = Array2::<bool>::from_elem((h, w), false);
    for (row, row_data) in rows.into_iter().enumerate() {
        for (col, px) in row_data.into_iter().enumerate() {
            data[[row, col]] = px.value;
            uncertainty[[row, col]] = px.uncertainty;
            mask[[row, col]] = px.masked;
        }
    }

    let first = &frames[0];
    let mut out = Frame::new(data)
        .with_unit(first.unit.clone())
        .with_metadata(first.metadata.clone());
    out.uncertainty = Some(uncertainty);
    if mask.iter().any(|&m| m) {
        out.mask = Some(mask);
    }
    out
}

fn reduce_row(frames: &[Frame], row: usize, w: usize, config: &CombineConfig) -> Vec<PixelResult> {
    let mut scratch = Scratch::new(frames.len());
    (0..w)
        .map(|col| {
            scratch.values.clear();
            scratch.values.extend(
                frames
                    .iter()
                    .filter(|f| !f.is_masked(row, col))
                    .map(|f| f.data[[row, col]]),
            );
            reduce_pixel(&mut scratch, config)
        })
        .collect()
}

fn reduce_pixel(scratch: &mut Scratch, config: &CombineConfig) -> PixelResult {
    let Scratch { values, keep, sort } = scratch;
    if values.is_empty() {
        // Every contributor was masked at this position.
        return PixelResult {
            masked: true,
            ..PixelResult::default()
        };
    }

    keep.clear();
    keep.resize(values.len(), true);
    if config.sigma_clip {
        let survivors = clip(values, keep, &config.clip, sort);
        if survivors == 0 {
            keep.fill(true);
        }
    }

    let (mean, stddev) = mean_stddev(values, keep);
    let count = keep.iter().filter(|&&k| k).count() as f32;
    let (value, uncertainty) = match config.method {
        CombineMethod::Median => (median_kept(values, keep, sort), stddev / count.sqrt()),
        CombineMethod::Average => (mean, stddev / count.sqrt()),
        CombineMethod::Sum => (mean * count, stddev * count.sqrt()),
    };

    PixelResult {
        value,
        uncertainty,
        masked: false,
    }
}
