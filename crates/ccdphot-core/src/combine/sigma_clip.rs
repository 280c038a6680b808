use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_CLIP_HIGH, DEFAULT_CLIP_ITERATIONS, DEFAULT_CLIP_LOW, EPSILON};

/// Statistic that clipping bounds are measured from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipCenter {
    #[default]
    Median,
    Mean,
}

/// Per-pixel outlier rejection parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaClipParams {
    /// Values more than `low` standard deviations below the center are rejected.
    pub low: f32,
    /// Values more than `high` standard deviations above the center are rejected.
    pub high: f32,
    /// Maximum rejection passes; stops early once a pass rejects nothing.
    pub iterations: usize,
    pub center: ClipCenter,
}

impl Default for SigmaClipParams {
    fn default() -> Self {
        Self {
            low: DEFAULT_CLIP_LOW,
            high: DEFAULT_CLIP_HIGH,
            iterations: DEFAULT_CLIP_ITERATIONS,
            center: ClipCenter::Median,
        }
    }
}

/// Reject outliers in `values`, clearing `keep[i]` for each rejected value.
///
/// Returns the number of surviving values.
pub(crate) fn clip(values: &[f32], keep: &mut [bool], params: &SigmaClipParams, scratch: &mut Vec<f32>) -> usize {
    let mut survivors = keep.iter().filter(|&&k| k).count();

    for _ in 0..params.iterations {
        if survivors < 2 {
            break;
        }
        let (mean, stddev) = mean_stddev(values, keep);
        if stddev < EPSILON {
            break;
        }
        let center = match params.center {
            ClipCenter::Mean => mean,
            ClipCenter::Median => median_kept(values, keep, scratch),
        };
        let lo = center - params.low * stddev;
        let hi = center + params.high * stddev;

        let mut rejected = 0;
        for (v, k) in values.iter().zip(keep.iter_mut()) {
            if *k && (*v < lo || *v > hi) {
                *k = false;
                rejected += 1;
            }
        }
        survivors -= rejected;
        if rejected == 0 {
            break;
        }
    }

    survivors
}

/// Mean and population standard deviation of the kept values.
pub(crate) fn mean_stddev(values: &[f32], keep: &[bool]) -> (f32, f32) {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for (&v, &k) in values.iter().zip(keep) {
        if k {
            sum += v as f64;
            count += 1;
        }
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;

    let mut var_sum = 0.0f64;
    for (&v, &k) in values.iter().zip(keep) {
        if k {
            let d = v as f64 - mean;
            var_sum += d * d;
        }
    }
    (mean as f32, (var_sum / count as f64).sqrt() as f32)
}

/// Median of the kept values, using `scratch` as working storage.
pub(crate) fn median_kept(values: &[f32], keep: &[bool], scratch: &mut Vec<f32>) -> f32 {
    scratch.clear();
    scratch.extend(values.iter().zip(keep).filter(|(_, &k)| k).map(|(&v, _)| v));
    median_in_place(scratch)
}

/// Median via `select_nth_unstable`, reordering `values`. Empty input yields 0.
pub(crate) fn median_in_place(values: &mut [f32]) -> f32 {
    let n = values.len();
    match n {
        0 => 0.0,
        1 => values[0],
        _ if n % 2 == 1 => *values.select_nth_unstable_by(n / 2, |a, b| a.total_cmp(b)).1,
        _ => {
            let mid = n / 2;
            values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            let upper = values[mid];
            let lower = *values[..mid]
                .select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b))
                .1;
            (lower + upper) / 2.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median_in_place(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_in_place(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median_in_place(&mut []), 0.0);
    }

    #[test]
    fn clip_rejects_single_outlier() {
        let values = [10.0, 10.2, 9.8, 10.1, 9.9, 10.0, 10.1, 9.9, 10.0, 500.0];
        let mut keep = [true; 10];
        let params = SigmaClipParams {
            low: 2.0,
            high: 2.0,
            iterations: 3,
            center: ClipCenter::Median,
        };
        let survivors = clip(&values, &mut keep, &params, &mut Vec::new());
        assert_eq!(survivors, 9);
        assert!(!keep[9]);
    }
}
