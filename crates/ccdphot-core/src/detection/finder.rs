use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, info};

use super::config::DetectionConfig;
use super::kernel::StarKernel;
use crate::background::{sigma_clipped_stats, SigmaClippedStats};
use crate::consts::{DEFAULT_BACKGROUND_MAX_ITERS, MIN_RELATIVE_AMPLITUDE};
use crate::error::Result;
use crate::frame::{Frame, Position, PositionList};

/// A point source found by [`detect_sources`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectedSource {
    /// 1-based identifier, in output order.
    pub id: usize,
    /// Column coordinate of the intensity-weighted centroid.
    pub x: f64,
    /// Row coordinate of the intensity-weighted centroid.
    pub y: f64,
    /// Background-subtracted value of the peak pixel.
    pub peak: f64,
    /// Background-subtracted sum over the kernel footprint.
    pub flux: f64,
    /// Matched-filter amplitude at the peak.
    pub amplitude: f64,
    pub sharpness: f64,
    pub roundness: f64,
}

/// Output of source detection. `sources` may be empty.
#[derive(Clone, Debug, Serialize)]
pub struct DetectionResult {
    pub sources: Vec<DetectedSource>,
    /// Background statistics the threshold was derived from.
    pub background: SigmaClippedStats,
    /// Effective threshold applied to the filtered image.
    pub threshold: f64,
}

impl DetectionResult {
    pub fn positions(&self) -> PositionList {
        self.sources.iter().map(|s| Position::new(s.x, s.y)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

/// Find point sources above `threshold` background sigmas.
///
/// The sigma-clipped median is removed, the result is filtered with a
/// zero-sum Gaussian kernel matched to `fwhm`, and local maxima of the
/// filtered image within the kernel footprint become candidates. Candidates
/// outside the sharpness/roundness limits or above `peakmax` are dropped.
/// No sources is a valid outcome, not an error.
pub fn detect_sources(frame: &Frame, config: &DetectionConfig) -> Result<DetectionResult> {
    config.validate()?;

    let background = sigma_clipped_stats(
        &frame.data,
        frame.mask.as_ref(),
        config.background_sigma,
        DEFAULT_BACKGROUND_MAX_ITERS,
    )?;
    let (h, w) = frame.shape();
    let mut data = frame.data.mapv(|v| (v - background.median) as f64);
    if let Some(mask) = &frame.mask {
        ndarray::Zip::from(&mut data).and(mask).for_each(|d, &m| {
            if m {
                *d = 0.0;
            }
        });
    }

    let kernel = StarKernel::new(config.fwhm, config.sigma_radius);
    let conv = kernel.convolve(&data);
    let offsets = kernel.offsets();

    let max_conv = conv.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let noise_threshold = config.threshold * background.std as f64 * kernel.relerr;
    let threshold = noise_threshold.max(MIN_RELATIVE_AMPLITUDE * max_conv.max(0.0));

    let half = kernel.half;
    let mut candidates = Vec::new();
    for row in 0..h {
        for col in 0..w {
            let c = conv[[row, col]];
            if c <= threshold || frame.is_masked(row, col) {
                continue;
            }
            if config.exclude_border
                && (row < half || col < half || row + half >= h || col + half >= w)
            {
                continue;
            }
            if is_local_max(&conv, row, col, &offsets) {
                candidates.push(measure_peak(&data, row, col, c, &offsets));
            }
        }
    }
    let n_peaks = candidates.len();

    let mut sources: Vec<DetectedSource> = candidates
        .into_iter()
        .filter(|s| s.sharpness >= config.sharplo && s.sharpness <= config.sharphi)
        .filter(|s| s.roundness >= config.roundlo && s.roundness <= config.roundhi)
        .filter(|s| config.peakmax.is_none_or(|max| s.peak <= max))
        .collect();
    debug!(
        peaks = n_peaks,
        accepted = sources.len(),
        threshold,
        "Filtered detection candidates"
    );

    if let Some(n) = config.brightest {
        if sources.len() > n {
            let mut order: Vec<usize> = (0..sources.len()).collect();
            order.sort_by(|&a, &b| sources[b].flux.total_cmp(&sources[a].flux));
            let mut keep = vec![false; sources.len()];
            for &i in order.iter().take(n) {
                keep[i] = true;
            }
            let mut idx = 0;
            sources.retain(|_| {
                let k = keep[idx];
                idx += 1;
                k
            });
        }
    }

    for (i, s) in sources.iter_mut().enumerate() {
        s.id = i + 1;
    }

    info!(
        n_sources = sources.len(),
        fwhm = config.fwhm,
        threshold = config.threshold,
        background = background.median,
        noise = background.std,
        "Detected sources"
    );

    Ok(DetectionResult {
        sources,
        background,
        threshold,
    })
}

/// Raster-order tie break: strictly greater than earlier neighbours, not
/// less than later ones.
fn is_local_max(conv: &Array2<f64>, row: usize, col: usize, offsets: &[(isize, isize)]) -> bool {
    let (h, w) = conv.dim();
    let c = conv[[row, col]];
    offsets.iter().all(|&(dy, dx)| {
        if dy == 0 && dx == 0 {
            return true;
        }
        let r = row as isize + dy;
        let cc = col as isize + dx;
        if r < 0 || cc < 0 || r >= h as isize || cc >= w as isize {
            return true;
        }
        let n = conv[[r as usize, cc as usize]];
        if dy < 0 || (dy == 0 && dx < 0) {
            c > n
        } else {
            c >= n
        }
    })
}

fn measure_peak(
    data: &Array2<f64>,
    row: usize,
    col: usize,
    amplitude: f64,
    offsets: &[(isize, isize)],
) -> DetectedSource {
    let (h, w) = data.dim();
    let peak = data[[row, col]];

    let mut flux = 0.0;
    let mut others = 0.0;
    let mut n_others = 0usize;
    let (mut sw, mut sx, mut sy) = (0.0, 0.0, 0.0);
    let mut samples = Vec::with_capacity(offsets.len());
    for &(dy, dx) in offsets {
        let r = row as isize + dy;
        let c = col as isize + dx;
        if r < 0 || c < 0 || r >= h as isize || c >= w as isize {
            continue;
        }
        let v = data[[r as usize, c as usize]];
        flux += v;
        if dy != 0 || dx != 0 {
            others += v;
            n_others += 1;
        }
        if v > 0.0 {
            sw += v;
            sx += v * dx as f64;
            sy += v * dy as f64;
            samples.push((dx as f64, dy as f64, v));
        }
    }

    let (ox, oy) = if sw > 0.0 { (sx / sw, sy / sw) } else { (0.0, 0.0) };
    let (mut mxx, mut myy) = (0.0, 0.0);
    for &(dx, dy, v) in &samples {
        mxx += v * (dx - ox).powi(2);
        myy += v * (dy - oy).powi(2);
    }
    let roundness = if mxx + myy > 0.0 {
        (mxx - myy) / (mxx + myy)
    } else {
        0.0
    };
    let sharpness = if n_others > 0 && amplitude != 0.0 {
        (peak - others / n_others as f64) / amplitude
    } else {
        0.0
    };

    DetectedSource {
        id: 0,
        x: col as f64 + ox,
        y: row as f64 + oy,
        peak,
        flux,
        amplitude,
        sharpness,
        roundness,
    }
}
