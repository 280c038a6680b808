use ndarray::Array2;

use crate::consts::FWHM_TO_SIGMA;

/// Zero-sum Gaussian matched filter.
///
/// Within the circular footprint the weights are `(g - mean(g)) / denom` with
/// `denom = sum(g^2) - sum(g)^2 / n`, so convolving a star whose profile
/// matches `g` yields its amplitude directly. Weights outside the footprint
/// are zero.
#[derive(Clone, Debug)]
pub struct StarKernel {
    pub weights: Array2<f64>,
    pub footprint: Array2<bool>,
    /// Half-width of the square kernel array.
    pub half: usize,
    /// Number of footprint pixels.
    pub npixels: usize,
    /// Ratio of the filtered-image noise to the input-image noise.
    pub relerr: f64,
}

impl StarKernel {
    pub fn new(fwhm: f64, sigma_radius: f64) -> Self {
        let sigma = fwhm * FWHM_TO_SIGMA;
        let radius = (sigma_radius * sigma).max(2.0);
        let half = radius.floor() as usize;
        let size = 2 * half + 1;
        let r2 = radius * radius;

        let mut gauss = Array2::<f64>::zeros((size, size));
        let mut footprint = Array2::from_elem((size, size), false);
        for ((row, col), g) in gauss.indexed_iter_mut() {
            let dy = row as f64 - half as f64;
            let dx = col as f64 - half as f64;
            let d2 = dx * dx + dy * dy;
            if d2 <= r2 {
                *g = (-d2 / (2.0 * sigma * sigma)).exp();
                footprint[[row, col]] = true;
            }
        }

        let npixels = footprint.iter().filter(|&&f| f).count();
        let sum: f64 = gauss.sum();
        let sum_sq: f64 = gauss.iter().map(|g| g * g).sum();
        let mean = sum / npixels as f64;
        let denom = sum_sq - sum * sum / npixels as f64;

        let mut weights = Array2::<f64>::zeros((size, size));
        for ((row, col), w) in weights.indexed_iter_mut() {
            if footprint[[row, col]] {
                *w = (gauss[[row, col]] - mean) / denom;
            }
        }

        Self {
            weights,
            footprint,
            half,
            npixels,
            relerr: 1.0 / denom.sqrt(),
        }
    }

    /// Offsets `(dy, dx)` of the footprint pixels, raster order.
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let h = self.half as isize;
        self.footprint
            .indexed_iter()
            .filter(|(_, &f)| f)
            .map(|((r, c), _)| (r as isize - h, c as isize - h))
            .collect()
    }

    /// Convolve with edge pixels replicated past the border.
    pub fn convolve(&self, data: &Array2<f64>) -> Array2<f64> {
        let (h, w) = data.dim();
        let taps: Vec<(isize, isize, f64)> = self
            .offsets()
            .into_iter()
            .map(|(dy, dx)| {
                let k = self.weights[[(dy + self.half as isize) as usize, (dx + self.half as isize) as usize]];
                (dy, dx, k)
            })
            .collect();

        let mut out = Array2::<f64>::zeros((h, w));
        for ((row, col), o) in out.indexed_iter_mut() {
            let mut acc = 0.0;
            for &(dy, dx, k) in &taps {
                let r = (row as isize + dy).clamp(0, h as isize - 1) as usize;
                let c = (col as isize + dx).clamp(0, w as isize - 1) as usize;
                acc += k * data[[r, c]];
            }
            *o = acc;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_zero_sum() {
        let kernel = StarKernel::new(3.0, 1.5);
        assert_eq!(kernel.half, 2);
        assert_eq!(kernel.npixels, 13);
        assert!(kernel.weights.sum().abs() < 1e-12);
    }
}
