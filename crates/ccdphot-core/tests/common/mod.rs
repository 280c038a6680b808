use ndarray::Array2;

use ccdphot_core::consts::FWHM_TO_SIGMA;
use ccdphot_core::frame::{ExposureMetadata, Frame, FrameSet, FrameType};

/// Deterministic linear congruential generator for synthetic noise.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1))
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Standard normal sample (Box-Muller).
    pub fn gaussian(&mut self) -> f64 {
        let u1 = self.next_f64().max(1e-300);
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

pub fn constant(h: usize, w: usize, value: f32) -> Array2<f32> {
    Array2::from_elem((h, w), value)
}

/// Uniform noise with the given mean and standard deviation.
pub fn uniform_noise(h: usize, w: usize, mean: f32, std: f32, seed: u64) -> Array2<f32> {
    let mut rng = Lcg::new(seed);
    let half_width = std as f64 * 3f64.sqrt();
    Array2::from_shape_fn((h, w), |_| mean + ((rng.next_f64() * 2.0 - 1.0) * half_width) as f32)
}

/// Gaussian noise with the given mean and standard deviation.
pub fn gaussian_noise(h: usize, w: usize, mean: f32, std: f32, seed: u64) -> Array2<f32> {
    let mut rng = Lcg::new(seed);
    Array2::from_shape_fn((h, w), |_| mean + (rng.gaussian() * std as f64) as f32)
}

/// Add a circular Gaussian star of total `flux`, sampled at pixel centres.
pub fn add_star(data: &mut Array2<f32>, x: f64, y: f64, flux: f64, fwhm: f64) {
    let sigma = fwhm * FWHM_TO_SIGMA;
    let amplitude = flux / (2.0 * std::f64::consts::PI * sigma * sigma);
    for ((row, col), v) in data.indexed_iter_mut() {
        let dx = col as f64 - x;
        let dy = row as f64 - y;
        *v += (amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()) as f32;
    }
}

/// Constant background with stars `(x, y, flux)` added.
pub fn star_field(h: usize, w: usize, background: f32, stars: &[(f64, f64, f64)], fwhm: f64) -> Frame {
    let mut data = constant(h, w, background);
    for &(x, y, flux) in stars {
        add_star(&mut data, x, y, flux, fwhm);
    }
    Frame::new(data)
}

pub fn metadata(exposure_time: Option<f64>, filter: Option<&str>) -> ExposureMetadata {
    ExposureMetadata {
        exposure_time,
        filter: filter.map(str::to_string),
        ..Default::default()
    }
}

pub fn constant_frame(h: usize, w: usize, value: f32) -> Frame {
    Frame::new(constant(h, w, value))
}

/// `n` frames of one type, each `value` plus a small per-frame offset.
pub fn frame_set(frame_type: FrameType, n: usize, h: usize, w: usize, value: f32, meta: ExposureMetadata) -> FrameSet {
    let frames = (0..n)
        .map(|i| {
            Frame::new(constant(h, w, value + (i as f32 - (n as f32 - 1.0) / 2.0) * 0.1))
                .with_metadata(meta.clone())
        })
        .collect();
    FrameSet::new(frame_type, frames)
}
