use ndarray::{Array2, Axis};

use super::lm::{optimize, LmSettings, Model, Sample};

const MIN_SIGMA: f64 = 0.1;

/// `z = c + a * exp(-(x - x0)^2 / (2 s^2))` over `(x, _)`, params `[c, a, x0, s]`.
struct Gaussian1D;

impl Model<4> for Gaussian1D {
    fn evaluate(&self, x: f64, _y: f64, p: &[f64; 4]) -> f64 {
        let [c, a, x0, s] = *p;
        let u = (x - x0) / s;
        c + a * (-0.5 * u * u).exp()
    }

    fn jacobian_row(&self, x: f64, _y: f64, p: &[f64; 4]) -> [f64; 4] {
        let [_, a, x0, s] = *p;
        let u = (x - x0) / s;
        let e = (-0.5 * u * u).exp();
        [1.0, e, a * e * u / s, a * e * u * u / s]
    }

    fn constrain(&self, p: &mut [f64; 4]) {
        p[3] = p[3].abs().max(MIN_SIGMA);
    }
}

/// Axis-aligned elliptical Gaussian, params `[c, a, x0, y0, sx, sy]`.
struct Gaussian2D;

impl Model<6> for Gaussian2D {
    fn evaluate(&self, x: f64, y: f64, p: &[f64; 6]) -> f64 {
        let [c, a, x0, y0, sx, sy] = *p;
        let (u, v) = ((x - x0) / sx, (y - y0) / sy);
        c + a * (-0.5 * (u * u + v * v)).exp()
    }

    fn jacobian_row(&self, x: f64, y: f64, p: &[f64; 6]) -> [f64; 6] {
        let [_, a, x0, y0, sx, sy] = *p;
        let (u, v) = ((x - x0) / sx, (y - y0) / sy);
        let e = (-0.5 * (u * u + v * v)).exp();
        let ae = a * e;
        [1.0, e, ae * u / sx, ae * v / sy, ae * u * u / sx, ae * v * v / sy]
    }

    fn constrain(&self, p: &mut [f64; 6]) {
        p[4] = p[4].abs().max(MIN_SIGMA);
        p[5] = p[5].abs().max(MIN_SIGMA);
    }
}

/// Centroid from independent 1-D Gaussian fits to the row and column
/// marginal sums of the cutout. Masked pixels contribute zero.
pub fn centroid_1dg(data: &Array2<f64>, mask: Option<&Array2<bool>>, max_iterations: usize) -> Option<(f64, f64)> {
    let cleaned = clean(data, mask);
    let settings = LmSettings::new(max_iterations);
    let x = fit_marginal(&cleaned.sum_axis(Axis(0)).to_vec(), &settings)?;
    let y = fit_marginal(&cleaned.sum_axis(Axis(1)).to_vec(), &settings)?;
    Some((x, y))
}

/// Centroid from a joint 2-D Gaussian fit over the cutout.
pub fn centroid_2dg(data: &Array2<f64>, mask: Option<&Array2<bool>>, max_iterations: usize) -> Option<(f64, f64)> {
    let (h, w) = data.dim();
    let samples: Vec<Sample> = data
        .indexed_iter()
        .filter(|((r, c), v)| !mask.is_some_and(|m| m[[*r, *c]]) && v.is_finite())
        .map(|((r, c), &z)| Sample {
            x: c as f64,
            y: r as f64,
            z,
        })
        .collect();
    if samples.len() < 6 {
        return None;
    }

    let (min, max, peak) = extremes(&samples);
    let amplitude = max - min;
    if amplitude <= 0.0 {
        return None;
    }
    let (sx, sy) = moment_sigmas(&samples, min);
    let initial = [min, amplitude, peak.0, peak.1, sx, sy];

    let fit = optimize(&Gaussian2D, &samples, initial, &LmSettings::new(max_iterations));
    let [_, a, x0, y0, _, _] = fit.params;
    if !(a > 0.0 && inside(x0, w) && inside(y0, h)) {
        return None;
    }
    Some((x0, y0))
}

fn fit_marginal(profile: &[f64], settings: &LmSettings) -> Option<f64> {
    if profile.len() < 4 {
        return None;
    }
    let samples: Vec<Sample> = profile
        .iter()
        .enumerate()
        .map(|(i, &z)| Sample {
            x: i as f64,
            y: 0.0,
            z,
        })
        .collect();
    let (min, max, peak) = extremes(&samples);
    let amplitude = max - min;
    if amplitude <= 0.0 {
        return None;
    }
    let (sigma, _) = moment_sigmas(&samples, min);
    let fit = optimize(&Gaussian1D, &samples, [min, amplitude, peak.0, sigma], settings);
    let [_, a, x0, _] = fit.params;
    (a > 0.0 && inside(x0, profile.len())).then_some(x0)
}

fn clean(data: &Array2<f64>, mask: Option<&Array2<bool>>) -> Array2<f64> {
    let mut out = data.mapv(|v| if v.is_finite() { v } else { 0.0 });
    if let Some(m) = mask {
        ndarray::Zip::from(&mut out).and(m).for_each(|v, &masked| {
            if masked {
                *v = 0.0;
            }
        });
    }
    out
}

/// Minimum, maximum and location of the maximum.
fn extremes(samples: &[Sample]) -> (f64, f64, (f64, f64)) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut at = (0.0, 0.0);
    for s in samples {
        min = min.min(s.z);
        if s.z > max {
            max = s.z;
            at = (s.x, s.y);
        }
    }
    (min, max, at)
}

/// Second-moment width estimates above `floor`, used as the starting sigmas.
fn moment_sigmas(samples: &[Sample], floor: f64) -> (f64, f64) {
    let (mut sw, mut sx, mut sy) = (0.0, 0.0, 0.0);
    for s in samples {
        let v = s.z - floor;
        sw += v;
        sx += v * s.x;
        sy += v * s.y;
    }
    if sw <= 0.0 {
        return (1.0, 1.0);
    }
    let (mx, my) = (sx / sw, sy / sw);
    let (mut vx, mut vy) = (0.0, 0.0);
    for s in samples {
        let v = s.z - floor;
        vx += v * (s.x - mx).powi(2);
        vy += v * (s.y - my).powi(2);
    }
    let sigma = |var: f64| (var / sw).sqrt().clamp(0.5, 1e3);
    (sigma(vx), sigma(vy))
}

fn inside(coord: f64, len: usize) -> bool {
    coord.is_finite() && coord >= -0.5 && coord <= len as f64 - 0.5
}
