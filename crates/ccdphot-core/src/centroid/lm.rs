//! Small dense Levenberg-Marquardt solver for profile fits.

/// A parametric surface `z = f(x, y; params)`.
pub(crate) trait Model<const N: usize> {
    fn evaluate(&self, x: f64, y: f64, params: &[f64; N]) -> f64;

    /// Partial derivatives of `evaluate` with respect to each parameter.
    fn jacobian_row(&self, x: f64, y: f64, params: &[f64; N]) -> [f64; N];

    /// Clamp parameters back into their physical range after a step.
    fn constrain(&self, _params: &mut [f64; N]) {}
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct LmSettings {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub initial_lambda: f64,
}

impl LmSettings {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            tolerance: 1e-8,
            initial_lambda: 1e-3,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Fit<const N: usize> {
    pub params: [f64; N],
    pub converged: bool,
}

/// One sample point of the data being fitted.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Sample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[allow(clippy::needless_range_loop)]
pub(crate) fn optimize<const N: usize, M: Model<N>>(
    model: &M,
    samples: &[Sample],
    initial: [f64; N],
    settings: &LmSettings,
) -> Fit<N> {
    let mut params = initial;
    let mut lambda = settings.initial_lambda;
    let mut chi2 = chi_squared(model, samples, &params);
    let mut converged = false;

    for _ in 0..settings.max_iterations {
        let mut hessian = [[0.0f64; N]; N];
        let mut gradient = [0.0f64; N];
        for s in samples {
            let row = model.jacobian_row(s.x, s.y, &params);
            let r = s.z - model.evaluate(s.x, s.y, &params);
            for i in 0..N {
                gradient[i] += row[i] * r;
                for j in i..N {
                    hessian[i][j] += row[i] * row[j];
                }
            }
        }
        for i in 1..N {
            for j in 0..i {
                hessian[i][j] = hessian[j][i];
            }
        }
        for (i, row) in hessian.iter_mut().enumerate() {
            row[i] *= 1.0 + lambda;
        }

        let Some(delta) = solve(&hessian, &gradient) else {
            break;
        };

        let mut trial = params;
        for (p, d) in trial.iter_mut().zip(delta.iter()) {
            *p += d;
        }
        model.constrain(&mut trial);

        let trial_chi2 = chi_squared(model, samples, &trial);
        if trial_chi2.is_finite() && trial_chi2 <= chi2 {
            params = trial;
            chi2 = trial_chi2;
            lambda *= 0.1;
            let max_delta = delta.iter().fold(0.0f64, |a, d| a.max(d.abs()));
            if max_delta < settings.tolerance {
                converged = true;
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e10 {
                break;
            }
        }
    }

    Fit { params, converged }
}

fn chi_squared<const N: usize, M: Model<N>>(model: &M, samples: &[Sample], params: &[f64; N]) -> f64 {
    samples
        .iter()
        .map(|s| {
            let r = s.z - model.evaluate(s.x, s.y, params);
            r * r
        })
        .sum()
}

/// Gaussian elimination with partial pivoting. `None` if singular.
#[allow(clippy::needless_range_loop)]
pub(crate) fn solve<const N: usize>(a: &[[f64; N]; N], b: &[f64; N]) -> Option<[f64; N]> {
    let mut m = *a;
    let mut rhs = *b;

    for col in 0..N {
        let mut pivot = col;
        for row in (col + 1)..N {
            if m[row][col].abs() > m[pivot][col].abs() {
                pivot = row;
            }
        }
        if m[pivot][col].abs() < 1e-14 {
            return None;
        }
        if pivot != col {
            m.swap(col, pivot);
            rhs.swap(col, pivot);
        }
        for row in (col + 1)..N {
            let factor = m[row][col] / m[col][col];
            let pivot_row = m[col];
            for (j, v) in m[row].iter_mut().enumerate().skip(col) {
                *v -= factor * pivot_row[j];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = [0.0f64; N];
    for i in (0..N).rev() {
        let mut sum = rhs[i];
        for (j, &xj) in x.iter().enumerate().skip(i + 1) {
            sum -= m[i][j] * xj;
        }
        x[i] = sum / m[i][i];
    }
    Some(x)
}
