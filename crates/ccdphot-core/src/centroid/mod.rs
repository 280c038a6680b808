pub mod com;
pub mod gaussian;
pub(crate) mod lm;
pub mod quadratic;

use std::fmt;
use std::str::FromStr;

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::consts::{DEFAULT_CENTROID_BOX_SIZE, DEFAULT_FIT_MAX_ITERATIONS, DEFAULT_QUADRATIC_FIT_BOXSIZE};
use crate::error::{CcdError, Result};
use crate::frame::{Frame, Position, PositionList};

pub use com::centroid_com;
pub use gaussian::{centroid_1dg, centroid_2dg};
pub use quadratic::centroid_quadratic;

/// Centroid estimator family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CentroidMethod {
    /// Intensity-weighted center of mass over the full cutout.
    #[default]
    #[serde(rename = "com")]
    Com,
    /// Maximum of a quadratic surface fitted near the peak.
    #[serde(rename = "quadratic")]
    Quadratic,
    /// Independent 1-D Gaussian fits to the x and y marginals.
    #[serde(rename = "1dg")]
    Gaussian1D,
    /// Joint 2-D Gaussian fit.
    #[serde(rename = "2dg")]
    Gaussian2D,
}

impl fmt::Display for CentroidMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Com => write!(f, "com"),
            Self::Quadratic => write!(f, "quadratic"),
            Self::Gaussian1D => write!(f, "1dg"),
            Self::Gaussian2D => write!(f, "2dg"),
        }
    }
}

impl FromStr for CentroidMethod {
    type Err = CcdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "com" | "center_of_mass" => Ok(Self::Com),
            "quadratic" => Ok(Self::Quadratic),
            "1dg" | "gaussian1d" => Ok(Self::Gaussian1D),
            "2dg" | "gaussian2d" => Ok(Self::Gaussian2D),
            _ => Err(CcdError::UnsupportedMethod {
                kind: "centroid method",
                name: s.to_string(),
            }),
        }
    }
}

/// Configuration for centroid refinement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentroidConfig {
    pub method: CentroidMethod,
    /// Side of the square cutout around each position (odd, pixels).
    pub box_size: usize,
    /// Side of the fitting box for the quadratic estimator (odd, pixels).
    pub fit_boxsize: usize,
    /// Iteration cap for the Gaussian fits.
    pub max_iterations: usize,
}

impl Default for CentroidConfig {
    fn default() -> Self {
        Self {
            method: CentroidMethod::Com,
            box_size: DEFAULT_CENTROID_BOX_SIZE,
            fit_boxsize: DEFAULT_QUADRATIC_FIT_BOXSIZE,
            max_iterations: DEFAULT_FIT_MAX_ITERATIONS,
        }
    }
}

impl CentroidConfig {
    pub fn with_method(method: CentroidMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, size) in [("box_size", self.box_size), ("fit_boxsize", self.fit_boxsize)] {
            if size < 3 || size % 2 == 0 {
                return Err(CcdError::InvalidInput(format!(
                    "{name} must be an odd integer >= 3, got {size}"
                )));
            }
        }
        if self.max_iterations == 0 {
            return Err(CcdError::InvalidInput("max_iterations must be at least 1".into()));
        }
        Ok(())
    }
}

/// Estimate the centroid of one cutout, in cutout pixel coordinates.
///
/// `None` when the estimator cannot produce a finite position inside the
/// cutout.
pub fn centroid(
    cutout: &Array2<f64>,
    mask: Option<&Array2<bool>>,
    config: &CentroidConfig,
) -> Option<(f64, f64)> {
    match config.method {
        CentroidMethod::Com => centroid_com(cutout, mask),
        CentroidMethod::Quadratic => centroid_quadratic(cutout, mask, config.fit_boxsize),
        CentroidMethod::Gaussian1D => centroid_1dg(cutout, mask, config.max_iterations),
        CentroidMethod::Gaussian2D => centroid_2dg(cutout, mask, config.max_iterations),
    }
}

/// Centroid of a whole frame.
pub fn centroid_frame(frame: &Frame, config: &CentroidConfig) -> Result<Position> {
    config.validate()?;
    let data = frame.data.mapv(f64::from);
    centroid(&data, frame.mask.as_ref(), config)
        .map(|(x, y)| Position::new(x, y))
        .ok_or_else(|| {
            CcdError::InvalidImage(format!("{} centroid could not be determined", config.method))
        })
}

/// Refine each position within a `box_size` cutout centred on it.
///
/// The output is aligned element-for-element with `positions`. A position
/// whose estimator fails keeps its input coordinates. Positions outside the
/// image are rejected with `InvalidPositions`.
pub fn refine_positions(frame: &Frame, positions: &PositionList, config: &CentroidConfig) -> Result<PositionList> {
    config.validate()?;
    positions.validate()?;

    let (h, w) = frame.shape();
    if let Some((i, p)) = positions.iter().enumerate().find(|(_, p)| {
        p.x < -0.5 || p.y < -0.5 || p.x > w as f64 - 0.5 || p.y > h as f64 - 0.5
    }) {
        return Err(CcdError::InvalidPositions(format!(
            "position {i} ({}, {}) lies outside the {w}x{h} image",
            p.x, p.y
        )));
    }

    let data = frame.data.mapv(f64::from);
    let half = config.box_size / 2;
    let mut failed = 0usize;

    let refined: PositionList = positions
        .iter()
        .map(|p| {
            let col = (p.x.round().max(0.0) as usize).min(w - 1);
            let row = (p.y.round().max(0.0) as usize).min(h - 1);
            let (r0, r1) = (row.saturating_sub(half), (row + half + 1).min(h));
            let (c0, c1) = (col.saturating_sub(half), (col + half + 1).min(w));

            let cutout = data.slice(s![r0..r1, c0..c1]).to_owned();
            let mask = frame.mask.as_ref().map(|m| m.slice(s![r0..r1, c0..c1]).to_owned());

            match centroid(&cutout, mask.as_ref(), config) {
                Some((x, y)) => Position::new(x + c0 as f64, y + r0 as f64),
                None => {
                    failed += 1;
                    *p
                }
            }
        })
        .collect();

    if failed > 0 {
        warn!(failed, method = %config.method, "Centroid refinement failed for some positions; kept inputs");
    }
    info!(n_positions = refined.len(), method = %config.method, "Refined positions");
    Ok(refined)
}
