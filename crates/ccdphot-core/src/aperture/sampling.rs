use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::geometry::ApertureGeometry;
use crate::consts::DEFAULT_SUBPIXELS;
use crate::error::{CcdError, Result};

/// How pixel overlap with an aperture is estimated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SamplingMethod {
    /// A pixel counts fully when its centre is inside, otherwise not at all.
    Center,
    /// Fraction of an N x N grid of sub-pixel centres inside the aperture.
    #[default]
    Subpixel,
}

impl fmt::Display for SamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Center => write!(f, "center"),
            Self::Subpixel => write!(f, "subpixel"),
        }
    }
}

impl FromStr for SamplingMethod {
    type Err = CcdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "center" => Ok(Self::Center),
            "subpixel" => Ok(Self::Subpixel),
            _ => Err(CcdError::UnsupportedMethod {
                kind: "pixel sampling",
                name: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for SamplingMethod {
    type Error = CcdError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SamplingMethod> for String {
    fn from(m: SamplingMethod) -> Self {
        m.to_string()
    }
}

/// Statistic estimating the per-pixel sky level from annulus pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnulusStatistic {
    /// Overlap-weighted mean.
    Mean,
    #[default]
    Median,
    /// Median after 3-sigma clipping.
    SigmaClippedMedian,
}

impl FromStr for AnnulusStatistic {
    type Err = CcdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "sigma_clipped_median" | "sigma_clip" => Ok(Self::SigmaClippedMedian),
            _ => Err(CcdError::UnsupportedMethod {
                kind: "annulus statistic",
                name: s.to_string(),
            }),
        }
    }
}

/// Options shared by every aperture shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApertureOptions {
    pub sampling: SamplingMethod,
    /// Sub-samples per pixel axis for `subpixel` sampling.
    pub subpixels: u32,
    pub annulus_statistic: AnnulusStatistic,
}

impl Default for ApertureOptions {
    fn default() -> Self {
        Self {
            sampling: SamplingMethod::Subpixel,
            subpixels: DEFAULT_SUBPIXELS,
            annulus_statistic: AnnulusStatistic::Median,
        }
    }
}

impl ApertureOptions {
    pub fn validate(&self) -> Result<()> {
        if self.sampling == SamplingMethod::Subpixel && self.subpixels == 0 {
            return Err(CcdError::InvalidInput("subpixels must be at least 1".into()));
        }
        Ok(())
    }
}

/// Fraction of the pixel centred at offset `(dx, dy)` covered by `geometry`.
pub(crate) fn pixel_weight(geometry: &ApertureGeometry, dx: f64, dy: f64, options: &ApertureOptions) -> f64 {
    match options.sampling {
        SamplingMethod::Center => {
            if geometry.contains(dx, dy) {
                1.0
            } else {
                0.0
            }
        }
        SamplingMethod::Subpixel => {
            let n = options.subpixels.max(1);
            let step = 1.0 / n as f64;
            let mut inside = 0u32;
            for i in 0..n {
                let sy = dy - 0.5 + (i as f64 + 0.5) * step;
                for j in 0..n {
                    let sx = dx - 0.5 + (j as f64 + 0.5) * step;
                    if geometry.contains(sx, sy) {
                        inside += 1;
                    }
                }
            }
            inside as f64 / (n * n) as f64
        }
    }
}
