use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_BACKGROUND_SIGMA, DEFAULT_DETECTION_THRESHOLD, DEFAULT_FWHM, DEFAULT_ROUNDHI,
    DEFAULT_ROUNDLO, DEFAULT_SHARPHI, DEFAULT_SHARPLO, DEFAULT_SIGMA_RADIUS,
};
use crate::error::{CcdError, Result};

/// Configuration for point-source detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Detection threshold in multiples of the background standard deviation.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Expected full width at half maximum of point sources, in pixels.
    #[serde(default = "default_fwhm")]
    pub fwhm: f64,
    /// Truncation radius of the detection kernel, in Gaussian sigmas.
    #[serde(default = "default_sigma_radius")]
    pub sigma_radius: f64,
    #[serde(default = "default_sharplo")]
    pub sharplo: f64,
    #[serde(default = "default_sharphi")]
    pub sharphi: f64,
    #[serde(default = "default_roundlo")]
    pub roundlo: f64,
    #[serde(default = "default_roundhi")]
    pub roundhi: f64,
    /// Skip peaks whose kernel footprint would leave the image.
    #[serde(default)]
    pub exclude_border: bool,
    /// Keep only the N brightest sources.
    #[serde(default)]
    pub brightest: Option<usize>,
    /// Reject sources whose peak pixel exceeds this value (saturation).
    #[serde(default)]
    pub peakmax: Option<f64>,
    /// Clipping threshold for the background statistics.
    #[serde(default = "default_background_sigma")]
    pub background_sigma: f32,
}

fn default_threshold() -> f64 {
    DEFAULT_DETECTION_THRESHOLD
}
fn default_fwhm() -> f64 {
    DEFAULT_FWHM
}
fn default_sigma_radius() -> f64 {
    DEFAULT_SIGMA_RADIUS
}
fn default_sharplo() -> f64 {
    DEFAULT_SHARPLO
}
fn default_sharphi() -> f64 {
    DEFAULT_SHARPHI
}
fn default_roundlo() -> f64 {
    DEFAULT_ROUNDLO
}
fn default_roundhi() -> f64 {
    DEFAULT_ROUNDHI
}
fn default_background_sigma() -> f32 {
    DEFAULT_BACKGROUND_SIGMA
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DETECTION_THRESHOLD,
            fwhm: DEFAULT_FWHM,
            sigma_radius: DEFAULT_SIGMA_RADIUS,
            sharplo: DEFAULT_SHARPLO,
            sharphi: DEFAULT_SHARPHI,
            roundlo: DEFAULT_ROUNDLO,
            roundhi: DEFAULT_ROUNDHI,
            exclude_border: false,
            brightest: None,
            peakmax: None,
            background_sigma: DEFAULT_BACKGROUND_SIGMA,
        }
    }
}

impl DetectionConfig {
    pub fn new(threshold: f64, fwhm: f64) -> Self {
        Self {
            threshold,
            fwhm,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.threshold.is_finite() && self.threshold >= 0.0) {
            return Err(CcdError::InvalidInput(format!(
                "detection threshold must be non-negative, got {}",
                self.threshold
            )));
        }
        if !(self.fwhm.is_finite() && self.fwhm > 0.0) {
            return Err(CcdError::InvalidInput(format!(
                "fwhm must be positive, got {}",
                self.fwhm
            )));
        }
        if !(self.sigma_radius.is_finite() && self.sigma_radius > 0.0) {
            return Err(CcdError::InvalidInput(format!(
                "sigma_radius must be positive, got {}",
                self.sigma_radius
            )));
        }
        if self.sharplo > self.sharphi || self.roundlo > self.roundhi {
            return Err(CcdError::InvalidInput(
                "sharpness/roundness lower bounds exceed upper bounds".into(),
            ));
        }
        if self.brightest == Some(0) {
            return Err(CcdError::InvalidInput("brightest must be at least 1".into()));
        }
        Ok(())
    }
}
