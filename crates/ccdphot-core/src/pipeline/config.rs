use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::aperture::{ApertureGeometry, ApertureMethod, ApertureOptions};
use crate::calibration::CalibrationConfig;
use crate::centroid::CentroidConfig;
use crate::combine::CombineConfig;
use crate::consts::{DEFAULT_BACKGROUND_MAX_ITERS, DEFAULT_BACKGROUND_SIGMA};
use crate::detection::DetectionConfig;
use crate::error::Result;

/// Parameters of the calibration pipeline, one block per step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationPipelineConfig {
    pub bias: CombineConfig,
    pub dark: CombineConfig,
    pub flat: CombineConfig,
    pub calibration: CalibrationConfig,
}

/// Optional median-background subtraction before detection.
///
/// Ignored when an explicit background image is supplied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub subtract_median: bool,
    pub sigma: f32,
    pub max_iters: usize,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            subtract_median: false,
            sigma: DEFAULT_BACKGROUND_SIGMA,
            max_iters: DEFAULT_BACKGROUND_MAX_ITERS,
        }
    }
}

/// Aperture selected by name, with its named parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApertureRequest {
    /// One of `circular`, `circular_annulus`, `elliptical`,
    /// `elliptical_annulus`.
    pub method: String,
    pub params: BTreeMap<String, f64>,
    pub options: ApertureOptions,
}

impl Default for ApertureRequest {
    fn default() -> Self {
        Self {
            method: ApertureMethod::Circular.as_str().to_string(),
            params: BTreeMap::from([("r".to_string(), 5.0)]),
            options: ApertureOptions::default(),
        }
    }
}

impl ApertureRequest {
    pub fn new(method: impl Into<String>, params: BTreeMap<String, f64>) -> Self {
        Self {
            method: method.into(),
            params,
            options: ApertureOptions::default(),
        }
    }

    /// Dispatch the method name and build the geometry.
    ///
    /// Unknown names fail with `UnsupportedMethod`, missing or invalid
    /// parameters with `InvalidAperture`.
    pub fn resolve(&self) -> Result<ApertureGeometry> {
        let method: ApertureMethod = self.method.parse()?;
        let geometry = ApertureGeometry::from_params(method, &self.params)?;
        self.options.validate()?;
        Ok(geometry)
    }
}

/// Parameters of the detection-photometry pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotometryPipelineConfig {
    pub background: BackgroundConfig,
    pub detection: DetectionConfig,
    pub refine: CentroidConfig,
    pub aperture: ApertureRequest,
}

/// Input files of a reduction run.
///
/// Explicit file lists take precedence; when all of them are empty and a
/// directory is given, the directory is scanned and classified by IMAGETYP.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub directory: Option<PathBuf>,
    pub bias: Vec<PathBuf>,
    pub darks: Vec<PathBuf>,
    pub flats: Vec<PathBuf>,
    pub science: Vec<PathBuf>,
    /// Background image subtracted before detection.
    pub background: Option<PathBuf>,
}

impl InputConfig {
    pub(crate) fn has_explicit_files(&self) -> bool {
        !(self.bias.is_empty() && self.darks.is_empty() && self.flats.is_empty() && self.science.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// Write master frames next to the calibrated frames.
    pub write_masters: bool,
    /// Table extension, `json` or `csv`.
    pub table_format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("reduced"),
            write_masters: true,
            table_format: "json".to_string(),
        }
    }
}

/// A full reduction run, usually read from TOML.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub calibration: CalibrationPipelineConfig,
    /// Photometry is skipped when absent.
    pub photometry: Option<PhotometryPipelineConfig>,
}
