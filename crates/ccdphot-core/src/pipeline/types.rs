use thiserror::Error;

use crate::aperture::PhotometryResult;
use crate::background::SigmaClippedStats;
use crate::detection::DetectionResult;
use crate::error::{CcdError, Result};
use crate::frame::{ArrayImage, Frame, MasterFrame, PositionList};

/// Pipeline stage, used for progress reporting and error attribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Reading,
    Validate,
    CombineBias,
    CombineDark,
    CombineFlat,
    CalibrateScience,
    SubtractBackground,
    Detect,
    CheckSources,
    Refine,
    Photometry,
    Writing,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reading => write!(f, "Reading frames"),
            Self::Validate => write!(f, "Validating inputs"),
            Self::CombineBias => write!(f, "Combining bias frames"),
            Self::CombineDark => write!(f, "Combining dark frames"),
            Self::CombineFlat => write!(f, "Combining flat frames"),
            Self::CalibrateScience => write!(f, "Calibrating science frames"),
            Self::SubtractBackground => write!(f, "Subtracting background"),
            Self::Detect => write!(f, "Detecting sources"),
            Self::CheckSources => write!(f, "Checking detections"),
            Self::Refine => write!(f, "Refining centroids"),
            Self::Photometry => write!(f, "Measuring photometry"),
            Self::Writing => write!(f, "Writing output"),
        }
    }
}

/// A failed step, tagged with the stage that produced it.
#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    #[source]
    pub source: CcdError,
}

impl PipelineError {
    pub fn new(stage: PipelineStage, source: CcdError) -> Self {
        Self { stage, source }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Attach a stage to a step result.
pub(crate) trait AtStage<T> {
    fn at(self, stage: PipelineStage) -> PipelineResult<T>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: PipelineStage) -> PipelineResult<T> {
        self.map_err(|e| PipelineError::new(stage, e))
    }
}

/// Thread-safe progress reporting for the pipelines.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g., frame count), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Reporter that ignores every event.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Image handed to a pipeline entry point, either already a frame or a
/// raw array whose dimensionality has not been checked yet.
#[derive(Clone, Debug)]
pub enum ImageInput {
    Frame(Frame),
    Array(ArrayImage),
}

impl ImageInput {
    pub(crate) fn to_frame(&self) -> Result<Frame> {
        match self {
            Self::Frame(f) => {
                let (h, w) = f.shape();
                if h == 0 || w == 0 {
                    return Err(CcdError::InvalidImage(format!("image is empty ({h}x{w})")));
                }
                Ok(f.clone())
            }
            Self::Array(a) => a.to_frame(),
        }
    }
}

impl From<Frame> for ImageInput {
    fn from(frame: Frame) -> Self {
        Self::Frame(frame)
    }
}

impl From<ArrayImage> for ImageInput {
    fn from(image: ArrayImage) -> Self {
        Self::Array(image)
    }
}

/// Products of the calibration pipeline.
#[derive(Clone, Debug)]
pub struct CalibrationOutput {
    pub bias: MasterFrame,
    /// One master per dark exposure time.
    pub darks: Vec<MasterFrame>,
    /// One master per flat filter.
    pub flats: Vec<MasterFrame>,
    /// Calibrated science frames, in input order.
    pub science: Vec<Frame>,
}

/// Terminal state of detection and refinement.
#[derive(Clone, Debug)]
pub enum DetectionOutcome {
    Detected {
        detection: DetectionResult,
        /// Refined positions, aligned with `detection.sources`.
        positions: PositionList,
    },
    /// Nothing cleared the threshold; an expected outcome, not a failure.
    NoSourcesDetected { background: SigmaClippedStats },
}

/// Terminal state of the detection-photometry pipeline.
#[derive(Clone, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum PhotometryOutcome {
    Measured {
        detection: DetectionResult,
        positions: PositionList,
        table: PhotometryResult,
    },
    NoSourcesDetected { background: SigmaClippedStats },
}

impl PhotometryOutcome {
    pub fn table(&self) -> Option<&PhotometryResult> {
        match self {
            Self::Measured { table, .. } => Some(table),
            Self::NoSourcesDetected { .. } => None,
        }
    }

    pub fn is_no_sources(&self) -> bool {
        matches!(self, Self::NoSourcesDetected { .. })
    }
}
