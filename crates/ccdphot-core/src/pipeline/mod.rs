pub mod config;
mod calibration;
mod orchestrator;
mod photometry;
mod types;

pub use calibration::{run_calibration_pipeline, CalibrationInputs};
pub use config::{
    ApertureRequest, BackgroundConfig, CalibrationPipelineConfig, InputConfig, OutputConfig,
    PhotometryPipelineConfig, RunConfig,
};
pub use orchestrator::{run_reduction, run_reduction_quiet, ReductionSummary};
pub use photometry::{run_aperture_photometry, run_photometry_pipeline, run_source_detection, PhotometryRequest};
pub use types::{
    CalibrationOutput, DetectionOutcome, ImageInput, NoOpReporter, PhotometryOutcome, PipelineError,
    PipelineResult, PipelineStage, ProgressReporter,
};
