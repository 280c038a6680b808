use tracing::info;

use super::config::{ApertureRequest, PhotometryPipelineConfig};
use super::types::{
    AtStage, DetectionOutcome, ImageInput, PhotometryOutcome, PipelineResult, PipelineStage, ProgressReporter,
};
use crate::aperture::{measure, ApertureGeometry, PhotometryResult};
use crate::background::{subtract_background, subtract_median_background};
use crate::centroid::refine_positions;
use crate::detection::detect_sources;
use crate::error::{CcdError, Result};
use crate::frame::{Frame, PositionList};

/// Inputs of the detection-photometry pipeline.
#[derive(Clone, Debug)]
pub struct PhotometryRequest {
    pub image: ImageInput,
    /// Subtracted before detection and refinement. Photometry always runs
    /// on `image` itself.
    pub background: Option<ImageInput>,
    pub config: PhotometryPipelineConfig,
}

impl PhotometryRequest {
    pub fn new(image: impl Into<ImageInput>, config: PhotometryPipelineConfig) -> Self {
        Self {
            image: image.into(),
            background: None,
            config,
        }
    }

    pub fn with_background(mut self, background: impl Into<ImageInput>) -> Self {
        self.background = Some(background.into());
        self
    }
}

/// Detect sources and refine their centroids.
///
/// Stages: validate-image, optional background subtraction, detect,
/// check-nonempty, refine. An empty detection ends in
/// [`DetectionOutcome::NoSourcesDetected`].
pub fn run_source_detection(
    image: &ImageInput,
    background: Option<&ImageInput>,
    config: &PhotometryPipelineConfig,
    reporter: &dyn ProgressReporter,
) -> PipelineResult<DetectionOutcome> {
    reporter.begin_stage(PipelineStage::Validate, None);
    let validated = validate_detection_inputs(image, background, config);
    reporter.finish_stage();
    let (frame, background) = validated.at(PipelineStage::Validate)?;

    let working = match background {
        Some(bg) => {
            reporter.begin_stage(PipelineStage::SubtractBackground, None);
            let out = subtract_background(&frame, &bg).at(PipelineStage::SubtractBackground)?;
            reporter.finish_stage();
            out
        }
        None if config.background.subtract_median => {
            reporter.begin_stage(PipelineStage::SubtractBackground, None);
            let (out, _) = subtract_median_background(&frame, config.background.sigma, config.background.max_iters)
                .at(PipelineStage::SubtractBackground)?;
            reporter.finish_stage();
            out
        }
        None => frame,
    };

    reporter.begin_stage(PipelineStage::Detect, None);
    let detection = detect_sources(&working, &config.detection).at(PipelineStage::Detect)?;
    reporter.finish_stage();

    reporter.begin_stage(PipelineStage::CheckSources, None);
    if detection.is_empty() {
        reporter.finish_stage();
        info!(threshold = detection.threshold, "No sources detected");
        return Ok(DetectionOutcome::NoSourcesDetected {
            background: detection.background,
        });
    }
    reporter.finish_stage();

    reporter.begin_stage(PipelineStage::Refine, Some(detection.len()));
    let positions = refine_positions(&working, &detection.positions(), &config.refine).at(PipelineStage::Refine)?;
    reporter.advance(positions.len());
    reporter.finish_stage();

    Ok(DetectionOutcome::Detected { detection, positions })
}

/// Measure fixed positions with an aperture selected by name.
pub fn run_aperture_photometry(
    image: &ImageInput,
    positions: &PositionList,
    aperture: &ApertureRequest,
    reporter: &dyn ProgressReporter,
) -> PipelineResult<PhotometryResult> {
    reporter.begin_stage(PipelineStage::Validate, None);
    let validated = validate_photometry_inputs(image, positions, aperture);
    reporter.finish_stage();
    let (geometry, frame) = validated.at(PipelineStage::Validate)?;

    reporter.begin_stage(PipelineStage::Photometry, Some(positions.len()));
    let table = measure(&frame, positions, &geometry, &aperture.options).at(PipelineStage::Photometry)?;
    reporter.advance(table.len());
    reporter.finish_stage();
    Ok(table)
}

fn validate_detection_inputs(
    image: &ImageInput,
    background: Option<&ImageInput>,
    config: &PhotometryPipelineConfig,
) -> Result<(Frame, Option<Frame>)> {
    config.detection.validate()?;
    config.refine.validate()?;
    let frame = image.to_frame()?;
    let background = background.map(ImageInput::to_frame).transpose()?;
    Ok((frame, background))
}

fn validate_photometry_inputs(
    image: &ImageInput,
    positions: &PositionList,
    aperture: &ApertureRequest,
) -> Result<(ApertureGeometry, Frame)> {
    let geometry = aperture.resolve()?;
    let frame = image.to_frame()?;
    positions.validate()?;
    if positions.is_empty() {
        return Err(CcdError::InvalidPositions("no positions to measure".into()));
    }
    Ok((geometry, frame))
}

/// Detection, refinement and aperture photometry in one call.
///
/// The aperture method is resolved before any image is touched. Refined
/// positions from the (background-subtracted) detection image are measured
/// on the original image.
pub fn run_photometry_pipeline(
    request: &PhotometryRequest,
    reporter: &dyn ProgressReporter,
) -> PipelineResult<PhotometryOutcome> {
    request.config.aperture.resolve().at(PipelineStage::Validate)?;

    let detected = run_source_detection(
        &request.image,
        request.background.as_ref(),
        &request.config,
        reporter,
    )?;
    let (detection, positions) = match detected {
        DetectionOutcome::Detected { detection, positions } => (detection, positions),
        DetectionOutcome::NoSourcesDetected { background } => {
            return Ok(PhotometryOutcome::NoSourcesDetected { background });
        }
    };

    let table = run_aperture_photometry(&request.image, &positions, &request.config.aperture, reporter)?;
    info!(
        method = %request.config.aperture.method,
        n_sources = table.len(),
        "Photometry pipeline complete"
    );
    Ok(PhotometryOutcome::Measured {
        detection,
        positions,
        table,
    })
}
