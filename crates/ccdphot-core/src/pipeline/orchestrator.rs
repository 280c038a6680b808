use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use super::calibration::{run_calibration_pipeline, CalibrationInputs};
use super::config::{InputConfig, RunConfig};
use super::photometry::{run_photometry_pipeline, PhotometryRequest};
use super::types::{AtStage, NoOpReporter, PhotometryOutcome, PipelineResult, PipelineStage, ProgressReporter};
use crate::error::{CcdError, Result};
use crate::frame::{Frame, FrameSet, FrameType, MasterFrame};
use crate::io::{load_frame_set, read_fits, write_fits, write_table, ImageCollection, TableFormat};

/// Files written by [`run_reduction`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct ReductionSummary {
    pub masters: Vec<PathBuf>,
    pub calibrated: Vec<PathBuf>,
    pub tables: Vec<PathBuf>,
    /// Science inputs on which nothing was detected.
    pub no_sources: Vec<PathBuf>,
}

struct LoadedInputs {
    bias: FrameSet,
    darks: Option<FrameSet>,
    flats: Option<FrameSet>,
    science: Vec<(PathBuf, Frame)>,
    background: Option<Frame>,
}

/// Run a full reduction: load frames, calibrate, detect and measure, write
/// every product to the output directory.
///
/// Calibration is skipped when no bias frames are supplied; photometry is
/// skipped when the config has no photometry block. Already written masters
/// are left in place if a later stage fails.
pub fn run_reduction(config: &RunConfig, reporter: &dyn ProgressReporter) -> PipelineResult<ReductionSummary> {
    reporter.begin_stage(PipelineStage::Validate, None);
    let table_format = TableFormat::from_extension(&config.output.table_format).at(PipelineStage::Validate)?;
    if let Some(photometry) = &config.photometry {
        photometry.aperture.resolve().at(PipelineStage::Validate)?;
        photometry.detection.validate().at(PipelineStage::Validate)?;
        photometry.refine.validate().at(PipelineStage::Validate)?;
    }
    reporter.finish_stage();

    let inputs = load_inputs(&config.input, reporter).at(PipelineStage::Reading)?;
    info!(
        n_bias = inputs.bias.len(),
        n_science = inputs.science.len(),
        output = %config.output.directory.display(),
        "Starting reduction"
    );

    let out_dir = &config.output.directory;
    std::fs::create_dir_all(out_dir)
        .map_err(CcdError::from)
        .at(PipelineStage::Writing)?;
    let mut summary = ReductionSummary::default();

    let (paths, raw): (Vec<PathBuf>, Vec<Frame>) = inputs.science.into_iter().unzip();
    let science = if inputs.bias.is_empty() {
        warn!("No bias frames supplied, skipping calibration");
        raw
    } else {
        let mut calibration = CalibrationInputs::new(inputs.bias).with_science(raw);
        calibration.darks = inputs.darks;
        calibration.flats = inputs.flats;
        let output = run_calibration_pipeline(&calibration, &config.calibration, reporter)?;

        reporter.begin_stage(PipelineStage::Writing, None);
        if config.output.write_masters {
            let masters = std::iter::once(&output.bias)
                .chain(&output.darks)
                .chain(&output.flats);
            for master in masters {
                let path = out_dir.join(master_file_name(master));
                write_fits(&path, master.frame()).at(PipelineStage::Writing)?;
                summary.masters.push(path);
            }
        }
        for (path, frame) in paths.iter().zip(&output.science) {
            let out = out_dir.join(format!("{}_cal.fits", file_stem(path)));
            write_fits(&out, frame).at(PipelineStage::Writing)?;
            summary.calibrated.push(out);
        }
        reporter.finish_stage();
        output.science
    };

    let Some(photometry) = &config.photometry else {
        return Ok(summary);
    };
    for (path, frame) in paths.iter().zip(science) {
        let mut request = PhotometryRequest::new(frame, photometry.clone());
        if let Some(bg) = &inputs.background {
            request = request.with_background(bg.clone());
        }
        match run_photometry_pipeline(&request, reporter)? {
            PhotometryOutcome::Measured { table, .. } => {
                let out = out_dir.join(format!("{}_phot.{}", file_stem(path), table_format.extension()));
                reporter.begin_stage(PipelineStage::Writing, None);
                write_table(&table, &out).at(PipelineStage::Writing)?;
                reporter.finish_stage();
                summary.tables.push(out);
            }
            PhotometryOutcome::NoSourcesDetected { .. } => {
                warn!(path = %path.display(), "No sources detected");
                summary.no_sources.push(path.clone());
            }
        }
    }

    info!(
        n_masters = summary.masters.len(),
        n_calibrated = summary.calibrated.len(),
        n_tables = summary.tables.len(),
        "Reduction complete"
    );
    Ok(summary)
}

/// [`run_reduction`] without progress reporting.
pub fn run_reduction_quiet(config: &RunConfig) -> PipelineResult<ReductionSummary> {
    run_reduction(config, &NoOpReporter)
}

fn load_inputs(input: &InputConfig, reporter: &dyn ProgressReporter) -> Result<LoadedInputs> {
    let (bias, darks, flats, science_paths) = if input.has_explicit_files() {
        (
            input.bias.clone(),
            input.darks.clone(),
            input.flats.clone(),
            input.science.clone(),
        )
    } else if let Some(dir) = &input.directory {
        let collection = ImageCollection::scan(dir)?;
        let paths = |t| collection.of_type(t).map(|e| e.path.clone()).collect::<Vec<_>>();
        (
            paths(FrameType::Bias),
            paths(FrameType::Dark),
            paths(FrameType::Flat),
            paths(FrameType::Science),
        )
    } else {
        return Err(CcdError::InvalidInput("no input files or directory given".into()));
    };
    if science_paths.is_empty() && bias.is_empty() {
        return Err(CcdError::InvalidInput("no bias or science frames to reduce".into()));
    }

    let total = bias.len() + darks.len() + flats.len() + science_paths.len();
    reporter.begin_stage(PipelineStage::Reading, Some(total));
    let optional = |frame_type, paths: &[PathBuf]| -> Result<Option<FrameSet>> {
        if paths.is_empty() {
            Ok(None)
        } else {
            load_frame_set(frame_type, paths).map(Some)
        }
    };
    let bias = load_frame_set(FrameType::Bias, bias.as_slice())?;
    let darks = optional(FrameType::Dark, &darks)?;
    let flats = optional(FrameType::Flat, &flats)?;
    reporter.advance(total - science_paths.len());
    let science = science_paths
        .into_iter()
        .map(|p| read_fits(&p).map(|f| (p, f)))
        .collect::<Result<Vec<_>>>()?;
    let background = input.background.as_deref().map(read_fits).transpose()?;
    reporter.advance(total);
    reporter.finish_stage();

    Ok(LoadedInputs {
        bias,
        darks,
        flats,
        science,
        background,
    })
}

fn master_file_name(master: &MasterFrame) -> String {
    let metadata = &master.frame().metadata;
    match master.master_type() {
        FrameType::Dark => match metadata.exposure_time {
            Some(t) => format!("master_dark_{t}s.fits"),
            None => "master_dark.fits".to_string(),
        },
        FrameType::Flat => match &metadata.filter {
            Some(filter) => format!("master_flat_{}.fits", sanitize(filter)),
            None => "master_flat.fits".to_string(),
        },
        _ => "master_bias.fits".to_string(),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
