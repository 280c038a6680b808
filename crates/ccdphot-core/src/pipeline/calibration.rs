use tracing::{debug, info};

use super::config::CalibrationPipelineConfig;
use super::types::{AtStage, CalibrationOutput, PipelineResult, PipelineStage, ProgressReporter};
use crate::calibration::{calibrate, create_master_bias, create_master_dark, create_master_flat, MasterSet};
use crate::error::{CcdError, Result};
use crate::frame::{Frame, FrameSet, FrameType};

/// Raw inputs of the calibration pipeline.
///
/// Darks are combined per exposure time and flats per filter. Each science
/// frame is matched to the dark with the same exposure and the flat with the
/// same filter; a single master of either kind is used for every frame.
#[derive(Clone, Debug)]
pub struct CalibrationInputs {
    pub bias: FrameSet,
    pub darks: Option<FrameSet>,
    pub flats: Option<FrameSet>,
    pub science: Vec<Frame>,
}

impl CalibrationInputs {
    pub fn new(bias: FrameSet) -> Self {
        Self {
            bias,
            darks: None,
            flats: None,
            science: Vec::new(),
        }
    }

    pub fn with_darks(mut self, darks: FrameSet) -> Self {
        self.darks = Some(darks);
        self
    }

    pub fn with_flats(mut self, flats: FrameSet) -> Self {
        self.flats = Some(flats);
        self
    }

    pub fn with_science(mut self, science: Vec<Frame>) -> Self {
        self.science = science;
        self
    }
}

/// Which master each later step uses, decided before anything is combined.
struct CalibrationPlan {
    dark_groups: Vec<(Option<f64>, FrameSet)>,
    flat_groups: Vec<(Option<String>, FrameSet)>,
    /// Dark index for each flat group.
    flat_darks: Vec<Option<usize>>,
    /// `(dark, flat)` indices for each science frame.
    science: Vec<(Option<usize>, Option<usize>)>,
}

/// Combine masters and calibrate the science frames.
///
/// All shapes, frame types and master assignments are checked before the
/// first combination, so a validation failure produces no master at all.
pub fn run_calibration_pipeline(
    inputs: &CalibrationInputs,
    config: &CalibrationPipelineConfig,
    reporter: &dyn ProgressReporter,
) -> PipelineResult<CalibrationOutput> {
    reporter.begin_stage(PipelineStage::Validate, None);
    let plan = plan_calibration(inputs, config).at(PipelineStage::Validate)?;
    reporter.finish_stage();
    info!(
        n_bias = inputs.bias.len(),
        n_dark_groups = plan.dark_groups.len(),
        n_flat_groups = plan.flat_groups.len(),
        n_science = inputs.science.len(),
        "Calibration inputs validated"
    );

    reporter.begin_stage(PipelineStage::CombineBias, Some(inputs.bias.len()));
    let bias = create_master_bias(&inputs.bias, &config.bias).at(PipelineStage::CombineBias)?;
    reporter.advance(inputs.bias.len());
    reporter.finish_stage();

    let mut darks = Vec::with_capacity(plan.dark_groups.len());
    if !plan.dark_groups.is_empty() {
        reporter.begin_stage(PipelineStage::CombineDark, Some(plan.dark_groups.len()));
        for (i, (exposure, set)) in plan.dark_groups.iter().enumerate() {
            let master = create_master_dark(set, &bias, &config.dark).at(PipelineStage::CombineDark)?;
            debug!(exposure = ?exposure, n_frames = set.len(), "Master dark combined");
            darks.push(master);
            reporter.advance(i + 1);
        }
        reporter.finish_stage();
    }

    let mut flats = Vec::with_capacity(plan.flat_groups.len());
    if !plan.flat_groups.is_empty() {
        reporter.begin_stage(PipelineStage::CombineFlat, Some(plan.flat_groups.len()));
        for (i, ((filter, set), dark)) in plan.flat_groups.iter().zip(&plan.flat_darks).enumerate() {
            let dark = dark.map(|d| &darks[d]);
            let master = create_master_flat(set, &bias, dark, &config.flat, &config.calibration)
                .at(PipelineStage::CombineFlat)?;
            debug!(filter = ?filter, n_frames = set.len(), dark = dark.is_some(), "Master flat combined");
            flats.push(master);
            reporter.advance(i + 1);
        }
        reporter.finish_stage();
    }

    let mut science = Vec::with_capacity(inputs.science.len());
    if !inputs.science.is_empty() {
        reporter.begin_stage(PipelineStage::CalibrateScience, Some(inputs.science.len()));
        for (i, (frame, &(dark, flat))) in inputs.science.iter().zip(&plan.science).enumerate() {
            let mut masters = MasterSet::new(&bias);
            if let Some(d) = dark {
                masters = masters.with_dark(&darks[d]);
            }
            if let Some(f) = flat {
                masters = masters.with_flat(&flats[f]);
            }
            science.push(calibrate(frame, &masters, &config.calibration).at(PipelineStage::CalibrateScience)?);
            reporter.advance(i + 1);
        }
        reporter.finish_stage();
    }

    info!(
        n_darks = darks.len(),
        n_flats = flats.len(),
        n_calibrated = science.len(),
        "Calibration pipeline complete"
    );
    Ok(CalibrationOutput {
        bias,
        darks,
        flats,
        science,
    })
}

fn plan_calibration(inputs: &CalibrationInputs, config: &CalibrationPipelineConfig) -> Result<CalibrationPlan> {
    let scale = config.calibration.scale_dark;

    expect_type(&inputs.bias, FrameType::Bias)?;
    if inputs.bias.is_empty() {
        return Err(CcdError::EmptySequence);
    }
    for (set, expected) in [(&inputs.darks, FrameType::Dark), (&inputs.flats, FrameType::Flat)] {
        if let Some(set) = set {
            expect_type(set, expected)?;
            if set.is_empty() {
                return Err(CcdError::InvalidInput(format!("{expected} frame set is empty")));
            }
        }
    }

    let all: Vec<(usize, usize)> = inputs
        .bias
        .frames
        .iter()
        .chain(inputs.darks.iter().flat_map(|s| &s.frames))
        .chain(inputs.flats.iter().flat_map(|s| &s.frames))
        .chain(&inputs.science)
        .map(Frame::shape)
        .collect();
    if all.iter().any(|&s| s != all[0]) {
        return Err(CcdError::shape_mismatch("calibration inputs", all));
    }

    let dark_groups = inputs.darks.as_ref().map(FrameSet::group_by_exposure).unwrap_or_default();
    let flat_groups = inputs.flats.as_ref().map(FrameSet::group_by_filter).unwrap_or_default();
    let dark_exposures: Vec<Option<f64>> = dark_groups.iter().map(|(t, _)| *t).collect();
    let flat_filters: Vec<Option<String>> = flat_groups.iter().map(|(f, _)| f.clone()).collect();

    let mut flat_darks = Vec::with_capacity(flat_groups.len());
    for (filter, set) in &flat_groups {
        let exposure = set.frames.first().and_then(|f| f.metadata.exposure_time);
        let dark = select_dark(&dark_exposures, exposure, scale);
        if let Some(d) = dark {
            if scale && (dark_exposures[d].is_none() || set.frames.iter().any(|f| f.metadata.exposure_time.is_none())) {
                return Err(CcdError::InvalidInput(format!(
                    "dark scaling for {} flats requires exposure times on darks and flats",
                    filter.as_deref().unwrap_or("unfiltered")
                )));
            }
        } else if !dark_exposures.is_empty() {
            debug!(filter = ?filter, exposure = ?exposure, "No matching master dark for flats");
        }
        flat_darks.push(dark);
    }

    let mut science = Vec::with_capacity(inputs.science.len());
    for (i, frame) in inputs.science.iter().enumerate() {
        let exposure = frame.metadata.exposure_time;
        let dark = if dark_exposures.is_empty() {
            None
        } else {
            let d = select_dark(&dark_exposures, exposure, scale).ok_or_else(|| {
                CcdError::InvalidInput(format!(
                    "no master dark matches exposure {exposure:?} of science frame {i}"
                ))
            })?;
            if scale && (exposure.is_none() || dark_exposures[d].is_none()) {
                return Err(CcdError::InvalidInput(format!(
                    "dark scaling requires exposure times (science frame {i})"
                )));
            }
            Some(d)
        };
        let flat = if flat_filters.is_empty() {
            None
        } else {
            Some(select_flat(&flat_filters, frame.metadata.filter.as_deref()).ok_or_else(|| {
                CcdError::InvalidInput(format!(
                    "no master flat matches filter {:?} of science frame {i}",
                    frame.metadata.filter
                ))
            })?)
        };
        science.push((dark, flat));
    }

    Ok(CalibrationPlan {
        dark_groups,
        flat_groups,
        flat_darks,
        science,
    })
}

fn expect_type(set: &FrameSet, expected: FrameType) -> Result<()> {
    if set.frame_type != expected {
        return Err(CcdError::InvalidInput(format!(
            "expected {expected} frames, got {}",
            set.frame_type
        )));
    }
    Ok(())
}

/// Same exposure at millisecond resolution; otherwise the only dark; otherwise,
/// when scaling, the closest known exposure.
fn select_dark(exposures: &[Option<f64>], target: Option<f64>, scale: bool) -> Option<usize> {
    let ms = |t: f64| (t * 1000.0).round() as i64;
    if let Some(t) = target {
        if let Some(i) = exposures.iter().position(|e| e.is_some_and(|e| ms(e) == ms(t))) {
            return Some(i);
        }
    }
    if exposures.len() == 1 {
        return Some(0);
    }
    let t = target.filter(|_| scale)?;
    exposures
        .iter()
        .enumerate()
        .filter_map(|(i, e)| e.map(|e| (i, (e - t).abs())))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

fn select_flat(filters: &[Option<String>], target: Option<&str>) -> Option<usize> {
    filters
        .iter()
        .position(|f| f.as_deref() == target)
        .or_else(|| (filters.len() == 1).then_some(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_dark_prefers_exact_exposure() {
        let exposures = [Some(10.0), Some(30.0)];
        assert_eq!(select_dark(&exposures, Some(30.0), false), Some(1));
        assert_eq!(select_dark(&exposures, Some(20.0), false), None);
        assert_eq!(select_dark(&exposures, Some(25.0), true), Some(1));
        assert_eq!(select_dark(&[Some(60.0)], Some(5.0), false), Some(0));
        assert_eq!(select_dark(&[], Some(5.0), true), None);
    }

    #[test]
    fn test_select_flat_by_filter() {
        let filters = [Some("B".to_string()), Some("V".to_string())];
        assert_eq!(select_flat(&filters, Some("V")), Some(1));
        assert_eq!(select_flat(&filters, Some("R")), None);
        assert_eq!(select_flat(&[None], Some("R")), Some(0));
    }
}
