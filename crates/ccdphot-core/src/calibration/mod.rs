pub mod masters;
pub mod ops;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::frame::{Frame, MasterFrame};

pub use masters::{create_master_bias, create_master_dark, create_master_flat};
pub use ops::{flat_correct, subtract_bias, subtract_dark};

/// Options for the calibration sub-steps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Scale the master dark by the exposure-time ratio before subtracting.
    pub scale_dark: bool,
    /// Floor applied to master-flat values before normalisation.
    pub flat_min_value: Option<f32>,
}

/// Borrowed master frames for calibrating science frames.
#[derive(Clone, Copy, Debug)]
pub struct MasterSet<'a> {
    pub bias: &'a MasterFrame,
    pub dark: Option<&'a MasterFrame>,
    pub flat: Option<&'a MasterFrame>,
}

impl<'a> MasterSet<'a> {
    pub fn new(bias: &'a MasterFrame) -> Self {
        Self {
            bias,
            dark: None,
            flat: None,
        }
    }

    pub fn with_dark(mut self, dark: &'a MasterFrame) -> Self {
        self.dark = Some(dark);
        self
    }

    pub fn with_flat(mut self, flat: &'a MasterFrame) -> Self {
        self.flat = Some(flat);
        self
    }
}

/// Calibrate a science frame: bias, then dark, then flat.
///
/// The sub-steps do not commute; this order is the only one applied.
pub fn calibrate(science: &Frame, masters: &MasterSet<'_>, config: &CalibrationConfig) -> Result<Frame> {
    let mut frame = subtract_bias(science, masters.bias)?;
    if let Some(dark) = masters.dark {
        frame = subtract_dark(&frame, dark, config.scale_dark)?;
    }
    if let Some(flat) = masters.flat {
        frame = flat_correct(&frame, flat, config.flat_min_value)?;
    }
    frame.provenance.is_calibrated = true;

    info!(
        dark = masters.dark.is_some(),
        flat = masters.flat.is_some(),
        scale_dark = config.scale_dark,
        "Calibrated science frame"
    );
    Ok(frame)
}
