pub mod reduce;
pub mod sigma_clip;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CcdError, Result};
use crate::frame::{FrameSet, MasterFrame};

pub use sigma_clip::{ClipCenter, SigmaClipParams};

/// Statistic used to reduce the per-pixel stack to a single value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineMethod {
    #[default]
    Median,
    Average,
    Sum,
}

impl fmt::Display for CombineMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Median => write!(f, "median"),
            Self::Average => write!(f, "average"),
            Self::Sum => write!(f, "sum"),
        }
    }
}

impl FromStr for CombineMethod {
    type Err = CcdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "median" => Ok(Self::Median),
            "average" | "mean" => Ok(Self::Average),
            "sum" => Ok(Self::Sum),
            _ => Err(CcdError::UnsupportedMethod {
                kind: "combine method",
                name: s.to_string(),
            }),
        }
    }
}

/// Configuration for combining a frame set into a master.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    pub method: CombineMethod,
    /// Reject per-pixel outliers before reducing.
    pub sigma_clip: bool,
    pub clip: SigmaClipParams,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            method: CombineMethod::Median,
            sigma_clip: true,
            clip: SigmaClipParams::default(),
        }
    }
}

impl CombineConfig {
    pub fn new(method: CombineMethod, sigma_clip: bool) -> Self {
        Self {
            method,
            sigma_clip,
            ..Self::default()
        }
    }
}

/// Combine a set of same-shaped frames into a master frame.
///
/// Fails with `EmptySequence` for an empty set and `ShapeMismatch` (listing
/// every member shape) when the members differ. Masked input pixels are
/// left out of the stack at that position.
pub fn combine(frames: &FrameSet, config: &CombineConfig) -> Result<MasterFrame> {
    let shape = frames.validate_shapes()?;

    let unit = &frames.frames[0].unit;
    if let Some(other) = frames.frames.iter().find(|f| &f.unit != unit) {
        return Err(CcdError::InvalidInput(format!(
            "cannot combine frames with different units ({unit:?} and {:?})",
            other.unit
        )));
    }

    let frame = reduce::reduce_stack(&frames.frames, config);

    info!(
        frame_type = %frames.frame_type,
        n_frames = frames.len(),
        method = %config.method,
        sigma_clip = config.sigma_clip,
        height = shape.0,
        width = shape.1,
        "Combined frame set"
    );

    Ok(MasterFrame::new(
        frame,
        frames.frame_type,
        config.method,
        frames.len(),
    ))
}
