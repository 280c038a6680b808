use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayD, Ix2};
use serde::{Deserialize, Serialize};

use crate::combine::CombineMethod;
use crate::consts::DEFAULT_UNIT;
use crate::error::{CcdError, Result};

/// A single CCD image.
///
/// Pixel values keep their physical scale (ADU, electrons, ...); nothing is
/// normalised to [0, 1]. Steps never mutate a frame they receive: every
/// operation returns a new `Frame`.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
    /// Physical unit of the pixel values (e.g. "adu").
    pub unit: String,
    /// Optional bad-pixel mask; `true` marks a pixel to ignore.
    pub mask: Option<Array2<bool>>,
    /// Optional per-pixel 1-sigma uncertainty, same unit as `data`.
    pub uncertainty: Option<Array2<f32>>,
    pub metadata: ExposureMetadata,
    pub provenance: Provenance,
}

impl Frame {
    pub fn new(data: Array2<f32>) -> Self {
        Self {
            data,
            unit: DEFAULT_UNIT.to_string(),
            mask: None,
            uncertainty: None,
            metadata: ExposureMetadata::default(),
            provenance: Provenance::default(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_metadata(mut self, metadata: ExposureMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach a bad-pixel mask. Fails if its shape differs from the data.
    pub fn with_mask(mut self, mask: Array2<bool>) -> Result<Self> {
        if mask.dim() != self.shape() {
            return Err(CcdError::shape_mismatch(
                "frame mask",
                vec![self.shape(), mask.dim()],
            ));
        }
        self.mask = Some(mask);
        Ok(self)
    }

    /// Attach a per-pixel uncertainty map. Fails if its shape differs from the data.
    pub fn with_uncertainty(mut self, uncertainty: Array2<f32>) -> Result<Self> {
        if uncertainty.dim() != self.shape() {
            return Err(CcdError::shape_mismatch(
                "frame uncertainty",
                vec![self.shape(), uncertainty.dim()],
            ));
        }
        self.uncertainty = Some(uncertainty);
        Ok(self)
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// `(height, width)`
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Whether the pixel at `(row, col)` is flagged in the mask.
    pub fn is_masked(&self, row: usize, col: usize) -> bool {
        self.mask.as_ref().is_some_and(|m| m[[row, col]])
    }
}

/// Calibration role of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Bias,
    Dark,
    Flat,
    Science,
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bias => write!(f, "bias"),
            Self::Dark => write!(f, "dark"),
            Self::Flat => write!(f, "flat"),
            Self::Science => write!(f, "science"),
        }
    }
}

impl FromStr for FrameType {
    type Err = CcdError;

    /// Accepts the short names plus the common IMAGETYP spellings written by
    /// acquisition software ("Bias Frame", "Light Frame", "zero", "object").
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "bias" | "bias frame" | "zero" => Ok(Self::Bias),
            "dark" | "dark frame" => Ok(Self::Dark),
            "flat" | "flat frame" | "flat field" | "flatfield" | "domeflat" | "skyflat" => {
                Ok(Self::Flat)
            }
            "science" | "light" | "light frame" | "object" => Ok(Self::Science),
            _ => Err(CcdError::UnsupportedMethod {
                kind: "frame type",
                name: s.to_string(),
            }),
        }
    }
}

/// Curated exposure metadata carried by a frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureMetadata {
    /// Exposure time in seconds (EXPTIME).
    pub exposure_time: Option<f64>,
    /// Filter name (FILTER).
    pub filter: Option<String>,
    /// Observation timestamp as written (DATE-OBS).
    pub date_obs: Option<String>,
    pub instrument: Option<String>,
    pub telescope: Option<String>,
    pub object: Option<String>,
    /// Detector gain in e-/ADU (GAIN).
    pub gain: Option<f64>,
    /// Read noise in electrons (RDNOISE).
    pub read_noise: Option<f64>,
    /// Raw IMAGETYP value.
    pub image_type: Option<String>,
}

/// Provenance tags attached to produced frames.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub is_master: bool,
    pub master_type: Option<FrameType>,
    pub combine_method: Option<CombineMethod>,
    /// Number of raw frames that went into a master.
    pub n_combined: usize,
    pub is_calibrated: bool,
}

/// A set of same-typed frames destined to be combined together.
#[derive(Clone, Debug)]
pub struct FrameSet {
    pub frame_type: FrameType,
    pub frames: Vec<Frame>,
}

impl FrameSet {
    pub fn new(frame_type: FrameType, frames: Vec<Frame>) -> Self {
        Self { frame_type, frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Check that every member shares one pixel-grid shape and return it.
    pub fn validate_shapes(&self) -> Result<(usize, usize)> {
        validate_same_shape(&format!("{} frames", self.frame_type), &self.frames)
    }

    /// Split the set by exposure time (millisecond resolution).
    ///
    /// Groups are ordered by exposure time; frames without EXPTIME form a
    /// trailing group keyed `None`.
    pub fn group_by_exposure(&self) -> Vec<(Option<f64>, FrameSet)> {
        // Key on rounded milliseconds; unknown exposures sort last.
        let mut groups: std::collections::BTreeMap<(bool, i64), (Option<f64>, FrameSet)> =
            std::collections::BTreeMap::new();
        for frame in &self.frames {
            let exposure = frame.metadata.exposure_time;
            let key = match exposure {
                Some(t) => (false, (t * 1000.0).round() as i64),
                None => (true, 0),
            };
            groups
                .entry(key)
                .or_insert_with(|| (exposure, FrameSet::new(self.frame_type, Vec::new())))
                .1
                .frames
                .push(frame.clone());
        }
        groups.into_values().collect()
    }

    /// Split the set by filter name, ordered by name; unfiltered frames are keyed `None`.
    pub fn group_by_filter(&self) -> Vec<(Option<String>, FrameSet)> {
        let mut groups: std::collections::BTreeMap<Option<String>, FrameSet> =
            std::collections::BTreeMap::new();
        for frame in &self.frames {
            groups
                .entry(frame.metadata.filter.clone())
                .or_insert_with(|| FrameSet::new(self.frame_type, Vec::new()))
                .frames
                .push(frame.clone());
        }
        groups.into_iter().collect()
    }
}

/// Require all frames to share one shape. Reports every shape on mismatch.
pub(crate) fn validate_same_shape(context: &str, frames: &[Frame]) -> Result<(usize, usize)> {
    let first = frames.first().ok_or(CcdError::EmptySequence)?.shape();
    if frames.iter().any(|f| f.shape() != first) {
        let shapes = frames.iter().map(Frame::shape).collect();
        return Err(CcdError::shape_mismatch(context, shapes));
    }
    Ok(first)
}

/// A master calibration frame produced by combining a [`FrameSet`].
///
/// The wrapped frame always carries `is_master = true` together with the
/// master type and combination method in its provenance.
#[derive(Clone, Debug)]
pub struct MasterFrame {
    frame: Frame,
}

impl MasterFrame {
    pub(crate) fn new(
        mut frame: Frame,
        master_type: FrameType,
        combine_method: CombineMethod,
        n_combined: usize,
    ) -> Self {
        frame.provenance = Provenance {
            is_master: true,
            master_type: Some(master_type),
            combine_method: Some(combine_method),
            n_combined,
            is_calibrated: false,
        };
        Self { frame }
    }

    /// Re-wrap a frame previously written as a master (e.g. loaded from disk).
    pub fn from_frame(frame: Frame, master_type: FrameType) -> Self {
        let method = frame.provenance.combine_method.unwrap_or_default();
        let n = frame.provenance.n_combined.max(1);
        Self::new(frame, master_type, method, n)
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }

    pub fn master_type(&self) -> FrameType {
        self.frame.provenance.master_type.unwrap_or(FrameType::Bias)
    }

    pub fn combine_method(&self) -> CombineMethod {
        self.frame.provenance.combine_method.unwrap_or_default()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.frame.shape()
    }
}

/// A pixel coordinate: `x` is the column, `y` the row, pixel centres at integers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Ordered list of source positions. Order is significant: every step that
/// consumes a list returns results aligned element-for-element with it.
///
/// Serialises as two equal-length sequences `{ "x": [...], "y": [...] }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "PositionColumns", try_from = "PositionColumns")]
pub struct PositionList {
    positions: Vec<Position>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PositionColumns {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl From<PositionList> for PositionColumns {
    fn from(list: PositionList) -> Self {
        Self {
            x: list.xs(),
            y: list.ys(),
        }
    }
}

impl TryFrom<PositionColumns> for PositionList {
    type Error = CcdError;

    fn try_from(cols: PositionColumns) -> Result<Self> {
        PositionList::from_columns(&cols.x, &cols.y)
    }
}

impl PositionList {
    pub fn new(positions: Vec<Position>) -> Self {
        Self { positions }
    }

    /// Build from the `x` / `y` exchange format.
    pub fn from_columns(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(CcdError::InvalidPositions(format!(
                "x and y must have equal length (got {} and {})",
                x.len(),
                y.len()
            )));
        }
        Ok(Self {
            positions: x.iter().zip(y).map(|(&x, &y)| Position { x, y }).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Position> {
        self.positions.iter()
    }

    pub fn as_slice(&self) -> &[Position] {
        &self.positions
    }

    pub fn xs(&self) -> Vec<f64> {
        self.positions.iter().map(|p| p.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.positions.iter().map(|p| p.y).collect()
    }

    /// Reject non-finite coordinates. Emptiness is checked by callers that need it.
    pub fn validate(&self) -> Result<()> {
        if let Some((i, p)) = self
            .positions
            .iter()
            .enumerate()
            .find(|(_, p)| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(CcdError::InvalidPositions(format!(
                "position {i} is not finite: ({}, {})",
                p.x, p.y
            )));
        }
        Ok(())
    }
}

impl FromIterator<Position> for PositionList {
    fn from_iter<I: IntoIterator<Item = Position>>(iter: I) -> Self {
        Self {
            positions: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PositionList {
    type Item = &'a Position;
    type IntoIter = std::slice::Iter<'a, Position>;

    fn into_iter(self) -> Self::IntoIter {
        self.positions.iter()
    }
}

/// Array-based image input: a numeric array tagged `image` plus optional
/// `mask` / `error` companions of the same shape.
///
/// Dimensionality is only known at runtime here; [`ArrayImage::to_frame`] is
/// the gate that turns it into a 2-D [`Frame`].
#[derive(Clone, Debug)]
pub struct ArrayImage {
    pub image: ArrayD<f32>,
    pub mask: Option<ArrayD<bool>>,
    pub error: Option<ArrayD<f32>>,
    pub unit: String,
}

impl ArrayImage {
    pub fn new(image: ArrayD<f32>) -> Self {
        Self {
            image,
            mask: None,
            error: None,
            unit: DEFAULT_UNIT.to_string(),
        }
    }

    pub fn with_mask(mut self, mask: ArrayD<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_error(mut self, error: ArrayD<f32>) -> Self {
        self.error = Some(error);
        self
    }

    /// Validate dimensionality and companion shapes, producing a frame.
    pub fn to_frame(&self) -> Result<Frame> {
        let data = self
            .image
            .clone()
            .into_dimensionality::<Ix2>()
            .map_err(|_| {
                CcdError::InvalidImage(format!(
                    "image must be 2-dimensional, got {} dimension(s)",
                    self.image.ndim()
                ))
            })?;
        let (h, w) = data.dim();
        if h == 0 || w == 0 {
            return Err(CcdError::InvalidImage(format!("image is empty ({h}x{w})")));
        }

        let mut frame = Frame::new(data).with_unit(self.unit.clone());
        if let Some(mask) = &self.mask {
            let mask = mask
                .clone()
                .into_dimensionality::<Ix2>()
                .map_err(|_| CcdError::InvalidImage("mask must be 2-dimensional".into()))?;
            frame = frame.with_mask(mask)?;
        }
        if let Some(error) = &self.error {
            let error = error
                .clone()
                .into_dimensionality::<Ix2>()
                .map_err(|_| CcdError::InvalidImage("error must be 2-dimensional".into()))?;
            frame = frame.with_uncertainty(error)?;
        }
        Ok(frame)
    }
}

impl From<&Frame> for ArrayImage {
    fn from(frame: &Frame) -> Self {
        Self {
            image: frame.data.clone().into_dyn(),
            mask: frame.mask.clone().map(|m| m.into_dyn()),
            error: frame.uncertainty.clone().map(|e| e.into_dyn()),
            unit: frame.unit.clone(),
        }
    }
}
