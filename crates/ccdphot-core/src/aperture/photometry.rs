use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::info;

use super::geometry::ApertureGeometry;
use super::sampling::{pixel_weight, AnnulusStatistic, ApertureOptions};
use crate::background::sigma_clipped_stats;
use crate::combine::sigma_clip::median_in_place;
use crate::consts::{DEFAULT_BACKGROUND_MAX_ITERS, DEFAULT_BACKGROUND_SIGMA};
use crate::error::{CcdError, Result};
use crate::frame::{Frame, Position, PositionList};

/// Background estimate and sky-subtracted flux from an annulus.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnulusMeasurement {
    /// Effective (unmasked, in-image) ring area in square pixels.
    pub annulus_area: f64,
    pub background_per_pixel: f64,
    /// Sum over the region inside the inner edge.
    pub source_sum: f64,
    pub source_area: f64,
    pub sky_subtracted_sum: f64,
}

/// One row of a photometry table.
#[derive(Clone, Debug, PartialEq)]
pub struct PhotometryRow {
    /// 1-based, in input order.
    pub id: usize,
    pub xcenter: f64,
    pub ycenter: f64,
    /// Sum over the footprint (the ring, for annuli).
    pub aperture_sum: f64,
    /// Present when the frame carries an uncertainty map.
    pub aperture_sum_err: Option<f64>,
    /// Present for annulus shapes only.
    pub annulus: Option<AnnulusMeasurement>,
}

/// Column-oriented photometry table, one row per input position.
#[derive(Clone, Debug, PartialEq)]
pub struct PhotometryResult {
    pub geometry: ApertureGeometry,
    pub rows: Vec<PhotometryRow>,
}

const BASE_COLUMNS: [&str; 4] = ["id", "xcenter", "ycenter", "aperture_sum"];
const ANNULUS_COLUMNS: [&str; 5] = [
    "annulus_area",
    "background_per_pixel",
    "source_sum",
    "source_area",
    "sky_subtracted_sum",
];

impl PhotometryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn has_errors(&self) -> bool {
        self.rows.iter().any(|r| r.aperture_sum_err.is_some())
    }

    /// Column names in table order.
    pub fn column_names(&self) -> Vec<&'static str> {
        let mut names = BASE_COLUMNS.to_vec();
        if self.has_errors() {
            names.push("aperture_sum_err");
        }
        if self.geometry.is_annulus() {
            names.extend(ANNULUS_COLUMNS);
        }
        names
    }

    /// Values of one column, or `None` for an unknown name.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let pick = |f: &dyn Fn(&PhotometryRow) -> Option<f64>| -> Option<Vec<f64>> {
            self.rows.iter().map(f).collect()
        };
        match name {
            "id" => Some(self.rows.iter().map(|r| r.id as f64).collect()),
            "xcenter" => pick(&|r| Some(r.xcenter)),
            "ycenter" => pick(&|r| Some(r.ycenter)),
            "aperture_sum" => pick(&|r| Some(r.aperture_sum)),
            "aperture_sum_err" => pick(&|r| r.aperture_sum_err),
            "annulus_area" => pick(&|r| r.annulus.map(|a| a.annulus_area)),
            "background_per_pixel" => pick(&|r| r.annulus.map(|a| a.background_per_pixel)),
            "source_sum" => pick(&|r| r.annulus.map(|a| a.source_sum)),
            "source_area" => pick(&|r| r.annulus.map(|a| a.source_area)),
            "sky_subtracted_sum" => pick(&|r| r.annulus.map(|a| a.sky_subtracted_sum)),
            _ => None,
        }
    }

    pub fn positions(&self) -> PositionList {
        self.rows.iter().map(|r| Position::new(r.xcenter, r.ycenter)).collect()
    }
}

impl Serialize for PhotometryResult {
    /// Serialises as an ordered map of column name to values.
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let names = self.column_names();
        let mut map = serializer.serialize_map(Some(names.len()))?;
        for name in names {
            if name == "id" {
                let ids: Vec<usize> = self.rows.iter().map(|r| r.id).collect();
                map.serialize_entry(name, &ids)?;
            } else {
                map.serialize_entry(name, &self.column(name).unwrap_or_default())?;
            }
        }
        map.end()
    }
}

/// Sum pixel values inside `geometry` at every position.
///
/// Masked and non-finite pixels are left out; partial pixels count by their
/// sampled overlap. Annulus shapes also report a local background from the
/// ring and the sky-subtracted sum of the enclosed region. Bare shapes report
/// raw sums only.
pub fn measure(
    frame: &Frame,
    positions: &PositionList,
    geometry: &ApertureGeometry,
    options: &ApertureOptions,
) -> Result<PhotometryResult> {
    geometry.validate()?;
    options.validate()?;
    positions.validate()?;
    if positions.is_empty() {
        return Err(CcdError::InvalidPositions("no positions to measure".into()));
    }

    let rows = positions
        .iter()
        .enumerate()
        .map(|(i, p)| measure_one(frame, i + 1, p, geometry, options))
        .collect::<Result<Vec<_>>>()?;

    info!(
        n_sources = rows.len(),
        geometry = %geometry.method(),
        "Measured aperture photometry"
    );
    Ok(PhotometryResult {
        geometry: *geometry,
        rows,
    })
}

struct Footprint {
    sum: f64,
    var: f64,
    area: f64,
    /// `(value, weight)` of every contributing pixel.
    pixels: Vec<(f64, f64)>,
}

fn integrate(frame: &Frame, p: &Position, geometry: &ApertureGeometry, options: &ApertureOptions) -> Footprint {
    let (h, w) = frame.shape();
    let reach = geometry.extent() + 1.0;
    let r0 = (p.y - reach).floor().max(0.0) as usize;
    let c0 = (p.x - reach).floor().max(0.0) as usize;
    let r1 = ((p.y + reach).ceil() + 1.0).clamp(0.0, h as f64) as usize;
    let c1 = ((p.x + reach).ceil() + 1.0).clamp(0.0, w as f64) as usize;

    let mut fp = Footprint {
        sum: 0.0,
        var: 0.0,
        area: 0.0,
        pixels: Vec::new(),
    };
    for row in r0..r1 {
        for col in c0..c1 {
            let v = frame.data[[row, col]] as f64;
            if frame.is_masked(row, col) || !v.is_finite() {
                continue;
            }
            let weight = pixel_weight(geometry, col as f64 - p.x, row as f64 - p.y, options);
            if weight <= 0.0 {
                continue;
            }
            fp.sum += weight * v;
            fp.area += weight;
            if let Some(err) = &frame.uncertainty {
                let e = err[[row, col]] as f64;
                fp.var += weight * e * e;
            }
            fp.pixels.push((v, weight));
        }
    }
    fp
}

fn measure_one(
    frame: &Frame,
    id: usize,
    p: &Position,
    geometry: &ApertureGeometry,
    options: &ApertureOptions,
) -> Result<PhotometryRow> {
    let fp = integrate(frame, p, geometry, options);
    let aperture_sum_err = frame.uncertainty.as_ref().map(|_| fp.var.sqrt());

    let annulus = match geometry.inner() {
        None => None,
        Some(inner) => {
            let background = ring_background(&fp, options.annulus_statistic)?;
            let source = integrate(frame, p, &inner, options);
            Some(AnnulusMeasurement {
                annulus_area: fp.area,
                background_per_pixel: background,
                source_sum: source.sum,
                source_area: source.area,
                sky_subtracted_sum: source.sum - background * source.area,
            })
        }
    };

    Ok(PhotometryRow {
        id,
        xcenter: p.x,
        ycenter: p.y,
        aperture_sum: fp.sum,
        aperture_sum_err,
        annulus,
    })
}

/// Per-pixel sky level from the ring; zero when no ring pixel is usable.
fn ring_background(ring: &Footprint, statistic: AnnulusStatistic) -> Result<f64> {
    if ring.pixels.is_empty() || ring.area <= 0.0 {
        return Ok(0.0);
    }
    let value = match statistic {
        AnnulusStatistic::Mean => ring.sum / ring.area,
        AnnulusStatistic::Median => {
            let mut values: Vec<f32> = ring.pixels.iter().map(|&(v, _)| v as f32).collect();
            median_in_place(&mut values) as f64
        }
        AnnulusStatistic::SigmaClippedMedian => {
            let values: Vec<f32> = ring.pixels.iter().map(|&(v, _)| v as f32).collect();
            let n = values.len();
            let data = ndarray::Array2::from_shape_vec((1, n), values)
                .map_err(|e| CcdError::InvalidInput(e.to_string()))?;
            sigma_clipped_stats(&data, None, DEFAULT_BACKGROUND_SIGMA, DEFAULT_BACKGROUND_MAX_ITERS)?.median as f64
        }
    };
    Ok(value)
}
