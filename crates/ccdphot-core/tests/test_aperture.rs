#[allow(dead_code)]
mod common;

use std::collections::BTreeMap;
use std::f64::consts::PI;

use approx::assert_relative_eq;

use ccdphot_core::aperture::{
    measure, AnnulusStatistic, ApertureGeometry, ApertureMethod, ApertureOptions, SamplingMethod,
};
use ccdphot_core::error::CcdError;
use ccdphot_core::frame::{Position, PositionList};
use ccdphot_core::io::{to_csv, to_json, write_table};

fn params(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|&(k, v)| (k.to_string(), v)).collect()
}

fn center_sampling() -> ApertureOptions {
    ApertureOptions {
        sampling: SamplingMethod::Center,
        ..Default::default()
    }
}

fn at(x: f64, y: f64) -> PositionList {
    PositionList::new(vec![Position::new(x, y)])
}

#[test]
fn test_circular_area_on_unit_image() {
    let frame = common::constant_frame(40, 40, 1.0);
    let geometry = ApertureGeometry::Circular { r: 5.0 };
    let result = measure(&frame, &at(20.0, 20.0), &geometry, &ApertureOptions::default()).unwrap();
    assert_relative_eq!(result.rows[0].aperture_sum, 25.0 * PI, max_relative = 0.02);
}

#[test]
fn test_center_sampling_counts_whole_pixels() {
    let frame = common::constant_frame(20, 20, 2.0);
    let geometry = ApertureGeometry::Circular { r: 1.0 };
    let result = measure(&frame, &at(10.0, 10.0), &geometry, &center_sampling()).unwrap();
    assert_relative_eq!(result.rows[0].aperture_sum, 10.0);
}

#[test]
fn test_circular_recovers_star_flux() {
    let frame = common::star_field(60, 60, 0.0, &[(30.2, 29.7, 10_000.0)], 3.0);
    let geometry = ApertureGeometry::Circular { r: 10.0 };
    let result = measure(&frame, &at(30.2, 29.7), &geometry, &ApertureOptions::default()).unwrap();
    assert_relative_eq!(result.rows[0].aperture_sum, 10_000.0, max_relative = 0.005);
    assert!(result.rows[0].annulus.is_none());
}

#[test]
fn test_annulus_subtracts_local_sky() {
    let frame = common::star_field(60, 60, 10.0, &[(30.0, 30.0, 10_000.0)], 3.0);
    let geometry = ApertureGeometry::CircularAnnulus { r_in: 8.0, r_out: 14.0 };
    let result = measure(&frame, &at(30.0, 30.0), &geometry, &ApertureOptions::default()).unwrap();

    let row = &result.rows[0];
    let annulus = row.annulus.expect("annulus columns");
    assert_relative_eq!(annulus.background_per_pixel, 10.0, epsilon = 1e-3);
    assert_relative_eq!(annulus.annulus_area, PI * (196.0 - 64.0), max_relative = 0.02);
    assert_relative_eq!(annulus.source_area, 64.0 * PI, max_relative = 0.02);
    assert_relative_eq!(annulus.sky_subtracted_sum, 10_000.0, max_relative = 0.01);
    assert_relative_eq!(row.aperture_sum, 10.0 * annulus.annulus_area, max_relative = 1e-3);
}

#[test]
fn test_annulus_median_ignores_hot_pixel() {
    let mut frame = common::constant_frame(40, 40, 10.0);
    frame.data[[20, 31]] = 1000.0;
    let geometry = ApertureGeometry::CircularAnnulus { r_in: 6.0, r_out: 12.0 };

    let median = measure(&frame, &at(20.0, 20.0), &geometry, &ApertureOptions::default()).unwrap();
    assert_relative_eq!(median.rows[0].annulus.unwrap().background_per_pixel, 10.0);

    let options = ApertureOptions {
        annulus_statistic: AnnulusStatistic::Mean,
        ..Default::default()
    };
    let mean = measure(&frame, &at(20.0, 20.0), &geometry, &options).unwrap();
    assert!(mean.rows[0].annulus.unwrap().background_per_pixel > 10.5);
}

#[test]
fn test_elliptical_area() {
    let frame = common::constant_frame(40, 40, 1.0);
    let geometry = ApertureGeometry::Elliptical {
        a: 6.0,
        b: 3.0,
        theta: 0.5,
    };
    let result = measure(&frame, &at(20.0, 20.0), &geometry, &ApertureOptions::default()).unwrap();
    assert_relative_eq!(result.rows[0].aperture_sum, 18.0 * PI, max_relative = 0.03);
}

#[test]
fn test_elliptical_orientation() {
    // Long axis along +y once rotated by 90 degrees.
    let geometry = ApertureGeometry::Elliptical {
        a: 5.0,
        b: 1.0,
        theta: PI / 2.0,
    };
    assert!(geometry.contains(0.0, 4.5));
    assert!(!geometry.contains(4.5, 0.0));
}

#[test]
fn test_elliptical_annulus_default_inner_minor_axis() {
    let geometry = ApertureGeometry::from_params(
        ApertureMethod::EllipticalAnnulus,
        &params(&[("a_in", 4.0), ("a_out", 8.0), ("b_out", 6.0), ("theta", 0.0)]),
    )
    .unwrap();
    assert_eq!(
        geometry,
        ApertureGeometry::EllipticalAnnulus {
            a_in: 4.0,
            a_out: 8.0,
            b_in: 3.0,
            b_out: 6.0,
            theta: 0.0,
        }
    );
    assert_relative_eq!(geometry.area(), PI * (48.0 - 12.0));
}

#[test]
fn test_from_params_rejects_missing_or_bad_values() {
    let missing = ApertureGeometry::from_params(ApertureMethod::Circular, &params(&[("radius", 3.0)]));
    assert!(matches!(missing, Err(CcdError::InvalidAperture(_))));

    let negative = ApertureGeometry::from_params(ApertureMethod::Circular, &params(&[("r", -1.0)]));
    assert!(matches!(negative, Err(CcdError::InvalidAperture(_))));

    let inverted = ApertureGeometry::from_params(
        ApertureMethod::CircularAnnulus,
        &params(&[("r_in", 6.0), ("r_out", 4.0)]),
    );
    assert!(matches!(inverted, Err(CcdError::InvalidAperture(_))));
}

#[test]
fn test_method_names() {
    assert_eq!("circular".parse::<ApertureMethod>().unwrap(), ApertureMethod::Circular);
    assert_eq!(
        "Circular-Annulus".parse::<ApertureMethod>().unwrap(),
        ApertureMethod::CircularAnnulus
    );
    assert!(matches!(
        "triangular".parse::<ApertureMethod>(),
        Err(CcdError::UnsupportedMethod { .. })
    ));
    assert!(matches!(
        "exact".parse::<SamplingMethod>(),
        Err(CcdError::UnsupportedMethod { .. })
    ));
    for method in ApertureMethod::ALL {
        assert_eq!(method.to_string().parse::<ApertureMethod>().unwrap(), method);
    }
}

#[test]
fn test_masked_and_nan_pixels_are_skipped() {
    let mut frame = common::constant_frame(20, 20, 1.0);
    frame.data[[10, 11]] = f32::NAN;
    let mut mask = ndarray::Array2::from_elem((20, 20), false);
    mask[[10, 10]] = true;
    let frame = frame.with_mask(mask).unwrap();

    let geometry = ApertureGeometry::Circular { r: 1.0 };
    let result = measure(&frame, &at(10.0, 10.0), &geometry, &center_sampling()).unwrap();
    assert_relative_eq!(result.rows[0].aperture_sum, 3.0);
}

#[test]
fn test_uncertainty_adds_error_column() {
    let frame = common::constant_frame(20, 20, 1.0)
        .with_uncertainty(common::constant(20, 20, 2.0))
        .unwrap();
    let geometry = ApertureGeometry::Circular { r: 1.0 };
    let result = measure(&frame, &at(10.0, 10.0), &geometry, &center_sampling()).unwrap();

    assert_relative_eq!(result.rows[0].aperture_sum_err.unwrap(), 20f64.sqrt());
    assert!(result.column_names().contains(&"aperture_sum_err"));
}

#[test]
fn test_rows_follow_input_order() {
    let frame = common::star_field(50, 50, 0.0, &[(10.0, 10.0, 1000.0), (40.0, 35.0, 3000.0)], 3.0);
    let positions = PositionList::from_columns(&[40.0, 10.0], &[35.0, 10.0]).unwrap();
    let geometry = ApertureGeometry::Circular { r: 6.0 };
    let result = measure(&frame, &positions, &geometry, &ApertureOptions::default()).unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result.column("id").unwrap(), vec![1.0, 2.0]);
    assert_eq!(result.column("xcenter").unwrap(), vec![40.0, 10.0]);
    assert!(result.rows[0].aperture_sum > result.rows[1].aperture_sum);
    assert_eq!(result.positions(), positions);
}

#[test]
fn test_empty_or_invalid_positions() {
    let frame = common::constant_frame(20, 20, 1.0);
    let geometry = ApertureGeometry::Circular { r: 2.0 };
    let options = ApertureOptions::default();

    let empty = measure(&frame, &PositionList::default(), &geometry, &options);
    assert!(matches!(empty, Err(CcdError::InvalidPositions(_))));

    let nan = measure(&frame, &at(f64::NAN, 3.0), &geometry, &options);
    assert!(matches!(nan, Err(CcdError::InvalidPositions(_))));
}

#[test]
fn test_column_order() {
    let frame = common::constant_frame(30, 30, 1.0);
    let bare = measure(
        &frame,
        &at(15.0, 15.0),
        &ApertureGeometry::Circular { r: 3.0 },
        &ApertureOptions::default(),
    )
    .unwrap();
    assert_eq!(bare.column_names(), vec!["id", "xcenter", "ycenter", "aperture_sum"]);

    let ring = measure(
        &frame,
        &at(15.0, 15.0),
        &ApertureGeometry::CircularAnnulus { r_in: 3.0, r_out: 6.0 },
        &ApertureOptions::default(),
    )
    .unwrap();
    assert_eq!(
        ring.column_names(),
        vec![
            "id",
            "xcenter",
            "ycenter",
            "aperture_sum",
            "annulus_area",
            "background_per_pixel",
            "source_sum",
            "source_area",
            "sky_subtracted_sum",
        ]
    );
    assert!(ring.column("no_such_column").is_none());
}

#[test]
fn test_table_encodings() {
    let frame = common::constant_frame(30, 30, 1.0);
    let positions = PositionList::from_columns(&[10.0, 20.0], &[10.0, 20.0]).unwrap();
    let result = measure(
        &frame,
        &positions,
        &ApertureGeometry::Circular { r: 2.0 },
        &center_sampling(),
    )
    .unwrap();

    let csv = to_csv(&result);
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "id,xcenter,ycenter,aperture_sum");
    assert!(lines[1].starts_with("1,10,10,"));

    let json: serde_json::Value = serde_json::from_str(&to_json(&result).unwrap()).unwrap();
    assert_eq!(json["id"], serde_json::json!([1, 2]));
    assert_eq!(json["xcenter"], serde_json::json!([10.0, 20.0]));
    assert_eq!(json["aperture_sum"].as_array().unwrap().len(), 2);
}

#[test]
fn test_write_table_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let frame = common::constant_frame(20, 20, 1.0);
    let result = measure(
        &frame,
        &at(10.0, 10.0),
        &ApertureGeometry::Circular { r: 2.0 },
        &ApertureOptions::default(),
    )
    .unwrap();

    let csv_path = dir.path().join("phot.csv");
    write_table(&result, &csv_path).unwrap();
    let body = std::fs::read_to_string(&csv_path).unwrap();
    assert!(body.starts_with("id,xcenter"));

    let bad = write_table(&result, &dir.path().join("phot.txt"));
    assert!(matches!(bad, Err(CcdError::UnsupportedMethod { .. })));
}
