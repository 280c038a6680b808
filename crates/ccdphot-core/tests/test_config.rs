use std::collections::BTreeMap;
use std::path::PathBuf;

use ccdphot_core::aperture::{AnnulusStatistic, ApertureGeometry, ApertureOptions, SamplingMethod};
use ccdphot_core::centroid::CentroidMethod;
use ccdphot_core::combine::CombineMethod;
use ccdphot_core::detection::DetectionConfig;
use ccdphot_core::error::CcdError;
use ccdphot_core::pipeline::{ApertureRequest, OutputConfig, PhotometryPipelineConfig, RunConfig};

#[test]
fn test_default_run_config_round_trips_through_toml() {
    let config = RunConfig {
        photometry: Some(PhotometryPipelineConfig::default()),
        ..Default::default()
    };
    let text = toml::to_string(&config).unwrap();
    let parsed: RunConfig = toml::from_str(&text).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_partial_toml_uses_defaults() {
    let text = r#"
        [input]
        directory = "raw/2024-03-01"

        [calibration.dark]
        method = "average"
        sigma_clip = false

        [calibration.calibration]
        scale_dark = true

        [photometry.detection]
        threshold = 8.0

        [photometry.refine]
        method = "2dg"

        [photometry.aperture]
        method = "circular_annulus"
        params = { r_in = 6.0, r_out = 10.0 }
        options = { sampling = "center", annulus_statistic = "mean" }
    "#;
    let config: RunConfig = toml::from_str(text).unwrap();

    assert_eq!(config.input.directory, Some(PathBuf::from("raw/2024-03-01")));
    assert!(config.input.bias.is_empty());
    assert_eq!(config.output, OutputConfig::default());
    assert_eq!(config.calibration.bias.method, CombineMethod::Median);
    assert_eq!(config.calibration.dark.method, CombineMethod::Average);
    assert!(!config.calibration.dark.sigma_clip);
    assert!(config.calibration.calibration.scale_dark);

    let photometry = config.photometry.unwrap();
    assert!(!photometry.background.subtract_median);
    assert_eq!(photometry.detection.threshold, 8.0);
    assert_eq!(photometry.detection.fwhm, DetectionConfig::default().fwhm);
    assert_eq!(photometry.refine.method, CentroidMethod::Gaussian2D);
    assert_eq!(photometry.aperture.options.sampling, SamplingMethod::Center);
    assert_eq!(photometry.aperture.options.annulus_statistic, AnnulusStatistic::Mean);
    assert_eq!(
        photometry.aperture.resolve().unwrap(),
        ApertureGeometry::CircularAnnulus { r_in: 6.0, r_out: 10.0 }
    );
}

#[test]
fn test_photometry_block_is_optional() {
    let config: RunConfig = toml::from_str("[output]\ndirectory = \"out\"\n").unwrap();
    assert!(config.photometry.is_none());
    assert_eq!(config.output.directory, PathBuf::from("out"));
    assert!(config.output.write_masters);
}

#[test]
fn test_unknown_sampling_is_rejected() {
    assert!(toml::from_str::<ApertureOptions>("sampling = \"exact\"").is_err());
}

#[test]
fn test_aperture_request_resolution() {
    assert_eq!(
        ApertureRequest::default().resolve().unwrap(),
        ApertureGeometry::Circular { r: 5.0 }
    );

    let unknown = ApertureRequest::new("triangular", BTreeMap::new()).resolve();
    assert!(matches!(unknown, Err(CcdError::UnsupportedMethod { .. })));

    let missing = ApertureRequest::new("elliptical", BTreeMap::from([("a".to_string(), 4.0)])).resolve();
    assert!(matches!(missing, Err(CcdError::InvalidAperture(_))));

    let mut request = ApertureRequest::default();
    request.options.subpixels = 0;
    assert!(matches!(request.resolve(), Err(CcdError::InvalidInput(_))));
}
