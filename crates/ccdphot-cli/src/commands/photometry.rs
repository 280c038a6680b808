use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use ccdphot_core::aperture::SamplingMethod;
use ccdphot_core::centroid::CentroidMethod;
use ccdphot_core::io::{read_fits, write_table};
use ccdphot_core::pipeline::{
    run_photometry_pipeline, ApertureRequest, PhotometryOutcome, PhotometryPipelineConfig, PhotometryRequest,
};
use clap::Args;
use tracing::debug;

use crate::progress::BarReporter;
use crate::summary::print_photometry_table;

#[derive(Args)]
pub struct PhotometryArgs {
    /// Input FITS image
    pub file: PathBuf,

    /// Background image subtracted before detection
    #[arg(long)]
    pub background: Option<PathBuf>,

    /// Subtract the sigma-clipped median before detection
    #[arg(long)]
    pub median_background: bool,

    /// Aperture geometry (circular, circular_annulus, elliptical, elliptical_annulus)
    #[arg(long, default_value = "circular")]
    pub method: String,

    /// Aperture parameter as key=value (repeatable), e.g. r=5
    #[arg(long = "param", value_parser = parse_key_val)]
    pub params: Vec<(String, f64)>,

    /// Detection threshold in units of the background standard deviation
    #[arg(long, default_value = "3.0")]
    pub threshold: f64,

    /// Expected stellar FWHM in pixels
    #[arg(long, default_value = "3.0")]
    pub fwhm: f64,

    /// Centroid estimator (com, quadratic, 1dg, 2dg)
    #[arg(long, default_value = "com")]
    pub centroid: String,

    /// Pixel sampling (center, subpixel)
    #[arg(long, default_value = "subpixel")]
    pub sampling: String,

    /// Output table (.json or .csv)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, f64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for {key}: {e}"))?;
    Ok((key.trim().to_string(), value))
}

pub fn run(args: &PhotometryArgs) -> Result<()> {
    let config = build_config_from_args(args)?;
    debug!(method = %config.aperture.method, params = ?config.aperture.params, "Aperture request");
    config
        .aperture
        .resolve()
        .with_context(|| format!("Invalid {} aperture", config.aperture.method))?;
    let image = read_fits(&args.file).with_context(|| format!("Failed to read {}", args.file.display()))?;

    let mut request = PhotometryRequest::new(image, config);
    if let Some(ref path) = args.background {
        let bg = read_fits(path).with_context(|| format!("Failed to read {}", path.display()))?;
        request = request.with_background(bg);
    }

    let reporter = BarReporter::new();
    let outcome = run_photometry_pipeline(&request, &reporter);
    reporter.finish();

    match outcome? {
        PhotometryOutcome::Measured { table, .. } => {
            print_photometry_table(&table);
            if let Some(ref out) = args.output {
                write_table(&table, out).with_context(|| format!("Failed to write {}", out.display()))?;
                println!("\nTable saved to {}", out.display());
            }
        }
        PhotometryOutcome::NoSourcesDetected { background } => {
            println!(
                "No sources detected (background median {:.3}, std {:.3})",
                background.median, background.std
            );
        }
    }
    Ok(())
}

fn build_config_from_args(args: &PhotometryArgs) -> Result<PhotometryPipelineConfig> {
    let mut params: BTreeMap<String, f64> = args.params.iter().cloned().collect();
    if params.is_empty() && args.method == "circular" {
        params.insert("r".into(), 2.0 * args.fwhm);
    }

    let mut config = PhotometryPipelineConfig::default();
    config.background.subtract_median = args.median_background;
    config.detection.threshold = args.threshold;
    config.detection.fwhm = args.fwhm;
    config.refine.method = args.centroid.parse::<CentroidMethod>()?;

    let mut aperture = ApertureRequest::new(args.method.clone(), params);
    aperture.options.sampling = args.sampling.parse::<SamplingMethod>()?;
    config.aperture = aperture;
    Ok(config)
}
