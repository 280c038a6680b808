use std::path::PathBuf;

use anyhow::Result;
use ccdphot_core::combine::CombineMethod;
use ccdphot_core::pipeline::{run_reduction, InputConfig, OutputConfig, RunConfig};
use clap::Args;

use crate::progress::BarReporter;
use crate::summary::print_reduction_summary;

#[derive(Args)]
pub struct CalibrateArgs {
    /// Raw science frames
    #[arg(long, num_args = 1..)]
    pub science: Vec<PathBuf>,

    /// Raw bias frames
    #[arg(long, num_args = 1.., required = true)]
    pub bias: Vec<PathBuf>,

    /// Raw dark frames
    #[arg(long, num_args = 1..)]
    pub dark: Vec<PathBuf>,

    /// Raw flat frames
    #[arg(long, num_args = 1..)]
    pub flat: Vec<PathBuf>,

    /// Combination method for every master (median, average, sum)
    #[arg(long, default_value = "median")]
    pub method: String,

    /// Disable sigma clipping during combination
    #[arg(long)]
    pub no_sigma_clip: bool,

    /// Scale the master dark by the ratio of exposure times
    #[arg(long)]
    pub scale_dark: bool,

    /// Replace master-flat values below this before normalising
    #[arg(long)]
    pub flat_min: Option<f32>,

    /// Output directory
    #[arg(short, long, default_value = "reduced")]
    pub output: PathBuf,
}

pub fn run(args: &CalibrateArgs) -> Result<()> {
    let config = build_config_from_args(args)?;

    let reporter = BarReporter::new();
    let result = run_reduction(&config, &reporter);
    reporter.finish();

    print_reduction_summary(&result?);
    Ok(())
}

fn build_config_from_args(args: &CalibrateArgs) -> Result<RunConfig> {
    let method: CombineMethod = args.method.parse()?;
    let mut config = RunConfig {
        input: InputConfig {
            bias: args.bias.clone(),
            darks: args.dark.clone(),
            flats: args.flat.clone(),
            science: args.science.clone(),
            ..Default::default()
        },
        output: OutputConfig {
            directory: args.output.clone(),
            ..Default::default()
        },
        ..Default::default()
    };
    for combine in [
        &mut config.calibration.bias,
        &mut config.calibration.dark,
        &mut config.calibration.flat,
    ] {
        combine.method = method;
        combine.sigma_clip = !args.no_sigma_clip;
    }
    config.calibration.calibration.scale_dark = args.scale_dark;
    config.calibration.calibration.flat_min_value = args.flat_min;
    Ok(config)
}
