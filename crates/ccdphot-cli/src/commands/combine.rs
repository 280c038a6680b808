use std::path::PathBuf;

use anyhow::{Context, Result};
use ccdphot_core::combine::{combine, CombineConfig, CombineMethod};
use ccdphot_core::frame::FrameType;
use ccdphot_core::io::{load_frame_set, write_fits};
use clap::{Args, ValueEnum};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FrameTypeArg {
    Bias,
    Dark,
    Flat,
}

impl From<FrameTypeArg> for FrameType {
    fn from(arg: FrameTypeArg) -> Self {
        match arg {
            FrameTypeArg::Bias => FrameType::Bias,
            FrameTypeArg::Dark => FrameType::Dark,
            FrameTypeArg::Flat => FrameType::Flat,
        }
    }
}

#[derive(Args)]
pub struct CombineArgs {
    /// Raw frames to combine
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Frame type of the inputs
    #[arg(long = "type", value_enum, default_value = "bias")]
    pub frame_type: FrameTypeArg,

    /// Combination method (median, average, sum)
    #[arg(long, default_value = "median")]
    pub method: String,

    /// Disable sigma clipping before combination
    #[arg(long)]
    pub no_sigma_clip: bool,

    /// Output FITS file
    #[arg(short, long, default_value = "master.fits")]
    pub output: PathBuf,
}

/// Plain combination of the inputs; use `calibrate` for masters that need
/// bias or dark subtraction first.
pub fn run(args: &CombineArgs) -> Result<()> {
    let method: CombineMethod = args.method.parse()?;
    let config = CombineConfig::new(method, !args.no_sigma_clip);
    let frame_type = FrameType::from(args.frame_type);

    let frames = load_frame_set(frame_type, &args.files).context("Failed to load input frames")?;
    println!("Combining {} {} frames ({})", frames.len(), frame_type, method);

    let master = combine(&frames, &config)?;
    write_fits(&args.output, master.frame())
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    let (h, w) = master.shape();
    println!("Master {} ({}x{}) saved to {}", frame_type, w, h, args.output.display());
    Ok(())
}
