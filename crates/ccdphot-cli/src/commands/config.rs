use std::path::PathBuf;

use anyhow::{Context, Result};
use ccdphot_core::pipeline::{InputConfig, PhotometryPipelineConfig, RunConfig};
use clap::Args;

#[derive(Args)]
pub struct ConfigArgs {
    /// Raw-frame directory scanned by the generated config
    #[arg(long, default_value = "raw")]
    pub directory: PathBuf,

    /// Leave the photometry block out (calibration only)
    #[arg(long)]
    pub no_photometry: bool,

    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Emit a default RunConfig as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let config = RunConfig {
        input: InputConfig {
            directory: Some(args.directory.clone()),
            ..Default::default()
        },
        photometry: (!args.no_photometry).then(PhotometryPipelineConfig::default),
        ..Default::default()
    };
    let text = toml::to_string_pretty(&config).context("Failed to encode run config")?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &text).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Run config written to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
