use std::path::PathBuf;

use anyhow::{Context, Result};
use ccdphot_core::pipeline::{run_reduction, RunConfig};
use clap::Args;
use tracing::debug;

use crate::progress::BarReporter;
use crate::summary::{print_reduction_summary, print_run_summary};

#[derive(Args)]
pub struct RunArgs {
    /// Run config file (TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override the output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the list of written products as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let contents = std::fs::read_to_string(&args.config)
        .with_context(|| format!("Failed to read config {}", args.config.display()))?;
    let mut config: RunConfig = toml::from_str(&contents).context("Invalid run config")?;
    if let Some(ref out) = args.output {
        config.output.directory = out.clone();
    }
    debug!(config = %args.config.display(), output = %config.output.directory.display(), "Loaded run config");

    if !args.json {
        print_run_summary(&config);
    }

    let reporter = BarReporter::new();
    let result = run_reduction(&config, &reporter);
    reporter.finish();
    let summary = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_reduction_summary(&summary);
    }
    Ok(())
}
