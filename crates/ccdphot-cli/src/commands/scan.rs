use std::path::PathBuf;

use anyhow::{Context, Result};
use ccdphot_core::io::ImageCollection;
use clap::Args;

use crate::summary::print_collection_summary;

#[derive(Args)]
pub struct ScanArgs {
    /// Directory of FITS files
    pub dir: PathBuf,

    /// List every file, not just the counts
    #[arg(short, long)]
    pub list: bool,
}

pub fn run(args: &ScanArgs) -> Result<()> {
    let collection = ImageCollection::scan(&args.dir)
        .with_context(|| format!("Failed to scan {}", args.dir.display()))?;
    print_collection_summary(&args.dir, &collection, args.list);
    Ok(())
}
