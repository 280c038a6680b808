use std::path::PathBuf;

use anyhow::{Context, Result};
use ccdphot_core::io::FitsReader;
use clap::Args;

#[derive(Args)]
pub struct InfoArgs {
    /// Input FITS file
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let reader = FitsReader::open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;
    let (height, width) = reader.shape();
    let meta = reader.header.exposure_metadata();
    let provenance = reader.header.provenance();

    println!("File:        {}", args.file.display());
    println!("Dimensions:  {}x{}", width, height);
    if let Some(bitpix) = reader.header.get_i64("BITPIX") {
        println!("BITPIX:      {}", bitpix);
    }
    println!("Unit:        {}", reader.header.unit());

    if let Some(ref t) = meta.image_type {
        println!("Image type:  {}", t);
    }
    if let Some(exp) = meta.exposure_time {
        println!("Exposure:    {} s", exp);
    }
    if let Some(ref filter) = meta.filter {
        println!("Filter:      {}", filter);
    }
    if let Some(ref date) = meta.date_obs {
        println!("Date:        {}", date);
    }
    if let Some(ref object) = meta.object {
        println!("Object:      {}", object);
    }
    if let Some(ref tel) = meta.telescope {
        println!("Telescope:   {}", tel);
    }
    if let Some(ref inst) = meta.instrument {
        println!("Instrument:  {}", inst);
    }
    if let Some(gain) = meta.gain {
        println!("Gain:        {}", gain);
    }
    if let Some(rn) = meta.read_noise {
        println!("Read noise:  {}", rn);
    }
    if provenance.is_master {
        let kind = provenance
            .master_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unknown".into());
        println!("Master:      {} ({} frames)", kind, provenance.n_combined);
        if let Some(method) = provenance.combine_method {
            println!("Combined:    {}", method);
        }
    }
    if provenance.is_calibrated {
        println!("Calibrated:  yes");
    }

    Ok(())
}
