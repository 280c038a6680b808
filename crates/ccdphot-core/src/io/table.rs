use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::aperture::PhotometryResult;
use crate::error::{CcdError, Result};

/// Table encodings supported by [`write_table`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableFormat {
    Json,
    Csv,
}

impl TableFormat {
    /// Pick the format from a file extension (`.json` or `.csv`).
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_extension(path.extension().and_then(|e| e.to_str()).unwrap_or(""))
    }

    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(CcdError::UnsupportedMethod {
                kind: "table format",
                name: ext.to_string(),
            }),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

/// Column name to values, column order preserved.
pub fn to_json(result: &PhotometryResult) -> Result<String> {
    serde_json::to_string_pretty(result).map_err(|e| CcdError::InvalidInput(e.to_string()))
}

/// Header line of column names, then one line per source.
pub fn to_csv(result: &PhotometryResult) -> String {
    let names = result.column_names();
    let columns: Vec<Vec<f64>> = names
        .iter()
        .map(|n| result.column(n).unwrap_or_default())
        .collect();

    let mut out = names.join(",");
    out.push('\n');
    for row in 0..result.len() {
        let line: Vec<String> = names
            .iter()
            .zip(&columns)
            .map(|(name, col)| {
                let v = col.get(row).copied().unwrap_or(f64::NAN);
                if *name == "id" {
                    format!("{}", v as usize)
                } else {
                    format!("{v}")
                }
            })
            .collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

/// Write a photometry table, choosing the encoding from the extension.
pub fn write_table(result: &PhotometryResult, path: &Path) -> Result<()> {
    let body = match TableFormat::from_path(path)? {
        TableFormat::Json => to_json(result)?,
        TableFormat::Csv => to_csv(result),
    };
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(body.as_bytes())?;
    out.flush()?;
    Ok(())
}
