use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::fits::{read_fits, FitsReader};
use crate::error::Result;
use crate::frame::{ExposureMetadata, FrameSet, FrameType};

const FITS_EXTENSIONS: [&str; 3] = ["fits", "fit", "fts"];

/// One FITS file found by [`ImageCollection::scan`].
#[derive(Clone, Debug)]
pub struct CollectionEntry {
    pub path: PathBuf,
    /// Classification from IMAGETYP; `None` when missing or unrecognised.
    pub frame_type: Option<FrameType>,
    /// `(height, width)`
    pub shape: (usize, usize),
    pub metadata: ExposureMetadata,
}

/// FITS files of a directory, classified by frame type.
#[derive(Clone, Debug, Default)]
pub struct ImageCollection {
    pub entries: Vec<CollectionEntry>,
}

impl ImageCollection {
    /// Read the primary header of every FITS file directly inside `dir`.
    ///
    /// Files that cannot be parsed are logged and skipped. Entries are
    /// sorted by path.
    pub fn scan(dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_fits_path(p))
            .collect();
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            match FitsReader::open(&path) {
                Ok(reader) => {
                    let metadata = reader.header.exposure_metadata();
                    let frame_type = metadata
                        .image_type
                        .as_deref()
                        .and_then(|t| t.parse::<FrameType>().ok());
                    entries.push(CollectionEntry {
                        shape: reader.shape(),
                        path,
                        frame_type,
                        metadata,
                    });
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable FITS file"),
            }
        }
        debug!(dir = %dir.display(), n_files = entries.len(), "Scanned image collection");
        Ok(Self { entries })
    }

    pub fn of_type(&self, frame_type: FrameType) -> impl Iterator<Item = &CollectionEntry> {
        self.entries
            .iter()
            .filter(move |e| e.frame_type == Some(frame_type))
    }

    /// Number of files per frame type; unclassified files are not counted.
    pub fn summary(&self) -> BTreeMap<FrameType, usize> {
        let mut counts = BTreeMap::new();
        for t in self.entries.iter().filter_map(|e| e.frame_type) {
            *counts.entry(t).or_insert(0) += 1;
        }
        counts
    }

    pub fn unclassified(&self) -> impl Iterator<Item = &CollectionEntry> {
        self.entries.iter().filter(|e| e.frame_type.is_none())
    }

    /// Load every frame of one type. The set is empty when none match.
    pub fn load_frame_set(&self, frame_type: FrameType) -> Result<FrameSet> {
        let paths: Vec<&Path> = self.of_type(frame_type).map(|e| e.path.as_path()).collect();
        load_frame_set(frame_type, &paths)
    }
}

/// Load the given files as one frame set.
pub fn load_frame_set<P: AsRef<Path>>(frame_type: FrameType, paths: &[P]) -> Result<FrameSet> {
    let frames = paths
        .iter()
        .map(|p| read_fits(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(FrameSet::new(frame_type, frames))
}

fn is_fits_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| FITS_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}
