use std::path::Path;

use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use ndarray::Array2;
use tracing::debug;

use crate::consts::{DEFAULT_UNIT, FITS_MAX_STRING_LEN};
use crate::error::{CcdError, Result};
use crate::frame::{ExposureMetadata, Frame, FrameType, Provenance};

/// Keywords read from the primary header, by value type.
const FLOAT_KEYS: [&str; 6] = ["EXPTIME", "EXPOSURE", "GAIN", "RDNOISE", "BZERO", "BSCALE"];
const INTEGER_KEYS: [&str; 1] = ["NCOMBINE"];
const LOGICAL_KEYS: [&str; 1] = ["CALIBRAT"];
const TEXT_KEYS: [&str; 9] = [
    "BUNIT", "FILTER", "DATE-OBS", "INSTRUME", "TELESCOP", "OBJECT", "IMAGETYP", "CALTYPE", "CMBMETH",
];

/// Value of a header card.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
    Logical(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl HeaderValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Logical(b) => Some(*b),
            _ => None,
        }
    }
}

/// Curated keyword/value cards of a primary header.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<(String, HeaderValue)>,
}

impl FitsHeader {
    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.cards.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(HeaderValue::as_i64)
    }

    /// Text value, trimmed; empty strings count as missing.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(HeaderValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(HeaderValue::as_bool)
    }

    pub fn insert(&mut self, key: &str, value: HeaderValue) {
        match self.cards.iter_mut().find(|(k, _)| k == key) {
            Some(card) => card.1 = value,
            None => self.cards.push((key.to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Curated exposure metadata.
    pub fn exposure_metadata(&self) -> ExposureMetadata {
        let text = |key: &str| self.get_str(key).map(str::to_string);
        ExposureMetadata {
            exposure_time: self.get_f64("EXPTIME").or_else(|| self.get_f64("EXPOSURE")),
            filter: text("FILTER"),
            date_obs: text("DATE-OBS"),
            instrument: text("INSTRUME"),
            telescope: text("TELESCOP"),
            object: text("OBJECT"),
            gain: self.get_f64("GAIN"),
            read_noise: self.get_f64("RDNOISE"),
            image_type: text("IMAGETYP"),
        }
    }

    /// Physical unit from BUNIT, lower-cased, defaulting to ADU.
    pub fn unit(&self) -> String {
        self.get_str("BUNIT")
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| DEFAULT_UNIT.to_string())
    }

    /// Provenance cards written by [`write_fits`].
    pub fn provenance(&self) -> Provenance {
        let master_type = self.get_str("CALTYPE").and_then(|s| s.parse::<FrameType>().ok());
        Provenance {
            is_master: master_type.is_some(),
            master_type,
            combine_method: self.get_str("CMBMETH").and_then(|s| s.parse().ok()),
            n_combined: self.get_i64("NCOMBINE").map_or(0, |n| n.max(0) as usize),
            is_calibrated: self.get_bool("CALIBRAT").unwrap_or(false),
        }
    }
}

/// Reader for the primary image HDU of a FITS file.
pub struct FitsReader {
    fptr: FitsFile,
    hdu: FitsHdu,
    pub header: FitsHeader,
    height: usize,
    width: usize,
}

impl FitsReader {
    /// Open a file and read its primary header.
    pub fn open(path: &Path) -> Result<Self> {
        let file_len = std::fs::metadata(path)?.len();
        let mut fptr = FitsFile::open(path).map_err(invalid_fits)?;
        let hdu = fptr.primary_hdu().map_err(invalid_fits)?;

        let (shape, bitpix) = match &hdu.info {
            HduInfo::ImageInfo { shape, image_type } => (shape.clone(), bitpix(image_type)),
            _ => return Err(CcdError::InvalidFits("primary HDU is not an image".into())),
        };
        if shape.len() != 2 {
            return Err(CcdError::InvalidImage(format!(
                "primary HDU must be 2-dimensional, got NAXIS = {}",
                shape.len()
            )));
        }
        // fitsio reports axes slowest first: [NAXIS2, NAXIS1].
        let (height, width) = (shape[0], shape[1]);
        if height == 0 || width == 0 {
            return Err(CcdError::InvalidFits(format!("empty image axis in {height}x{width} HDU")));
        }

        // Bound the pixel buffer by the file size before anything is allocated.
        let data_len = height
            .checked_mul(width)
            .and_then(|n| n.checked_mul(bitpix.unsigned_abs() as usize / 8))
            .ok_or_else(|| CcdError::InvalidFits("image size overflows".into()))?;
        if data_len as u64 > file_len {
            return Err(CcdError::InvalidFits(format!(
                "file truncated: {data_len} bytes of pixel data declared, file has {file_len}"
            )));
        }

        let mut header = read_header(&hdu, &mut fptr);
        header.insert("BITPIX", HeaderValue::Integer(bitpix));
        header.insert("NAXIS", HeaderValue::Integer(2));
        header.insert("NAXIS1", HeaderValue::Integer(width as i64));
        header.insert("NAXIS2", HeaderValue::Integer(height as i64));

        Ok(Self {
            fptr,
            hdu,
            header,
            height,
            width,
        })
    }

    /// `(height, width)`
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Read the pixel array with header metadata attached.
    ///
    /// cfitsio applies BSCALE/BZERO while converting to `f32`.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let values: Vec<f32> = self.hdu.read_image(&mut self.fptr).map_err(invalid_fits)?;
        let data = Array2::from_shape_vec((self.height, self.width), values)
            .map_err(|e| CcdError::InvalidFits(e.to_string()))?;

        let mut frame = Frame::new(data)
            .with_unit(self.header.unit())
            .with_metadata(self.header.exposure_metadata());
        frame.provenance = self.header.provenance();
        Ok(frame)
    }
}

/// Read the primary image of a FITS file as a frame.
pub fn read_fits(path: &Path) -> Result<Frame> {
    let mut reader = FitsReader::open(path)?;
    let frame = reader.read_frame()?;
    debug!(path = %path.display(), height = frame.height(), width = frame.width(), "Read FITS frame");
    Ok(frame)
}

/// Write a frame as a single-HDU FITS file with 32-bit float pixels.
///
/// Curated metadata and provenance are written as header cards. The mask
/// and uncertainty planes are not persisted. The header is validated before
/// the file is created, and a failed write leaves no file behind.
pub fn write_fits(path: &Path, frame: &Frame) -> Result<()> {
    let header = frame_header(frame)?;
    let (h, w) = frame.shape();
    let values: Vec<f32> = frame.data.iter().copied().collect();

    if let Err(e) = write_hdu(path, [h, w], &values, &header) {
        let _ = std::fs::remove_file(path);
        return Err(invalid_fits(e));
    }

    debug!(path = %path.display(), height = h, width = w, "Wrote FITS frame");
    Ok(())
}

/// Cards written for a frame, checked against single-card limits.
fn frame_header(frame: &Frame) -> Result<FitsHeader> {
    let mut header = FitsHeader::default();
    header.insert("BUNIT", HeaderValue::Text(frame.unit.clone()));

    let meta = &frame.metadata;
    let floats = [
        ("EXPTIME", meta.exposure_time),
        ("GAIN", meta.gain),
        ("RDNOISE", meta.read_noise),
    ];
    for (key, value) in floats {
        if let Some(v) = value {
            header.insert(key, HeaderValue::Float(v));
        }
    }
    let texts = [
        ("FILTER", &meta.filter),
        ("DATE-OBS", &meta.date_obs),
        ("INSTRUME", &meta.instrument),
        ("TELESCOP", &meta.telescope),
        ("OBJECT", &meta.object),
        ("IMAGETYP", &meta.image_type),
    ];
    for (key, value) in texts {
        if let Some(v) = value {
            header.insert(key, HeaderValue::Text(v.clone()));
        }
    }

    let prov = &frame.provenance;
    if let Some(t) = prov.master_type.filter(|_| prov.is_master) {
        header.insert("CALTYPE", HeaderValue::Text(t.to_string()));
        header.insert("NCOMBINE", HeaderValue::Integer(prov.n_combined as i64));
        if let Some(m) = prov.combine_method {
            header.insert("CMBMETH", HeaderValue::Text(m.to_string()));
        }
    }
    header.insert("CALIBRAT", HeaderValue::Logical(prov.is_calibrated));

    for (key, value) in header.iter() {
        match value {
            HeaderValue::Text(s) if !s.is_ascii() => {
                return Err(CcdError::InvalidFits(format!("value for {key} is not ASCII")));
            }
            HeaderValue::Text(s) if s.replace('\'', "''").len() > FITS_MAX_STRING_LEN => {
                return Err(CcdError::InvalidFits(format!("value for {key} does not fit in one card")));
            }
            HeaderValue::Float(f) if !f.is_finite() => {
                return Err(CcdError::InvalidFits(format!("value for {key} is not finite")));
            }
            _ => {}
        }
    }
    Ok(header)
}

fn write_hdu(path: &Path, shape: [usize; 2], values: &[f32], header: &FitsHeader) -> fitsio::errors::Result<()> {
    let description = ImageDescription {
        data_type: ImageType::Float,
        dimensions: &shape,
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .overwrite()
        .open()?;
    let hdu = fptr.primary_hdu()?;
    for (key, value) in header.iter() {
        match value {
            // Logical cards are stored as 0/1.
            HeaderValue::Logical(b) => hdu.write_key(&mut fptr, key, i64::from(*b))?,
            HeaderValue::Integer(i) => hdu.write_key(&mut fptr, key, *i)?,
            HeaderValue::Float(f) => hdu.write_key(&mut fptr, key, *f)?,
            HeaderValue::Text(s) => hdu.write_key(&mut fptr, key, s.as_str())?,
        }
    }
    hdu.write_image(&mut fptr, values)?;
    Ok(())
}

/// Curated cards present in the HDU; absent or mistyped keys are skipped.
fn read_header(hdu: &FitsHdu, fptr: &mut FitsFile) -> FitsHeader {
    let mut header = FitsHeader::default();
    for key in FLOAT_KEYS {
        if let Ok(v) = hdu.read_key::<f64>(fptr, key) {
            header.insert(key, HeaderValue::Float(v));
        }
    }
    for key in INTEGER_KEYS {
        if let Ok(v) = hdu.read_key::<i64>(fptr, key) {
            header.insert(key, HeaderValue::Integer(v));
        }
    }
    for key in LOGICAL_KEYS {
        if let Ok(v) = hdu.read_key::<i64>(fptr, key) {
            header.insert(key, HeaderValue::Logical(v != 0));
        }
    }
    for key in TEXT_KEYS {
        if let Ok(v) = hdu.read_key::<String>(fptr, key) {
            header.insert(key, HeaderValue::Text(v.trim_end().to_string()));
        }
    }
    header
}

fn bitpix(image_type: &ImageType) -> i64 {
    match image_type {
        ImageType::UnsignedByte | ImageType::Byte => 8,
        ImageType::Short | ImageType::UnsignedShort => 16,
        ImageType::Long | ImageType::UnsignedLong => 32,
        ImageType::LongLong => 64,
        ImageType::Float => -32,
        _ => -64,
    }
}

fn invalid_fits(err: fitsio::errors::Error) -> CcdError {
    CcdError::InvalidFits(err.to_string())
}
