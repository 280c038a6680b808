#[allow(dead_code)]
mod common;

use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use ndarray::Array2;

use ccdphot_core::combine::{combine, CombineConfig, CombineMethod};
use ccdphot_core::error::CcdError;
use ccdphot_core::frame::{ExposureMetadata, Frame, FrameType};
use ccdphot_core::io::{read_fits, write_fits, FitsReader, HeaderValue, ImageCollection};

fn card(key: &str, value: &str) -> String {
    format!("{:<80}", format!("{key:<8}= {value:>20}"))
}

/// Assemble a minimal primary HDU from raw cards and big-endian pixel bytes.
fn raw_fits(path: &Path, cards: &[String], data: &[u8]) {
    let mut bytes: Vec<u8> = cards.concat().into_bytes();
    bytes.extend(format!("{:<80}", "END").bytes());
    bytes.resize(bytes.len().div_ceil(2880) * 2880, b' ');
    bytes.extend_from_slice(data);
    bytes.resize(bytes.len().div_ceil(2880) * 2880, 0);
    std::fs::write(path, bytes).unwrap();
}

fn light_metadata() -> ExposureMetadata {
    ExposureMetadata {
        exposure_time: Some(30.0),
        filter: Some("V".into()),
        date_obs: Some("2024-03-01T21:14:05".into()),
        object: Some("Barnard's Star".into()),
        gain: Some(1.5),
        read_noise: Some(7.25),
        image_type: Some("Light Frame".into()),
        ..Default::default()
    }
}

#[test]
fn test_round_trip_preserves_pixels_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("light.fits");
    let data = Array2::from_shape_fn((7, 9), |(r, c)| r as f32 * 10.0 + c as f32 * 0.25 - 3.0);
    let frame = Frame::new(data.clone())
        .with_unit("electron")
        .with_metadata(light_metadata());

    write_fits(&path, &frame).unwrap();
    let loaded = read_fits(&path).unwrap();

    assert_eq!(loaded.shape(), (7, 9));
    assert_eq!(loaded.data, data);
    assert_eq!(loaded.unit, "electron");
    assert_eq!(loaded.metadata, light_metadata());
    assert!(!loaded.provenance.is_master);
    assert!(!loaded.provenance.is_calibrated);
    assert!(loaded.mask.is_none());
    assert!(loaded.uncertainty.is_none());
}

#[test]
fn test_master_provenance_cards() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("master_bias.fits");
    let set = common::frame_set(FrameType::Bias, 5, 6, 6, 100.0, Default::default());
    let master = combine(&set, &CombineConfig::new(CombineMethod::Average, false)).unwrap();

    write_fits(&path, master.frame()).unwrap();
    let mut reader = FitsReader::open(&path).unwrap();
    assert_eq!(reader.header.get_str("CALTYPE"), Some("bias"));
    assert_eq!(reader.header.get_i64("NCOMBINE"), Some(5));

    let provenance = reader.read_frame().unwrap().provenance;
    assert!(provenance.is_master);
    assert_eq!(provenance.master_type, Some(FrameType::Bias));
    assert_eq!(provenance.combine_method, Some(CombineMethod::Average));
    assert_eq!(provenance.n_combined, 5);
}

#[test]
fn test_integer_pixels_with_bzero() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("u16.fits");
    let physical: [u16; 6] = [0, 1, 1000, 32768, 40000, 65535];
    let raw: Vec<i16> = physical.iter().map(|&v| (v as i32 - 32768) as i16).collect();
    let mut bytes = vec![0u8; raw.len() * 2];
    BigEndian::write_i16_into(&raw, &mut bytes);
    raw_fits(
        &path,
        &[
            card("SIMPLE", "T"),
            card("BITPIX", "16"),
            card("NAXIS", "2"),
            card("NAXIS1", "3"),
            card("NAXIS2", "2"),
            card("BZERO", "32768"),
            card("BSCALE", "1"),
            card("EXPTIME", "1.2D1"),
        ],
        &bytes,
    );

    let frame = read_fits(&path).unwrap();
    assert_eq!(frame.shape(), (2, 3));
    let values: Vec<f32> = frame.data.iter().copied().collect();
    let expected: Vec<f32> = physical.iter().map(|&v| v as f32).collect();
    assert_eq!(values, expected);
    assert_eq!(frame.metadata.exposure_time, Some(12.0));
    assert_eq!(frame.unit, "adu");
}

#[test]
fn test_rejects_non_2d_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cube.fits");
    raw_fits(
        &path,
        &[
            card("SIMPLE", "T"),
            card("BITPIX", "-32"),
            card("NAXIS", "3"),
            card("NAXIS1", "2"),
            card("NAXIS2", "2"),
            card("NAXIS3", "2"),
        ],
        &[0u8; 32],
    );
    assert!(matches!(read_fits(&path), Err(CcdError::InvalidImage(_))));
}

#[test]
fn test_rejects_malformed_files() {
    let dir = tempfile::tempdir().unwrap();

    let truncated = dir.path().join("truncated.fits");
    raw_fits(
        &truncated,
        &[
            card("SIMPLE", "T"),
            card("BITPIX", "-32"),
            card("NAXIS", "2"),
            card("NAXIS1", "100"),
            card("NAXIS2", "100"),
        ],
        &[0u8; 16],
    );
    assert!(matches!(read_fits(&truncated), Err(CcdError::InvalidFits(_))));

    let no_end = dir.path().join("no_end.fits");
    std::fs::write(&no_end, card("SIMPLE", "T").repeat(36)).unwrap();
    assert!(matches!(read_fits(&no_end), Err(CcdError::InvalidFits(_))));

    let bad_bitpix = dir.path().join("bitpix.fits");
    raw_fits(
        &bad_bitpix,
        &[card("SIMPLE", "T"), card("BITPIX", "12"), card("NAXIS", "2")],
        &[],
    );
    assert!(matches!(read_fits(&bad_bitpix), Err(CcdError::InvalidFits(_))));

    assert!(matches!(
        read_fits(&dir.path().join("missing.fits")),
        Err(CcdError::Io(_))
    ));
}

#[test]
fn test_oversized_axes_are_rejected_before_allocation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.fits");
    raw_fits(
        &path,
        &[
            card("SIMPLE", "T"),
            card("BITPIX", "-64"),
            card("NAXIS", "2"),
            card("NAXIS1", "4294967296"),
            card("NAXIS2", "4294967296"),
        ],
        &[],
    );
    assert!(matches!(read_fits(&path), Err(CcdError::InvalidFits(_))));
    assert!(matches!(FitsReader::open(&path), Err(CcdError::InvalidFits(_))));
}

#[test]
fn test_unwritable_header_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long_object.fits");
    let frame = common::constant_frame(3, 3, 1.0).with_metadata(ExposureMetadata {
        object: Some("X".repeat(70)),
        ..Default::default()
    });

    assert!(matches!(write_fits(&path, &frame), Err(CcdError::InvalidFits(_))));
    assert!(!path.exists());

    // Doubled quotes count against the card length.
    let quoted = common::constant_frame(3, 3, 1.0).with_metadata(ExposureMetadata {
        object: Some("'".repeat(40)),
        ..Default::default()
    });
    assert!(matches!(write_fits(&path, &quoted), Err(CcdError::InvalidFits(_))));
    assert!(!path.exists());

    let fits_exactly = common::constant_frame(3, 3, 1.0).with_metadata(ExposureMetadata {
        object: Some("X".repeat(68)),
        ..Default::default()
    });
    write_fits(&path, &fits_exactly).unwrap();
    assert_eq!(read_fits(&path).unwrap().metadata.object, Some("X".repeat(68)));
}

#[test]
fn test_header_value_parsing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("header.fits");
    raw_fits(
        &path,
        &[
            card("SIMPLE", "T"),
            card("BITPIX", "-32"),
            card("NAXIS", "2"),
            card("NAXIS1", "1"),
            card("NAXIS2", "1"),
            format!("{:<80}", "FILTER  = 'R       '           / passband"),
            format!("{:<80}", "GAIN    =                 2.5 / e-/ADU"),
            format!("{:<80}", "COMMENT anything at all"),
        ],
        &[0u8; 4],
    );

    let reader = FitsReader::open(&path).unwrap();
    assert_eq!(reader.header.get("FILTER"), Some(&HeaderValue::Text("R".into())));
    assert_eq!(reader.header.get_f64("GAIN"), Some(2.5));
    assert!(reader.header.get("COMMENT").is_none());
    assert_eq!(reader.shape(), (1, 1));
}

#[test]
fn test_collection_classifies_by_image_type() {
    let dir = tempfile::tempdir().unwrap();
    let with_type = |t: &str| ExposureMetadata {
        image_type: Some(t.to_string()),
        ..Default::default()
    };
    let frames = [
        ("bias1.fits", with_type("Bias Frame")),
        ("bias2.fits", with_type("zero")),
        ("dark.fit", with_type("Dark Frame")),
        ("flat.fts", with_type("FLAT")),
        ("light.FITS", with_type("Light Frame")),
        ("mystery.fits", ExposureMetadata::default()),
    ];
    for (name, meta) in &frames {
        write_fits(&dir.path().join(name), &common::constant_frame(4, 5, 1.0).with_metadata(meta.clone())).unwrap();
    }
    std::fs::write(dir.path().join("junk.fits"), b"not a fits file").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let collection = ImageCollection::scan(dir.path()).unwrap();
    assert_eq!(collection.entries.len(), frames.len());
    let summary = collection.summary();
    assert_eq!(summary.get(&FrameType::Bias), Some(&2));
    assert_eq!(summary.get(&FrameType::Dark), Some(&1));
    assert_eq!(summary.get(&FrameType::Flat), Some(&1));
    assert_eq!(summary.get(&FrameType::Science), Some(&1));
    assert_eq!(collection.unclassified().count(), 1);
    assert!(collection.entries.iter().all(|e| e.shape == (4, 5)));

    let biases = collection.load_frame_set(FrameType::Bias).unwrap();
    assert_eq!(biases.frame_type, FrameType::Bias);
    assert_eq!(biases.len(), 2);
}
