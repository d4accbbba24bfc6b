//! End-to-end tests over DICOM files written to a temporary directory.

use dicom::{
    core::{DataElement, PrimitiveValue, VR},
    object::{FileMetaTableBuilder, InMemDicomObject},
};
use dicom_dictionary_std::{tags, uids};
use dicom_volume_split::{
    Config, LoadError, VolumeLoader,
    enums::{SampleType, SortStatus},
    slice::{DecodeError, ExtractError, Samples},
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

struct Slice<'a> {
    name: &'a str,
    series: Option<&'a str>,
    date: Option<&'a str>,
    z: f64,
    rows: u16,
    pixels: [u16; 4],
}

impl<'a> Slice<'a> {
    fn new(name: &'a str, series: &'a str, date: &'a str, z: f64) -> Self {
        Self {
            name,
            series: Some(series),
            date: Some(date),
            z,
            rows: 2,
            pixels: [0, 1, 2, 3],
        }
    }
}

fn write_slice(dir: &Path, slice: &Slice<'_>) -> PathBuf {
    let sop_instance_uid = format!("2.25.{}", slice.name.bytes().map(u32::from).sum::<u32>());
    let mut elements = vec![
        DataElement::new(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(uids::CT_IMAGE_STORAGE)),
        DataElement::new(
            tags::SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(sop_instance_uid.as_str()),
        ),
        DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT")),
        DataElement::new(
            tags::IMAGE_POSITION_PATIENT,
            VR::DS,
            PrimitiveValue::from(format!("0\\0\\{}", slice.z)),
        ),
        DataElement::new(
            tags::IMAGE_ORIENTATION_PATIENT,
            VR::DS,
            PrimitiveValue::from("1\\0\\0\\0\\1\\0"),
        ),
        DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)),
        DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("MONOCHROME2"),
        ),
        DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(slice.rows)),
        DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(2_u16)),
        DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)),
        DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)),
        DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)),
        DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)),
        DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::U16(slice.pixels.iter().copied().collect()),
        ),
    ];
    if let Some(series) = slice.series {
        elements.push(DataElement::new(
            tags::SERIES_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(series),
        ));
    }
    if let Some(date) = slice.date {
        elements.push(DataElement::new(tags::SERIES_DATE, VR::DA, PrimitiveValue::from(date)));
    }

    let object = InMemDicomObject::from_element_iter(elements)
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(sop_instance_uid.as_str()),
        )
        .expect("valid file meta group");

    let path = dir.join(slice.name);
    object.write_to_file(&path).expect("DICOM file written");
    path
}

fn loader(dir: &TempDir, consume_inputs: bool) -> VolumeLoader {
    VolumeLoader::new(Config {
        consume_inputs,
        base_dir: Some(dir.path().to_path_buf()),
        ..Config::default()
    })
}

#[test]
fn splits_series_by_date_and_orders_by_position() {
    let dir = TempDir::new().unwrap();
    let paths = vec![
        write_slice(dir.path(), &Slice::new("B.dcm", "1.2.3", "20200101", 10.0)),
        write_slice(dir.path(), &Slice::new("C.dcm", "1.2.3", "20200202", 0.0)),
        write_slice(dir.path(), &Slice::new("A.dcm", "1.2.3", "20200101", 0.0)),
    ];

    let report = loader(&dir, true).load_from_file_paths(&paths).unwrap();

    assert_eq!(
        report.catalog.to_json().unwrap(),
        r#"{"1.2.3|20200101":["A.dcm","B.dcm"],"1.2.3|20200202":["C.dcm"]}"#
    );
    assert!(report.volumes.iter().all(|v| v.status == SortStatus::Ok));
    assert!(report.errors.is_empty());
    assert!(report.not_removed.is_empty());
    for path in &paths {
        assert!(!path.exists(), "{} should have been consumed", path.display());
    }
}

#[test]
fn keeps_inputs_when_asked() {
    let dir = TempDir::new().unwrap();
    let paths = vec![write_slice(dir.path(), &Slice::new("only.dcm", "1.2.3", "20200101", 0.0))];

    let report = loader(&dir, false).load_from_file_paths(&paths).unwrap();

    assert_eq!(report.catalog.get("1.2.3|20200101"), Some(&["only.dcm".to_string()][..]));
    assert_eq!(report.volumes[0].status, SortStatus::Ok);
    assert_eq!(report.volumes[0].info.modality, "CT");
    assert!(paths[0].exists());
}

#[test]
fn bad_files_are_reported_per_file() {
    let dir = TempDir::new().unwrap();
    let garbage = dir.path().join("notes.txt");
    fs::write(&garbage, b"not a DICOM file").unwrap();
    let no_series = write_slice(
        dir.path(),
        &Slice {
            series: None,
            ..Slice::new("orphan.dcm", "", "20200101", 0.0)
        },
    );
    let good = write_slice(dir.path(), &Slice::new("good.dcm", "1.2.3", "20200101", 0.0));

    let report = loader(&dir, false)
        .load_from_file_paths(&[garbage, no_series, good])
        .unwrap();

    assert_eq!(report.catalog.len(), 1);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.iter().any(|e| e.contains("notes.txt")));
    assert!(report.errors.iter().any(|e| e.contains("orphan.dcm")));
}

#[test]
fn failed_run_deletes_nothing() {
    let dir = TempDir::new().unwrap();
    let garbage = dir.path().join("junk.bin");
    fs::write(&garbage, [0u8; 16]).unwrap();

    let result = loader(&dir, true).load_from_file_paths(&[garbage.clone()]);

    assert!(matches!(result, Err(LoadError::NoGroupableFiles(errors)) if errors.len() == 1));
    assert!(garbage.exists());
}

#[test]
fn missing_series_date_groups_with_absent_peers() {
    let dir = TempDir::new().unwrap();
    let paths = vec![
        write_slice(
            dir.path(),
            &Slice {
                date: None,
                ..Slice::new("2.dcm", "1.2.3", "", 5.0)
            },
        ),
        write_slice(
            dir.path(),
            &Slice {
                date: None,
                ..Slice::new("1.dcm", "1.2.3", "", 0.0)
            },
        ),
    ];

    let report = loader(&dir, false).load_from_file_paths(&paths).unwrap();

    assert_eq!(
        report.catalog.to_json().unwrap(),
        r#"{"1.2.3":["1.dcm","2.dcm"]}"#
    );
}

#[test]
fn loads_directory() {
    let dir = TempDir::new().unwrap();
    write_slice(dir.path(), &Slice::new("x.dcm", "1.2.3", "20200101", 3.0));
    write_slice(dir.path(), &Slice::new("y.dcm", "1.2.3", "20200101", 1.0));
    write_slice(dir.path(), &Slice::new("z.dcm", "1.2.3", "20200101", 2.0));

    let report = loader(&dir, false).load_from_directory(dir.path()).unwrap();

    assert_eq!(
        report.catalog.get("1.2.3|20200101"),
        Some(&["y.dcm".to_string(), "z.dcm".to_string(), "x.dcm".to_string()][..])
    );
    let volume = report.volume("1.2.3|20200101").unwrap();
    assert_eq!(volume.geometry.spacing, Some(1.0));
}

#[test]
fn extracts_native_slice() {
    let dir = TempDir::new().unwrap();
    let path = write_slice(
        dir.path(),
        &Slice {
            pixels: [100, 4000, 1075, 2050],
            ..Slice::new("s.dcm", "1.2.3", "20200101", 0.0)
        },
    );

    let image = loader(&dir, false).extract_file(&path, false).unwrap();

    assert_eq!((image.width, image.height, image.channels), (2, 2, 1));
    assert_eq!(image.sample_type(), SampleType::U16);
    assert_eq!(image.samples, Samples::U16(vec![100, 4000, 1075, 2050]));
}

#[test]
fn extracts_thumbnail_through_catalog() {
    let dir = TempDir::new().unwrap();
    let paths = vec![
        write_slice(
            dir.path(),
            &Slice {
                pixels: [100, 4000, 1075, 2050],
                ..Slice::new("first.dcm", "1.2.3", "20200101", 0.0)
            },
        ),
        write_slice(dir.path(), &Slice::new("second.dcm", "1.2.3", "20200101", 1.0)),
    ];
    let loader = loader(&dir, false);
    let report = loader.load_from_file_paths(&paths).unwrap();

    let image = loader
        .extract_slice(&report.catalog, "1.2.3|20200101", 1, true)
        .unwrap();
    assert_eq!(image.samples, Samples::U8(vec![0, 255, 64, 128]));

    assert!(matches!(
        loader.extract_slice(&report.catalog, "1.2.3|20200101", 3, true),
        Err(LoadError::Catalog(_))
    ));
}

#[test]
fn volume_thumbnail_is_the_middle_slice() {
    let patterns = [[9, 0, 0, 0], [0, 9, 0, 0], [0, 0, 9, 0], [0, 0, 0, 9]];
    for count in [3, 4] {
        let dir = TempDir::new().unwrap();
        let names = ["0.dcm", "1.dcm", "2.dcm", "3.dcm"];
        let paths: Vec<PathBuf> = (0..count)
            .map(|i| {
                write_slice(
                    dir.path(),
                    &Slice {
                        pixels: patterns[i],
                        ..Slice::new(names[i], "1.2.3", "20200101", i as f64)
                    },
                )
            })
            .collect();
        let loader = loader(&dir, false);
        let report = loader.load_from_file_paths(&paths).unwrap();

        let image = loader
            .extract_volume_thumbnail(&report.catalog, "1.2.3|20200101")
            .unwrap();
        assert_eq!(image.samples, Samples::U8(vec![0, 255, 0, 0]), "{count} slices");
    }
}

#[test]
fn unreadable_file_is_an_open_error() {
    let dir = TempDir::new().unwrap();
    let garbage = dir.path().join("broken.dcm");
    fs::write(&garbage, b"DICM?").unwrap();

    assert!(matches!(
        loader(&dir, false).extract_file(&garbage, true),
        Err(ExtractError::Open { .. })
    ));
}

#[test]
fn truncated_pixel_data_is_a_decode_error() {
    let dir = TempDir::new().unwrap();
    let path = write_slice(dir.path(), &Slice::new("cut.dcm", "1.2.3", "20200101", 0.0));
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

    assert!(matches!(
        loader(&dir, false).extract_file(&path, true),
        Err(ExtractError::Decode(DecodeError::Read(_)))
    ));
}

#[test]
fn pixel_data_smaller_than_frame_is_a_decode_error() {
    let dir = TempDir::new().unwrap();
    let path = write_slice(
        dir.path(),
        &Slice {
            rows: 8,
            ..Slice::new("short.dcm", "1.2.3", "20200101", 0.0)
        },
    );

    assert!(matches!(
        loader(&dir, false).extract_file(&path, true),
        Err(ExtractError::Decode(_))
    ));
}
