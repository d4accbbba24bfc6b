//! # DICOM volume split library
//!
//! This crate splits a flat set of DICOM files into reconstructable 3D
//! volumes and reports, per volume, the member files in stacking order.
//!
//! It is built on the dicom-rs ecosystem: headers are read with
//! `dicom-object` (stopping before the pixel data), in parallel using rayon.
//! The pipeline then runs as pure functions over the parsed headers:
//!
//!  1. [`grouper`]: bucket files by SeriesInstanceUID plus a configurable,
//!     ordered set of restriction tags (SeriesDate by default).
//!  2. [`sorter`]: order each bucket along its slice normal, falling back
//!     to instance number, file name or discovery order when geometry is
//!     missing or inconsistent.
//!  3. [`catalog`]: emit the volume catalog, a mapping from volume
//!     identifier to ordered file names, with per-volume diagnostics.
//!
//! Geometry problems never abort a run. They are reported through
//! [`enums::SortStatus`] on each volume:
//!  - `Heterogeneous`: slices disagree on ImageOrientationPatient
//!  - `PositionMissing`: some slice lacks ImagePositionPatient
//!  - `IrregularSpacing`: slices are not evenly spaced
//!
//! A single slice can also be extracted as a raster image with [`slice`],
//! either with its native sample type or as an 8-bit thumbnail.
//!
//! # Examples
//!
//! ## Splitting a directory into volumes
//!
//! ```no_run
//! # use dicom_volume_split::{config::Config, volume_loader::VolumeLoader};
//! let config = Config {
//!     consume_inputs: false,
//!     ..Config::default()
//! };
//! let report = VolumeLoader::new(config)
//!     .load_from_directory("dicom")
//!     .expect("should have split files into volumes");
//! println!("{}", report.catalog.to_json_pretty().unwrap());
//! ```
//!
//! ## Getting a thumbnail of a slice
//!
//! ```no_run
//! # use dicom_volume_split::{config::Config, volume_loader::VolumeLoader};
//! # let loader = VolumeLoader::new(Config { consume_inputs: false, ..Config::default() });
//! # let report = loader.load_from_directory("dicom").unwrap();
//! let volume_id = report.catalog.volume_ids().next().unwrap();
//! let image = loader
//!     .extract_slice(&report.catalog, volume_id, 1, true)
//!     .expect("should have extracted the first slice");
//! image.save("thumbnail.png").unwrap();
//! ```

pub mod catalog;
pub mod config;
pub mod enums;
pub mod grouper;
pub mod info;
mod interpolator;
pub mod record;
pub mod slice;
pub mod sorter;
pub mod volume;
pub mod volume_loader;

pub use catalog::{CatalogReport, VolumeCatalog};
pub use config::Config;
pub use volume_loader::{LoadError, VolumeLoader};
