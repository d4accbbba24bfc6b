use crate::{
    catalog::{self, CatalogError, CatalogReport, VolumeCatalog, relative_name},
    config::Config,
    grouper::{GroupKey, group},
    record::{FileError, FileRecord, TagReader},
    slice::{self, ExtractError, ExtractOptions, RasterImage},
    sorter::{SortOptions, SortOutcome, sort},
};

use rayon::prelude::*;
use std::{
    collections::{BTreeMap, HashSet},
    fmt::Display,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, warn};
use web_time::Instant;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("No input files")]
    EmptyInput,

    #[error("No file could be grouped into a volume ({} errors)", .0.len())]
    NoGroupableFiles(Vec<FileError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Runs the split-and-sort pipeline: header reads, grouping, ordering and
/// catalog construction.
#[derive(Debug, Clone, Default)]
pub struct VolumeLoader {
    config: Config,
    reader: TagReader,
}

impl VolumeLoader {
    pub fn new(config: Config) -> Self {
        let reader = TagReader::new(config.reader.clone());
        Self { config, reader }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Split the files at `paths` into volumes.
    ///
    /// Per-file failures are collected in the report. When
    /// [`Config::consume_inputs`] is set, every input is deleted once the
    /// catalog has been built; nothing is deleted if the run fails.
    ///
    /// # Errors
    ///
    /// [`LoadError::EmptyInput`] for an empty path list and
    /// [`LoadError::NoGroupableFiles`] when no file made it into a volume.
    pub fn load_from_file_paths(
        &self,
        paths: &[impl AsRef<Path>],
    ) -> Result<CatalogReport, LoadError> {
        let start = Instant::now();
        let paths = unique_paths(paths);
        if paths.is_empty() {
            return Err(LoadError::EmptyInput);
        }

        let (records, read_errors) = self.read_headers(&paths);
        let mut report = self.load_from_records(&records, read_errors)?;

        if self.config.consume_inputs {
            report.not_removed = self.consume(&paths);
        }

        info!(
            "split {} files into {} volumes in {:?}",
            paths.len(),
            report.catalog.len(),
            start.elapsed()
        );
        Ok(report)
    }

    /// Split every regular file directly inside `path` (not recursive).
    pub fn load_from_directory(&self, path: impl AsRef<Path>) -> Result<CatalogReport, LoadError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        self.load_from_file_paths(&paths)
    }

    /// Read every header in parallel.
    ///
    /// Each worker fills its own result slot; collecting them is the barrier
    /// before grouping.
    pub fn read_headers(&self, paths: &[PathBuf]) -> (Vec<FileRecord>, Vec<FileError>) {
        let base_dir = self.config.base_dir.as_deref();
        let results: Vec<Result<FileRecord, FileError>> = paths
            .par_iter()
            .enumerate()
            .map(|(discovery, path)| {
                self.reader
                    .read(path, relative_name(path, base_dir), discovery)
            })
            .collect();

        let mut records = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(record) => records.push(record),
                Err(error) => {
                    self.report(&error);
                    errors.push(error);
                }
            }
        }
        (records, errors)
    }

    /// Group, order and catalog already read records.
    ///
    /// `errors` are per-file failures from earlier stages, carried into the
    /// report.
    pub fn load_from_records(
        &self,
        records: &[FileRecord],
        mut errors: Vec<FileError>,
    ) -> Result<CatalogReport, LoadError> {
        if records.is_empty() && errors.is_empty() {
            return Err(LoadError::EmptyInput);
        }

        let grouping = group(records, &self.config.restriction_tags);
        for error in &grouping.rejected {
            self.report(error);
        }
        errors.extend(grouping.rejected);

        if grouping.groups.is_empty() {
            return Err(LoadError::NoGroupableFiles(errors));
        }

        let options = SortOptions {
            epsilon: self.config.epsilon,
            spacing_cv_threshold: self.config.spacing_cv_threshold,
        };
        let sorted: BTreeMap<GroupKey, SortOutcome<'_>> = grouping
            .groups
            .into_iter()
            .map(|(key, members)| {
                let outcome = sort(&members, &options);
                (key, outcome)
            })
            .collect();

        let volumes = catalog::build_volumes(&sorted, self.config.base_dir.as_deref());
        for volume in volumes.iter().filter(|volume| !volume.status.is_ok()) {
            self.report(&format_args!(
                "volume {} ({} files): {:?}",
                volume.id,
                volume.len(),
                volume.status
            ));
        }

        Ok(CatalogReport {
            catalog: VolumeCatalog::from_volumes(&volumes),
            volumes,
            errors: errors.iter().map(ToString::to_string).collect(),
            not_removed: Vec::new(),
        })
    }

    /// Extract the 1-based `slice` of `volume_id`.
    ///
    /// Catalog names are resolved against [`Config::base_dir`].
    pub fn extract_slice(
        &self,
        catalog: &VolumeCatalog,
        volume_id: &str,
        slice: usize,
        thumbnail: bool,
    ) -> Result<RasterImage, LoadError> {
        let name = catalog.slice_file(volume_id, slice)?;
        let path = self
            .config
            .base_dir
            .as_deref()
            .unwrap_or(Path::new("."))
            .join(name);
        Ok(self.extract_file(&path, thumbnail)?)
    }

    /// 8-bit thumbnail of the middle slice of `volume_id`.
    pub fn extract_volume_thumbnail(
        &self,
        catalog: &VolumeCatalog,
        volume_id: &str,
    ) -> Result<RasterImage, LoadError> {
        let slice = catalog.middle_slice(volume_id)?;
        self.extract_slice(catalog, volume_id, slice, true)
    }

    pub fn extract_file(&self, path: &Path, thumbnail: bool) -> Result<RasterImage, ExtractError> {
        let options = ExtractOptions {
            thumbnail_max_size: self.config.thumbnail_max_size,
        };
        slice::extract_path(path, thumbnail, &options)
    }

    /// Delete every input, returning the ones that could not be removed.
    fn consume(&self, paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .filter_map(|path| match fs::remove_file(path) {
                Ok(()) => None,
                Err(error) => {
                    warn!("could not remove {}: {error}", path.display());
                    Some(path.display().to_string())
                }
            })
            .collect()
    }

    fn report(&self, message: &dyn Display) {
        if self.config.reader.report_warnings {
            warn!("{message}");
        } else {
            debug!("{message}");
        }
    }
}

/// Input paths with duplicates removed, first occurrence kept.
fn unique_paths(paths: &[impl AsRef<Path>]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .iter()
        .map(|path| path.as_ref().to_path_buf())
        .filter(|path| seen.insert(path.clone()))
        .collect()
}
