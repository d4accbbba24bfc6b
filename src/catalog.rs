//! The volume catalog: volume identifier → ordered file names.
//!
//! [`VolumeCatalog`] is the only normative output of a split-and-sort run.
//! It serializes to a JSON object whose keys are volume identifiers and
//! whose values are file names in stacking order. [`CatalogReport`] wraps it
//! with per-volume diagnostics and per-file errors.

use crate::{grouper::GroupKey, sorter::SortOutcome, volume::Volume};

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Cannot find volume {0}")]
    UnknownVolume(String),

    #[error("Slice {slice} is out of bounds for volume {volume} (1..={len})")]
    SliceOutOfBounds {
        volume: String,
        slice: usize,
        len: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeCatalog {
    volumes: BTreeMap<String, Vec<String>>,
}

impl VolumeCatalog {
    pub fn from_volumes<'a>(volumes: impl IntoIterator<Item = &'a Volume>) -> Self {
        Self {
            volumes: volumes
                .into_iter()
                .filter(|volume| !volume.is_empty())
                .map(|volume| (volume.id.clone(), volume.files.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    pub fn get(&self, volume_id: &str) -> Option<&[String]> {
        self.volumes.get(volume_id).map(Vec::as_slice)
    }

    pub fn volume_ids(&self) -> impl Iterator<Item = &str> {
        self.volumes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.volumes
            .iter()
            .map(|(id, files)| (id.as_str(), files.as_slice()))
    }

    /// File name of the 1-based `slice` of `volume_id`.
    pub fn slice_file(&self, volume_id: &str, slice: usize) -> Result<&str, CatalogError> {
        let files = self
            .get(volume_id)
            .ok_or_else(|| CatalogError::UnknownVolume(volume_id.to_string()))?;
        slice
            .checked_sub(1)
            .and_then(|index| files.get(index))
            .map(String::as_str)
            .ok_or(CatalogError::SliceOutOfBounds {
                volume: volume_id.to_string(),
                slice,
                len: files.len(),
            })
    }

    /// 1-based index of the middle slice, `ceil(len / 2)`.
    pub fn middle_slice(&self, volume_id: &str) -> Result<usize, CatalogError> {
        let files = self
            .get(volume_id)
            .ok_or_else(|| CatalogError::UnknownVolume(volume_id.to_string()))?;
        Ok(files.len().div_ceil(2))
    }

    pub fn to_json(&self) -> Result<String, CatalogError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, CatalogError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Catalog plus everything a consumer may want to warn about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogReport {
    pub catalog: VolumeCatalog,
    pub volumes: Vec<Volume>,
    /// Per-file errors; those files are in no volume.
    pub errors: Vec<String>,
    /// Inputs that could not be removed after the run.
    pub not_removed: Vec<String>,
}

impl CatalogReport {
    pub fn volume(&self, volume_id: &str) -> Option<&Volume> {
        self.volumes.iter().find(|volume| volume.id == volume_id)
    }

    pub fn to_json_pretty(&self) -> Result<String, CatalogError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Name under which `path` appears in the catalog.
///
/// Relative to `base_dir` when the path lies inside it, otherwise the path
/// as given, without a leading `./`. Components are joined with `/`.
pub fn relative_name(path: &Path, base_dir: Option<&Path>) -> String {
    match base_dir.and_then(|base| path.strip_prefix(base).ok()) {
        Some(relative) => relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        None => path
            .strip_prefix(".")
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned(),
    }
}

/// Turn sorted groups into volumes, naming members relative to `base_dir`.
pub fn build_volumes(
    groups: &BTreeMap<GroupKey, SortOutcome<'_>>,
    base_dir: Option<&Path>,
) -> Vec<Volume> {
    groups
        .iter()
        .filter_map(|(key, outcome)| {
            Volume::new(key, outcome, |record| relative_name(record.path(), base_dir))
        })
        .collect()
}

pub fn build(
    groups: &BTreeMap<GroupKey, SortOutcome<'_>>,
    base_dir: Option<&Path>,
) -> VolumeCatalog {
    VolumeCatalog::from_volumes(&build_volumes(groups, base_dir))
}
