use crate::{
    enums::{SortKey, SortStatus},
    grouper::GroupKey,
    info::VolumeInfo,
    record::FileRecord,
    sorter::SortOutcome,
};

use serde::{Deserialize, Serialize};

/// Geometry learned while ordering a volume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub normal: Option<[f64; 3]>,
    pub spacing: Option<f64>,
    pub tilt_degrees: Option<f64>,
}

/// One reconstructable volume: ordered member files plus diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    /// Catalog file names, in stacking order.
    pub files: Vec<String>,
    pub status: SortStatus,
    pub sorted_by: SortKey,
    pub geometry: Geometry,
    pub info: VolumeInfo,
}

impl Volume {
    /// Build a volume from its key and sort outcome, naming members with `name`.
    ///
    /// Returns `None` for an empty outcome, which never forms a volume.
    pub fn new(
        key: &GroupKey,
        outcome: &SortOutcome<'_>,
        name: impl Fn(&FileRecord) -> String,
    ) -> Option<Self> {
        let first = outcome.files.first()?;
        let id = key.volume_id();
        let files: Vec<String> = outcome.files.iter().map(|&record| name(record)).collect();
        let info = VolumeInfo::from_record(&id, files.len(), first);
        Some(Self {
            id,
            files,
            status: outcome.status,
            sorted_by: outcome.key,
            geometry: Geometry {
                normal: outcome.normal,
                spacing: outcome.spacing,
                tilt_degrees: outcome.tilt_degrees,
            },
            info,
        })
    }

    /// Get the number of slices in the volume
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// File holding the 1-based `slice`.
    pub fn slice_file(&self, slice: usize) -> Option<&str> {
        let index = slice.checked_sub(1)?;
        self.files.get(index).map(String::as_str)
    }
}
