//! Bucketing of file records into candidate volumes.

use crate::record::{FileError, FileRecord, TagValue};

use dicom::core::Tag;
use dicom_dictionary_std::tags;
use std::collections::BTreeMap;
use tracing::debug;

/// Value of one restriction tag inside a [`GroupKey`].
///
/// Files lacking the tag (or carrying an empty value) all share `Absent`,
/// so they keep grouping together within their series.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RestrictionValue {
    Absent,
    Present(String),
}

impl RestrictionValue {
    fn of(record: &FileRecord, tag: Tag) -> Self {
        match record.get(tag) {
            Some(TagValue::Bytes(bytes)) if !bytes.is_empty() => {
                RestrictionValue::Present(bytes.iter().map(|b| format!("{b:02x}")).collect())
            }
            Some(value) => value
                .text()
                .map_or(RestrictionValue::Absent, RestrictionValue::Present),
            None => RestrictionValue::Absent,
        }
    }
}

/// Composite grouping key: series UID plus one value per restriction tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    series_uid: String,
    restrictions: Vec<(Tag, RestrictionValue)>,
}

impl GroupKey {
    pub fn new(series_uid: impl Into<String>, restrictions: Vec<(Tag, RestrictionValue)>) -> Self {
        Self {
            series_uid: series_uid.into(),
            restrictions,
        }
    }

    /// Key of `record`, or `None` if it has no SeriesInstanceUID.
    pub fn of(record: &FileRecord, restriction_tags: &[Tag]) -> Option<Self> {
        let series_uid = record.series_uid()?;
        let restrictions = restriction_tags
            .iter()
            .map(|&tag| (tag, RestrictionValue::of(record, tag)))
            .collect();
        Some(Self::new(series_uid, restrictions))
    }

    pub fn series_uid(&self) -> &str {
        &self.series_uid
    }

    pub fn restrictions(&self) -> &[(Tag, RestrictionValue)] {
        &self.restrictions
    }

    /// Stable string identifier of the volume this key describes.
    ///
    /// The bare series UID when every restriction value is absent, otherwise
    /// the UID followed by `|value` per restriction tag (empty for absent
    /// values). `\` and `|` inside components are escaped, which keeps the
    /// mapping injective.
    pub fn volume_id(&self) -> String {
        let mut id = escape(&self.series_uid);
        if self
            .restrictions
            .iter()
            .all(|(_, value)| *value == RestrictionValue::Absent)
        {
            return id;
        }
        for (_, value) in &self.restrictions {
            id.push('|');
            if let RestrictionValue::Present(text) = value {
                id.push_str(&escape(text));
            }
        }
        id
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('|', "\\|")
}

/// Result of [`group`]: candidate volumes and the files that could not join one.
#[derive(Debug, Default)]
pub struct Grouping<'a> {
    pub groups: BTreeMap<GroupKey, Vec<&'a FileRecord>>,
    pub rejected: Vec<FileError>,
}

/// Bucket `files` by [`GroupKey`].
///
/// Members of each bucket are kept in discovery order, so the grouping does
/// not depend on the order of `files`. Files without a SeriesInstanceUID are
/// rejected with [`FileError::MissingRequiredTag`].
pub fn group<'a>(files: &'a [FileRecord], restriction_tags: &[Tag]) -> Grouping<'a> {
    let mut grouping = Grouping::default();

    for record in files {
        match GroupKey::of(record, restriction_tags) {
            Some(key) => grouping.groups.entry(key).or_default().push(record),
            None => grouping.rejected.push(FileError::MissingRequiredTag {
                name: record.name().to_string(),
                tag: tags::SERIES_INSTANCE_UID,
            }),
        }
    }

    for members in grouping.groups.values_mut() {
        members.sort_by_key(|record| record.discovery());
    }
    grouping
        .rejected
        .sort_by(|a, b| a.to_string().cmp(&b.to_string()));

    debug!(
        "grouped {} files into {} candidate volumes ({} rejected)",
        files.len(),
        grouping.groups.len(),
        grouping.rejected.len()
    );
    grouping
}
