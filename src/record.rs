//! Header-level view of one input file.
//!
//! [`TagReader`] parses a file's data set up to the pixel data and turns it
//! into a [`FileRecord`]: a plain map from tag to [`TagValue`] plus the few
//! geometric fields grouping and sorting need, computed once.

use crate::config::ReaderOptions;

use dicom::{
    core::{PrimitiveValue, Tag, VR},
    object::{InMemDicomObject, OpenFileOptions},
};
use dicom_dictionary_std::tags;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("{name}: missing required tag {tag}")]
    MissingRequiredTag { name: String, tag: Tag },

    #[error("{name}: could not read DICOM header: {source}")]
    Read {
        name: String,
        #[source]
        source: dicom::object::ReadError,
    },
}

/// A raw header value, as handed over by the tag reader.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// Textual value, multiple values separated by `\`.
    Str(String),
    Numbers(Vec<f64>),
    Bytes(Vec<u8>),
}

impl TagValue {
    /// Trimmed textual form, `None` for binary or empty values.
    pub fn text(&self) -> Option<String> {
        let text = match self {
            TagValue::Str(s) => s
                .trim_matches(|c: char| c.is_whitespace() || c == '\0')
                .to_string(),
            TagValue::Numbers(values) => values
                .iter()
                .map(f64::to_string)
                .collect::<Vec<_>>()
                .join("\\"),
            TagValue::Bytes(_) => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    /// All values as numbers, `None` if any of them is not numeric.
    pub fn numbers(&self) -> Option<Vec<f64>> {
        match self {
            TagValue::Numbers(values) => Some(values.clone()),
            TagValue::Str(s) => {
                let values: Option<Vec<f64>> = s
                    .trim_matches(|c: char| c.is_whitespace() || c == '\0')
                    .split('\\')
                    .map(|part| part.trim().parse::<f64>().ok())
                    .collect();
                values.filter(|v| !v.is_empty())
            }
            TagValue::Bytes(_) => None,
        }
    }

    pub fn number(&self) -> Option<f64> {
        self.numbers().and_then(|v| v.first().copied())
    }
}

/// One input file: its identity, its header tags and derived geometry.
#[derive(Debug, Clone)]
pub struct FileRecord {
    path: PathBuf,
    name: String,
    discovery: usize,
    tags: BTreeMap<Tag, TagValue>,
    series_uid: Option<String>,
    position: Option<[f64; 3]>,
    orientation: Option<[f64; 6]>,
    spacing_hint: Option<f64>,
    instance_number: Option<i64>,
}

impl FileRecord {
    /// Build a record from an already parsed tag map.
    ///
    /// `name` is the caller-facing file name reported in the catalog and
    /// `discovery` the position of the file in the input sequence.
    pub fn from_tags(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        discovery: usize,
        tags: BTreeMap<Tag, TagValue>,
    ) -> Self {
        let series_uid = tags.get(&tags::SERIES_INSTANCE_UID).and_then(TagValue::text);
        let position = tags
            .get(&tags::IMAGE_POSITION_PATIENT)
            .and_then(TagValue::numbers)
            .and_then(|v| <[f64; 3]>::try_from(v.get(..3)?).ok());
        let orientation = tags
            .get(&tags::IMAGE_ORIENTATION_PATIENT)
            .and_then(TagValue::numbers)
            .and_then(|v| <[f64; 6]>::try_from(v.get(..6)?).ok());
        let spacing_hint = tags
            .get(&tags::SPACING_BETWEEN_SLICES)
            .or_else(|| tags.get(&tags::SLICE_THICKNESS))
            .and_then(TagValue::number);
        let instance_number = tags
            .get(&tags::INSTANCE_NUMBER)
            .and_then(TagValue::number)
            .map(|n| n.round() as i64);

        Self {
            path: path.into(),
            name: name.into(),
            discovery,
            tags,
            series_uid,
            position,
            orientation,
            spacing_hint,
            instance_number,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn discovery(&self) -> usize {
        self.discovery
    }

    pub fn tags(&self) -> &BTreeMap<Tag, TagValue> {
        &self.tags
    }

    pub fn get(&self, tag: Tag) -> Option<&TagValue> {
        self.tags.get(&tag)
    }

    /// Trimmed text of a tag, `None` when absent or empty.
    pub fn text(&self, tag: Tag) -> Option<String> {
        self.get(tag).and_then(TagValue::text)
    }

    pub fn series_uid(&self) -> Option<&str> {
        self.series_uid.as_deref()
    }

    pub fn position(&self) -> Option<[f64; 3]> {
        self.position
    }

    pub fn orientation(&self) -> Option<[f64; 6]> {
        self.orientation
    }

    pub fn spacing_hint(&self) -> Option<f64> {
        self.spacing_hint
    }

    pub fn instance_number(&self) -> Option<i64> {
        self.instance_number
    }
}

/// Reads DICOM headers into [`FileRecord`]s.
#[derive(Debug, Clone, Default)]
pub struct TagReader {
    options: ReaderOptions,
}

impl TagReader {
    pub fn new(options: ReaderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Read the header of the file at `path`.
    ///
    /// Parsing stops before the pixel data and the file handle is released
    /// before this returns.
    pub fn read(
        &self,
        path: &Path,
        name: impl Into<String>,
        discovery: usize,
    ) -> Result<FileRecord, FileError> {
        let name = name.into();
        let object = OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path)
            .map_err(|source| FileError::Read {
                name: name.clone(),
                source,
            })?;
        let tags = self.collect_tags(&object);
        debug!("{name}: read {} header elements", tags.len());
        Ok(FileRecord::from_tags(path, name, discovery, tags))
    }

    /// Flatten the root data set into a tag map.
    pub fn collect_tags(&self, object: &InMemDicomObject) -> BTreeMap<Tag, TagValue> {
        object
            .into_iter()
            .filter(|elem| self.options.load_private_tags || elem.header().tag.group() % 2 == 0)
            .filter_map(|elem| {
                let value = to_tag_value(elem.vr(), elem.value().primitive()?)?;
                Some((elem.header().tag, value))
            })
            .collect()
    }
}

fn to_tag_value(vr: VR, value: &PrimitiveValue) -> Option<TagValue> {
    match vr {
        VR::SQ => None,
        VR::FL | VR::FD | VR::SL | VR::SS | VR::UL | VR::US | VR::SV | VR::UV => {
            value.to_multi_float64().ok().map(TagValue::Numbers)
        }
        VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN => {
            Some(TagValue::Bytes(value.to_bytes().into_owned()))
        }
        _ => Some(TagValue::Str(value.to_str().into_owned())),
    }
}
