//! Runtime configuration for the split-and-sort pipeline.
//!
//! Configuration can be built in code (starting from [`Config::default`])
//! or read from a TOML document:
//!
//! ```toml
//! restriction_tags = ["0008|0021", "0020|0012"]
//! consume_inputs = false
//!
//! [reader]
//! load_private_tags = false
//! report_warnings = true
//! ```

use dicom::core::Tag;
use dicom_dictionary_std::tags;
use serde::{Deserialize, Deserializer};
use std::{fs, path::Path, path::PathBuf};
use thiserror::Error;

/// Relative tolerance used for orientation comparison and position ties.
pub const EPSILON: f64 = 1e-4;

/// Spacing coefficient of variation above which a volume is flagged irregular.
pub const SPACING_CV_THRESHOLD: f64 = 0.05;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid tag {0:?}, expected GGGG|EEEE")]
    InvalidTag(String),
}

/// Options handed to the tag reader.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Keep odd-group (private) data elements in the parsed tag map.
    pub load_private_tags: bool,
    /// Log per-file problems as warnings instead of debug messages.
    pub report_warnings: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            load_private_tags: false,
            report_warnings: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tags that split a series into finer volumes, in key order.
    #[serde(deserialize_with = "deserialize_tags")]
    pub restriction_tags: Vec<Tag>,
    pub reader: ReaderOptions,
    pub epsilon: f64,
    pub spacing_cv_threshold: f64,
    /// Delete the input files once the catalog has been built.
    pub consume_inputs: bool,
    /// Prefix stripped from file names written to the catalog.
    pub base_dir: Option<PathBuf>,
    /// Largest thumbnail edge in pixels, no downsampling when unset.
    pub thumbnail_max_size: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            restriction_tags: vec![tags::SERIES_DATE],
            reader: ReaderOptions::default(),
            epsilon: EPSILON,
            spacing_cv_threshold: SPACING_CV_THRESHOLD,
            consume_inputs: true,
            base_dir: None,
            thumbnail_max_size: None,
        }
    }
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Append a restriction tag, ignoring duplicates.
    pub fn with_restriction(mut self, tag: Tag) -> Self {
        if !self.restriction_tags.contains(&tag) {
            self.restriction_tags.push(tag);
        }
        self
    }
}

/// Parse a tag written as `GGGG|EEEE`, `GGGG,EEEE`, `(GGGG,EEEE)` or `GGGGEEEE`.
pub fn parse_tag(text: &str) -> Result<Tag, ConfigError> {
    let invalid = || ConfigError::InvalidTag(text.to_string());
    let trimmed = text
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')');
    let (group, element) = match trimmed.split_once(['|', ',']) {
        Some((group, element)) => (group.trim(), element.trim()),
        None if trimmed.len() == 8 => trimmed.split_at(4),
        None => return Err(invalid()),
    };
    if group.len() != 4 || element.len() != 4 {
        return Err(invalid());
    }
    let group = u16::from_str_radix(group, 16).map_err(|_| invalid())?;
    let element = u16::from_str_radix(element, 16).map_err(|_| invalid())?;
    Ok(Tag(group, element))
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<Tag>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    raw.iter()
        .map(|text| parse_tag(text).map_err(serde::de::Error::custom))
        .collect()
}
