//! Descriptive metadata attached to each volume.
//!
//! Patient, study and series attributes are read from the first slice of a
//! volume; the synthetic patient key lets consumers build a
//! patient → study → volume hierarchy even when PatientID is not unique.

use crate::record::FileRecord;

use dicom_dictionary_std::tags;
use serde::{Deserialize, Serialize};

pub const ANONYMOUS_PATIENT: &str = "Anonymous";
pub const ANONYMOUS_PATIENT_ID: &str = "ANONYMOUS";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PatientInfo {
    #[serde(rename = "PatientID")]
    pub patient_id: String,
    pub patient_name: String,
    pub patient_birth_date: String,
    pub patient_sex: String,
}

impl PatientInfo {
    pub fn from_record(record: &FileRecord) -> Self {
        Self {
            patient_id: record
                .text(tags::PATIENT_ID)
                .unwrap_or_else(|| ANONYMOUS_PATIENT_ID.to_string()),
            patient_name: record
                .text(tags::PATIENT_NAME)
                .unwrap_or_else(|| ANONYMOUS_PATIENT.to_string()),
            patient_birth_date: record.text(tags::PATIENT_BIRTH_DATE).unwrap_or_default(),
            patient_sex: record.text(tags::PATIENT_SEX).unwrap_or_default(),
        }
    }

    /// Multi-attribute key identifying a patient: `id|name|birth date|sex`.
    pub fn key(&self) -> String {
        [
            &self.patient_id,
            &self.patient_name,
            &self.patient_birth_date,
            &self.patient_sex,
        ]
        .iter()
        .map(|part| part.trim().replace('|', "_"))
        .collect::<Vec<_>>()
        .join("|")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StudyInfo {
    #[serde(rename = "StudyID")]
    pub study_id: String,
    #[serde(rename = "StudyInstanceUID")]
    pub study_instance_uid: String,
    pub study_date: String,
    pub study_time: String,
    pub accession_number: String,
    pub study_description: String,
}

impl StudyInfo {
    pub fn from_record(record: &FileRecord) -> Self {
        let text = |tag| record.text(tag).unwrap_or_default();
        Self {
            study_id: text(tags::STUDY_ID),
            study_instance_uid: text(tags::STUDY_INSTANCE_UID),
            study_date: text(tags::STUDY_DATE),
            study_time: text(tags::STUDY_TIME),
            accession_number: text(tags::ACCESSION_NUMBER),
            study_description: text(tags::STUDY_DESCRIPTION),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeInfo {
    #[serde(rename = "VolumeID")]
    pub volume_id: String,
    pub number_of_slices: usize,
    pub modality: String,
    #[serde(rename = "SeriesInstanceUID")]
    pub series_instance_uid: String,
    pub series_number: String,
    pub series_description: String,
    pub window_level: String,
    pub window_width: String,
    pub patient_key: String,
    pub patient: PatientInfo,
    pub study: StudyInfo,
}

impl VolumeInfo {
    pub fn from_record(volume_id: &str, number_of_slices: usize, record: &FileRecord) -> Self {
        let text = |tag| record.text(tag).unwrap_or_default();
        let patient = PatientInfo::from_record(record);
        Self {
            volume_id: volume_id.to_string(),
            number_of_slices,
            modality: text(tags::MODALITY),
            series_instance_uid: text(tags::SERIES_INSTANCE_UID),
            series_number: text(tags::SERIES_NUMBER),
            series_description: text(tags::SERIES_DESCRIPTION),
            window_level: text(tags::WINDOW_CENTER),
            window_width: text(tags::WINDOW_WIDTH),
            patient_key: patient.key(),
            patient,
            study: StudyInfo::from_record(record),
        }
    }

    /// Human readable name: description, else series number, else the UID.
    pub fn display_name(&self) -> String {
        let source = if self.series_description.trim().is_empty() {
            &self.series_number
        } else {
            &self.series_description
        };
        let name = source.split_whitespace().collect::<Vec<_>>().join(" ");
        if name.is_empty() {
            self.series_instance_uid.clone()
        } else {
            name
        }
    }
}
