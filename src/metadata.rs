use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted annotation of one catalog file, keyed by `file_path`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub file_path: String,
    pub title: String,
    pub description: String,
    /// Normalized tags; stored comma-joined.
    pub tags: Vec<String>,
    pub last_filesize: u64,
    pub last_modified: DateTime<Utc>,
    /// Set by the repository. Ignored on upsert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set by the repository. Ignored on upsert.
    pub updated_at: Option<DateTime<Utc>>,
}

/// The displayable part of an [`ImageRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// One row of the catalog listing. `info` is absent for files nobody annotated yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub info: Option<ImageInfo>,
}

/// Structured answer of the vision model, also returned to the caller once cleaned.
///
/// The file facts are never read from the model; they are filled from the file itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationResult {
    #[serde(default, skip_deserializing)]
    pub filename: String,
    #[serde(default, skip_deserializing)]
    pub filesize: u64,
    #[serde(default, skip_deserializing)]
    pub file_modification_time: String,
    pub image_information: ImageInformation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInformation {
    pub title: String,
    pub detailed_description: String,
    pub tags: Vec<String>,
}
