//! The per-record outcome returned to the caller and persisted.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::record::BibliographicRecord;

/// Status value recorded for a fetched record.
pub const STATUS_OPEN: &str = "Open";

/// Status value recorded for a record no strategy could fetch.
pub const STATUS_CLOSED: &str = "Closed";

/// Aggregated outcome of one record's pipeline.
///
/// Serialized with the column names callers already consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    #[serde(rename = "DOI")]
    pub id: String,
    #[serde(rename = "Publication Title")]
    pub title: Option<String>,
    #[serde(rename = "OA_URL")]
    pub primary_url: Option<String>,
    #[serde(rename = "OA_Publisher")]
    pub primary_publisher: Option<String>,
    #[serde(rename = "SS_URL")]
    pub secondary_url: Option<String>,
    #[serde(rename = "SS_Publisher")]
    pub secondary_publisher: Option<String>,

    /// Local artifact path; set only on success.
    #[serde(rename = "PDF Filepath")]
    pub pdf_path: Option<PathBuf>,
    /// Domain the artifact was served from.
    #[serde(rename = "PDF Source")]
    pub source_domain: Option<String>,
    /// `Open` or `Closed`.
    #[serde(rename = "OA Status")]
    pub open_access_status: String,
    #[serde(rename = "PDF Link in GCS")]
    pub pdf_public_link: Option<String>,
    #[serde(rename = "Text Link in GCS")]
    pub text_public_link: Option<String>,
    #[serde(rename = "Download_Success")]
    pub success: bool,

    /// Strategy invocations made across all resolver steps.
    #[serde(rename = "Fetch Attempts")]
    pub attempts: u32,
    /// Name of the strategy that produced the artifact.
    #[serde(rename = "Strategy")]
    pub strategy: Option<String>,
    #[serde(rename = "Fetch Error")]
    pub fetch_error: Option<String>,
    #[serde(rename = "PDF Upload Error")]
    pub pdf_upload_error: Option<String>,
    #[serde(rename = "Text Extraction Error")]
    pub text_extraction_error: Option<String>,
    #[serde(rename = "Text Upload Error")]
    pub text_upload_error: Option<String>,
    #[serde(rename = "Persistence Error")]
    pub persistence_error: Option<String>,
}

impl DownloadResult {
    /// A failed result carrying only the record's own fields.
    #[must_use]
    pub fn failed(record: &BibliographicRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            primary_url: record.primary_url.clone(),
            primary_publisher: record.primary_publisher.clone(),
            secondary_url: record.secondary_url.clone(),
            secondary_publisher: record.secondary_publisher.clone(),
            pdf_path: None,
            source_domain: None,
            open_access_status: STATUS_CLOSED.to_string(),
            pdf_public_link: None,
            text_public_link: None,
            success: false,
            attempts: 0,
            strategy: None,
            fetch_error: None,
            pdf_upload_error: None,
            text_extraction_error: None,
            text_upload_error: None,
            persistence_error: None,
        }
    }

    /// Number of post-fetch and persistence stages that recorded an error.
    #[must_use]
    pub fn stage_error_count(&self) -> usize {
        [
            &self.pdf_upload_error,
            &self.text_extraction_error,
            &self.text_upload_error,
            &self.persistence_error,
        ]
        .iter()
        .filter(|error| error.is_some())
        .count()
    }
}
