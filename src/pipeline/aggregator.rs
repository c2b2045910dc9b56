//! Result aggregator: builds the [`DownloadResult`] and merge-updates the
//! record's status document.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::postfetch::PostFetchReport;
use super::resolver::Resolution;
use super::result::{DownloadResult, STATUS_CLOSED, STATUS_OPEN};
use crate::record::BibliographicRecord;
use crate::storage::{DocumentFields, DocumentStore};

/// Fields written to the status document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperUpdate {
    pub open_access_status: String,
    pub pdf_public_link: Option<String>,
    pub text_public_link: Option<String>,
    pub pdf_source: Option<String>,
}

impl PaperUpdate {
    /// Builds the update from a finished result.
    #[must_use]
    pub fn from_result(result: &DownloadResult) -> Self {
        Self {
            open_access_status: result.open_access_status.clone(),
            pdf_public_link: result.pdf_public_link.clone(),
            text_public_link: result.text_public_link.clone(),
            pdf_source: result.source_domain.clone(),
        }
    }

    /// Returns the update as a document field map.
    #[must_use]
    pub fn to_fields(&self) -> DocumentFields {
        let mut fields = DocumentFields::new();
        fields.insert(
            "openAccessStatus".to_string(),
            Value::String(self.open_access_status.clone()),
        );
        let optional = [
            ("pdfPublicLink", &self.pdf_public_link),
            ("textPublicLink", &self.text_public_link),
            ("pdfSource", &self.pdf_source),
        ];
        for (key, value) in optional {
            fields.insert(
                key.to_string(),
                value.clone().map_or(Value::Null, Value::String),
            );
        }
        fields
    }
}

/// Builds results and persists their status.
#[derive(Clone)]
pub struct ResultAggregator {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for ResultAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultAggregator").finish_non_exhaustive()
    }
}

impl ResultAggregator {
    /// Creates an aggregator writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Combines the record, its resolution and the post-fetch report.
    #[must_use]
    pub fn build(
        record: &BibliographicRecord,
        resolution: Resolution,
        report: PostFetchReport,
    ) -> DownloadResult {
        let mut result = DownloadResult::failed(record);
        result.success = resolution.success;
        result.open_access_status = if resolution.success {
            STATUS_OPEN
        } else {
            STATUS_CLOSED
        }
        .to_string();
        result.attempts = resolution.attempts;
        result.fetch_error = if resolution.success {
            None
        } else {
            resolution.last_error
        };
        if resolution.success {
            result.pdf_path = resolution.path;
            result.source_domain = resolution.domain;
            result.strategy = resolution.strategy;
        }
        result.pdf_public_link = report.pdf_public_link;
        result.pdf_upload_error = report.pdf_upload_error;
        result.text_public_link = report.text_public_link;
        result.text_extraction_error = report.text_extraction_error;
        result.text_upload_error = report.text_upload_error;
        result
    }

    /// Merge-updates the status document for `result`.
    ///
    /// A write failure is recorded on the result and logged, never raised.
    #[instrument(skip(self, result), fields(id = %result.id))]
    pub async fn persist(&self, result: &mut DownloadResult) {
        let update = PaperUpdate::from_result(result);
        match self.store.merge_update(&result.id, &update.to_fields()).await {
            Ok(()) => debug!(status = %update.open_access_status, "status document updated"),
            Err(error) => {
                warn!(error = %error, "status document update failed");
                result.persistence_error = Some(error.to_string());
            }
        }
    }

    /// Builds the result and persists it.
    pub async fn finalize(
        &self,
        record: &BibliographicRecord,
        resolution: Resolution,
        report: PostFetchReport,
    ) -> DownloadResult {
        let mut result = Self::build(record, resolution, report);
        self.persist(&mut result).await;
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::storage::{DocumentStoreError, MemoryDocumentStore};

    struct DownStore;

    #[async_trait]
    impl DocumentStore for DownStore {
        async fn merge_update(&self, _id: &str, _fields: &DocumentFields) -> Result<(), DocumentStoreError> {
            Err(DocumentStoreError::Unavailable("connection reset".to_string()))
        }
    }

    fn success() -> Resolution {
        Resolution {
            success: true,
            path: Some(PathBuf::from("/tmp/a.pdf")),
            domain: Some("arxiv.org".to_string()),
            attempts: 2,
            strategy: Some("arxiv".to_string()),
            last_error: Some("earlier".to_string()),
            retries: 0,
        }
    }

    #[test]
    fn test_paper_update_fields_keep_nulls() {
        let update = PaperUpdate {
            open_access_status: "Closed".to_string(),
            pdf_public_link: None,
            text_public_link: None,
            pdf_source: None,
        };
        assert_eq!(
            Value::Object(update.to_fields()),
            json!({"openAccessStatus": "Closed", "pdfPublicLink": null, "textPublicLink": null, "pdfSource": null})
        );
        assert_eq!(serde_json::to_value(&update).unwrap(), Value::Object(update.to_fields()));
    }

    #[test]
    fn test_build_success() {
        let record = BibliographicRecord::new("10.1/a", "T");
        let report = PostFetchReport {
            pdf_public_link: Some("https://s/a.pdf".to_string()),
            ..PostFetchReport::default()
        };
        let result = ResultAggregator::build(&record, success(), report);
        assert!(result.success);
        assert_eq!(result.open_access_status, "Open");
        assert_eq!(result.source_domain.as_deref(), Some("arxiv.org"));
        assert_eq!(result.pdf_public_link.as_deref(), Some("https://s/a.pdf"));
        assert!(result.fetch_error.is_none());
    }

    #[tokio::test]
    async fn test_finalize_writes_status_document() {
        let store = Arc::new(MemoryDocumentStore::new());
        let aggregator = ResultAggregator::new(store.clone());
        let record = BibliographicRecord::new("10.1/a", "T");

        let result = aggregator
            .finalize(&record, Resolution::default(), PostFetchReport::default())
            .await;
        assert!(!result.success);
        assert!(result.persistence_error.is_none());
        let document = store.get("10.1/a").await.unwrap();
        assert_eq!(document["openAccessStatus"], "Closed");
        assert!(document["pdfSource"].is_null());
    }

    #[tokio::test]
    async fn test_persistence_failure_recorded_not_raised() {
        let aggregator = ResultAggregator::new(Arc::new(DownStore));
        let record = BibliographicRecord::new("10.1/a", "T");

        let result = aggregator.finalize(&record, success(), PostFetchReport::default()).await;
        assert!(result.success);
        assert!(result.persistence_error.unwrap().contains("connection reset"));
    }
}
