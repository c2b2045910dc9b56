//! Post-fetch pipeline: publish the PDF, extract its text, publish the text.
//!
//! The three stages fail independently. A failure is captured on the report
//! and never aborts the remaining stages or flips the record's success.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::extract::{TextExtractor, write_text_artifact};
use crate::storage::ObjectStore;

/// Per-stage results of one post-fetch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFetchReport {
    /// Public link of the uploaded PDF.
    pub pdf_public_link: Option<String>,
    /// Upload error for the PDF.
    pub pdf_upload_error: Option<String>,
    /// Local text artifact, when extraction produced one.
    pub text_path: Option<PathBuf>,
    /// Extraction error.
    pub text_extraction_error: Option<String>,
    /// Public link of the uploaded text artifact.
    pub text_public_link: Option<String>,
    /// Upload error for the text artifact.
    pub text_upload_error: Option<String>,
}

/// Upload and extraction stages run after a successful fetch.
#[derive(Clone)]
pub struct PostFetchPipeline {
    object_store: Arc<dyn ObjectStore>,
    extractor: Arc<dyn TextExtractor>,
    bucket: String,
}

impl std::fmt::Debug for PostFetchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostFetchPipeline")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl PostFetchPipeline {
    /// Creates the pipeline uploading into `bucket`.
    #[must_use]
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        extractor: Arc<dyn TextExtractor>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            object_store,
            extractor,
            bucket: bucket.into(),
        }
    }

    /// Runs all stages for the artifact at `pdf`, writing text to `text_path`.
    #[instrument(skip(self), fields(bucket = %self.bucket, pdf = %pdf.display()))]
    pub async fn run(&self, pdf: &Path, text_path: &Path) -> PostFetchReport {
        let mut report = PostFetchReport::default();

        match self.object_store.upload(&self.bucket, pdf).await {
            Ok(uploaded) => {
                info!(public_url = %uploaded.public_url, "PDF uploaded");
                report.pdf_public_link = Some(uploaded.public_url);
            }
            Err(error) => {
                warn!(error = %error, "PDF upload failed");
                report.pdf_upload_error = Some(error.to_string());
            }
        }

        match write_text_artifact(Arc::clone(&self.extractor), pdf, text_path).await {
            Ok(path) => report.text_path = Some(path),
            Err(error) => {
                warn!(error = %error, "text extraction failed");
                report.text_extraction_error = Some(error.to_string());
            }
        }

        if let Some(text) = &report.text_path {
            match self.object_store.upload(&self.bucket, text).await {
                Ok(uploaded) => {
                    info!(public_url = %uploaded.public_url, "text uploaded");
                    report.text_public_link = Some(uploaded.public_url);
                }
                Err(error) => {
                    warn!(error = %error, "text upload failed");
                    report.text_upload_error = Some(error.to_string());
                }
            }
        }

        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::extract::ExtractError;
    use crate::storage::{StorageError, UploadedObject};

    /// Uploads succeed unless the file extension is listed in `fail_ext`.
    struct RecordingStore {
        fail_ext: &'static [&'static str],
        uploads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn upload(&self, bucket: &str, local: &Path) -> Result<UploadedObject, StorageError> {
            let filename = local.file_name().unwrap().to_string_lossy().to_string();
            self.uploads.lock().unwrap().push(filename.clone());
            let ext = local.extension().unwrap().to_string_lossy().to_string();
            if self.fail_ext.contains(&ext.as_str()) {
                return Err(StorageError::Rejected {
                    status: 503,
                    message: "bucket unavailable".to_string(),
                });
            }
            Ok(UploadedObject {
                public_url: format!("https://store.example/{bucket}/{filename}"),
                filename,
            })
        }
    }

    struct Pages(Result<Vec<String>, ()>);

    impl TextExtractor for Pages {
        fn extract_pages(&self, pdf: &Path) -> Result<Vec<String>, ExtractError> {
            self.0.clone().map_err(|()| ExtractError::Parse {
                path: pdf.to_path_buf(),
                message: "bad xref".to_string(),
            })
        }
    }

    fn pipeline(fail_ext: &'static [&'static str], pages: Result<Vec<String>, ()>) -> (PostFetchPipeline, Arc<RecordingStore>) {
        let store = Arc::new(RecordingStore {
            fail_ext,
            uploads: Mutex::new(Vec::new()),
        });
        let pipeline = PostFetchPipeline::new(store.clone(), Arc::new(Pages(pages)), "bucket");
        (pipeline, store)
    }

    #[tokio::test]
    async fn test_all_stages_succeed() {
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("a.pdf");
        let (pipeline, store) = pipeline(&[], Ok(vec!["hello".to_string()]));

        let report = pipeline.run(&pdf, &dir.path().join("a.txt")).await;
        assert_eq!(report.pdf_public_link.as_deref(), Some("https://store.example/bucket/a.pdf"));
        assert_eq!(report.text_public_link.as_deref(), Some("https://store.example/bucket/a.txt"));
        assert!(report.pdf_upload_error.is_none());
        assert!(report.text_extraction_error.is_none());
        assert!(report.text_upload_error.is_none());
        assert_eq!(*store.uploads.lock().unwrap(), vec!["a.pdf", "a.txt"]);
    }

    #[tokio::test]
    async fn test_pdf_upload_failure_still_extracts() {
        let dir = TempDir::new().unwrap();
        let (pipeline, _) = pipeline(&["pdf"], Ok(vec!["p1".to_string()]));

        let report = pipeline.run(&dir.path().join("a.pdf"), &dir.path().join("a.txt")).await;
        assert!(report.pdf_public_link.is_none());
        assert!(report.pdf_upload_error.unwrap().contains("bucket unavailable"));
        assert!(report.text_path.is_some());
        assert!(report.text_public_link.is_some());
    }

    #[tokio::test]
    async fn test_extraction_failure_skips_text_upload() {
        let dir = TempDir::new().unwrap();
        let (pipeline, store) = pipeline(&[], Err(()));

        let report = pipeline.run(&dir.path().join("a.pdf"), &dir.path().join("a.txt")).await;
        assert!(report.pdf_public_link.is_some());
        assert!(report.text_extraction_error.is_some());
        assert!(report.text_upload_error.is_none());
        assert_eq!(store.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_text_upload_failure_recorded_independently() {
        let dir = TempDir::new().unwrap();
        let (pipeline, _) = pipeline(&["txt"], Ok(vec![String::new()]));

        let report = pipeline.run(&dir.path().join("a.pdf"), &dir.path().join("a.txt")).await;
        assert!(report.pdf_upload_error.is_none());
        assert!(report.text_extraction_error.is_none());
        assert!(report.text_upload_error.is_some());
    }
}
