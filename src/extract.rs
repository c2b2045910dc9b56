//! PDF text extraction.
//!
//! Pages are joined with `\n`; a page without extractable text contributes an
//! empty line. Parsing is CPU-bound and runs on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

/// Errors raised while turning a PDF into a text artifact.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The PDF could not be parsed.
    #[error("failed to parse PDF {path}: {message}")]
    Parse {
        /// The PDF path.
        path: PathBuf,
        /// Parser error description.
        message: String,
    },

    /// Writing the text artifact failed.
    #[error("failed to write text artifact {path}: {source}")]
    Io {
        /// The text artifact path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The blocking extraction task did not complete.
    #[error("text extraction task aborted: {0}")]
    Aborted(String),
}

/// Extracts per-page text from a local PDF.
pub trait TextExtractor: Send + Sync {
    /// Returns one string per page, in page order.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Parse`] when the document cannot be read.
    fn extract_pages(&self, pdf: &Path) -> Result<Vec<String>, ExtractError>;
}

/// [`TextExtractor`] backed by `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfTextExtractor;

impl TextExtractor for LopdfTextExtractor {
    fn extract_pages(&self, pdf: &Path) -> Result<Vec<String>, ExtractError> {
        let document = lopdf::Document::load(pdf).map_err(|e| ExtractError::Parse {
            path: pdf.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(document
            .get_pages()
            .keys()
            .map(|page| document.extract_text(&[*page]).unwrap_or_default())
            .collect())
    }
}

/// Joins raw page texts with `\n` separators.
#[must_use]
pub fn join_pages(pages: &[String]) -> String {
    pages.join("\n")
}

/// Extracts `pdf` and writes the joined text to `text_path`.
///
/// # Errors
///
/// Returns [`ExtractError`] when parsing or writing fails, or when the
/// blocking task aborts.
#[instrument(skip(extractor), fields(pdf = %pdf.display(), text = %text_path.display()))]
pub async fn write_text_artifact(
    extractor: Arc<dyn TextExtractor>,
    pdf: &Path,
    text_path: &Path,
) -> Result<PathBuf, ExtractError> {
    let pdf = pdf.to_path_buf();
    let text_path = text_path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let pages = extractor.extract_pages(&pdf)?;
        let text = join_pages(&pages);
        std::fs::write(&text_path, text).map_err(|source| ExtractError::Io {
            path: text_path.clone(),
            source,
        })?;
        debug!(pages = pages.len(), "text artifact written");
        Ok(text_path)
    })
    .await
    .map_err(|e| ExtractError::Aborted(e.to_string()))?
}
