//! Input records and the local artifact layout derived from them.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

/// Maximum characters kept from a sanitized title in an artifact name.
const MAX_TITLE_CHARS: usize = 120;

/// Hex digits of the id digest appended to every artifact name.
const ID_SUFFIX_HEX_DIGITS: usize = 12;

/// Deserializes a string field, mapping empty or whitespace-only values to `None`.
fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }))
}

/// One bibliographic record as supplied by the caller.
///
/// A record carries up to two independent discovery pairs: the primary
/// (OpenAlex) and the secondary (Semantic Scholar).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographicRecord {
    /// Unique record id (a DOI).
    #[serde(rename = "DOI")]
    pub id: String,

    #[serde(rename = "Publication Title", default, deserialize_with = "non_empty")]
    pub title: Option<String>,

    #[serde(rename = "OpenAlex URL", default, deserialize_with = "non_empty")]
    pub primary_url: Option<String>,

    #[serde(rename = "OpenAlex Publisher", default, deserialize_with = "non_empty")]
    pub primary_publisher: Option<String>,

    #[serde(rename = "SS URL", default, deserialize_with = "non_empty")]
    pub secondary_url: Option<String>,

    #[serde(rename = "SS Publisher", default, deserialize_with = "non_empty")]
    pub secondary_publisher: Option<String>,
}

impl BibliographicRecord {
    /// Creates a record with only an id and title.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: id.into(),
            title: (!title.trim().is_empty()).then_some(title),
            ..Self::default()
        }
    }

    /// Sets the primary discovery pair.
    #[must_use]
    pub fn with_primary(mut self, url: impl Into<String>, publisher: Option<&str>) -> Self {
        self.primary_url = Some(url.into());
        self.primary_publisher = publisher.map(str::to_string);
        self
    }

    /// Sets the secondary discovery pair.
    #[must_use]
    pub fn with_secondary(mut self, url: impl Into<String>, publisher: Option<&str>) -> Self {
        self.secondary_url = Some(url.into());
        self.secondary_publisher = publisher.map(str::to_string);
        self
    }

    /// Returns true if neither discovery URL is present.
    #[must_use]
    pub fn has_no_discovery_urls(&self) -> bool {
        self.primary_url.is_none() && self.secondary_url.is_none()
    }

    /// Returns the secondary URL unless it duplicates the primary.
    #[must_use]
    pub fn distinct_secondary_url(&self) -> Option<&str> {
        match (&self.primary_url, &self.secondary_url) {
            (Some(primary), Some(secondary)) if primary.trim() == secondary.trim() => None,
            (_, secondary) => secondary.as_deref(),
        }
    }
}

/// Keeps alphanumerics, spaces and underscores, then trims trailing spaces.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .take(MAX_TITLE_CHARS)
        .collect();
    kept.trim_end().to_string()
}

/// Returns the deterministic artifact base name for `record`.
///
/// The sanitized title keeps paths readable; the id digest keeps two
/// records with the same title from sharing a file.
#[must_use]
pub fn artifact_stem(record: &BibliographicRecord) -> String {
    let digest = Sha256::digest(record.id.as_bytes());
    let mut suffix = String::with_capacity(ID_SUFFIX_HEX_DIGITS);
    for byte in digest.iter().take(ID_SUFFIX_HEX_DIGITS / 2) {
        let _ = write!(suffix, "{byte:02x}");
    }

    let title = record.title.as_deref().map(sanitize_title).unwrap_or_default();
    if title.is_empty() {
        suffix
    } else {
        format!("{title}_{suffix}")
    }
}

/// Local artifact paths for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Where the PDF is saved.
    pub pdf: PathBuf,
    /// Where the extracted text is written.
    pub text: PathBuf,
}

impl ArtifactPaths {
    /// Derives both paths for `record` inside `output_dir`.
    #[must_use]
    pub fn for_record(output_dir: &Path, record: &BibliographicRecord) -> Self {
        let stem = artifact_stem(record);
        Self {
            pdf: output_dir.join(format!("{stem}.pdf")),
            text: output_dir.join(format!("{stem}.txt")),
        }
    }
}
