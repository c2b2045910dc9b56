//! Error types for fetch strategies.
//!
//! Strategies return `Ok(FetchOutcome::miss())` for expected negative outcomes
//! (no access, no PDF link) and raise a [`FetchError`] for exceptional
//! conditions the retry policy should look at.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a single strategy invocation.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while writing the artifact.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Strategy-specific failure described only by a message
    /// (browser session errors, unexpected page states).
    #[error("{strategy} strategy failed: {message}")]
    Strategy {
        /// Name of the strategy that raised.
        strategy: String,
        /// Human-readable failure description.
        message: String,
    },

    /// The isolated task running the strategy panicked or was cancelled.
    #[error("{strategy} strategy task aborted: {message}")]
    Aborted {
        /// Name of the strategy whose task aborted.
        strategy: String,
        /// Join error description.
        message: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    ///
    /// Timeouts are promoted to [`FetchError::Timeout`]. The URL is stripped
    /// from `source`; it is kept once, in `url`.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::Timeout { url: url.into() };
        }
        Self::Network {
            url: url.into(),
            source: source.without_url(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a message-only strategy error.
    pub fn strategy(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            message: message.into(),
        }
    }

    /// Creates an aborted-task error.
    pub fn aborted(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Aborted {
            strategy: strategy.into(),
            message: message.into(),
        }
    }

    /// Returns the part of the error that carries its classification signal.
    ///
    /// URLs are excluded so a DOI such as `10.1503/...` is never mistaken
    /// for an HTTP 503.
    #[must_use]
    pub fn classification_text(&self) -> String {
        match self {
            Self::Network { source, .. } => source.to_string(),
            Self::Timeout { .. } => "timeout".to_string(),
            Self::HttpStatus { status, .. } => format!("HTTP {status}"),
            Self::Io { source, .. } => source.to_string(),
            Self::InvalidUrl { .. } => "invalid URL".to_string(),
            Self::Strategy { message, .. } | Self::Aborted { message, .. } => message.clone(),
        }
    }
}
