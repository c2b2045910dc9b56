//! Fetch strategies: the pluggable procedures that turn a discovery URL into
//! a local PDF artifact.
//!
//! # Architecture
//!
//! - [`FetchStrategy`] - Async trait every strategy implements
//! - [`FetchOutcome`] - Result of one invocation (artifact path + source domain)
//! - [`DirectFetch`] - Plain unauthenticated GET that only accepts `application/pdf`
//! - [`PublisherStrategy`] - Landing-page link discovery configured per publisher
//! - [`UniversalStrategy`] - Interactive session, then automated browser session
//! - [`StrategyRegistry`] - Ordered (predicate, normalizer, strategy) table
//! - [`RetryPolicy`] - Error classification and backoff around one strategy
//!
//! Every invocation goes through [`invoke_isolated`], which runs the strategy
//! in its own task so a panicking strategy cannot take down the batch.
//! Strategies are async: network waits are awaited, CPU-bound work goes to
//! `spawn_blocking` and browsers run as awaited child processes.

mod direct;
mod error;
mod http;
mod links;
pub mod normalize;
mod publisher;
mod registry;
mod retry;
mod universal;

pub use direct::DirectFetch;
pub use error::FetchError;
pub use http::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, FetchClientOptions, build_fetch_client,
    fetch_pdf_to_file,
};
pub use links::{absolutize_url, canonical_host, host_of, hosts_match};
pub use publisher::{PublisherProfile, PublisherStrategy, default_publisher_profiles};
pub use registry::{PublisherMatcher, StrategyEntry, StrategyRegistry, UrlNormalizer};
pub use retry::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryOutcome,
    RetryPolicy, classify_error, classify_message,
};
pub use universal::{BrowserSession, UniversalStrategy};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

/// Result of one strategy invocation.
///
/// Success is derived: an invocation succeeded when it produced an artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Local artifact path, when the strategy saved a PDF.
    pub path: Option<PathBuf>,
    /// Domain the artifact was served from.
    pub domain: Option<String>,
}

impl FetchOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn saved(path: impl Into<PathBuf>, domain: Option<String>) -> Self {
        Self {
            path: Some(path.into()),
            domain,
        }
    }

    /// Creates an expected-negative outcome (no access, no PDF).
    #[must_use]
    pub fn miss() -> Self {
        Self::default()
    }

    /// Returns true if the invocation produced an artifact.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.path.is_some()
    }
}

/// A procedure that fetches the PDF behind `url` into `target`.
///
/// Implementations return [`FetchOutcome::miss`] for expected negative
/// outcomes and raise [`FetchError`] for exceptional or network conditions
/// so the [`RetryPolicy`] can classify them.
///
/// # Object Safety
///
/// This trait uses `async_trait` to support dynamic dispatch via
/// `Arc<dyn FetchStrategy>` in the [`StrategyRegistry`].
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Returns the strategy's name (e.g., "direct", "wiley", "universal").
    fn name(&self) -> &str;

    /// Fetches the PDF behind `url` and saves it at `target`.
    async fn fetch(&self, url: &str, target: &Path) -> Result<FetchOutcome, FetchError>;
}

/// Runs one strategy invocation in its own task.
///
/// A panic inside the strategy is contained and surfaced as
/// [`FetchError::Aborted`]. A strategy body that blocks occupies one runtime
/// worker for its duration; on a multi-threaded runtime the rest of the batch
/// keeps running on the other workers.
///
/// # Errors
///
/// Returns whatever the strategy raised, or [`FetchError::Aborted`] when its
/// task did not complete.
pub async fn invoke_isolated(
    strategy: &Arc<dyn FetchStrategy>,
    url: &str,
    target: &Path,
) -> Result<FetchOutcome, FetchError> {
    let task_strategy = Arc::clone(strategy);
    let url = url.to_string();
    let target = target.to_path_buf();
    let handle =
        tokio::spawn(async move { task_strategy.fetch(&url, &target).await });

    match handle.await {
        Ok(result) => result,
        Err(join_error) => {
            warn!(strategy = strategy.name(), error = %join_error, "strategy task aborted");
            Err(FetchError::aborted(strategy.name(), join_error.to_string()))
        }
    }
}
