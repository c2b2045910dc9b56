//! Row resolver: turns one record into a local PDF, trying strategies in
//! strict priority order and stopping at the first success.
//!
//! 1. direct fetch of the primary URL
//! 2. direct fetch of the secondary URL (when distinct)
//! 3. the primary publisher's strategy, retried
//! 4. the secondary publisher's strategy, retried (when the URL is distinct)
//! 5. the universal strategy on whichever URL is present, retried
//!
//! Errors raised by a step are logged and end that step only.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::fetch::{FetchOutcome, FetchStrategy, RetryOutcome, RetryPolicy, StrategyRegistry, invoke_isolated};
use crate::record::BibliographicRecord;

/// What the resolver found for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Whether an artifact was saved.
    pub success: bool,
    /// Local artifact path (success only).
    pub path: Option<PathBuf>,
    /// Source domain (success only).
    pub domain: Option<String>,
    /// Strategy invocations across all steps.
    pub attempts: u32,
    /// Name of the strategy that succeeded.
    pub strategy: Option<String>,
    /// Last error raised by any step.
    pub last_error: Option<String>,
    /// Invocations beyond the first within retried steps.
    pub retries: u32,
}

impl Resolution {
    fn record_outcome(&mut self, strategy: &str, outcome: FetchOutcome) -> bool {
        if let Some(path) = outcome.path {
            self.success = true;
            self.path = Some(path);
            self.domain = outcome.domain;
            self.strategy = Some(strategy.to_string());
        }
        self.success
    }

    fn record_retried(&mut self, strategy: &str, retried: RetryOutcome) -> bool {
        self.attempts += retried.attempts;
        self.retries += retried.attempts.saturating_sub(1);
        if retried.last_error.is_some() {
            self.last_error = retried.last_error;
        }
        match retried.outcome {
            Some(outcome) => self.record_outcome(strategy, outcome),
            None => false,
        }
    }
}

/// Per-record orchestrator over the direct, publisher and universal strategies.
#[derive(Clone)]
pub struct RowResolver {
    direct: Arc<dyn FetchStrategy>,
    registry: Arc<StrategyRegistry>,
    universal: Arc<dyn FetchStrategy>,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for RowResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowResolver")
            .field("direct", &self.direct.name())
            .field("registry", &self.registry)
            .field("universal", &self.universal.name())
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl RowResolver {
    /// Creates a resolver from its collaborators.
    #[must_use]
    pub fn new(
        direct: Arc<dyn FetchStrategy>,
        registry: Arc<StrategyRegistry>,
        universal: Arc<dyn FetchStrategy>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            direct,
            registry,
            universal,
            retry_policy,
        }
    }

    /// Returns the retry policy wrapping publisher and universal steps.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Resolves `record`, saving the artifact at `target` on success.
    #[instrument(skip(self, record, target), fields(id = %record.id))]
    pub async fn resolve(&self, record: &BibliographicRecord, target: &Path) -> Resolution {
        let mut resolution = Resolution::default();

        if record.has_no_discovery_urls() {
            debug!("no discovery URLs; nothing to fetch");
            return resolution;
        }

        let secondary_url = record.distinct_secondary_url();

        // 1-2: plain fetch of each discovery URL.
        for url in record.primary_url.as_deref().into_iter().chain(secondary_url) {
            if self.direct_step(url, target, &mut resolution).await {
                return resolution;
            }
        }

        // 3-4: publisher strategies.
        let pairs = [
            (record.primary_publisher.as_deref(), record.primary_url.as_deref()),
            (record.secondary_publisher.as_deref(), secondary_url),
        ];
        for (publisher, url) in pairs {
            let (Some(publisher), Some(url)) = (publisher, url) else {
                continue;
            };
            if self.publisher_step(publisher, url, target, &mut resolution).await {
                return resolution;
            }
        }

        // 5: universal fallback.
        if let Some(url) = record.primary_url.as_deref().or(record.secondary_url.as_deref()) {
            let retried = self.retry_policy.run(&self.universal, url, target).await;
            if resolution.record_retried(self.universal.name(), retried) {
                info!(url, "universal strategy succeeded");
                return resolution;
            }
        }

        debug!(attempts = resolution.attempts, "all strategies exhausted");
        resolution
    }

    async fn direct_step(&self, url: &str, target: &Path, resolution: &mut Resolution) -> bool {
        resolution.attempts += 1;
        match invoke_isolated(&self.direct, url, target).await {
            Ok(outcome) => {
                let saved = resolution.record_outcome(self.direct.name(), outcome);
                if saved {
                    info!(url, "direct fetch succeeded");
                }
                saved
            }
            Err(error) => {
                warn!(url, error = %error, "direct fetch failed");
                resolution.last_error = Some(error.to_string());
                false
            }
        }
    }

    async fn publisher_step(
        &self,
        publisher: &str,
        url: &str,
        target: &Path,
        resolution: &mut Resolution,
    ) -> bool {
        let Some(entry) = self.registry.lookup(publisher) else {
            debug!(publisher, "no strategy registered for publisher");
            return false;
        };
        let normalized = (entry.normalize)(url);
        debug!(publisher, url, normalized = %normalized, strategy = entry.strategy.name(), "invoking publisher strategy");

        let retried = self.retry_policy.run(&entry.strategy, &normalized, target).await;
        let saved = resolution.record_retried(entry.strategy.name(), retried);
        if saved {
            info!(publisher, "publisher strategy succeeded");
        }
        saved
    }
}
