//! Strategy registry: an ordered table from publisher identifier to strategy.
//!
//! Entries are evaluated in registration order and the first matching entry
//! wins. An unknown publisher is not an error; [`StrategyRegistry::lookup`]
//! returns `None` and the resolver falls through to its next step.

use std::sync::Arc;

use tracing::debug;

use super::http::FetchClientOptions;
use super::links::canonical_host;
use super::normalize;
use super::publisher::{PublisherStrategy, default_publisher_profiles};
use super::FetchStrategy;

/// Rewrites a discovery URL before the bound strategy sees it.
pub type UrlNormalizer = fn(&str) -> String;

/// Predicate over a publisher identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublisherMatcher {
    /// Matches when the canonical host equals this host.
    Exact(String),
    /// Matches this host or any subdomain of it.
    Suffix(String),
}

impl PublisherMatcher {
    /// Creates an exact matcher from a host (canonicalized).
    #[must_use]
    pub fn exact(host: &str) -> Self {
        Self::Exact(canonical_host(host))
    }

    /// Creates a suffix matcher from a host (canonicalized).
    #[must_use]
    pub fn suffix(host: &str) -> Self {
        Self::Suffix(canonical_host(host))
    }

    /// Returns true if `publisher` satisfies this predicate.
    #[must_use]
    pub fn matches(&self, publisher: &str) -> bool {
        let publisher = canonical_host(publisher);
        if publisher.is_empty() {
            return false;
        }
        match self {
            Self::Exact(host) => publisher == *host,
            Self::Suffix(host) => {
                publisher == *host
                    || publisher
                        .strip_suffix(host.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
        }
    }
}

/// One row of the registry table.
#[derive(Clone)]
pub struct StrategyEntry {
    /// Which publisher identifiers this entry serves.
    pub matcher: PublisherMatcher,
    /// URL normalization applied before invoking the strategy.
    pub normalize: UrlNormalizer,
    /// The bound strategy.
    pub strategy: Arc<dyn FetchStrategy>,
}

impl std::fmt::Debug for StrategyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyEntry")
            .field("matcher", &self.matcher)
            .field("strategy", &self.strategy.name())
            .finish_non_exhaustive()
    }
}

/// Ordered (predicate, normalizer, strategy) table.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    entries: Vec<StrategyEntry>,
}

impl StrategyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry; earlier entries take precedence.
    pub fn register(
        &mut self,
        matcher: PublisherMatcher,
        normalize: UrlNormalizer,
        strategy: Arc<dyn FetchStrategy>,
    ) {
        debug!(matcher = ?matcher, strategy = strategy.name(), "registering strategy");
        self.entries.push(StrategyEntry {
            matcher,
            normalize,
            strategy,
        });
    }

    /// Returns the first entry whose predicate matches `publisher`.
    #[must_use]
    pub fn lookup(&self, publisher: &str) -> Option<&StrategyEntry> {
        self.entries
            .iter()
            .find(|entry| entry.matcher.matches(publisher))
    }

    /// Returns the number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the default table from the built-in publisher profiles.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error when a strategy's client cannot be built.
    pub fn with_defaults(options: &FetchClientOptions) -> Result<Self, reqwest::Error> {
        let mut registry = Self::new();
        for profile in default_publisher_profiles() {
            let normalize: UrlNormalizer = match profile.name {
                "wiley" => normalize::wiley_doi_to_epdf,
                "sage" => normalize::sage_url_to_epub,
                _ => normalize::identity,
            };
            let matcher = PublisherMatcher::exact(profile.publisher_id);
            let strategy = PublisherStrategy::new(profile, options)?;
            registry.register(matcher, normalize, Arc::new(strategy));
        }
        Ok(registry)
    }
}
