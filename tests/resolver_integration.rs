//! Integration tests for the row resolver over real HTTP strategies.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use oa_downloader_core::fetch::{
    DirectFetch, FetchClientOptions, FetchError, FetchOutcome, FetchStrategy, PublisherMatcher,
    RetryPolicy, StrategyRegistry, host_of, normalize,
};
use oa_downloader_core::pipeline::RowResolver;
use oa_downloader_core::record::{ArtifactPaths, BibliographicRecord};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;
use support::{MissStrategy, RecordingStrategy};

/// Raises the same error on every call.
struct Failing {
    message: &'static str,
    calls: AtomicU32,
}

impl Failing {
    fn new(message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            message,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl FetchStrategy for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    async fn fetch(&self, _url: &str, _target: &Path) -> Result<FetchOutcome, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::strategy("failing", self.message))
    }
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(10))
        .with_delays(Duration::from_millis(10), Duration::ZERO)
}

fn publisher_only(strategy: Arc<dyn FetchStrategy>, max_attempts: u32) -> RowResolver {
    let mut registry = StrategyRegistry::new();
    registry.register(
        PublisherMatcher::exact("publisher.example"),
        normalize::identity,
        strategy,
    );
    RowResolver::new(
        Arc::new(MissStrategy),
        Arc::new(registry),
        Arc::new(MissStrategy),
        fast_policy(max_attempts),
    )
}

fn publisher_record() -> BibliographicRecord {
    BibliographicRecord::new("10.1/x", "Paper")
        .with_primary("https://publisher.example/article/1", Some("publisher.example"))
}

#[tokio::test]
async fn test_direct_pdf_resolves_without_publisher_strategy() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/paper.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(b"%PDF-1.4 direct".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let recording = Arc::new(RecordingStrategy::default());
    let mut registry = StrategyRegistry::new();
    registry.register(
        PublisherMatcher::exact("arxiv.org"),
        normalize::identity,
        recording.clone(),
    );
    let resolver = RowResolver::new(
        Arc::new(DirectFetch::new().unwrap()),
        Arc::new(registry),
        Arc::new(MissStrategy),
        fast_policy(3),
    );

    let url = format!("{}/paper.pdf", server.uri());
    let record = BibliographicRecord::new("10.48550/arXiv.1", "Direct").with_primary(&url, Some("arxiv.org"));
    let dir = TempDir::new().unwrap();
    let paths = ArtifactPaths::for_record(dir.path(), &record);

    let resolution = resolver.resolve(&record, &paths.pdf).await;
    assert!(resolution.success);
    assert_eq!(resolution.domain, host_of(&url));
    assert_eq!(resolution.strategy.as_deref(), Some("direct"));
    assert_eq!(resolution.attempts, 1);
    assert_eq!(std::fs::read(&paths.pdf).unwrap(), b"%PDF-1.4 direct");
    assert!(recording.urls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_html_discovery_url_falls_through_to_universal() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/landing"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html>abstract</html>"),
        )
        .mount(&server)
        .await;

    let universal = Arc::new(RecordingStrategy::default());
    let resolver = RowResolver::new(
        Arc::new(DirectFetch::new().unwrap()),
        Arc::new(StrategyRegistry::new()),
        universal.clone(),
        fast_policy(3),
    );
    let url = format!("{}/landing", server.uri());
    let record = BibliographicRecord::new("10.1/html", "Html").with_primary(&url, Some("unknown.example"));
    let dir = TempDir::new().unwrap();

    let resolution = resolver.resolve(&record, &dir.path().join("x.pdf")).await;
    assert!(!resolution.success);
    assert!(resolution.domain.is_none());
    // One direct attempt plus one universal attempt.
    assert_eq!(resolution.attempts, 2);
    assert_eq!(*universal.urls.lock().unwrap(), vec![url]);
    assert!(!dir.path().join("x.pdf").exists());
}

#[tokio::test]
async fn test_wiley_doi_url_rewritten_before_strategy_runs() {
    let recording = Arc::new(RecordingStrategy::default());
    let mut registry = StrategyRegistry::new();
    registry.register(
        PublisherMatcher::exact("onlinelibrary.wiley.com"),
        normalize::wiley_doi_to_epdf,
        recording.clone(),
    );
    let resolver = RowResolver::new(
        Arc::new(MissStrategy),
        Arc::new(registry),
        Arc::new(MissStrategy),
        fast_policy(1),
    );
    let record = BibliographicRecord::new("10.1002/anie.202000001", "Wiley paper").with_primary(
        "https://doi.org/10.1002/anie.202000001",
        Some("onlinelibrary.wiley.com"),
    );
    let dir = TempDir::new().unwrap();

    resolver.resolve(&record, &dir.path().join("w.pdf")).await;
    assert_eq!(
        *recording.urls.lock().unwrap(),
        vec!["https://onlinelibrary.wiley.com/doi/epdf/10.1002/anie.202000001".to_string()]
    );
}

#[test]
fn test_default_registry_normalizes_wiley() {
    let registry = StrategyRegistry::with_defaults(&FetchClientOptions::default()).unwrap();
    let entry = registry.lookup("onlinelibrary.wiley.com").unwrap();
    assert_eq!(entry.strategy.name(), "wiley");
    assert_eq!(
        (entry.normalize)("https://doi.org/10.1002/abc.1"),
        "https://onlinelibrary.wiley.com/doi/epdf/10.1002/abc.1"
    );
    assert!(registry.lookup("unknown.example").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_persistent_503_with_single_attempt_budget() {
    let failing = Failing::new("HTTP 503 Service Unavailable");
    let resolver = publisher_only(failing.clone(), 1);
    let dir = TempDir::new().unwrap();

    let resolution = resolver.resolve(&publisher_record(), &dir.path().join("a.pdf")).await;
    assert!(!resolution.success);
    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    assert!(resolution.last_error.unwrap().contains("503"));
}

#[tokio::test(start_paused = true)]
async fn test_persistent_403_retries_once_regardless_of_budget() {
    let failing = Failing::new("HTTP 403 Forbidden");
    let resolver = publisher_only(failing.clone(), 5);
    let dir = TempDir::new().unwrap();

    let resolution = resolver.resolve(&publisher_record(), &dir.path().join("a.pdf")).await;
    assert!(!resolution.success);
    assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_attempted_once() {
    let failing = Failing::new("500 internal error");
    let resolver = publisher_only(failing.clone(), 5);
    let dir = TempDir::new().unwrap();

    resolver.resolve(&publisher_record(), &dir.path().join("a.pdf")).await;
    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_error_uses_full_budget() {
    let failing = Failing::new("request timeout");
    let resolver = publisher_only(failing.clone(), 4);
    let dir = TempDir::new().unwrap();

    let resolution = resolver.resolve(&publisher_record(), &dir.path().join("a.pdf")).await;
    assert_eq!(failing.calls.load(Ordering::SeqCst), 4);
    // Direct step plus four publisher attempts; universal misses once.
    assert_eq!(resolution.attempts, 1 + 4 + 1);
    assert_eq!(resolution.retries, 3);
}
