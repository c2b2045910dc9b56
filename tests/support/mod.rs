//! Shared fakes and fixtures for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use oa_downloader_core::extract::LopdfTextExtractor;
use oa_downloader_core::fetch::{
    FetchError, FetchOutcome, FetchStrategy, RetryPolicy, StrategyRegistry,
};
use oa_downloader_core::pipeline::{
    BatchScheduler, PostFetchPipeline, ResultAggregator, RowResolver,
};
use oa_downloader_core::storage::{
    DocumentStore, LocalObjectStore, MemoryDocumentStore, ObjectStore, StorageError,
    UploadedObject,
};

/// Builds a one-page PDF whose page draws `text`.
pub fn pdf_bytes(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("encode content"),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize pdf");
    bytes
}

/// Strategy that never finds anything.
pub struct MissStrategy;

#[async_trait]
impl FetchStrategy for MissStrategy {
    fn name(&self) -> &str {
        "miss"
    }

    async fn fetch(&self, _url: &str, _target: &Path) -> Result<FetchOutcome, FetchError> {
        Ok(FetchOutcome::miss())
    }
}

/// Strategy that records every URL it is invoked with and then misses.
#[derive(Default)]
pub struct RecordingStrategy {
    pub urls: Mutex<Vec<String>>,
}

#[async_trait]
impl FetchStrategy for RecordingStrategy {
    fn name(&self) -> &str {
        "recording"
    }

    async fn fetch(&self, url: &str, _target: &Path) -> Result<FetchOutcome, FetchError> {
        self.urls.lock().expect("urls lock").push(url.to_string());
        Ok(FetchOutcome::miss())
    }
}

/// Strategy that holds each fetch for `hold`, tracking peak concurrency,
/// then writes a small file and reports success.
pub struct SlowStrategy {
    pub hold: Duration,
    /// Hold with `std::thread::sleep` instead of an async sleep.
    pub blocking: bool,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl SlowStrategy {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            blocking: false,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn blocking(hold: Duration) -> Self {
        Self {
            blocking: true,
            ..Self::new(hold)
        }
    }
}

#[async_trait]
impl FetchStrategy for SlowStrategy {
    fn name(&self) -> &str {
        "slow"
    }

    async fn fetch(&self, _url: &str, target: &Path) -> Result<FetchOutcome, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if self.blocking {
            std::thread::sleep(self.hold);
        } else {
            tokio::time::sleep(self.hold).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        tokio::fs::write(target, b"%PDF-1.4\n")
            .await
            .map_err(|e| FetchError::io(target, e))?;
        Ok(FetchOutcome::saved(target, Some("slow.example".to_string())))
    }
}

/// Object store whose uploads always fail.
pub struct FailingObjectStore;

#[async_trait]
impl ObjectStore for FailingObjectStore {
    async fn upload(&self, _bucket: &str, _local: &Path) -> Result<UploadedObject, StorageError> {
        Err(StorageError::Rejected {
            status: 503,
            message: "storage unavailable".to_string(),
        })
    }
}

/// Collaborators for assembling a scheduler in tests.
pub struct Harness {
    pub direct: Arc<dyn FetchStrategy>,
    pub registry: StrategyRegistry,
    pub universal: Arc<dyn FetchStrategy>,
    pub object_store: Arc<dyn ObjectStore>,
    pub document_store: Arc<dyn DocumentStore>,
    pub max_retries: u32,
}

impl Harness {
    /// Everything misses; uploads go to a local store under `root`.
    pub fn new(root: &Path) -> Self {
        Self {
            direct: Arc::new(MissStrategy),
            registry: StrategyRegistry::new(),
            universal: Arc::new(MissStrategy),
            object_store: Arc::new(LocalObjectStore::new(
                root.join("published"),
                "https://files.example",
            )),
            document_store: Arc::new(MemoryDocumentStore::new()),
            max_retries: 1,
        }
    }

    pub fn scheduler(self, output_dir: &Path, concurrency: usize) -> BatchScheduler {
        let resolver = RowResolver::new(
            self.direct,
            Arc::new(self.registry),
            self.universal,
            RetryPolicy::new(self.max_retries, Duration::from_millis(1))
                .with_delays(Duration::ZERO, Duration::ZERO),
        );
        let postfetch = PostFetchPipeline::new(
            self.object_store,
            Arc::new(LopdfTextExtractor),
            "test-bucket",
        );
        BatchScheduler::new(
            Arc::new(resolver),
            Arc::new(postfetch),
            Arc::new(ResultAggregator::new(self.document_store)),
            output_dir.to_path_buf(),
            concurrency,
        )
        .expect("valid concurrency")
    }
}
