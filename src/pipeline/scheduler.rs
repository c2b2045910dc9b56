//! Batch scheduler: runs one record pipeline per record under a concurrency bound.
//!
//! # Concurrency Model
//!
//! - A semaphore of the configured capacity is created per batch run
//! - A permit is acquired before a record's task is spawned
//! - The permit is held until resolve, post-fetch and persistence all finish (RAII)
//! - Results are returned in input order regardless of completion order
//!
//! Records that repeat an id seen earlier in the batch are not processed
//! again; they receive a copy of the first occurrence's result.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::aggregator::ResultAggregator;
use super::postfetch::{PostFetchPipeline, PostFetchReport};
use super::resolver::RowResolver;
use super::result::DownloadResult;
use crate::record::{ArtifactPaths, BibliographicRecord};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Callback invoked as each record's pipeline completes.
pub type ProgressCallback = Arc<dyn Fn(&DownloadResult) + Send + Sync>;

/// Error type for batch-level failures.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The output directory could not be created.
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        /// The directory path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Statistics from a batch run.
///
/// Uses atomic counters for updates from concurrent record tasks.
#[derive(Debug, Default)]
pub struct BatchStats {
    fetched: AtomicUsize,
    not_fetched: AtomicUsize,
    retried: AtomicUsize,
    stage_failures: AtomicUsize,
}

impl BatchStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records whose PDF was fetched.
    #[must_use]
    pub fn fetched(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }

    /// Returns the number of records no strategy could fetch.
    #[must_use]
    pub fn not_fetched(&self) -> usize {
        self.not_fetched.load(Ordering::SeqCst)
    }

    /// Returns the number of retry attempts made.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Returns the number of post-fetch or persistence stages that failed.
    #[must_use]
    pub fn stage_failures(&self) -> usize {
        self.stage_failures.load(Ordering::SeqCst)
    }

    /// Returns the total number of records processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.fetched() + self.not_fetched()
    }
}

/// Shared per-run context cloned into each record task.
#[derive(Debug, Clone)]
struct RecordContext {
    resolver: Arc<RowResolver>,
    postfetch: Arc<PostFetchPipeline>,
    aggregator: Arc<ResultAggregator>,
    output_dir: PathBuf,
    stats: Arc<BatchStats>,
}

impl RecordContext {
    /// Resolve, post-fetch and persist one record.
    #[instrument(skip(self, record), fields(id = %record.id))]
    async fn process(&self, record: &BibliographicRecord) -> DownloadResult {
        let paths = ArtifactPaths::for_record(&self.output_dir, record);
        let resolution = self.resolver.resolve(record, &paths.pdf).await;

        let retries = usize::try_from(resolution.retries).unwrap_or(usize::MAX);
        self.stats.retried.fetch_add(retries, Ordering::SeqCst);

        let report = match resolution.path.as_deref() {
            Some(pdf) if resolution.success => self.postfetch.run(pdf, &paths.text).await,
            _ => PostFetchReport::default(),
        };

        let result = self.aggregator.finalize(record, resolution, report).await;

        if result.success {
            self.stats.fetched.fetch_add(1, Ordering::SeqCst);
        } else {
            self.stats.not_fetched.fetch_add(1, Ordering::SeqCst);
        }
        self.stats
            .stage_failures
            .fetch_add(result.stage_error_count(), Ordering::SeqCst);

        result
    }
}

/// Runs record pipelines for a batch with bounded concurrency.
#[derive(Debug)]
pub struct BatchScheduler {
    resolver: Arc<RowResolver>,
    postfetch: Arc<PostFetchPipeline>,
    aggregator: Arc<ResultAggregator>,
    output_dir: PathBuf,
    concurrency: usize,
}

impl BatchScheduler {
    /// Creates a scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConcurrency`] if `concurrency` is
    /// outside 1..=100.
    #[instrument(level = "debug", skip(resolver, postfetch, aggregator))]
    pub fn new(
        resolver: Arc<RowResolver>,
        postfetch: Arc<PostFetchPipeline>,
        aggregator: Arc<ResultAggregator>,
        output_dir: PathBuf,
        concurrency: usize,
    ) -> Result<Self, SchedulerError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(SchedulerError::InvalidConcurrency { value: concurrency });
        }
        debug!(
            concurrency,
            max_retries = resolver.retry_policy().max_attempts(),
            "creating batch scheduler"
        );
        Ok(Self {
            resolver,
            postfetch,
            aggregator,
            output_dir,
            concurrency,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the working directory for local artifacts.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Runs the batch and returns one result per input record, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::OutputDir`] if the output directory cannot be
    /// created, or [`SchedulerError::SemaphoreClosed`] if the permit pool closes.
    /// Individual record failures never fail the batch.
    pub async fn run(&self, records: Vec<BibliographicRecord>) -> Result<Vec<DownloadResult>, SchedulerError> {
        self.run_with_progress(records, None).await
    }

    /// Like [`run`](Self::run), invoking `progress` as each record completes.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    #[instrument(skip(self, records, progress), fields(records = records.len(), concurrency = self.concurrency))]
    pub async fn run_with_progress(
        &self,
        records: Vec<BibliographicRecord>,
        progress: Option<ProgressCallback>,
    ) -> Result<Vec<DownloadResult>, SchedulerError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| SchedulerError::OutputDir {
                path: self.output_dir.clone(),
                source,
            })?;

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let stats = Arc::new(BatchStats::new());
        let context = RecordContext {
            resolver: Arc::clone(&self.resolver),
            postfetch: Arc::clone(&self.postfetch),
            aggregator: Arc::clone(&self.aggregator),
            output_dir: self.output_dir.clone(),
            stats: Arc::clone(&stats),
        };

        info!("starting batch");

        // Index of the first occurrence of each id.
        let mut first_seen: HashMap<String, usize> = HashMap::new();
        let mut sources: Vec<usize> = Vec::with_capacity(records.len());
        let mut handles = Vec::new();

        for (index, record) in records.iter().enumerate() {
            if let Some(&first) = first_seen.get(&record.id) {
                debug!(id = %record.id, first, index, "duplicate id; reusing first result");
                sources.push(first);
                continue;
            }
            first_seen.insert(record.id.clone(), index);
            sources.push(index);

            // Acquire before spawning so at most `concurrency` pipelines exist.
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| SchedulerError::SemaphoreClosed)?;

            let context = context.clone();
            let record = record.clone();
            let progress = progress.clone();
            handles.push((
                index,
                tokio::spawn(async move {
                    // Permit is dropped when this block exits (RAII)
                    let _permit = permit;
                    let result = context.process(&record).await;
                    if let Some(callback) = progress {
                        callback(&result);
                    }
                    result
                }),
            ));
        }

        let mut computed: HashMap<usize, DownloadResult> = HashMap::with_capacity(handles.len());
        for (index, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    warn!(index, error = %join_error, "record task aborted");
                    stats.not_fetched.fetch_add(1, Ordering::SeqCst);
                    let mut failed = DownloadResult::failed(&records[index]);
                    failed.fetch_error = Some(format!("record task aborted: {join_error}"));
                    failed
                }
            };
            computed.insert(index, result);
        }

        let results: Vec<DownloadResult> = sources
            .iter()
            .enumerate()
            .map(|(index, source)| match computed.get(source) {
                Some(result) => result.clone(),
                None => DownloadResult::failed(&records[index]),
            })
            .collect();

        info!(
            fetched = stats.fetched(),
            not_fetched = stats.not_fetched(),
            retried = stats.retried(),
            stage_failures = stats.stage_failures(),
            "batch complete"
        );

        Ok(results)
    }
}
