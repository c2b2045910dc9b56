//! Per-record pipeline and the batch scheduler that drives it.
//!
//! # Architecture
//!
//! - [`RowResolver`] - Tries strategies in priority order until one saves a PDF
//! - [`PostFetchPipeline`] - Upload, text extraction and text upload
//! - [`ResultAggregator`] - Builds the [`DownloadResult`] and persists status
//! - [`BatchScheduler`] - Bounded-concurrency batch runner

mod aggregator;
mod postfetch;
mod resolver;
mod result;
mod scheduler;

pub use aggregator::{PaperUpdate, ResultAggregator};
pub use postfetch::{PostFetchPipeline, PostFetchReport};
pub use resolver::{Resolution, RowResolver};
pub use result::{DownloadResult, STATUS_CLOSED, STATUS_OPEN};
pub use scheduler::{BatchScheduler, BatchStats, DEFAULT_CONCURRENCY, ProgressCallback, SchedulerError};
