//! Open-access download orchestration.
//!
//! Resolves bibliographic records to PDF artifacts through a chain of fetch
//! strategies, publishes the artifacts, extracts their text and records each
//! record's status.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - Fetch strategies, the publisher registry and the retry policy
//! - [`pipeline`] - Row resolver, post-fetch pipeline, aggregator and batch scheduler
//! - [`storage`] - Object stores and status document stores
//! - [`extract`] - PDF text extraction
//! - [`record`] - Input records and the local artifact layout
//! - [`db`] - SQLite connection and schema management
//! - [`api`] - HTTP entry point

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod db;
pub mod extract;
pub mod fetch;
pub mod pipeline;
pub mod record;
pub mod storage;
pub mod user_agent;

// Re-export commonly used types
pub use db::{Database, DbError};
pub use extract::{ExtractError, LopdfTextExtractor, TextExtractor};
pub use fetch::{
    BrowserSession, DirectFetch, FetchClientOptions, FetchError, FetchOutcome, FetchStrategy,
    RetryPolicy, StrategyRegistry, UniversalStrategy,
};
pub use pipeline::{
    BatchScheduler, DownloadResult, PostFetchPipeline, ResultAggregator, RowResolver,
    SchedulerError,
};
pub use record::BibliographicRecord;
pub use storage::{DocumentStore, ObjectStore};
