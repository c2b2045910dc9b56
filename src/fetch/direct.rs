//! Direct fetch - a plain unauthenticated GET.
//!
//! [`DirectFetch`] is the first thing tried for every discovery URL. It
//! succeeds only when the URL answers with `application/pdf`, possibly after
//! redirects. The reported domain is always the discovery URL's host.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::http::{FetchClientOptions, build_fetch_client, fetch_pdf_to_file};
use super::links::host_of;
use super::{FetchError, FetchOutcome, FetchStrategy};

/// Whole-request budget for a direct fetch.
const DIRECT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A strategy that GETs the discovery URL and keeps the body if it is a PDF.
#[derive(Debug, Clone)]
pub struct DirectFetch {
    client: Client,
}

impl DirectFetch {
    /// Creates a direct fetcher with the default 30 second budget.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error when client construction fails.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_options(&FetchClientOptions {
            read_timeout: DIRECT_FETCH_TIMEOUT,
            ..FetchClientOptions::default()
        })
    }

    /// Creates a direct fetcher with explicit client options.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error when client construction fails.
    pub fn with_options(options: &FetchClientOptions) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_fetch_client(options)?,
        })
    }
}

#[async_trait]
impl FetchStrategy for DirectFetch {
    fn name(&self) -> &'static str {
        "direct"
    }

    #[tracing::instrument(skip(self, target), fields(strategy = "direct", url = %url))]
    async fn fetch(&self, url: &str, target: &Path) -> Result<FetchOutcome, FetchError> {
        match fetch_pdf_to_file(&self.client, url, target).await? {
            Some(_) => Ok(FetchOutcome::saved(target, host_of(url))),
            None => Ok(FetchOutcome::miss()),
        }
    }
}
