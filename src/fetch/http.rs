//! HTTP plumbing shared by strategies: client construction and streaming a
//! PDF response to disk.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use super::FetchError;
use super::links::host_of;
use crate::user_agent;

/// Default connect timeout for fetch clients.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default whole-request timeout for fetch clients.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for [`build_fetch_client`].
#[derive(Debug, Clone)]
pub struct FetchClientOptions {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub read_timeout: Duration,
    /// User-Agent header; `None` uses the tool's identifying UA.
    pub user_agent: Option<String>,
    /// Whether to keep cookies between requests (session behavior).
    pub cookie_store: bool,
}

impl Default for FetchClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            user_agent: None,
            cookie_store: false,
        }
    }
}

impl FetchClientOptions {
    /// Options for a browser-like session: cookies kept, browser UA.
    #[must_use]
    pub fn browser_session(read_timeout: Duration) -> Self {
        Self {
            read_timeout,
            user_agent: Some(user_agent::BROWSER_USER_AGENT.to_string()),
            cookie_store: true,
            ..Self::default()
        }
    }
}

/// Builds a reqwest client from `options`.
///
/// # Errors
///
/// Returns the reqwest builder error (TLS backend initialization failures).
pub fn build_fetch_client(options: &FetchClientOptions) -> Result<Client, reqwest::Error> {
    let user_agent = options
        .user_agent
        .clone()
        .unwrap_or_else(user_agent::default_fetch_user_agent);
    Client::builder()
        .connect_timeout(options.connect_timeout)
        .timeout(options.read_timeout)
        .gzip(true)
        .cookie_store(options.cookie_store)
        .user_agent(user_agent)
        .build()
}

/// Returns true if the response declares `application/pdf` (parameters ignored).
#[must_use]
pub(crate) fn is_pdf_response(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/pdf"))
}

/// GETs `url` and saves the body at `target` when it is a PDF.
///
/// Returns the serving host when a PDF was saved and `None` when the
/// server answered 2xx with something other than a PDF.
///
/// # Errors
///
/// Raises for network failures, non-2xx statuses and write failures, so the
/// retry policy can classify them.
#[instrument(skip(client, target), fields(url = %url))]
pub async fn fetch_pdf_to_file(
    client: &Client,
    url: &str,
    target: &Path,
) -> Result<Option<String>, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::network(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::http_status(url, status.as_u16()));
    }
    if !is_pdf_response(&response) {
        debug!(%status, "response is not a PDF");
        return Ok(None);
    }

    let final_url = response.url().to_string();
    save_response(response, url, target).await?;
    Ok(host_of(&final_url).or_else(|| host_of(url)))
}

/// Streams `response` into `target`, removing the partial file on failure.
pub(crate) async fn save_response(
    response: Response,
    url: &str,
    target: &Path,
) -> Result<u64, FetchError> {
    let mut file = File::create(target)
        .await
        .map_err(|e| FetchError::io(target, e))?;

    let result = stream_to_file(&mut file, response, url, target).await;
    if result.is_err() {
        debug!(path = %target.display(), "cleaning up partial file after error");
        let _ = tokio::fs::remove_file(target).await;
    }
    result
}

async fn stream_to_file(
    file: &mut File,
    response: Response,
    url: &str,
    target: &Path,
) -> Result<u64, FetchError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| FetchError::network(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| FetchError::io(target, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| FetchError::io(target, e))?;
    debug!(bytes_written, path = %target.display(), "artifact saved");
    Ok(bytes_written)
}
