//! Universal fallback strategy for publishers without a dedicated profile.
//!
//! Two stages, tried in order:
//! 1. An interactive session: a cookie-keeping client with a browser UA that
//!    saves the URL if it is a PDF, otherwise follows PDF links on the page.
//! 2. An automated session: a headless browser renders the page (for sites
//!    that build their download links with JavaScript) and the rendered DOM
//!    is scanned for PDF links, fetched in the same cookie session.
//!
//! An error from the interactive stage does not skip the automated stage; it
//! is raised only if the automated stage saves nothing.
//!
//! Success reports the discovery URL's host as the source domain.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::http::{FetchClientOptions, build_fetch_client, fetch_pdf_to_file, is_pdf_response, save_response};
use super::links::{CITATION_PDF_RE, absolutize_url, compile_static_regex, first_capture, host_of};
use super::{FetchError, FetchOutcome, FetchStrategy};

/// Wait budget for one automated browser session.
pub const BROWSER_SESSION_BUDGET: Duration = Duration::from_secs(15);

/// How often the browser process is polled for completion.
pub const BROWSER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Browser executables probed on `PATH`, in order.
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];

static PDF_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)\bhref\s*=\s*["']([^"']+\.pdf(?:[?#][^"']*)?)["']"#)
});

/// Collects candidate PDF links from a page: `citation_pdf_url` first, then
/// every `href` ending in `.pdf`.
fn discover_pdf_links(html: &str, base: &Url) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    let citation = first_capture(html, &CITATION_PDF_RE);
    let hrefs = PDF_HREF_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()));
    for href in citation.into_iter().chain(hrefs) {
        if let Some(absolute) = absolutize_url(&href, base)
            && !links.contains(&absolute)
        {
            links.push(absolute);
        }
    }
    links
}

/// A headless browser used to render JavaScript-built pages.
#[derive(Debug, Clone)]
pub struct BrowserSession {
    executable: Option<PathBuf>,
    budget: Duration,
    poll_interval: Duration,
}

impl BrowserSession {
    /// Locates a browser: `configured` when given, else the first candidate on `PATH`.
    #[must_use]
    pub fn discover(configured: Option<PathBuf>) -> Self {
        let executable = configured.or_else(|| {
            BROWSER_CANDIDATES
                .iter()
                .find_map(|name| which::which(name).ok())
        });
        match &executable {
            Some(path) => debug!(browser = %path.display(), "automated browser session available"),
            None => debug!("no headless browser found; automated session disabled"),
        }
        Self {
            executable,
            budget: BROWSER_SESSION_BUDGET,
            poll_interval: BROWSER_POLL_INTERVAL,
        }
    }

    /// A session that never runs.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            executable: None,
            budget: BROWSER_SESSION_BUDGET,
            poll_interval: BROWSER_POLL_INTERVAL,
        }
    }

    /// Overrides the wait budget and polling interval.
    #[must_use]
    pub fn with_timing(mut self, budget: Duration, poll_interval: Duration) -> Self {
        self.budget = budget;
        self.poll_interval = poll_interval;
        self
    }

    /// Returns the browser executable, if one is configured or was found.
    #[must_use]
    pub fn executable(&self) -> Option<&Path> {
        self.executable.as_deref()
    }

    /// Renders `url` and returns the serialized DOM.
    ///
    /// Returns `Ok(None)` when no browser is available or the budget runs out.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Strategy`] when the browser cannot be started.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn render(&self, url: &str) -> Result<Option<String>, FetchError> {
        let Some(executable) = &self.executable else {
            return Ok(None);
        };

        let mut child = Command::new(executable)
            .args(["--headless", "--disable-gpu", "--no-sandbox", "--dump-dom"])
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::strategy("universal", format!("browser launch failed: {e}")))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::strategy("universal", "browser stdout unavailable"))?;
        let reader = tokio::spawn(async move {
            let mut dom = String::new();
            stdout.read_to_string(&mut dom).await.map(|_| dom)
        });

        let deadline = Instant::now() + self.budget;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "browser session finished");
                    break;
                }
                Ok(None) if Instant::now() >= deadline => {
                    warn!(budget_ms = self.budget.as_millis(), "browser session budget exhausted");
                    let _ = child.kill().await;
                    reader.abort();
                    return Ok(None);
                }
                Ok(None) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    return Err(FetchError::strategy(
                        "universal",
                        format!("browser wait failed: {e}"),
                    ));
                }
            }
        }

        match reader.await {
            Ok(Ok(dom)) => Ok(Some(dom)),
            Ok(Err(e)) => Err(FetchError::strategy(
                "universal",
                format!("reading browser output failed: {e}"),
            )),
            Err(e) => Err(FetchError::aborted("universal", e.to_string())),
        }
    }
}

/// Interactive session, then automated browser session.
#[derive(Debug, Clone)]
pub struct UniversalStrategy {
    client: Client,
    browser: BrowserSession,
}

impl UniversalStrategy {
    /// Creates the strategy with a browser-like client built from `options`.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error when client construction fails.
    pub fn new(options: &FetchClientOptions, browser: BrowserSession) -> Result<Self, reqwest::Error> {
        let options = FetchClientOptions {
            cookie_store: true,
            ..options.clone()
        };
        Ok(Self {
            client: build_fetch_client(&options)?,
            browser,
        })
    }

    async fn fetch_links(&self, links: Vec<String>, target: &Path) -> Result<bool, FetchError> {
        for link in links {
            debug!(link = %link, "trying discovered PDF link");
            match fetch_pdf_to_file(&self.client, &link, target).await {
                Ok(Some(_)) => return Ok(true),
                Ok(None) | Err(FetchError::HttpStatus { status: 404 | 410, .. }) => {}
                Err(error) => return Err(error),
            }
        }
        Ok(false)
    }

    /// Interactive stage. Returns true when the artifact was saved.
    async fn interactive(&self, url: &str, parsed: &Url, target: &Path) -> Result<bool, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }
        if is_pdf_response(&response) {
            save_response(response, url, target).await?;
            return Ok(true);
        }

        let landed = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| FetchError::network(url, e))?;
        let links = discover_pdf_links(&html, &landed);
        debug!(count = links.len(), landed = %landed, base = %parsed, "interactive session links");
        self.fetch_links(links, target).await
    }

    /// Automated stage. Returns true when the artifact was saved.
    async fn automated(&self, url: &str, parsed: &Url, target: &Path) -> Result<bool, FetchError> {
        let Some(dom) = self.browser.render(url).await? else {
            return Ok(false);
        };
        let links = discover_pdf_links(&dom, parsed);
        debug!(count = links.len(), "automated session links");
        self.fetch_links(links, target).await
    }
}

#[async_trait]
impl FetchStrategy for UniversalStrategy {
    fn name(&self) -> &'static str {
        "universal"
    }

    #[instrument(skip(self, target), fields(strategy = "universal", url = %url))]
    async fn fetch(&self, url: &str, target: &Path) -> Result<FetchOutcome, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        let interactive_error = match self.interactive(url, &parsed, target).await {
            Ok(true) => {
                info!("interactive session saved PDF");
                return Ok(FetchOutcome::saved(target, host_of(url)));
            }
            Ok(false) => {
                debug!("interactive session found no PDF, trying automated session");
                None
            }
            Err(error) => {
                warn!(error = %error, "interactive session failed, trying automated session");
                Some(error)
            }
        };

        match self.automated(url, &parsed, target).await {
            Ok(true) => {
                info!("automated session saved PDF");
                Ok(FetchOutcome::saved(target, host_of(url)))
            }
            // The interactive error is what the retry policy classifies.
            Ok(false) => interactive_error.map_or(Ok(FetchOutcome::miss()), Err),
            Err(error) => Err(interactive_error.unwrap_or(error)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn strategy() -> UniversalStrategy {
        UniversalStrategy::new(&FetchClientOptions::default(), BrowserSession::disabled()).unwrap()
    }

    #[test]
    fn test_discover_pdf_links_order_and_dedup() {
        let base = Url::parse("https://example.org/article/1").unwrap();
        let html = r#"
            <meta name="citation_pdf_url" content="https://example.org/files/a.pdf">
            <a href="/files/a.pdf">PDF</a>
            <a href="supp.pdf?download=1">Supplement</a>
            <a href="/about">About</a>
        "#;
        assert_eq!(
            discover_pdf_links(html, &base),
            vec![
                "https://example.org/files/a.pdf",
                "https://example.org/article/supp.pdf?download=1",
            ]
        );
    }

    #[test]
    fn test_disabled_browser_has_no_executable() {
        assert!(BrowserSession::disabled().executable().is_none());
    }

    #[tokio::test]
    async fn test_disabled_browser_renders_nothing() {
        let dom = BrowserSession::disabled().render("https://example.org").await.unwrap();
        assert!(dom.is_none());
    }

    #[tokio::test]
    async fn test_interactive_session_follows_pdf_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(r#"<a href="/files/paper.pdf">Download</a>"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/paper.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.3".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("paper.pdf");
        let url = format!("{}/landing", server.uri());
        let outcome = strategy().fetch(&url, &target).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.domain, host_of(&url));
        assert!(target.exists());
    }

    #[tokio::test]
    async fn test_no_pdf_anywhere_is_miss() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<p>nothing here</p>"),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let outcome = strategy()
            .fetch(&server.uri(), &dir.path().join("a.pdf"))
            .await
            .unwrap();
        assert!(!outcome.is_success());
    }

    /// Writes an executable script that prints `dom` whatever its arguments.
    #[cfg(unix)]
    fn fake_browser(dir: &Path, dom: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-chromium");
        std::fs::write(&script, format!("#!/bin/sh\ncat <<'EOF'\n{dom}\nEOF\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_automated_session_runs_after_interactive_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/p.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.3".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dom = format!(r#"<html><a href="{}/files/p.pdf">PDF</a></html>"#, server.uri());
        let browser = BrowserSession::discover(Some(fake_browser(dir.path(), &dom)))
            .with_timing(Duration::from_secs(5), Duration::from_millis(20));
        let universal = UniversalStrategy::new(&FetchClientOptions::default(), browser).unwrap();

        let target = dir.path().join("p.pdf");
        let url = format!("{}/landing", server.uri());
        let outcome = universal.fetch(&url, &target).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.domain, host_of(&url));
        assert!(target.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interactive_error_raised_when_automated_finds_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let browser = BrowserSession::discover(Some(fake_browser(dir.path(), "<p>blocked</p>")))
            .with_timing(Duration::from_secs(5), Duration::from_millis(20));
        let universal = UniversalStrategy::new(&FetchClientOptions::default(), browser).unwrap();

        let error = universal
            .fetch(&format!("{}/landing", server.uri()), &dir.path().join("a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(error, FetchError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_rate_limited_landing_raises() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let error = strategy()
            .fetch(&server.uri(), &dir.path().join("a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(error, FetchError::HttpStatus { status: 429, .. }));
    }
}
