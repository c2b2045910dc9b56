//! Publisher strategies: landing-page PDF discovery configured per publisher.
//!
//! Each publisher is described by a [`PublisherProfile`]:
//! - direct candidates derived from the URL shape (e.g. arXiv `/abs/` → `/pdf/`),
//! - link patterns matched against the landing page's `<a>` tags,
//! - hosts that mean "no access" when a request lands on them.
//!
//! [`PublisherStrategy`] runs one profile: candidates first, then the landing
//! page, then every discovered link in pattern order, then `citation_pdf_url`.

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use super::http::{FetchClientOptions, build_fetch_client, fetch_pdf_to_file, is_pdf_response, save_response};
use super::links::{CITATION_PDF_RE, absolutize_url, compile_static_regex, first_capture, host_of, hosts_match};
use super::{FetchError, FetchOutcome, FetchStrategy};

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"(?is)\bhref\s*=\s*["']([^"']+)["']"#));

/// Static description of how to get a PDF out of one publisher's site.
#[derive(Debug, Clone)]
pub struct PublisherProfile {
    /// Strategy name used in logs and results (e.g. "wiley").
    pub name: &'static str,
    /// Publisher identifier (host) this profile is registered under.
    pub publisher_id: &'static str,
    /// Fixed domain to report on success; `None` reports the PDF's host.
    pub domain_label: Option<&'static str>,
    /// Regexes matching whole `<a ...>` opening tags that link to the PDF.
    pub link_tags: Vec<Regex>,
    /// URLs to try before loading the landing page.
    pub direct_candidates: fn(&Url) -> Vec<String>,
    /// Landing on one of these hosts without a PDF means no access.
    pub no_access_hosts: &'static [&'static str],
}

fn no_candidates(_url: &Url) -> Vec<String> {
    Vec::new()
}

/// Replaces the first occurrence of `from` in the URL path with `to`.
fn swap_path_segment(url: &Url, from: &str, to: &str, suffix: &str) -> Vec<String> {
    let path = url.path();
    if !path.contains(from) {
        return Vec::new();
    }
    let mut candidate = url.clone();
    candidate.set_path(&format!("{}{suffix}", path.replacen(from, to, 1)));
    candidate.set_query(None);
    vec![candidate.to_string()]
}

fn wiley_candidates(url: &Url) -> Vec<String> {
    let mut candidates = swap_path_segment(url, "/doi/epdf/", "/doi/pdfdirect/", "");
    for candidate in &mut candidates {
        candidate.push_str("?download=true");
    }
    candidates
}

fn springer_candidates(url: &Url) -> Vec<String> {
    let path = url.path();
    if path.contains("/content/pdf/") {
        return vec![url.to_string()];
    }
    ["/article/", "/chapter/"]
        .iter()
        .find_map(|segment| {
            let found = swap_path_segment(url, segment, "/content/pdf/", ".pdf");
            (!found.is_empty()).then_some(found)
        })
        .unwrap_or_default()
}

fn sage_candidates(url: &Url) -> Vec<String> {
    let mut candidates = swap_path_segment(url, "/doi/epub/", "/doi/pdf/", "");
    for candidate in &mut candidates {
        candidate.push_str("?download=true");
    }
    candidates
}

fn arxiv_candidates(url: &Url) -> Vec<String> {
    swap_path_segment(url, "/abs/", "/pdf/", "")
}

fn tags(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| compile_static_regex(p)).collect()
}

/// Returns the built-in publisher profiles.
#[must_use]
pub fn default_publisher_profiles() -> Vec<PublisherProfile> {
    vec![
        PublisherProfile {
            name: "wiley",
            publisher_id: "onlinelibrary.wiley.com",
            domain_label: Some("onlinelibrary.wiley.com"),
            link_tags: tags(&[
                r#"(?is)<a\b[^>]*\bnavbar-download\b[^>]*>"#,
                r#"(?is)<a\b[^>]*\bpdf-download\b[^>]*>"#,
            ]),
            direct_candidates: wiley_candidates,
            no_access_hosts: &[],
        },
        PublisherProfile {
            name: "elsevier",
            publisher_id: "linkinghub.elsevier.com",
            domain_label: None,
            link_tags: tags(&[r#"(?is)<a\b[^>]*aria-label\s*=\s*["']View PDF[^>]*>"#]),
            direct_candidates: no_candidates,
            no_access_hosts: &[],
        },
        PublisherProfile {
            name: "springer",
            publisher_id: "link.springer.com",
            domain_label: None,
            link_tags: tags(&[r#"(?is)<a\b[^>]*\bc-pdf-download__link\b[^>]*>"#]),
            direct_candidates: springer_candidates,
            no_access_hosts: &[],
        },
        PublisherProfile {
            name: "sage",
            publisher_id: "journals.sagepub.com",
            domain_label: Some("journals.sagepub.com"),
            link_tags: tags(&[r#"(?is)<a\b[^>]*\bformat-download-btn\b[^>]*>"#]),
            direct_candidates: sage_candidates,
            no_access_hosts: &[],
        },
        PublisherProfile {
            name: "pmc",
            publisher_id: "pmc.ncbi.nlm.nih.gov",
            domain_label: None,
            link_tags: tags(&[r#"(?is)<a\b[^>]*href\s*=\s*["'][^"']+\.pdf["'][^>]*>"#]),
            direct_candidates: no_candidates,
            no_access_hosts: &[],
        },
        PublisherProfile {
            name: "arxiv",
            publisher_id: "arxiv.org",
            domain_label: None,
            link_tags: tags(&[r#"(?is)<a\b[^>]*\bdownload-pdf\b[^>]*>"#]),
            direct_candidates: arxiv_candidates,
            no_access_hosts: &[],
        },
        PublisherProfile {
            name: "oup",
            publisher_id: "academic.oup.com",
            domain_label: None,
            link_tags: Vec::new(),
            direct_candidates: no_candidates,
            no_access_hosts: &["academic.oup.com"],
        },
    ]
}

/// A [`FetchStrategy`] driven by a [`PublisherProfile`].
#[derive(Debug, Clone)]
pub struct PublisherStrategy {
    profile: PublisherProfile,
    client: Client,
}

impl PublisherStrategy {
    /// Creates a strategy for `profile` using a client built from `options`.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error when client construction fails.
    pub fn new(profile: PublisherProfile, options: &FetchClientOptions) -> Result<Self, reqwest::Error> {
        Ok(Self {
            profile,
            client: build_fetch_client(options)?,
        })
    }

    /// Returns the profile this strategy runs.
    #[must_use]
    pub fn profile(&self) -> &PublisherProfile {
        &self.profile
    }

    fn report_domain(&self, pdf_host: Option<String>) -> Option<String> {
        self.profile
            .domain_label
            .map(str::to_string)
            .or(pdf_host)
    }

    /// Tries one candidate PDF URL. Missing candidates (404/410) are not errors.
    async fn try_candidate(&self, url: &str, target: &Path) -> Result<Option<String>, FetchError> {
        match fetch_pdf_to_file(&self.client, url, target).await {
            Ok(host) => Ok(host),
            Err(FetchError::HttpStatus { status: 404 | 410, .. }) => {
                debug!(url, "candidate not found");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Collects PDF links from `html` in pattern order, deduplicated.
    fn discover_links(&self, html: &str, base: &Url) -> Vec<String> {
        let mut links: Vec<String> = Vec::new();
        let tag_hrefs = self.profile.link_tags.iter().flat_map(|pattern| {
            pattern
                .find_iter(html)
                .filter_map(|tag| first_capture(tag.as_str(), &HREF_RE))
                .collect::<Vec<_>>()
        });
        let citation = first_capture(html, &CITATION_PDF_RE);
        for href in tag_hrefs.chain(citation) {
            if let Some(absolute) = absolutize_url(&href, base)
                && !links.contains(&absolute)
            {
                links.push(absolute);
            }
        }
        links
    }
}

#[async_trait]
impl FetchStrategy for PublisherStrategy {
    fn name(&self) -> &str {
        self.profile.name
    }

    #[instrument(skip(self, target), fields(strategy = self.profile.name, url = %url))]
    async fn fetch(&self, url: &str, target: &Path) -> Result<FetchOutcome, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        for candidate in (self.profile.direct_candidates)(&parsed) {
            debug!(candidate = %candidate, "trying direct candidate");
            if let Some(host) = self.try_candidate(&candidate, target).await? {
                return Ok(FetchOutcome::saved(target, self.report_domain(Some(host))));
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;
        let status = response.status();
        if status.as_u16() == 403 || status.as_u16() == 429 || status.is_server_error() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }
        if !status.is_success() {
            debug!(%status, "landing page unavailable");
            return Ok(FetchOutcome::miss());
        }

        let landed = response.url().clone();
        if is_pdf_response(&response) {
            save_response(response, url, target).await?;
            let host = host_of(landed.as_str());
            return Ok(FetchOutcome::saved(target, self.report_domain(host)));
        }

        let landed_host = landed.host_str().unwrap_or_default();
        if self
            .profile
            .no_access_hosts
            .iter()
            .any(|host| hosts_match(host, landed_host))
        {
            debug!(landed = %landed, "landed on abstract page; no access");
            return Ok(FetchOutcome::miss());
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::network(url, e))?;
        for link in self.discover_links(&html, &landed) {
            debug!(link = %link, "trying discovered PDF link");
            if let Some(host) = self.try_candidate(&link, target).await? {
                return Ok(FetchOutcome::saved(target, self.report_domain(Some(host))));
            }
        }

        debug!("no PDF link found on landing page");
        Ok(FetchOutcome::miss())
    }
}
