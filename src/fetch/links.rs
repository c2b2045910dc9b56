//! Shared helpers for strategies: host normalization, URL joining and link extraction.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Compiles a regex at static init; panics on invalid pattern.
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Regex for extracting `citation_pdf_url` from HTML meta tags.
pub(crate) static CITATION_PDF_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?is)<meta\s+[^>]*(?:name|property)\s*=\s*["']citation_pdf_url["'][^>]*content\s*=\s*["']([^"']+)["']"#,
    )
});

/// Normalizes a host string: trim, strip leading "www.", trailing '.', and lowercases.
#[must_use]
pub fn canonical_host(host: &str) -> String {
    host.trim()
        .trim_start_matches("www.")
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// Returns true if the two host strings refer to the same host after normalization.
#[must_use]
pub fn hosts_match(lhs: &str, rhs: &str) -> bool {
    canonical_host(lhs) == canonical_host(rhs)
}

/// Returns the network location of `url`: its host, plus the port when one is explicit.
///
/// This is the value reported as a result's source domain.
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Resolves a possibly relative URL string against a base URL.
///
/// Returns the value as-is if it already starts with `http://` or `https://`;
/// normalizes `//...` to `https:...`; otherwise joins with `base_url`.
#[must_use]
pub fn absolutize_url(value: &str, base_url: &Url) -> Option<String> {
    let value = value.replace("&amp;", "&");
    if value.starts_with("http://") || value.starts_with("https://") {
        return Some(value);
    }
    if value.starts_with("//") {
        return Some(format!("https:{value}"));
    }
    base_url.join(&value).ok().map(|url| url.to_string())
}

/// Returns the first capture of `regex` in `html`, trimmed.
#[must_use]
pub(crate) fn first_capture(html: &str, regex: &Regex) -> Option<String> {
    regex
        .captures(html)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|value| !value.is_empty())
}
