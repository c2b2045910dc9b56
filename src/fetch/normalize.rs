//! Publisher-specific URL normalizers.
//!
//! A normalizer rewrites a discovery URL (often a DOI-resolver link) into the
//! URL form a publisher strategy expects. Normalizers are total: input they do
//! not recognize is returned unchanged.

use url::Url;

use super::links::hosts_match;

const WILEY_HOST: &str = "onlinelibrary.wiley.com";
const SAGE_HOST: &str = "journals.sagepub.com";

/// Leaves the URL unchanged.
#[must_use]
pub fn identity(url: &str) -> String {
    url.to_string()
}

/// Returns the DOI carried by a `doi.org` / `dx.doi.org` resolver URL.
fn doi_from_resolver(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    if !(hosts_match(host, "doi.org") || hosts_match(host, "dx.doi.org")) {
        return None;
    }
    let doi = url.path().trim_start_matches('/');
    (!doi.is_empty()).then(|| doi.to_string())
}

/// Returns the path remainder after the first `marker` segment.
fn suffix_after<'a>(path: &'a str, marker: &str) -> Option<&'a str> {
    path.find(marker)
        .map(|idx| &path[idx + marker.len()..])
        .filter(|rest| !rest.is_empty())
}

/// Rewrites a DOI-resolver or Wiley article URL into the Wiley `/doi/epdf/` form.
///
/// URLs already pointing at `/doi/epdf/` or `/doi/pdfdirect/` are kept.
#[must_use]
pub fn wiley_doi_to_epdf(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if let Some(doi) = doi_from_resolver(&parsed) {
        return format!("https://{WILEY_HOST}/doi/epdf/{doi}");
    }
    let is_wiley = parsed
        .host_str()
        .is_some_and(|host| hosts_match(host, WILEY_HOST));
    if !is_wiley {
        return url.to_string();
    }
    let path = parsed.path();
    if path.contains("/doi/epdf/") || path.contains("/doi/pdfdirect/") {
        return url.to_string();
    }
    match suffix_after(path, "/doi/") {
        Some(rest) => {
            // Strip an access-type segment such as `full/` or `abs/`.
            let doi = ["full/", "abs/", "pdf/"]
                .iter()
                .find_map(|prefix| rest.strip_prefix(prefix))
                .unwrap_or(rest);
            format!("https://{WILEY_HOST}/doi/epdf/{doi}")
        }
        None => url.to_string(),
    }
}

/// Rewrites a DOI-resolver or SAGE article URL into the SAGE `/doi/epub/` form.
#[must_use]
pub fn sage_url_to_epub(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if let Some(doi) = doi_from_resolver(&parsed) {
        return format!("https://{SAGE_HOST}/doi/epub/{doi}");
    }
    let is_sage = parsed
        .host_str()
        .is_some_and(|host| hosts_match(host, SAGE_HOST));
    if !is_sage {
        return url.to_string();
    }
    let path = parsed.path();
    if path.contains("/doi/epub/") {
        return url.to_string();
    }
    if let Some(doi) = suffix_after(path, "/doi/pdf/") {
        return format!("https://{SAGE_HOST}/doi/epub/{doi}");
    }
    match suffix_after(path, "/doi/") {
        Some(doi) => format!("https://{SAGE_HOST}/doi/epub/{doi}"),
        None => url.to_string(),
    }
}
