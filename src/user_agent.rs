//! Shared User-Agent strings for fetch traffic.
//!
//! Direct fetches and publisher strategies identify the tool; the universal
//! strategy's interactive session presents itself as a desktop browser.

/// Project URL for User-Agent identification (RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/oa-downloader";

/// Browser User-Agent used by interactive sessions.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Default User-Agent for fetch requests (identifies the tool).
#[must_use]
pub(crate) fn default_fetch_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("oa-downloader/{version} (open-access-research-tool; +{PROJECT_UA_URL})")
}
