//! User-Agent string sent with every request.

/// Project URL for User-Agent identification (RFC 9308 good citizenship).
const PROJECT_UA_URL: &str = "https://github.com/fierce/chunkfetch";

/// Default User-Agent for metadata and range requests.
#[must_use]
pub(crate) fn default_fetch_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("chunkfetch/{version} (+{PROJECT_UA_URL})")
}
