//! Metadata resolution: one HEAD request for size and integrity tag.

use reqwest::header::{CONTENT_LENGTH, ETAG, HeaderMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use super::client::HttpClient;
use super::error::{FetchPhase, ResolveFailure};
use super::FetchError;

/// What the server told us about the file before any body transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    /// Exact size in bytes from `Content-Length`.
    pub total_size: u64,
    /// Opaque integrity token from `ETag`, quotes removed. `None` disables
    /// verification.
    pub integrity_tag: Option<String>,
}

/// Resolves size and integrity tag with a HEAD request.
///
/// # Errors
///
/// - [`FetchError::Resolution`] on transport failure, non-success status, or
///   a missing/unparseable `Content-Length`
/// - [`FetchError::Cancelled`] if `cancel` fires before the response arrives
#[instrument(skip(client, cancel), fields(url = %url))]
pub async fn resolve(
    client: &HttpClient,
    url: &Url,
    cancel: &CancellationToken,
) -> Result<RemoteMetadata, FetchError> {
    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            return Err(FetchError::Cancelled { phase: FetchPhase::Resolving });
        }
        response = client.head(url) => response,
    };

    let response = response.map_err(|e| {
        let reason = if e.is_timeout() {
            ResolveFailure::Timeout
        } else {
            ResolveFailure::Network(e)
        };
        FetchError::resolution(url.as_str(), reason)
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::resolution(
            url.as_str(),
            ResolveFailure::Status(status.as_u16()),
        ));
    }

    let headers = response.headers();
    let total_size =
        parse_content_length(headers).map_err(|reason| FetchError::resolution(url.as_str(), reason))?;
    let integrity_tag = headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .and_then(normalize_etag);

    match &integrity_tag {
        Some(tag) => info!(total_size, etag = %tag, "resolved remote metadata"),
        None => info!(total_size, "resolved remote metadata without ETag"),
    }

    Ok(RemoteMetadata {
        total_size,
        integrity_tag,
    })
}

/// Reads `Content-Length` from the header map.
///
/// The header is read directly rather than through the response body's size
/// hint, which is zero for HEAD responses.
fn parse_content_length(headers: &HeaderMap) -> Result<u64, ResolveFailure> {
    let raw = headers
        .get(CONTENT_LENGTH)
        .ok_or(ResolveFailure::MissingContentLength)?;
    let text = raw
        .to_str()
        .map_err(|_| ResolveFailure::InvalidContentLength(format!("{raw:?}")))?;
    text.trim()
        .parse::<u64>()
        .map_err(|_| ResolveFailure::InvalidContentLength(text.to_string()))
}

/// Strips the weak-validator prefix and surrounding quotes from an ETag.
///
/// Returns `None` for an empty tag.
pub(crate) fn normalize_etag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_weak = trimmed
        .strip_prefix("W/")
        .or_else(|| trimmed.strip_prefix("w/"))
        .unwrap_or(trimmed);
    let tag = without_weak.trim_matches('"').trim();
    if tag.is_empty() {
        debug!("ignoring empty ETag");
        None
    } else {
        Some(tag.to_string())
    }
}
