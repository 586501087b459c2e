//! HTTP client wrapper used for metadata and range requests.
//!
//! The client is created once per run and cloned into every chunk worker,
//! so all range requests share one connection pool.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::RANGE;
use tracing::{debug, instrument};
use url::Url;

use super::FetchError;
use crate::user_agent;

/// HTTP client with the run's timeouts applied.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds a client with the given per-request and connect timeouts.
    ///
    /// Response decompression is left off: range offsets must address the
    /// bytes the server stores, not a re-encoded stream.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the TLS backend or resolver
    /// cannot be initialised.
    #[instrument(level = "debug")]
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(user_agent::default_fetch_user_agent())
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self { client })
    }

    /// Sends a HEAD request. Status handling is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns the transport error if no response was received.
    pub async fn head(&self, url: &Url) -> Result<reqwest::Response, reqwest::Error> {
        debug!(url = %url, "sending HEAD");
        self.client.head(url.clone()).send().await
    }

    /// Sends a GET with a `Range` header (e.g. `bytes=0-1023`).
    ///
    /// # Errors
    ///
    /// Returns the transport error if no response was received.
    pub async fn get_range(
        &self,
        url: &Url,
        range: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .get(url.clone())
            .header(RANGE, range)
            .send()
            .await
    }
}
