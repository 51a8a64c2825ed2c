//! HTTP client wrapper for search pages and image bodies.
//!
//! This module provides the `HttpClient` struct which carries the browser
//! identity, the optional adult-filter cookie and the timeouts shared by every
//! request the crate makes.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, MAX_IMAGE_BYTES, READ_TIMEOUT_SECS};
use super::error::FetchError;
use crate::user_agent::{ADULT_FILTER_OFF_COOKIE, BROWSER_USER_AGENT};

/// Options for building an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Timeout for a whole request including the body.
    pub read_timeout: Duration,
    /// Send the cookie that disables the search backend's adult filter.
    pub adult_filter_off: bool,
    /// Largest body accepted by [`HttpClient::fetch_bytes`].
    pub max_body_bytes: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            adult_filter_off: false,
            max_body_bytes: MAX_IMAGE_BYTES,
        }
    }
}

/// HTTP client shared by the search source and the image fetcher.
///
/// This client is designed to be created once and reused for every request,
/// taking advantage of connection pooling. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    max_body_bytes: u64,
}

impl HttpClient {
    /// Creates a client with the default options (2s connect timeout, adult
    /// filter on).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_options(&ClientOptions::default())
    }

    /// Creates a client with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the TLS backend cannot be initialized.
    #[instrument(level = "debug")]
    pub fn with_options(options: &ClientOptions) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        if options.adult_filter_off {
            headers.insert(COOKIE, HeaderValue::from_static(ADULT_FILTER_OFF_COOKIE));
        }

        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.read_timeout)
            .gzip(true)
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|source| FetchError::Client { source })?;

        Ok(Self {
            client,
            max_body_bytes: options.max_body_bytes,
        })
    }

    /// Fetches a URL and returns its whole body.
    ///
    /// The body is streamed and rejected as soon as it grows past the
    /// configured cap, so a mislabeled video cannot exhaust memory.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout)
    /// - The server returns an error status (4xx, 5xx)
    /// - The body exceeds the size cap
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.send(url).await?;

        if let Some(length) = response.content_length()
            && length > self.max_body_bytes
        {
            return Err(FetchError::too_large(url, self.max_body_bytes));
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::network(url, e))?;
            if (body.len() + chunk.len()) as u64 > self.max_body_bytes {
                return Err(FetchError::too_large(url, self.max_body_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(bytes = body.len(), "body received");
        Ok(body)
    }

    /// Fetches a URL and returns its body decoded as text.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`fetch_bytes`](Self::fetch_bytes), except
    /// that no size cap is applied.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.send(url).await?;
        response.text().await.map_err(|e| FetchError::network(url, e))
    }

    async fn send(&self, url: &str) -> Result<Response, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}
