//! Bing image search as a [`CandidateSource`].
//!
//! Each page is requested from the asynchronous image results endpoint and
//! parsed with `scraper`: every `div.imgpt > a[m]` element carries a JSON
//! `m` attribute holding the full-size image URL (`murl`), a description
//! (`desc`) and the page title (`t`).

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::fetch::{Candidate, FetchError, HttpClient};
use crate::session::{CandidateSource, FilterSpec};

/// Endpoint serving result pages as HTML fragments.
pub const DEFAULT_BASE_URL: &str = "https://www.bing.com/images/async";

/// Results requested per page.
pub const PAGE_SIZE: usize = 35;

const RESULT_SELECTOR: &str = "div.imgpt > a[m]";

/// Errors from the search source.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The results page could not be fetched.
    #[error("search request failed: {0}")]
    Request(#[from] FetchError),

    /// A CSS selector failed to parse.
    #[error("invalid result selector: {0}")]
    Selector(String),
}

/// Metadata embedded in each result anchor.
#[derive(Debug, Deserialize)]
struct ResultMeta {
    murl: Option<String>,
    desc: Option<String>,
    t: Option<String>,
}

/// Bing image search client.
#[derive(Debug, Clone)]
pub struct BingSearch {
    client: HttpClient,
    base_url: String,
}

impl BingSearch {
    /// Creates a search source against the public endpoint.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    /// Creates a search source against another endpoint (used by tests).
    #[must_use]
    pub fn with_base_url(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Builds the request URL for one page.
    ///
    /// The keyword is form-encoded; the filter value is appended verbatim since
    /// filter expressions use `+` as a separator.
    #[must_use]
    pub fn page_url(&self, keyword: &str, offset: usize, filters: &FilterSpec) -> String {
        let query = urlencoding::encode(keyword).replace("%20", "+");
        format!(
            "{}?q={query}&first={offset}&count={PAGE_SIZE}&qft={}",
            self.base_url,
            filters.query_value()
        )
    }
}

#[async_trait]
impl CandidateSource for BingSearch {
    #[instrument(skip(self, filters), fields(source = "bing"))]
    async fn next_batch(
        &self,
        keyword: &str,
        offset: usize,
        filters: &FilterSpec,
    ) -> Result<Vec<Candidate>, SearchError> {
        let url = self.page_url(keyword, offset, filters);
        let html = self.client.fetch_text(&url).await?;
        let candidates = parse_results(&html)?;
        debug!(candidates = candidates.len(), "results page parsed");
        Ok(candidates)
    }
}

/// Extracts candidates from a results page, in page order.
///
/// Anchors whose metadata is not valid JSON or has no image URL are skipped.
///
/// # Errors
///
/// Returns [`SearchError::Selector`] if the result selector fails to parse.
pub fn parse_results(html: &str) -> Result<Vec<Candidate>, SearchError> {
    let selector = Selector::parse(RESULT_SELECTOR)
        .map_err(|e| SearchError::Selector(format!("{RESULT_SELECTOR}: {e:?}")))?;
    let document = Html::parse_document(html);

    let candidates = document
        .select(&selector)
        .filter_map(|anchor| anchor.value().attr("m"))
        .filter_map(|raw| match serde_json::from_str::<ResultMeta>(raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                debug!(error = %e, "skipping result with malformed metadata");
                None
            }
        })
        .filter_map(|meta| {
            let url = meta.murl.filter(|url| !url.trim().is_empty())?;
            Some(Candidate {
                url,
                suggested_name: display_name(meta.desc.as_deref(), meta.t.as_deref()),
            })
        })
        .collect();
    Ok(candidates)
}

/// `"<desc> - <title>"`, dropping whichever part is missing or blank.
fn display_name(desc: Option<&str>, title: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [desc, title]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" - "))
    }
}
