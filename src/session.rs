//! Resumable per-keyword download session.
//!
//! A [`Session`] pages candidates out of a [`CandidateSource`] and hands each
//! one to the worker pool as an image fetch. Paging stops when the source runs
//! dry (an empty page, or the same page twice), when the ledger holds as many
//! URLs as the save limit allows, or when the cancellation token fires. The
//! session always waits for the jobs it dispatched before returning, except
//! on cancellation, where running fetches are aborted and the ledger is
//! snapshotted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::fetch::{
    Candidate, FetchError, FetchOutcome, ImageFetcher, SkipReason, sweep_partial_files,
};
use crate::pool::{DEFAULT_WORKERS, PoolError, WorkerPool};
use crate::search::SearchError;

/// Delay before each page request if not specified.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(100);

/// Filter suffix that restricts results to animated GIFs.
const ANIMATED_GIF_FILTER: &str = "+filterui:photo-animatedgif";

/// A paged source of image candidates for a keyword.
///
/// Implementations return one page per call; `offset` is the number of
/// candidates already returned for this keyword.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Returns the page of candidates starting at `offset`.
    async fn next_batch(
        &self,
        keyword: &str,
        offset: usize,
        filters: &FilterSpec,
    ) -> Result<Vec<Candidate>, SearchError>;
}

/// Search filter settings passed through to the candidate source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// Raw filter expression, passed on verbatim.
    pub extra: Option<String>,
    /// Restrict results to animated GIFs.
    pub animated_only: bool,
}

impl FilterSpec {
    /// Renders the filter query value: the extra expression followed by the
    /// animated GIF filter when requested.
    #[must_use]
    pub fn query_value(&self) -> String {
        let mut value = self.extra.clone().unwrap_or_default();
        if self.animated_only {
            value.push_str(ANIMATED_GIF_FILTER);
        }
        value
    }
}

/// Cap on the number of URLs recorded in the ledger.
///
/// The count includes URLs restored from earlier runs and URLs recorded by
/// earlier keywords sharing the same ledger, so a resumed run whose history
/// already holds `limit` entries saves nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveLimit {
    limit: Option<usize>,
}

impl SaveLimit {
    /// Creates a limit; `None` means unlimited.
    #[must_use]
    pub fn new(limit: Option<usize>) -> Self {
        Self { limit }
    }

    /// Creates a limit that is never reached.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// True once `attempted` recorded URLs meet the limit.
    #[must_use]
    pub fn is_reached(&self, attempted: usize) -> bool {
        self.limit.is_some_and(|limit| attempted >= limit)
    }
}

/// Per-outcome counters for a session.
///
/// All counters are atomic so workers can update them concurrently.
#[derive(Debug, Default)]
pub struct FetchStats {
    dispatched: AtomicUsize,
    saved: AtomicUsize,
    already_tried: AtomicUsize,
    invalid_image: AtomicUsize,
    duplicate_content: AtomicUsize,
    already_on_disk: AtomicUsize,
    limit_reached: AtomicUsize,
    failed: AtomicUsize,
}

impl FetchStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidates handed to the pool.
    #[must_use]
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Images written.
    #[must_use]
    pub fn saved(&self) -> usize {
        self.saved.load(Ordering::SeqCst)
    }

    /// Fetches that ended in an error.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Candidates skipped for any reason.
    #[must_use]
    pub fn skipped(&self) -> usize {
        [
            &self.already_tried,
            &self.invalid_image,
            &self.duplicate_content,
            &self.already_on_disk,
            &self.limit_reached,
        ]
        .iter()
        .map(|counter| counter.load(Ordering::SeqCst))
        .sum()
    }

    fn increment_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
    }

    fn record_skip(&self, reason: &SkipReason) {
        let counter = match reason {
            SkipReason::AlreadyTried => &self.already_tried,
            SkipReason::InvalidImage => &self.invalid_image,
            SkipReason::DuplicateContent { .. } => &self.duplicate_content,
            SkipReason::AlreadySavedOnDisk { .. } => &self.already_on_disk,
            SkipReason::LimitReached => &self.limit_reached,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn record(&self, result: &Result<FetchOutcome, FetchError>) {
        match result {
            Ok(FetchOutcome::Saved { .. }) => {
                self.saved.fetch_add(1, Ordering::SeqCst);
            }
            Ok(FetchOutcome::Skipped(reason)) => self.record_skip(reason),
            Err(_) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn report(&self, keyword: &str) -> SessionReport {
        SessionReport {
            keyword: keyword.to_string(),
            dispatched: self.dispatched(),
            saved: self.saved(),
            skipped_already_tried: self.already_tried.load(Ordering::SeqCst),
            skipped_invalid_image: self.invalid_image.load(Ordering::SeqCst),
            skipped_duplicate: self.duplicate_content.load(Ordering::SeqCst),
            skipped_on_disk: self.already_on_disk.load(Ordering::SeqCst),
            skipped_limit: self.limit_reached.load(Ordering::SeqCst),
            failed: self.failed(),
            ..SessionReport::default()
        }
    }
}

/// What a session did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// The keyword searched.
    pub keyword: String,
    /// Candidates handed to the pool.
    pub dispatched: usize,
    /// Images written.
    pub saved: usize,
    /// Skipped: URL already attempted in an earlier session.
    pub skipped_already_tried: usize,
    /// Skipped: body was not an image.
    pub skipped_invalid_image: usize,
    /// Skipped: content already saved under another name.
    pub skipped_duplicate: usize,
    /// Skipped: identical file already on disk.
    pub skipped_on_disk: usize,
    /// Skipped: save limit reached.
    pub skipped_limit: usize,
    /// Fetches that ended in an error.
    pub failed: usize,
    /// Highest number of fetches running at once.
    pub peak_in_flight: usize,
    /// The save limit was reached.
    pub limit_reached: bool,
    /// The session was cancelled before finishing.
    pub interrupted: bool,
}

impl SessionReport {
    /// Candidates skipped for any reason.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped_already_tried
            + self.skipped_invalid_image
            + self.skipped_duplicate
            + self.skipped_on_disk
            + self.skipped_limit
    }
}

/// Error type for session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The worker pool could not be started or stopped accepting jobs.
    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Downloads the images for one keyword into one directory.
pub struct Session {
    source: Arc<dyn CandidateSource>,
    fetcher: ImageFetcher,
    workers: usize,
    page_delay: Duration,
    cancel: CancellationToken,
    checkpoint: Option<PathBuf>,
}

impl Session {
    /// Creates a session with 20 workers, a 100ms page delay, no
    /// cancellation and no checkpoint.
    #[must_use]
    pub fn new(source: Arc<dyn CandidateSource>, fetcher: ImageFetcher) -> Self {
        Self {
            source,
            fetcher,
            workers: DEFAULT_WORKERS,
            page_delay: DEFAULT_PAGE_DELAY,
            cancel: CancellationToken::new(),
            checkpoint: None,
        }
    }

    /// Sets the worker count (validated when the session runs).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the delay before each page request.
    #[must_use]
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Sets the token that interrupts the session.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sets where the ledger is snapshotted on interruption.
    #[must_use]
    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint = Some(path.into());
        self
    }

    /// Runs the session for `keyword`, saving into `output_dir` (which must
    /// exist).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pool`] if the worker count is invalid. Per-fetch
    /// failures and candidate source failures are logged, not returned.
    #[instrument(skip(self, output_dir, filters), fields(dir = %output_dir.display()))]
    pub async fn run(
        &self,
        keyword: &str,
        output_dir: &Path,
        filters: &FilterSpec,
        limit: Option<usize>,
    ) -> Result<SessionReport, SessionError> {
        let pool = WorkerPool::new(self.workers)?;
        match sweep_partial_files(output_dir).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "removed partial files from an aborted run"),
            Err(e) => warn!(error = %e, "failed to sweep partial files"),
        }
        let in_flight = pool.in_flight().clone();
        let limit = SaveLimit::new(limit);
        let stats = Arc::new(FetchStats::new());

        let mut offset = 0;
        let mut previous: Option<Vec<Candidate>> = None;
        let mut interrupted = false;

        loop {
            if self.limit_reached(limit).await {
                debug!("save limit reached, no more pages");
                break;
            }

            let page = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    interrupted = true;
                    break;
                }
                page = self.next_page(keyword, offset, filters) => page,
            };

            let batch = match page {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(offset, error = %e, "candidate source failed, ending keyword");
                    break;
                }
            };
            if batch.is_empty() {
                debug!(offset, "no more results");
                break;
            }
            if previous.as_ref() == Some(&batch) {
                debug!(offset, "results repeated, no more pages");
                break;
            }

            debug!(offset, candidates = batch.len(), "dispatching page");
            offset += batch.len();
            for candidate in &batch {
                stats.increment_dispatched();
                pool.submit(fetch_job(
                    self.fetcher.clone(),
                    candidate.clone(),
                    output_dir.to_path_buf(),
                    limit,
                    Arc::clone(&stats),
                ))?;
            }
            previous = Some(batch);
        }

        if !pool.join_or_cancel(&self.cancel).await {
            interrupted = true;
        }

        if interrupted {
            warn!("session interrupted");
            if let Some(path) = &self.checkpoint
                && let Err(e) = self.fetcher.ledger().snapshot(path).await
            {
                error!(error = %e, "failed to save download history");
            }
        }

        let mut report = stats.report(keyword);
        report.peak_in_flight = in_flight.peak();
        report.limit_reached = self.limit_reached(limit).await;
        report.interrupted = interrupted;

        info!(
            saved = report.saved,
            skipped = report.skipped(),
            failed = report.failed,
            "keyword finished"
        );
        Ok(report)
    }

    async fn limit_reached(&self, limit: SaveLimit) -> bool {
        limit.is_reached(self.fetcher.ledger().attempted_count().await)
    }

    async fn next_page(
        &self,
        keyword: &str,
        offset: usize,
        filters: &FilterSpec,
    ) -> Result<Vec<Candidate>, SearchError> {
        tokio::time::sleep(self.page_delay).await;
        self.source.next_batch(keyword, offset, filters).await
    }
}

/// One pool job: fetch a candidate, log and count the outcome.
async fn fetch_job(
    fetcher: ImageFetcher,
    candidate: Candidate,
    output_dir: PathBuf,
    limit: SaveLimit,
    stats: Arc<FetchStats>,
) {
    if limit.is_reached(fetcher.ledger().attempted_count().await) {
        stats.record_skip(&SkipReason::LimitReached);
        return;
    }

    let result = fetcher.fetch(&candidate, &output_dir, limit).await;
    match &result {
        Ok(FetchOutcome::Saved { filename }) => {
            info!(url = %candidate.url, filename = %filename, "saved");
        }
        Ok(FetchOutcome::Skipped(reason)) => {
            info!(url = %candidate.url, reason = %reason, "skipped");
        }
        Err(e) => {
            warn!(url = %candidate.url, error = %e, "fetch failed");
        }
    }
    stats.record(&result);
}
