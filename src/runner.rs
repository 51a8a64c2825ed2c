//! Multi-keyword runs over a shared output root.
//!
//! Every keyword gets its own subdirectory under the output root, while the
//! download history (`download_history.json`) lives in the root itself and is
//! shared by all keywords: it is restored once before the first keyword and
//! written back after each keyword (when asked to) and once more at the end.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::fetch::{HttpClient, ImageFetcher};
use crate::ledger::{CHECKPOINT_FILE_NAME, Ledger};
use crate::pool::DEFAULT_WORKERS;
use crate::session::{
    CandidateSource, DEFAULT_PAGE_DELAY, FilterSpec, Session, SessionError, SessionReport,
};

/// Pause between keywords if not specified.
pub const DEFAULT_KEYWORD_PAUSE: Duration = Duration::from_secs(10);

/// Output root if not specified.
pub const DEFAULT_OUTPUT_DIR: &str = "./bing";

/// Settings for a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory holding one subdirectory per keyword plus the history file.
    pub output_root: PathBuf,
    /// Concurrent fetch workers per keyword.
    pub workers: usize,
    /// Cap on URLs in the shared history, restored entries included.
    pub limit: Option<usize>,
    /// Search filters applied to every keyword.
    pub filters: FilterSpec,
    /// Delay before each results page request.
    pub page_delay: Duration,
    /// Pause between consecutive keywords.
    pub keyword_pause: Duration,
    /// Write the history file after every keyword, not only at the end.
    pub snapshot_each_keyword: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(DEFAULT_OUTPUT_DIR),
            workers: DEFAULT_WORKERS,
            limit: None,
            filters: FilterSpec::default(),
            page_delay: DEFAULT_PAGE_DELAY,
            keyword_pause: DEFAULT_KEYWORD_PAUSE,
            snapshot_each_keyword: false,
        }
    }
}

impl RunOptions {
    /// Path of the shared history file.
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_root.join(CHECKPOINT_FILE_NAME)
    }
}

/// Error type for run operations.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// An output directory could not be created.
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A session could not run.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// One report per keyword that was started.
    pub sessions: Vec<SessionReport>,
    /// The run was cancelled before every keyword finished.
    pub interrupted: bool,
}

impl RunSummary {
    /// Images saved across all keywords.
    #[must_use]
    pub fn saved(&self) -> usize {
        self.sessions.iter().map(|report| report.saved).sum()
    }

    /// Candidates skipped across all keywords.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.sessions.iter().map(SessionReport::skipped).sum()
    }

    /// Failed fetches across all keywords.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.sessions.iter().map(|report| report.failed).sum()
    }
}

/// Directory name for a keyword: trimmed, with spaces and path separators
/// replaced by underscores.
///
/// ```
/// use imgbulk_core::keyword_dir_name;
///
/// assert_eq!(keyword_dir_name("  red panda "), "red_panda");
/// ```
#[must_use]
pub fn keyword_dir_name(keyword: &str) -> String {
    let name: String = keyword
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    if name.chars().all(|c| c == '.') {
        return name.replace('.', "_");
    }
    name
}

/// Keywords from a keyword file: one per line, trimmed, blank lines skipped.
#[must_use]
pub fn keywords_from_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

async fn create_dir(path: &Path) -> Result<(), RunError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| RunError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

/// Runs one session per keyword, in order.
///
/// The history file in the output root is restored before the first keyword
/// and written when the run ends, however it ends.
///
/// # Errors
///
/// Returns [`RunError::CreateDir`] if an output directory cannot be created
/// and [`RunError::Session`] if a session cannot start (invalid worker count).
#[instrument(skip_all, fields(root = %options.output_root.display(), keywords = keywords.len()))]
pub async fn run_keywords(
    source: Arc<dyn CandidateSource>,
    client: HttpClient,
    keywords: &[String],
    options: &RunOptions,
    cancel: CancellationToken,
) -> Result<RunSummary, RunError> {
    create_dir(&options.output_root).await?;
    let checkpoint = options.checkpoint_path();
    let ledger = Arc::new(Ledger::restore(&checkpoint).await);
    let fetcher = ImageFetcher::new(client, Arc::clone(&ledger));

    let mut summary = RunSummary::default();
    let result = run_sessions(
        &source,
        &fetcher,
        keywords,
        options,
        &cancel,
        &checkpoint,
        &mut summary,
    )
    .await;

    save_history(&ledger, &checkpoint).await;
    result?;

    info!(
        saved = summary.saved(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        interrupted = summary.interrupted,
        "run finished"
    );
    Ok(summary)
}

async fn run_sessions(
    source: &Arc<dyn CandidateSource>,
    fetcher: &ImageFetcher,
    keywords: &[String],
    options: &RunOptions,
    cancel: &CancellationToken,
    checkpoint: &Path,
    summary: &mut RunSummary,
) -> Result<(), RunError> {
    for (index, keyword) in keywords.iter().enumerate() {
        if cancel.is_cancelled() {
            summary.interrupted = true;
            break;
        }

        let dir = options.output_root.join(keyword_dir_name(keyword));
        create_dir(&dir).await?;
        info!(keyword = %keyword, dir = %dir.display(), "starting keyword");

        let report = Session::new(Arc::clone(source), fetcher.clone())
            .with_workers(options.workers)
            .with_page_delay(options.page_delay)
            .with_cancellation(cancel.clone())
            .with_checkpoint(checkpoint)
            .run(keyword, &dir, &options.filters, options.limit)
            .await?;
        let interrupted = report.interrupted;
        summary.sessions.push(report);
        if interrupted {
            summary.interrupted = true;
            break;
        }

        if options.snapshot_each_keyword {
            save_history(fetcher.ledger(), checkpoint).await;
        }

        let is_last = index + 1 == keywords.len();
        if !is_last && !options.keyword_pause.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => {
                    summary.interrupted = true;
                    break;
                }
                () = tokio::time::sleep(options.keyword_pause) => {}
            }
        }
    }
    Ok(())
}

async fn save_history(ledger: &Ledger, checkpoint: &Path) {
    if let Err(e) = ledger.snapshot(checkpoint).await {
        error!(error = %e, "failed to save download history");
    }
}
