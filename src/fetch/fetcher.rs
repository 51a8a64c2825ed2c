//! The image fetcher: one candidate in, one saved file (or a skip reason) out.
//!
//! # Flow
//!
//! 1. Skip URLs the ledger already lists as attempted (no network call)
//! 2. Derive the target name from the suggested name or URL basename
//! 3. Retrieve the body (outside any lock)
//! 4. Reject bodies that do not sniff as an image
//! 5. Under the ledger lock: reject known content hashes, pick a free name,
//!    check the save limit against the attempted URL count, write the file,
//!    then record hash and URL
//!
//! Step 5 runs entirely while holding the ledger's mutex, so two workers that
//! downloaded identical bytes can never both write them, and two workers with
//! the same base name can never pick the same free slot.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument};
use url::Url;

use super::error::FetchError;
use super::filename::TargetName;
use super::sniff::detect_image_format;
use super::{Candidate, HttpClient};
use crate::ledger::{ContentHash, Ledger};
use crate::session::SaveLimit;

/// Why a candidate was not saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The URL is already in the attempted set.
    AlreadyTried,
    /// The body is not a recognized image format.
    InvalidImage,
    /// Identical content was saved before under `existing`.
    DuplicateContent {
        /// Filename the content was first saved under.
        existing: String,
    },
    /// A file with identical content already sits at `filename` on disk.
    AlreadySavedOnDisk {
        /// The matching file in the output directory.
        filename: String,
    },
    /// The ledger already holds as many attempted URLs as the save limit.
    LimitReached,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyTried => write!(f, "already checked url"),
            Self::InvalidImage => write!(f, "invalid image"),
            Self::DuplicateContent { existing } => write!(f, "duplicate of {existing}"),
            Self::AlreadySavedOnDisk { filename } => write!(f, "already downloaded as {filename}"),
            Self::LimitReached => write!(f, "save limit reached"),
        }
    }
}

/// Result of a fetch that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The image was written under `filename` in the output directory.
    Saved {
        /// Name of the new file.
        filename: String,
    },
    /// The candidate was deliberately not saved.
    Skipped(SkipReason),
}

/// Downloads candidates and saves distinct images.
///
/// The fetcher owns no mutable state itself; everything shared lives in the
/// injected [`Ledger`], so one fetcher can be cloned into every worker.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: HttpClient,
    ledger: Arc<Ledger>,
}

/// Where a new body can be written.
enum Slot {
    Free(String),
    Matching(String),
}

impl ImageFetcher {
    /// Creates a fetcher over a shared client and ledger.
    #[must_use]
    pub fn new(client: HttpClient, ledger: Arc<Ledger>) -> Self {
        Self { client, ledger }
    }

    /// Returns the ledger this fetcher records into.
    #[must_use]
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Fetches one candidate into `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` when the URL is malformed, the request fails, or
    /// reading/writing in `output_dir` fails. Skips are not errors.
    #[instrument(skip(self, candidate), fields(url = %candidate.url))]
    pub async fn fetch(
        &self,
        candidate: &Candidate,
        output_dir: &Path,
        limit: SaveLimit,
    ) -> Result<FetchOutcome, FetchError> {
        if self.ledger.has_attempted(&candidate.url).await {
            return Ok(FetchOutcome::Skipped(SkipReason::AlreadyTried));
        }

        let url = Url::parse(&candidate.url).map_err(|_| FetchError::invalid_url(&candidate.url))?;
        let target = TargetName::derive(&url, candidate.suggested_name.as_deref());

        let bytes = self.client.fetch_bytes(&candidate.url).await?;

        let Some(format) = detect_image_format(&bytes) else {
            return Ok(FetchOutcome::Skipped(SkipReason::InvalidImage));
        };
        let hash = ContentHash::of(&bytes);
        debug!(format = format.as_str(), %hash, bytes = bytes.len(), "image received");

        self.commit(&candidate.url, &target, &bytes, hash, output_dir, limit)
            .await
    }

    /// Dedup, naming, limit check and write, all under the ledger lock.
    async fn commit(
        &self,
        url: &str,
        target: &TargetName,
        bytes: &[u8],
        hash: ContentHash,
        output_dir: &Path,
        limit: SaveLimit,
    ) -> Result<FetchOutcome, FetchError> {
        let mut ledger = self.ledger.lock().await;

        if let Some(existing) = ledger.filename_for(&hash) {
            return Ok(FetchOutcome::Skipped(SkipReason::DuplicateContent {
                existing: existing.to_string(),
            }));
        }

        let filename = match find_slot(output_dir, target, hash).await? {
            Slot::Free(filename) => filename,
            Slot::Matching(filename) => {
                return Ok(FetchOutcome::Skipped(SkipReason::AlreadySavedOnDisk {
                    filename,
                }));
            }
        };

        if limit.is_reached(ledger.attempted_count()) {
            return Ok(FetchOutcome::Skipped(SkipReason::LimitReached));
        }

        write_atomically(&output_dir.join(&filename), bytes).await?;

        ledger.reserve(hash, filename.clone());
        ledger.record_attempt(url);

        Ok(FetchOutcome::Saved { filename })
    }
}

/// Walks `name.ext`, `name-1.ext`, `name-2.ext`, ... until a name is free or
/// holds the same content.
async fn find_slot(
    output_dir: &Path,
    target: &TargetName,
    hash: ContentHash,
) -> Result<Slot, FetchError> {
    let mut attempt = 0;
    loop {
        let filename = target.numbered(attempt);
        let path = output_dir.join(&filename);
        match tokio::fs::read(&path).await {
            Ok(existing) => {
                if ContentHash::of(&existing) == hash {
                    return Ok(Slot::Matching(filename));
                }
                debug!(filename = %filename, "name taken by different content");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Slot::Free(filename)),
            Err(e) => return Err(FetchError::io(path, e)),
        }
        attempt += 1;
    }
}

/// Writes to a hidden sibling and renames it into place, so an interrupted
/// write never leaves a truncated file under the final name.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    let partial = partial_path(path);
    if let Err(e) = tokio::fs::write(&partial, bytes).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(FetchError::io(partial, e));
    }
    if let Err(e) = tokio::fs::rename(&partial, path).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(FetchError::io(path, e));
    }
    Ok(())
}

const PARTIAL_SUFFIX: &str = ".part";

fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}{PARTIAL_SUFFIX}"))
}

fn is_partial_name(name: &str) -> bool {
    name.len() > PARTIAL_SUFFIX.len() + 1 && name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)
}

/// Removes partial files left in `output_dir` by writes that were aborted
/// between the write and the rename. Returns how many were removed.
///
/// Must not run while fetches are writing into `output_dir`.
pub(crate) async fn sweep_partial_files(output_dir: &Path) -> Result<usize, FetchError> {
    let mut entries = tokio::fs::read_dir(output_dir)
        .await
        .map_err(|e| FetchError::io(output_dir, e))?;
    let mut removed = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FetchError::io(output_dir, e))?
    {
        if !is_partial_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let path = entry.path();
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| FetchError::io(&path, e))?;
        removed += 1;
    }
    Ok(removed)
}
