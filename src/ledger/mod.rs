//! Dedup ledger: attempted URLs and the content hash index.
//!
//! The ledger is the only state shared across fetch workers. [`LedgerState`]
//! holds the data; [`Ledger`] wraps it in a mutex that doubles as the
//! serialization guard for the check-duplicate, pick-name, write, record
//! sequence performed by the image fetcher.
//!
//! # Invariants
//!
//! - A content hash, once reserved, keeps its first filename.
//! - Every attempted URL corresponds to an image written during some session;
//!   skipped or failed candidates are never recorded.
//! - A restored checkpoint yields exactly the state that was snapshotted.

mod checkpoint;
mod hash;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, instrument, warn};

pub use checkpoint::{CHECKPOINT_FILE_NAME, CheckpointError};
pub use hash::{ContentHash, ParseContentHashError};

/// Snapshot-able ledger contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    attempted: Vec<String>,
    attempted_index: HashSet<String>,
    hashes: HashMap<ContentHash, String>,
}

impl LedgerState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a state from stored parts. Repeated URLs are kept once and the
    /// first filename for a repeated hash wins.
    pub fn from_parts(
        attempted: impl IntoIterator<Item = String>,
        hashes: impl IntoIterator<Item = (ContentHash, String)>,
    ) -> Self {
        let mut state = Self::new();
        for url in attempted {
            state.record_attempt(&url);
        }
        for (hash, filename) in hashes {
            state.reserve(hash, filename);
        }
        state
    }

    /// Returns true if `url` has been recorded as attempted.
    #[must_use]
    pub fn has_attempted(&self, url: &str) -> bool {
        self.attempted_index.contains(url)
    }

    /// Appends `url` to the attempted list. Returns false if already present.
    pub fn record_attempt(&mut self, url: &str) -> bool {
        if !self.attempted_index.insert(url.to_string()) {
            return false;
        }
        self.attempted.push(url.to_string());
        true
    }

    /// Attempted URLs in the order they were recorded.
    #[must_use]
    pub fn attempted_urls(&self) -> &[String] {
        &self.attempted
    }

    /// Number of attempted URLs.
    #[must_use]
    pub fn attempted_count(&self) -> usize {
        self.attempted.len()
    }

    /// Filename first saved for `hash`, if any.
    #[must_use]
    pub fn filename_for(&self, hash: &ContentHash) -> Option<&str> {
        self.hashes.get(hash).map(String::as_str)
    }

    /// Maps `hash` to `filename` unless the hash is already known.
    ///
    /// Returns false (and leaves the existing entry untouched) for a known hash.
    pub fn reserve(&mut self, hash: ContentHash, filename: String) -> bool {
        match self.hashes.entry(hash) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(filename);
                true
            }
        }
    }

    /// The content hash index.
    #[must_use]
    pub fn content_hashes(&self) -> &HashMap<ContentHash, String> {
        &self.hashes
    }

    /// Number of distinct content hashes.
    #[must_use]
    pub fn hash_count(&self) -> usize {
        self.hashes.len()
    }
}

/// Shared, lock-guarded ledger.
///
/// Share it between workers with `Arc<Ledger>`.
#[derive(Debug, Default)]
pub struct Ledger {
    state: Mutex<LedgerState>,
}

impl Ledger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger over existing state.
    #[must_use]
    pub fn from_state(state: LedgerState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Loads the checkpoint at `path`.
    ///
    /// Never fails: a missing file yields an empty ledger, and an unreadable or
    /// malformed one is logged and also yields an empty ledger.
    #[instrument(fields(path = %path.display()))]
    pub async fn restore(path: &Path) -> Self {
        match checkpoint::read(path).await {
            Ok(Some(state)) => {
                info!(
                    attempted = state.attempted_count(),
                    hashes = state.hash_count(),
                    "restored download history"
                );
                Self::from_state(state)
            }
            Ok(None) => Self::new(),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable download history");
                Self::new()
            }
        }
    }

    /// Writes the current state to `path`.
    ///
    /// The state is copied under the lock and serialized after releasing it,
    /// so workers are blocked only for the duration of the copy.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the file cannot be written.
    pub async fn snapshot(&self, path: &Path) -> Result<(), CheckpointError> {
        let state = self.state().await;
        checkpoint::write(path, &state).await
    }

    /// Returns true if `url` has been recorded as attempted.
    pub async fn has_attempted(&self, url: &str) -> bool {
        self.state.lock().await.has_attempted(url)
    }

    /// Number of attempted URLs, restored ones included.
    pub async fn attempted_count(&self) -> usize {
        self.state.lock().await.attempted_count()
    }

    /// Acquires the serialization guard.
    pub async fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().await
    }

    /// Returns a copy of the current state.
    pub async fn state(&self) -> LedgerState {
        self.state.lock().await.clone()
    }
}
