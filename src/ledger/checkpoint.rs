//! Durable checkpoint file for the dedup ledger.
//!
//! The checkpoint is a pretty-printed JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "attempted_urls": ["https://example.com/cat.jpg"],
//!   "content_hashes": { "900150983cd24fb0d6963f7d28e17f72": "cat.jpg" }
//! }
//! ```
//!
//! Writes go to a temporary sibling that is renamed over the previous file, so
//! a crash mid-write leaves the last complete checkpoint in place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use super::LedgerState;
use super::hash::ContentHash;

/// File name of the checkpoint inside the output root.
pub const CHECKPOINT_FILE_NAME: &str = "download_history.json";

/// Current on-disk format version.
const FORMAT_VERSION: u32 = 1;

/// Errors reading or writing a checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Reading, writing or renaming the checkpoint failed.
    #[error("IO error on checkpoint {path}: {source}")]
    Io {
        /// The checkpoint (or temporary) path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The checkpoint could not be encoded or decoded.
    #[error("malformed checkpoint {path}: {source}")]
    Serialization {
        /// The checkpoint path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The checkpoint was written by an incompatible version.
    #[error("checkpoint {path} has unsupported version {version}")]
    UnsupportedVersion {
        /// The checkpoint path.
        path: PathBuf,
        /// The version found in the file.
        version: u32,
    },
}

impl CheckpointError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    fn serialization(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serialization {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    version: u32,
    attempted_urls: Vec<String>,
    content_hashes: BTreeMap<ContentHash, String>,
}

/// Writes `state` to `path`, replacing any previous checkpoint.
///
/// # Errors
///
/// Returns [`CheckpointError`] if encoding, writing or renaming fails.
#[instrument(skip(state), fields(path = %path.display()))]
pub async fn write(path: &Path, state: &LedgerState) -> Result<(), CheckpointError> {
    let file = CheckpointFile {
        version: FORMAT_VERSION,
        attempted_urls: state.attempted_urls().to_vec(),
        content_hashes: state
            .content_hashes()
            .iter()
            .map(|(hash, name)| (*hash, name.clone()))
            .collect(),
    };
    let encoded =
        serde_json::to_vec_pretty(&file).map_err(|e| CheckpointError::serialization(path, e))?;

    let partial = partial_path(path);
    if let Err(e) = tokio::fs::write(&partial, &encoded).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(CheckpointError::io(partial, e));
    }
    if let Err(e) = tokio::fs::rename(&partial, path).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(CheckpointError::io(path, e));
    }

    debug!(
        attempted = file.attempted_urls.len(),
        hashes = file.content_hashes.len(),
        "checkpoint written"
    );
    Ok(())
}

/// Reads a checkpoint. Returns `Ok(None)` when no file exists.
///
/// # Errors
///
/// Returns [`CheckpointError`] if the file exists but cannot be read, is not
/// valid JSON, or carries an unknown version.
#[instrument(fields(path = %path.display()))]
pub async fn read(path: &Path) -> Result<Option<LedgerState>, CheckpointError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no checkpoint found");
            return Ok(None);
        }
        Err(e) => return Err(CheckpointError::io(path, e)),
    };

    let file: CheckpointFile =
        serde_json::from_slice(&raw).map_err(|e| CheckpointError::serialization(path, e))?;
    if file.version != FORMAT_VERSION {
        return Err(CheckpointError::UnsupportedVersion {
            path: path.to_path_buf(),
            version: file.version,
        });
    }

    Ok(Some(LedgerState::from_parts(
        file.attempted_urls,
        file.content_hashes,
    )))
}

fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}
