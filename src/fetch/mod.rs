//! Fetching and saving individual image candidates.
//!
//! This module turns a [`Candidate`] into either a saved file or a
//! [`SkipReason`]. It owns the HTTP client, filename derivation, image
//! sniffing and the dedup-then-write sequence.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use imgbulk_core::{Candidate, HttpClient, ImageFetcher, Ledger, SaveLimit};
//!
//! # async fn example() -> Result<(), imgbulk_core::FetchError> {
//! let fetcher = ImageFetcher::new(HttpClient::new()?, Arc::new(Ledger::new()));
//! let candidate = Candidate::new("https://example.com/cat.jpg");
//! let outcome = fetcher
//!     .fetch(&candidate, Path::new("./bing/cat"), SaveLimit::unlimited())
//!     .await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod fetcher;
mod filename;
mod sniff;

pub use client::{ClientOptions, HttpClient};
pub use constants::{CONNECT_TIMEOUT_SECS, MAX_IMAGE_BYTES, READ_TIMEOUT_SECS};
pub use error::FetchError;
pub use fetcher::{FetchOutcome, ImageFetcher, SkipReason};
pub(crate) use fetcher::sweep_partial_files;
pub use filename::{TargetName, slugify};
pub use sniff::{ImageFormat, detect_image_format};

/// One image search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Absolute URL of the image.
    pub url: String,
    /// Human-readable name, used for the saved filename when present.
    pub suggested_name: Option<String>,
}

impl Candidate {
    /// Creates a candidate with no suggested name.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            suggested_name: None,
        }
    }

    /// Sets the suggested name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.suggested_name = Some(name.into());
        self
    }
}
