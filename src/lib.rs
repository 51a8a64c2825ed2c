//! imgbulk Core Library
//!
//! This library provides the core functionality for the imgbulk tool, which
//! pages through image search results and saves every distinct image exactly
//! once, keeping a resumable history of what has already been fetched.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - HTTP retrieval, image sniffing, filename derivation and the image fetcher
//! - [`ledger`] - Dedup ledger (attempted URLs, content hash index) and checkpoint files
//! - [`pool`] - Fixed-size worker pool bounding concurrent fetches
//! - [`session`] - Per-keyword session that pages candidates into the pool
//! - [`search`] - Bing image search candidate source
//! - [`runner`] - Multi-keyword orchestration and checkpoint lifecycle

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fetch;
pub mod ledger;
pub mod pool;
pub mod runner;
pub mod search;
pub mod session;
mod user_agent;

// Re-export commonly used types
pub use fetch::{
    Candidate, ClientOptions, FetchError, FetchOutcome, HttpClient, ImageFetcher, ImageFormat,
    SkipReason, detect_image_format, slugify,
};
pub use ledger::{CHECKPOINT_FILE_NAME, CheckpointError, ContentHash, Ledger, LedgerState};
pub use pool::{DEFAULT_WORKERS, InFlightCounter, PoolError, WorkerPool};
pub use runner::{
    RunError, RunOptions, RunSummary, keyword_dir_name, keywords_from_lines, run_keywords,
};
pub use search::{BingSearch, SearchError};
pub use session::{
    CandidateSource, FetchStats, FilterSpec, SaveLimit, Session, SessionError, SessionReport,
};
pub use user_agent::{ADULT_FILTER_OFF_COOKIE, BROWSER_USER_AGENT};
