//! Constants for the fetch module (timeouts, size caps, naming).

/// Default HTTP connect timeout (2 seconds). Image hosts that cannot accept a
/// connection this quickly are skipped rather than waited on.
pub const CONNECT_TIMEOUT_SECS: u64 = 2;

/// Default HTTP read timeout for a whole image response.
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Largest response body accepted as an image (64 MiB).
pub const MAX_IMAGE_BYTES: u64 = 64 * 1024 * 1024;

/// Extension used when the URL basename carries none.
pub const DEFAULT_EXTENSION: &str = ".gif";

/// Maximum number of characters kept from a name before slugifying.
pub const MAX_NAME_CHARS: usize = 36;

/// Stem used when a name slugifies to nothing.
pub const FALLBACK_STEM: &str = "image";
