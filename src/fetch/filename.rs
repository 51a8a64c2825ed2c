//! Filename derivation for saved images.
//!
//! A saved file is named `<slug>[-<n>]<ext>`: the slug comes from the
//! candidate's suggested name (or the URL basename), the extension from the URL
//! basename, and the numeric suffix is chosen by the fetcher when an unrelated
//! file already occupies the base name.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use url::Url;

use super::constants::{DEFAULT_EXTENSION, FALLBACK_STEM, MAX_NAME_CHARS};

/// Characters that are not word characters, whitespace or hyphens.
#[allow(clippy::expect_used)]
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\w\s-]").expect("slug filter regex is valid") // Static pattern, safe to panic
});

/// Runs of hyphens and whitespace, collapsed to a single hyphen.
#[allow(clippy::expect_used)]
static SEPARATOR_RUNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[-\s]+").expect("slug separator regex is valid") // Static pattern, safe to panic
});

/// Longest extension (including the dot) taken from a URL.
const MAX_EXTENSION_LEN: usize = 12;

/// Converts free text into a lowercase, hyphen-separated ASCII slug.
///
/// Accented letters are decomposed and reduced to their ASCII base, anything
/// that is not a letter, digit, underscore, whitespace or hyphen is dropped,
/// separator runs become a single hyphen, and leading/trailing hyphens and
/// underscores are trimmed.
///
/// ```
/// use imgbulk_core::slugify;
///
/// assert_eq!(slugify("Café Crème - Paris!"), "cafe-creme-paris");
/// ```
#[must_use]
pub fn slugify(value: &str) -> String {
    let ascii: String = value.nfkd().filter(char::is_ascii).collect();
    let lowered = ascii.to_lowercase();
    let stripped = DISALLOWED.replace_all(&lowered, "");
    let collapsed = SEPARATOR_RUNS.replace_all(&stripped, "-");
    collapsed.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// Base name and extension a candidate will be saved under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetName {
    stem: String,
    extension: String,
}

impl TargetName {
    /// Derives the target name for a candidate.
    ///
    /// The stem is the suggested name when one is given, otherwise the URL
    /// basename without its extension; it is trimmed, cut to 36 characters and
    /// slugified. The extension always comes from the URL basename.
    #[must_use]
    pub fn derive(url: &Url, suggested_name: Option<&str>) -> Self {
        let basename = url_basename(url);
        let (url_stem, raw_extension) = split_extension(&basename);

        let name = suggested_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(url_stem);
        let truncated: String = name.trim().chars().take(MAX_NAME_CHARS).collect();
        let mut stem = slugify(truncated.trim());
        if stem.is_empty() {
            stem = FALLBACK_STEM.to_string();
        }

        Self {
            stem,
            extension: normalize_extension(raw_extension),
        }
    }

    /// Returns the slug part of the name.
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Returns the extension including its leading dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Returns the unsuffixed filename, e.g. `cat.jpg`.
    #[must_use]
    pub fn filename(&self) -> String {
        format!("{}{}", self.stem, self.extension)
    }

    /// Returns the filename for collision attempt `n`: the base name for 0,
    /// `stem-n.ext` otherwise.
    #[must_use]
    pub fn numbered(&self, n: usize) -> String {
        if n == 0 {
            self.filename()
        } else {
            format!("{}-{n}{}", self.stem, self.extension)
        }
    }
}

/// Last path segment of the URL, percent-decoded, without any query suffix.
fn url_basename(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    decoded.split('?').next().unwrap_or("").to_string()
}

/// Splits `name.ext` at the last dot, ignoring leading dots.
fn split_extension(basename: &str) -> (&str, &str) {
    let leading_dots = basename.len() - basename.trim_start_matches('.').len();
    match basename[leading_dots..].rfind('.') {
        Some(pos) => basename.split_at(leading_dots + pos),
        None => (basename, ""),
    }
}

fn normalize_extension(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .skip(1)
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.is_empty() || cleaned.len() + 1 > MAX_EXTENSION_LEN {
        return DEFAULT_EXTENSION.to_string();
    }
    if cleaned == "gifv" {
        return ".gif".to_string();
    }
    format!(".{cleaned}")
}
