//! Shared User-Agent and cookie values for search and image requests.
//!
//! Image hosts and the search backend both serve different (often empty or
//! HTML) responses to clients that do not look like a browser, so every request
//! made by this crate carries the same desktop browser identity.

/// Desktop browser User-Agent sent with every request.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Fedora; Linux x86_64; rv:94.0) Gecko/20100101 Firefox/94.0";

/// Cookie that turns off the search backend's adult content filter.
pub const ADULT_FILTER_OFF_COOKIE: &str = "SRCHHPGUSR=ADLT=OFF";
