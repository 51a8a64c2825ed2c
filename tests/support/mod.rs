//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

/// Smallest valid PNG signature plus an IHDR chunk header.
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01\x00\x00\x00\x01";

/// A different PNG body (same signature, different dimensions).
pub const PNG_OTHER: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x02\x00\x00\x00\x02";

/// A GIF89a header.
pub const GIF: &[u8] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00\xff\xff\xff\x00\x00\x00!";

/// An HTML error page served under an image URL.
pub const HTML: &[u8] = b"<!DOCTYPE html><html><body>Not found</body></html>";

/// Builds a PNG body unique to `n`.
pub fn unique_png(n: u32) -> Vec<u8> {
    let mut body = PNG.to_vec();
    body.extend_from_slice(&n.to_be_bytes());
    body
}
