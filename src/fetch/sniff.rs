//! Image format detection from leading bytes.
//!
//! Only the content decides whether a response is an image; the URL extension
//! and the Content-Type header are both too often wrong for image search hits.

/// Image formats recognized by [`detect_image_format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Tiff,
    Bmp,
    Webp,
    Avif,
    /// SGI image (`.rgb`).
    Rgb,
    Pbm,
    Pgm,
    Ppm,
    /// Sun raster.
    Rast,
    Xbm,
    Exr,
}

impl ImageFormat {
    /// Returns the short lowercase name of the format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Rgb => "rgb",
            Self::Pbm => "pbm",
            Self::Pgm => "pgm",
            Self::Ppm => "ppm",
            Self::Rast => "rast",
            Self::Xbm => "xbm",
            Self::Exr => "exr",
        }
    }
}

/// Detects the image format from the first bytes of a body.
///
/// Returns `None` when the bytes do not start with any known image signature
/// (HTML error pages, truncated bodies, videos served under image URLs).
#[must_use]
pub fn detect_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    // JPEG: SOI marker followed by any segment marker
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(ImageFormat::Jpeg);
    }

    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(ImageFormat::Png);
    }

    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(ImageFormat::Gif);
    }

    if bytes.starts_with(b"MM\x00\x2a") || bytes.starts_with(b"II\x2a\x00") {
        return Some(ImageFormat::Tiff);
    }

    // WebP: RIFF container with WEBP form type at offset 8
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return Some(ImageFormat::Webp);
    }

    // AVIF: ISO-BMFF ftyp box with an avif/avis brand
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && matches!(&bytes[8..12], b"avif" | b"avis")
    {
        return Some(ImageFormat::Avif);
    }

    if bytes.starts_with(b"BM") {
        return Some(ImageFormat::Bmp);
    }

    if bytes.starts_with(&[0x01, 0xDA]) {
        return Some(ImageFormat::Rgb);
    }

    if bytes.starts_with(&[0x59, 0xA6, 0x6A, 0x95]) {
        return Some(ImageFormat::Rast);
    }

    if bytes.starts_with(&[0x76, 0x2F, 0x31, 0x01]) {
        return Some(ImageFormat::Exr);
    }

    if bytes.starts_with(b"#define ") {
        return Some(ImageFormat::Xbm);
    }

    detect_netpbm(bytes)
}

/// Netpbm family: `P<digit>` followed by whitespace.
fn detect_netpbm(bytes: &[u8]) -> Option<ImageFormat> {
    let [b'P', kind, separator, ..] = bytes else {
        return None;
    };
    if !matches!(separator, b' ' | b'\t' | b'\n' | b'\r') {
        return None;
    }
    match kind {
        b'1' | b'4' => Some(ImageFormat::Pbm),
        b'2' | b'5' => Some(ImageFormat::Pgm),
        b'3' | b'6' => Some(ImageFormat::Ppm),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_common_web_formats() {
        assert_eq!(
            detect_image_format(b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00"),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            detect_image_format(b"\xFF\xD8\xFF\xE2\x0C\x58ICC_PROFILE"),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            detect_image_format(b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR"),
            Some(ImageFormat::Png)
        );
        assert_eq!(detect_image_format(b"GIF89a\x01\x00\x01\x00"), Some(ImageFormat::Gif));
        assert_eq!(detect_image_format(b"GIF87a\x01\x00\x01\x00"), Some(ImageFormat::Gif));
        assert_eq!(
            detect_image_format(b"RIFF\x24\x00\x00\x00WEBPVP8 "),
            Some(ImageFormat::Webp)
        );
    }

    #[test]
    fn test_detects_less_common_formats() {
        assert_eq!(detect_image_format(b"II\x2a\x00\x08\x00"), Some(ImageFormat::Tiff));
        assert_eq!(detect_image_format(b"MM\x00\x2a\x00\x00"), Some(ImageFormat::Tiff));
        assert_eq!(detect_image_format(b"BM\x36\x00\x00\x00"), Some(ImageFormat::Bmp));
        assert_eq!(
            detect_image_format(b"\x00\x00\x00\x1cftypavif\x00\x00"),
            Some(ImageFormat::Avif)
        );
        assert_eq!(detect_image_format(b"P6\n3 2\n255\n"), Some(ImageFormat::Ppm));
        assert_eq!(detect_image_format(b"P1 1 1\n0"), Some(ImageFormat::Pbm));
        assert_eq!(detect_image_format(b"P5\t4 4"), Some(ImageFormat::Pgm));
        assert_eq!(detect_image_format(b"#define im_width 8"), Some(ImageFormat::Xbm));
    }

    #[test]
    fn test_rejects_non_images() {
        assert_eq!(detect_image_format(b"<!DOCTYPE html><html>"), None);
        assert_eq!(detect_image_format(b"\x00\x00\x00\x18ftypmp42"), None);
        assert_eq!(detect_image_format(b"RIFF\x24\x00\x00\x00WAVEfmt "), None);
        assert_eq!(detect_image_format(b"P7 332"), None);
        assert_eq!(detect_image_format(b"Px"), None);
        assert_eq!(detect_image_format(b""), None);
    }

    #[test]
    fn test_format_names() {
        assert_eq!(ImageFormat::Jpeg.as_str(), "jpeg");
        assert_eq!(ImageFormat::Webp.as_str(), "webp");
    }
}
