//! Cover image helpers shared by the codecs
//!
//! Sniffing, digest comparison, JPEG transcoding for PDF thumbnails and
//! collision-free naming for newly attached EPUB covers.

use crate::error::WriteError;
use crate::types::{hint, Field, FieldCategory, FieldOrigin, FieldValue};
use image::codecs::jpeg::JpegEncoder;
use sha2::{Digest, Sha256};
use std::io::Cursor;

/// Image formats a cover can be stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
}

impl CoverFormat {
    /// Detect the format from the leading magic bytes
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(CoverFormat::Jpeg)
        } else if data.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(CoverFormat::Png)
        } else if data.starts_with(b"GIF8") {
            Some(CoverFormat::Gif)
        } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(CoverFormat::Webp)
        } else if data.starts_with(b"BM") {
            Some(CoverFormat::Bmp)
        } else {
            None
        }
    }

    /// Guess the format from a file name extension
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(CoverFormat::Jpeg),
            "png" => Some(CoverFormat::Png),
            "gif" => Some(CoverFormat::Gif),
            "webp" => Some(CoverFormat::Webp),
            "bmp" => Some(CoverFormat::Bmp),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            CoverFormat::Jpeg => "image/jpeg",
            CoverFormat::Png => "image/png",
            CoverFormat::Gif => "image/gif",
            CoverFormat::Webp => "image/webp",
            CoverFormat::Bmp => "image/bmp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            CoverFormat::Jpeg => "jpg",
            CoverFormat::Png => "png",
            CoverFormat::Gif => "gif",
            CoverFormat::Webp => "webp",
            CoverFormat::Bmp => "bmp",
        }
    }
}

/// Whether an archive entry name looks like an image
pub fn is_image_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    [".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Whether an archive entry name matches the "cover" file name heuristic
pub fn is_cover_candidate(name: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name).to_ascii_lowercase();
    file_name.contains("cover") && (file_name.ends_with(".jpg") || file_name.ends_with(".jpeg"))
}

/// SHA-256 digest of an image, used to decide whether a cover changed
pub fn digest(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn same_image(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && digest(a) == digest(b)
}

/// A JPEG ready to embed, with its pixel size
#[derive(Debug, Clone, PartialEq)]
pub struct JpegThumbnail {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Return the image as JPEG, transcoding anything that is not JPEG already
pub fn to_jpeg(data: &[u8], quality: u8) -> Result<JpegThumbnail, WriteError> {
    let failed = |e: image::ImageError| WriteError::EncodingFailed(format!("cover image: {}", e));

    if CoverFormat::sniff(data) == Some(CoverFormat::Jpeg) {
        let (width, height) =
            image::ImageReader::with_format(Cursor::new(data), image::ImageFormat::Jpeg)
                .into_dimensions()
                .map_err(failed)?;
        return Ok(JpegThumbnail {
            data: data.to_vec(),
            width,
            height,
        });
    }

    let decoded = image::load_from_memory(data).map_err(failed)?;
    let rgb = decoded.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(failed)?;
    Ok(JpegThumbnail {
        data: out,
        width: rgb.width(),
        height: rgb.height(),
    })
}

/// Pick `<dir><stem>.<ext>`, or the first free `<dir><stem>-N.<ext>`
pub fn unique_name(dir: &str, stem: &str, ext: &str, taken: impl Fn(&str) -> bool) -> String {
    let candidate = format!("{}{}.{}", dir, stem, ext);
    if !taken(&candidate) {
        return candidate;
    }
    for n in 1..1000 {
        let candidate = format!("{}{}-{}.{}", dir, stem, n, ext);
        if !taken(&candidate) {
            return candidate;
        }
    }
    format!("{}{}-{}.{}", dir, stem, uuid::Uuid::new_v4().simple(), ext)
}

/// Build the cover field a reader reports
pub fn cover_field(name: &str, data: Vec<u8>, origin: FieldOrigin) -> Field {
    Field::new(name, FieldValue::Bytes(data))
        .with_type(FieldCategory::Cover.value_type())
        .with_origin(origin)
        .with_hint(hint::RENDERER, "image")
}

/// Cover bytes carried by a field, if any
pub fn cover_bytes(field: &Field) -> Option<&[u8]> {
    field
        .values
        .iter()
        .find_map(FieldValue::as_bytes)
        .filter(|b| !b.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(3, 2, image::Rgb([200, 10, 10]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_sniff_formats() {
        assert_eq!(CoverFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(CoverFormat::Jpeg));
        assert_eq!(CoverFormat::sniff(&tiny_png()), Some(CoverFormat::Png));
        assert_eq!(CoverFormat::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(CoverFormat::Webp));
        assert_eq!(CoverFormat::sniff(b"%PDF-1.4"), None);
    }

    #[test]
    fn test_png_is_transcoded_to_jpeg() {
        let thumb = to_jpeg(&tiny_png(), 85).unwrap();
        assert_eq!(CoverFormat::sniff(&thumb.data), Some(CoverFormat::Jpeg));
        assert_eq!((thumb.width, thumb.height), (3, 2));

        // A JPEG passes through untouched
        let again = to_jpeg(&thumb.data, 85).unwrap();
        assert_eq!(again.data, thumb.data);
    }

    #[test]
    fn test_cover_candidate_heuristic() {
        assert!(is_cover_candidate("OEBPS/images/Cover.JPG"));
        assert!(is_cover_candidate("front-cover.jpeg"));
        assert!(!is_cover_candidate("images/cover.png"));
        assert!(!is_cover_candidate("discover/page.jpg"));
    }

    #[test]
    fn test_unique_name_skips_taken() {
        let taken = ["OEBPS/cover.jpg", "OEBPS/cover-1.jpg"];
        let name = unique_name("OEBPS/", "cover", "jpg", |n| taken.contains(&n));
        assert_eq!(name, "OEBPS/cover-2.jpg");
    }
}
