//! Image upload validation via content sniffing.
//!
//! The inventory API only accepts PNG and JPEG product images. Rather than
//! trusting file extensions, the first bytes of the file are checked against
//! the magic numbers for each supported format before anything is uploaded.

use std::path::Path;

use anyhow::{Context, Result};

/// PNG signature: the first four bytes of every PNG file.
const PNG_MAGIC: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];

/// JPEG files start with the SOI marker followed by an APPn marker.
const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Image formats the API accepts for product photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    /// MIME type sent with the multipart upload
    pub fn mime(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
        }
    }

    /// Canonical file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpeg",
        }
    }
}

/// Detect the image format from the first bytes of the file contents.
/// Returns `None` when the header matches neither supported format.
pub fn sniff_image(bytes: &[u8]) -> Option<ImageKind> {
    if bytes.len() >= 4 && bytes[..4] == PNG_MAGIC {
        return Some(ImageKind::Png);
    }
    if bytes.len() >= 3 && bytes[..3] == JPEG_MAGIC {
        return Some(ImageKind::Jpeg);
    }
    None
}

/// A product image read from disk and validated for upload.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub kind: ImageKind,
}

impl ImageUpload {
    /// Read an image file and verify its header before it goes anywhere
    /// near the network. Rejects files that are not PNG or JPEG.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read image file: {}", path.display()))?;

        let kind = sniff_image(&bytes).ok_or_else(|| {
            anyhow::anyhow!(
                "Unsupported image type: {} (only PNG and JPEG are accepted)",
                path.display()
            )
        })?;

        // Normalize the name the way the server stores it: lowercase, no spaces.
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image")
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-");

        Ok(Self {
            file_name: format!("{}.{}", stem, kind.extension()),
            bytes,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_png() {
        let bytes = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(sniff_image(&bytes), Some(ImageKind::Png));
    }

    #[test]
    fn test_sniff_jpeg_variants() {
        // JFIF, EXIF, and raw SOI headers all share the FF D8 FF prefix
        for fourth in [0xE0u8, 0xE1, 0xE2, 0xE3, 0xE8] {
            let bytes = [0xFF, 0xD8, 0xFF, fourth];
            assert_eq!(sniff_image(&bytes), Some(ImageKind::Jpeg));
        }
    }

    #[test]
    fn test_sniff_rejects_other_formats() {
        // GIF header
        assert_eq!(sniff_image(b"GIF89a"), None);
        // Truncated PNG
        assert_eq!(sniff_image(&[0x89, 0x50]), None);
        // Empty
        assert_eq!(sniff_image(&[]), None);
    }

    #[test]
    fn test_mime_and_extension() {
        assert_eq!(ImageKind::Png.mime(), "image/png");
        assert_eq!(ImageKind::Jpeg.mime(), "image/jpeg");
        assert_eq!(ImageKind::Jpeg.extension(), "jpeg");
    }

    #[test]
    fn test_from_path_rejects_invalid_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fake.png");
        std::fs::write(&path, b"not an image at all").expect("write");

        let result = ImageUpload::from_path(&path);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_path_normalizes_file_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("My Product Photo.jpg");
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.extend_from_slice(&[0u8; 16]);
        std::fs::write(&path, &bytes).expect("write");

        let upload = ImageUpload::from_path(&path).expect("valid jpeg");
        assert_eq!(upload.file_name, "my-product-photo.jpeg");
        assert_eq!(upload.kind, ImageKind::Jpeg);
    }
}
