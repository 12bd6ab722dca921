//! Store icon: caller-supplied image re-encoded as PNG, or a placeholder.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use talewright_shared::sha256_hex;

use crate::error::ExportError;

pub const ICON_SIZE: u32 = 256;
const BORDER: u32 = 16;

/// PNG bytes for the archive's `icon.png`.
pub fn icon_png(icon: Option<&Path>, slug: &str) -> Result<Vec<u8>, ExportError> {
    let image = match icon {
        Some(path) => {
            let img = image::open(path).map_err(|e| {
                ExportError::packaging(format!("failed to open icon {}: {e}", path.display()))
            })?;
            if img.width() == ICON_SIZE && img.height() == ICON_SIZE {
                img
            } else {
                img.resize_exact(ICON_SIZE, ICON_SIZE, image::imageops::FilterType::Lanczos3)
            }
        }
        None => DynamicImage::ImageRgba8(placeholder_icon(slug)),
    };

    let mut png_bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|e| ExportError::packaging(format!("failed to encode icon: {e}")))?;
    Ok(png_bytes)
}

/// Solid square whose colors derive from the slug hash, with a darker border.
pub fn placeholder_icon(slug: &str) -> RgbaImage {
    let digest = sha256_hex(slug.as_bytes());
    let channel = |i: usize| u8::from_str_radix(&digest[i * 2..i * 2 + 2], 16).unwrap_or(128);
    let fill = Rgba([channel(0) | 0x40, channel(1) | 0x40, channel(2) | 0x40, 255]);
    let edge = Rgba([fill[0] / 2, fill[1] / 2, fill[2] / 2, 255]);

    RgbaImage::from_fn(ICON_SIZE, ICON_SIZE, |x, y| {
        let inside = x >= BORDER && y >= BORDER && x < ICON_SIZE - BORDER && y < ICON_SIZE - BORDER;
        if inside {
            fill
        } else {
            edge
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_placeholder_is_deterministic_png() {
        let a = icon_png(None, "tale").unwrap();
        let b = icon_png(None, "tale").unwrap();
        assert_eq!(a, b);
        assert_eq!(&a[1..4], b"PNG");

        let decoded = image::load_from_memory(&a).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (ICON_SIZE, ICON_SIZE));
    }

    #[test]
    fn test_placeholder_colors_differ_by_slug() {
        assert_ne!(placeholder_icon("tale").get_pixel(128, 128), placeholder_icon("other").get_pixel(128, 128));
    }

    #[test]
    fn test_supplied_icon_is_resized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("icon.png");
        RgbaImage::from_pixel(32, 16, Rgba([1, 2, 3, 255])).save(&path).unwrap();

        let png = icon_png(Some(&path), "tale").unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), ICON_SIZE);
        assert_eq!(decoded.height(), ICON_SIZE);
    }
}
