use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Default bound of rendered thumbnails (square, aspect-preserving fit)
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 512;

/// Default JPEG quality of persisted thumbnails (0.8 on a 0-1 scale)
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Embedded previews smaller than this are usually EXIF thumbnails
const MIN_EMBEDDED_JPEG: usize = 10_000;

/// Get the scoped temporary directory thumbnails are written to
pub fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("gallery-stream")
}

/// Render encoded image bytes into a pixel buffer no larger than
/// `bound`×`bound`, keeping the aspect ratio.
///
/// Files the codec can't read directly (RAW containers) fall back to
/// their largest decodable embedded JPEG preview.
pub fn render_bounded(bytes: &[u8], bound: u32) -> Result<DynamicImage> {
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(decode_err) => match decode_embedded_jpeg(bytes) {
            Some(img) => img,
            None => return Err(decode_err.into()),
        },
    };

    Ok(fit_within(img, bound))
}

/// Downscale to fit within a square bound; never upscales
pub fn fit_within(img: DynamicImage, bound: u32) -> DynamicImage {
    if img.width() <= bound && img.height() <= bound {
        return img;
    }
    // thumbnail() is the fast integer path and preserves aspect ratio
    img.thumbnail(bound, bound)
}

/// Try embedded JPEGs from largest to smallest until one decodes
fn decode_embedded_jpeg(data: &[u8]) -> Option<DynamicImage> {
    let mut candidates = find_embedded_jpegs(data);
    candidates.sort_by_key(|jpeg| std::cmp::Reverse(jpeg.len()));

    candidates
        .into_iter()
        .filter(|jpeg| jpeg.len() > MIN_EMBEDDED_JPEG)
        .find_map(|jpeg| image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg).ok())
}

/// Scan for SOI..EOI marker pairs
fn find_embedded_jpegs(data: &[u8]) -> Vec<&[u8]> {
    let jpeg_start = b"\xff\xd8\xff";
    let jpeg_end = b"\xff\xd9";

    let mut found = Vec::new();
    let mut pos = 0;
    while pos + jpeg_start.len() <= data.len() {
        if data[pos..].starts_with(jpeg_start) {
            if let Some(end) = data[pos..]
                .windows(2)
                .position(|w| w == jpeg_end)
                .map(|p| pos + p + 2)
            {
                found.push(&data[pos..end]);
                pos = end;
                continue;
            }
        }
        pos += 1;
    }

    found
}

/// Fresh, globally unique file path for a thumbnail inside `dir`
pub fn thumbnail_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.jpg", uuid::Uuid::new_v4()))
}

/// Encode an image as JPEG at the given quality (1-100)
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)))?;
    Ok(buffer)
}

/// Write a thumbnail file at `path`.
///
/// With no rendered image the file is still created, empty, so the
/// caller always has something at the path it hands out.
pub fn persist_thumbnail(path: &Path, img: Option<&DynamicImage>, quality: u8) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let contents = match img {
        Some(img) => encode_jpeg(img, quality)?,
        None => Vec::new(),
    };

    fs::write(path, contents)?;
    Ok(())
}
