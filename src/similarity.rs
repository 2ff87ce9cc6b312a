//! Perceptual image comparison.
//!
//! Images are reduced to a 64-bit average hash: scaled to 8x8, converted to grayscale, and
//! each pixel contributes one bit (`1` when at or above the mean). Similarity is the share of
//! matching bits as a percentage, so identical images score 100 and the measure is symmetric.

use crate::error::SyncError;
use crate::types::Format;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use resvg::{tiny_skia, usvg};
use std::path::Path;

const HASH_SIDE: u32 = 8;
const HASH_BITS: u32 = HASH_SIDE * HASH_SIDE;

/// 64-bit average hash of an image.
pub fn average_hash(image: &DynamicImage) -> u64 {
    let small = image
        .resize_exact(HASH_SIDE, HASH_SIDE, FilterType::Triangle)
        .to_luma8();
    let total: u32 = small.pixels().map(|p| u32::from(p.0[0])).sum();
    let mean = total / HASH_BITS;

    small
        .pixels()
        .enumerate()
        .filter(|(_, p)| u32::from(p.0[0]) >= mean)
        .fold(0u64, |hash, (i, _)| hash | (1 << i))
}

/// Percentage of matching bits between two hashes.
pub fn hash_similarity(a: u64, b: u64) -> f64 {
    let distance = (a ^ b).count_ones();
    f64::from(HASH_BITS - distance) * 100.0 / f64::from(HASH_BITS)
}

/// Decodes an encoded raster image (PNG or JPG).
pub fn decode_raster(bytes: &[u8], path: &Path) -> Result<DynamicImage, SyncError> {
    image::load_from_memory(bytes).map_err(|e| SyncError::Image {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Renders an SVG document to a bitmap at its intrinsic size.
pub fn rasterize_svg(svg: &[u8]) -> Result<DynamicImage, SyncError> {
    let tree = usvg::Tree::from_data(svg, &usvg::Options::default())
        .map_err(|e| SyncError::Svg(e.to_string()))?;
    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| SyncError::Svg(format!("invalid canvas size {:?}", size)))?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    let rgba = RgbaImage::from_raw(size.width(), size.height(), pixmap.take())
        .ok_or_else(|| SyncError::Svg("pixel buffer does not match canvas".to_string()))?;
    Ok(DynamicImage::ImageRgba8(rgba))
}

/// Perceptual similarity between the previous and the new encoding of an asset.
///
/// SVGs are rasterized first since equivalent markup can differ byte-wise. JPG has no
/// comparison path and yields [`SyncError::UnsupportedFormat`].
pub fn similarity(
    format: Format,
    previous: &[u8],
    current: &[u8],
    path: &Path,
) -> Result<f64, SyncError> {
    let (old, new) = match format {
        Format::Svg => (rasterize_svg(previous)?, rasterize_svg(current)?),
        Format::Png => (decode_raster(previous, path)?, decode_raster(current, path)?),
        Format::Jpg => return Err(SyncError::UnsupportedFormat(format.to_string())),
    };
    Ok(hash_similarity(average_hash(&old), average_hash(&new)))
}

/// Runs [`similarity`] on the blocking pool.
pub(crate) async fn similarity_blocking(
    format: Format,
    previous: Vec<u8>,
    current: Vec<u8>,
    path: &Path,
) -> Result<(f64, Vec<u8>, Vec<u8>), SyncError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let score = similarity(format, &previous, &current, &path)?;
        Ok((score, previous, current))
    })
    .await
    .map_err(|e| SyncError::TaskFailed(format!("Task join error: {}", e)))?
}
