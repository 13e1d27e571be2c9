//! Frame decoding.
//!
//! Malformed input fails here, before reaching the pipeline: everything past
//! this point assumes a valid decoded RGB raster.

use anyhow::{anyhow, Context, Result};
use image::{GrayImage, RgbImage};

/// Decode an encoded image (JPEG or PNG) into an RGB raster.
pub fn decode_frame(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(anyhow!("empty image payload"));
    }
    let image = image::load_from_memory(bytes).context("decode frame")?;
    let rgb = image.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(anyhow!("decoded frame has zero area"));
    }
    Ok(rgb)
}

/// Luma conversion used for face detection.
pub fn grayscale(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}
