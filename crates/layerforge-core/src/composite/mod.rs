//! # Compositor
//!
//! Paints one assignment into a PNG: every assigned trait is decoded (or
//! pulled from the shared LRU cache), blitted over a transparent RGBA
//! raster in ascending layer order with source-over alpha, and the result
//! is encoded with fixed encoder settings so identical rasters produce
//! identical bytes. The compositor never touches disk.

pub mod cache;

use std::sync::Arc;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use crate::compile::CompiledRequest;
use crate::error::{ForgeError, Result};
use cache::DecodeCache;

/// Default decode-cache budget, in frames of `output_size`.
pub const DEFAULT_CACHE_FRAMES: u64 = 64;

/// Composite an assignment and return the encoded PNG bytes.
pub fn render(
    compiled: &CompiledRequest,
    assignment: &[usize],
    cache: &DecodeCache,
) -> Result<Vec<u8>> {
    let mut canvas = RgbaImage::new(compiled.output_size.width, compiled.output_size.height);

    for (layer_idx, &trait_idx) in assignment.iter().enumerate() {
        let key = (layer_idx, trait_idx);
        let raster = match cache.get(key) {
            Some(hit) => hit,
            None => {
                let decoded = Arc::new(decode_trait(compiled, layer_idx, trait_idx)?);
                cache.insert(key, Arc::clone(&decoded));
                decoded
            }
        };
        image::imageops::overlay(&mut canvas, raster.as_ref(), 0, 0);
    }

    encode_png(&canvas)
}

/// Decode a trait payload to RGBA and verify it against the output raster.
fn decode_trait(compiled: &CompiledRequest, layer_idx: usize, trait_idx: usize) -> Result<RgbaImage> {
    let tr = &compiled.layers[layer_idx].traits[trait_idx];
    let decoded = image::load_from_memory(&tr.image.bytes).map_err(|e| ForgeError::DecodeFailure {
        trait_id: tr.id,
        reason: e.to_string(),
    })?;
    let raster = decoded.to_rgba8();
    if raster.width() != compiled.output_size.width
        || raster.height() != compiled.output_size.height
    {
        return Err(ForgeError::DecodeFailure {
            trait_id: tr.id,
            reason: format!(
                "decoded to {}x{}, expected {}x{}",
                raster.width(),
                raster.height(),
                compiled.output_size.width,
                compiled.output_size.height
            ),
        });
    }
    Ok(raster)
}

/// Deterministic PNG encode: fixed compression and filter, no ancillary
/// chunks, so byte output depends only on pixel content.
fn encode_png(canvas: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    PngEncoder::new_with_quality(&mut bytes, CompressionType::Default, FilterType::Adaptive)
        .write_image(
            canvas.as_raw(),
            canvas.width(),
            canvas.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| ForgeError::Other(format!("PNG encode failed: {e}")))?;
    Ok(bytes)
}

