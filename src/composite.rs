//! Mask Compositor - Canonical Export Bitmap
//!
//! Output contract: a pixel is exactly (0,0,0,255) if and only if the
//! wall-mask render is near-black there. Near-black pixels of the full
//! render are lifted so the downstream wall detector never sees them as
//! walls. Every output pixel is opaque.

use image::{Rgba, RgbaImage};
use thiserror::Error;

/// Mask channels at or below this value mark a wall pixel.
pub const MASK_WALL_THRESHOLD: u8 = 10;

/// Full-render channels at or below this value are lifted.
pub const FULL_NEAR_BLACK_THRESHOLD: u8 = 5;

/// Grey level near-black non-wall pixels are lifted to.
pub const LIFTED_LEVEL: u8 = 10;

pub const WALL_PIXEL: Rgba<u8> = Rgba([0, 0, 0, 255]);

const LIFTED_PIXEL: Rgba<u8> = Rgba([LIFTED_LEVEL, LIFTED_LEVEL, LIFTED_LEVEL, 255]);

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("Render size mismatch: full is {full:?}, mask is {mask:?}")]
    SizeMismatch { full: (u32, u32), mask: (u32, u32) },
}

fn all_at_most(px: &Rgba<u8>, limit: u8) -> bool {
    px.0[0] <= limit && px.0[1] <= limit && px.0[2] <= limit
}

pub fn is_wall(mask_px: &Rgba<u8>) -> bool {
    all_at_most(mask_px, MASK_WALL_THRESHOLD)
}

pub fn composite_pixel(full_px: &Rgba<u8>, mask_px: &Rgba<u8>) -> Rgba<u8> {
    if is_wall(mask_px) {
        WALL_PIXEL
    } else if all_at_most(full_px, FULL_NEAR_BLACK_THRESHOLD) {
        LIFTED_PIXEL
    } else {
        Rgba([full_px.0[0], full_px.0[1], full_px.0[2], 255])
    }
}

pub fn composite(full: &RgbaImage, mask: &RgbaImage) -> Result<RgbaImage, CompositeError> {
    if full.dimensions() != mask.dimensions() {
        return Err(CompositeError::SizeMismatch {
            full: full.dimensions(),
            mask: mask.dimensions(),
        });
    }

    let (w, h) = full.dimensions();
    let mut out = RgbaImage::new(w, h);
    for ((dst, f), m) in out.pixels_mut().zip(full.pixels()).zip(mask.pixels()) {
        *dst = composite_pixel(f, m);
    }

    let walls = out.pixels().filter(|p| **p == WALL_PIXEL).count();
    log::debug!("composited {}x{}, {} wall pixels", w, h, walls);
    Ok(out)
}
