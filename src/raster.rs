//! Rasterizer - Sanitized Scene to Square Bitmap
//!
//! The viewport is already square, so a uniform scale maps it onto the
//! whole canvas with no letterboxing.

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, RgbaImage};
use resvg::{tiny_skia, usvg};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Invalid scene markup: {0}")]
    Markup(#[from] usvg::Error),

    #[error("Cannot allocate a {0}x{0} canvas")]
    Canvas(u32),

    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),
}

/// Shared font database. Built once per pipeline, not per render.
pub type FontDb = Arc<usvg::fontdb::Database>;

/// No fonts: `<text>` renders as nothing. Output does not depend on the host.
pub fn no_fonts() -> FontDb {
    Arc::new(usvg::fontdb::Database::new())
}

pub fn system_fonts() -> FontDb {
    let mut fonts = usvg::fontdb::Database::new();
    fonts.load_system_fonts();
    log::debug!("loaded {} font faces", fonts.len());
    Arc::new(fonts)
}

/// Renders SVG markup into a `size_px` square RGBA bitmap.
pub fn rasterize(markup: &str, size_px: u32, fonts: FontDb) -> Result<RgbaImage, RasterError> {
    let mut opt = usvg::Options::default();
    opt.fontdb = fonts;

    let tree = usvg::Tree::from_str(markup, &opt)?;
    let mut pixmap = tiny_skia::Pixmap::new(size_px, size_px).ok_or(RasterError::Canvas(size_px))?;

    let size = tree.size();
    let transform = tiny_skia::Transform::from_scale(
        size_px as f32 / size.width(),
        size_px as f32 / size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let mut data = Vec::with_capacity((size_px * size_px * 4) as usize);
    for px in pixmap.pixels() {
        let c = px.demultiply();
        data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    RgbaImage::from_raw(size_px, size_px, data).ok_or(RasterError::Canvas(size_px))
}

/// Lossless PNG encoding.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RasterError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, RasterError> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8())
}
