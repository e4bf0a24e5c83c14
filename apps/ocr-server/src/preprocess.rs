//! Image normalization
//!
//! Turns an arbitrary decodable upload into the form the engines expect:
//! 8-bit RGB with no alpha, longer side capped so memory and inference cost
//! stay bounded. Images are never upscaled.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

/// Decoding failures. These are server-side 500s, not validation errors:
/// the upload passed the type check but its bytes are not an image.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("cannot identify image file: {0}")]
    Undecodable(#[from] image::ImageError),

    #[error("image has no pixels")]
    Empty,

    #[error("image processing task failed: {0}")]
    Task(String),
}

/// An upload after normalization
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub pixels: RgbImage,
    pub width: u32,
    pub height: u32,
}

impl NormalizedImage {
    /// `WIDTHxHEIGHT`, as reported back to the client
    pub fn size_label(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Encode as PNG, for engines that take an encoded image
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buffer = Vec::new();
        self.pixels
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(buffer)
    }
}

/// Decode `data` and normalize it. `max_dimension` of 0 disables resizing.
pub fn normalize(data: &[u8], max_dimension: u32) -> Result<NormalizedImage, DecodeError> {
    let decoded = image::load_from_memory(data)?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(DecodeError::Empty);
    }

    let mut pixels = flatten_to_rgb(decoded);

    if let Some((width, height)) = capped_size(pixels.width(), pixels.height(), max_dimension) {
        tracing::debug!(
            from = %format!("{}x{}", pixels.width(), pixels.height()),
            to = %format!("{}x{}", width, height),
            "Downscaling image"
        );
        pixels = image::imageops::resize(&pixels, width, height, FilterType::Lanczos3);
    }

    let (width, height) = pixels.dimensions();
    Ok(NormalizedImage { pixels, width, height })
}

/// [`normalize`] on the blocking pool
pub async fn normalize_blocking(
    data: axum::body::Bytes,
    max_dimension: u32,
) -> Result<NormalizedImage, DecodeError> {
    tokio::task::spawn_blocking(move || normalize(&data, max_dimension))
        .await
        .map_err(|e| DecodeError::Task(e.to_string()))?
}

/// Composite anything with alpha onto opaque white, convert the rest to RGB8
fn flatten_to_rgb(image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.into_rgb8();
    }

    let rgba = image.into_rgba8();
    let (width, height) = rgba.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let over_white = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([over_white(r), over_white(g), over_white(b)])
    })
}

/// New size when the longer side exceeds `max`, scaled by `max / longer`
/// with truncation (at least one pixel per side).
fn capped_size(width: u32, height: u32, max: u32) -> Option<(u32, u32)> {
    let longest = width.max(height);
    if max == 0 || longest <= max {
        return None;
    }

    let ratio = max as f64 / longest as f64;
    let scaled = |side: u32| ((side as f64 * ratio) as u32).max(1);
    Some((scaled(width), scaled(height)))
}
