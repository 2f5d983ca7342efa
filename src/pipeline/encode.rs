//! Image encoding for collaborators and output files.
//!
//! * PNG bytes for OCR and face-detection subprocesses (lossless, so glyph
//!   edges survive).
//! * base64 PNG [`ImageData`] for vision-model requests, downscaled so the
//!   longest edge fits `max_pixels`.
//! * JPEG bytes for face crops written to disk.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// JPEG quality used for face crops.
pub const FACE_JPEG_QUALITY: u8 = 92;

/// Encode an image as PNG bytes.
pub fn png_bytes(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Encode an image as base64 PNG ready for a vision-model request.
///
/// Images whose longest edge exceeds `max_pixels` are downscaled first,
/// preserving aspect ratio.
pub fn encode_for_model(img: &DynamicImage, max_pixels: u32) -> Result<ImageData, image::ImageError> {
    let scaled;
    let img = if img.width().max(img.height()) > max_pixels {
        scaled = img.resize(max_pixels, max_pixels, FilterType::Triangle);
        &scaled
    } else {
        img
    };

    let b64 = STANDARD.encode(png_bytes(img)?);
    debug!(
        "Encoded {}x{} image → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Encode a face crop as JPEG. Alpha is dropped.
pub fn jpeg_bytes(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)?;
    Ok(buf)
}
