//! Image encoding helpers shared by recognizers.
//!
//! Vision APIs take base64 data embedded in the JSON body. PNG keeps glyph
//! edges intact; JPEG artefacts on small print hurt recognition.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{ColorType, DynamicImage};
use std::io::Cursor;
use tracing::debug;

/// Encode an image as PNG bytes.
pub fn to_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Encode an image as a base64 PNG ready for a vision-model request.
///
/// `detail: "high"` keeps providers that tile images from downsampling the
/// page into a single low-resolution tile.
pub fn to_image_data(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let b64 = STANDARD.encode(to_png(img)?);
    debug!("Encoded {}x{} image → {} bytes base64", img.width(), img.height(), b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Conventional mode name for an image's pixel layout (`"RGB"`, `"L"`, ...).
pub fn image_mode(img: &DynamicImage) -> &'static str {
    match img.color() {
        ColorType::L8 => "L",
        ColorType::La8 => "LA",
        ColorType::Rgb8 => "RGB",
        ColorType::Rgba8 => "RGBA",
        ColorType::L16 => "I;16",
        ColorType::La16 => "LA;16",
        ColorType::Rgb16 => "RGB;16",
        ColorType::Rgba16 => "RGBA;16",
        ColorType::Rgb32F => "F",
        ColorType::Rgba32F => "RGBA;F",
        _ => "unknown",
    }
}
