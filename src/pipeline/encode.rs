//! Image encoding for extracted figures: `DynamicImage` → PNG bytes, and
//! PNG bytes → `data:` URL when no asset directory is configured.
//!
//! PNG is used because it is lossless; figures often contain text and
//! line art that JPEG artefacts would smear.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode an image as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} image → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Inline PNG bytes as a `data:image/png;base64,…` URL.
pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Base64-encode a document for a model attachment.
pub fn encode_document(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
