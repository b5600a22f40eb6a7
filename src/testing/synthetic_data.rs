//! Synthetic capture data
//!
//! Crop results and encoded images shaped like what a document camera
//! returns, for exercising the pipeline without a device.

use crate::quality::{CapturedImage, CropResult, DocumentType};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::Cursor;

/// Typical ID card crop at 300 DPI
pub const CARD_DIMENSIONS: (u32, u32) = (1012, 638);

/// Crop result with the given quality scores. The image bytes are a real
/// JPEG so that dimension probing works.
pub fn synthetic_crop(glare: f64, sharpness: f64) -> CropResult {
    let (width, height) = CARD_DIMENSIONS;
    CropResult {
        image: CapturedImage {
            data: STANDARD.encode(synthetic_jpeg(64, 40, 0)),
            width,
            height,
        },
        document_type: DocumentType::Id,
        glare,
        sharpness,
        moire: 99.0,
        dpi: 300,
    }
}

fn synthetic_rgb(width: u32, height: u32, seed: u8) -> image::RgbImage {
    image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            seed.wrapping_add((x % 256) as u8),
            seed.wrapping_add((y % 256) as u8),
            seed.wrapping_add(((x + y) % 256) as u8),
        ])
    })
}

fn encode(width: u32, height: u32, seed: u8, format: image::ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    // Encoding an in-memory RGB buffer to a Vec cannot fail for these formats.
    if let Err(e) = image::DynamicImage::ImageRgb8(synthetic_rgb(width, height, seed))
        .write_to(&mut Cursor::new(&mut bytes), format)
    {
        log::error!("Failed to encode synthetic image: {}", e);
    }
    bytes
}

/// Gradient JPEG; `seed` varies the content so fingerprints differ
pub fn synthetic_jpeg(width: u32, height: u32, seed: u8) -> Vec<u8> {
    encode(width, height, seed, image::ImageFormat::Jpeg)
}

pub fn synthetic_png(width: u32, height: u32, seed: u8) -> Vec<u8> {
    encode(width, height, seed, image::ImageFormat::Png)
}
