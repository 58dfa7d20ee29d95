//! Face thumbnail extraction.
//!
//! Crops the detected face region (clamped to image bounds), encodes it as
//! JPEG and wraps it in base64 for transport inside JSON bodies and store
//! payloads.

use crate::types::FaceBox;
use base64::Engine;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("face box lies entirely outside the image")]
    EmptyCrop,
    #[error("jpeg encode: {0}")]
    Encode(#[from] image::ImageError),
}

/// Crop the face region and return it as base64-encoded JPEG.
pub fn encode_face_thumbnail(image: &RgbImage, face: &FaceBox) -> Result<String, ThumbnailError> {
    let (x, y, w, h) = face
        .clamped_rect(image.width(), image.height())
        .ok_or(ThumbnailError::EmptyCrop)?;

    let crop = image::imageops::crop_imm(image, x, y, w, h).to_image();

    let mut jpeg = Vec::new();
    crop.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&jpeg))
}
