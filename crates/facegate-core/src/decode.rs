//! Upload decoding.
//!
//! Fast path is the `image` crate's format-sniffing decoder (JPEG/PNG/WebP/
//! GIF/BMP/TIFF). When that rejects the bytes, a HEIF/HEIC fallback takes
//! over if the `heif` feature is enabled. Every successful decode normalizes
//! to a tight 8-bit interleaved RGB buffer.

use image::RgbImage;
use thiserror::Error;

/// Both decode attempts failed; the upload cannot be processed.
///
/// Distinct from "no face detected": this means the bytes never became an
/// image at all.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unsupported or corrupt image data")]
    Undecodable,
}

#[derive(Error, Debug)]
enum FallbackError {
    #[cfg(feature = "heif")]
    #[error("libheif: {0}")]
    Heif(#[from] libheif_rs::HeifError),
    #[cfg(feature = "heif")]
    #[error("HEIF image is not 8-bit interleaved RGB")]
    PlaneLayout,
    #[error("no fallback decoder available for this format")]
    Unsupported,
}

/// Decode arbitrary uploaded bytes into an RGB image.
pub fn decode_image(data: &[u8]) -> Result<RgbImage, DecodeError> {
    match image::load_from_memory(data) {
        Ok(decoded) => Ok(decoded.into_rgb8()),
        Err(primary) => {
            tracing::debug!(error = %primary, "fast-path decode failed, trying HEIF fallback");
            decode_heif(data).map_err(|fallback| {
                tracing::debug!(error = %fallback, "fallback decode failed");
                DecodeError::Undecodable
            })
        }
    }
}

#[cfg(feature = "heif")]
fn decode_heif(data: &[u8]) -> Result<RgbImage, FallbackError> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let ctx = HeifContext::read_from_bytes(data)?;
    let lib_heif = LibHeif::new();
    let handle = ctx.primary_image_handle()?;
    let decoded = lib_heif.decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)?;

    let plane = decoded
        .planes()
        .interleaved
        .ok_or(FallbackError::PlaneLayout)?;
    if plane.bits_per_pixel != 24 {
        return Err(FallbackError::PlaneLayout);
    }

    let width = plane.width;
    let height = plane.height;
    let row_bytes = width as usize * 3;

    // libheif rows are padded to `stride` bytes; copy each row's visible part
    // into a tight buffer.
    let mut tight = Vec::with_capacity(row_bytes * height as usize);
    for y in 0..height as usize {
        let start = y * plane.stride;
        let row = plane
            .data
            .get(start..start + row_bytes)
            .ok_or(FallbackError::PlaneLayout)?;
        tight.extend_from_slice(row);
    }

    RgbImage::from_raw(width, height, tight).ok_or(FallbackError::PlaneLayout)
}

#[cfg(not(feature = "heif"))]
fn decode_heif(_data: &[u8]) -> Result<RgbImage, FallbackError> {
    Err(FallbackError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, Rgb};
    use std::io::Cursor;

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_decode_png_roundtrip() {
        let src = RgbImage::from_fn(32, 20, |x, y| Rgb([x as u8, y as u8, 7]));
        let decoded = decode_image(&png_bytes(&src)).unwrap();
        assert_eq!(decoded.dimensions(), (32, 20));
        assert_eq!(decoded.get_pixel(3, 5), src.get_pixel(3, 5));
    }

    #[test]
    fn test_decode_jpeg() {
        let src = RgbImage::from_pixel(64, 48, Rgb([200, 100, 50]));
        let mut bytes = Vec::new();
        src.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .unwrap();
        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn test_decode_grayscale_normalizes_to_rgb() {
        let src = GrayImage::from_pixel(16, 16, Luma([90]));
        let mut bytes = Vec::new();
        src.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.get_pixel(0, 0).0, [90, 90, 90]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, DecodeError::Undecodable));
    }

    #[test]
    fn test_decode_empty_fails() {
        assert!(decode_image(&[]).is_err());
    }

    #[test]
    fn test_decode_truncated_png_fails() {
        let src = RgbImage::from_pixel(32, 32, Rgb([1, 2, 3]));
        let bytes = png_bytes(&src);
        // Keep the magic so the format sniffer engages, then cut the stream.
        assert!(decode_image(&bytes[..bytes.len() / 2]).is_err());
    }
}
