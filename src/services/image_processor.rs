// src/services/image_processor.rs
use crate::errors::StudioError;
use crate::models::{UploadedImage, new_id};
use base64::{Engine as _, engine::general_purpose};
use image::{DynamicImage, GenericImageView, ImageFormat as ImgFormat};

pub const CANONICAL_MIME: &str = "image/png";

/// Converts uploads into the single encoding every other component expects.
pub struct ImageProcessor {
    max_dimension: u32,
}

impl ImageProcessor {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    /// Decode whatever the browser sent and re-encode as RGBA PNG.
    ///
    /// Identical pixels always produce identical `data`, whatever container
    /// or filename they arrived in.
    pub fn normalize(&self, data: &[u8]) -> Result<UploadedImage, StudioError> {
        let img = image::load_from_memory(data)
            .map_err(|e| StudioError::ImageProcessing(format!("Invalid image format: {}", e)))?;

        let img = self.resize_if_needed(img);
        let canonical = DynamicImage::ImageRgba8(img.to_rgba8());

        let mut output = Vec::new();
        canonical
            .write_to(&mut std::io::Cursor::new(&mut output), ImgFormat::Png)
            .map_err(|e| StudioError::ImageProcessing(format!("Failed to encode image: {}", e)))?;

        Ok(UploadedImage {
            id: new_id(),
            data: general_purpose::STANDARD.encode(&output),
            mime_type: CANONICAL_MIME.to_string(),
        })
    }

    fn resize_if_needed(&self, img: DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        if width <= self.max_dimension && height <= self.max_dimension {
            return img;
        }

        let ratio = self.max_dimension as f32 / width.max(height) as f32;
        let new_width = ((width as f32 * ratio) as u32).max(1);
        let new_height = ((height as f32 * ratio) as u32).max(1);
        log::debug!(
            "Downsizing upload from {}x{} to {}x{}",
            width,
            height,
            new_width,
            new_height
        );

        img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3)
    }
}

/// Parse a `data:<mime>;base64,<payload>` URL (as stored on artifacts) back
/// into an image that can be attached to a gateway call.
pub fn image_from_data_url(url: &str) -> Result<UploadedImage, StudioError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| StudioError::Validation("Artifact has no inline image".to_string()))?;
    let (mime_type, data) = rest
        .split_once(";base64,")
        .ok_or_else(|| StudioError::Validation("Artifact image is not base64 encoded".to_string()))?;
    if data.is_empty() {
        return Err(StudioError::Validation("Artifact image is empty".to_string()));
    }

    Ok(UploadedImage {
        id: new_id(),
        data: data.to_string(),
        mime_type: mime_type.to_string(),
    })
}

pub fn data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn encoded(format: ImgFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(8, 6, |x, y| Rgb([x as u8 * 20, y as u8 * 30, 90]));
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), format)
            .unwrap();
        out
    }

    #[test]
    fn same_pixels_in_different_containers_normalize_identically() {
        let processor = ImageProcessor::new(2048);
        let from_png = processor.normalize(&encoded(ImgFormat::Png)).unwrap();
        let from_bmp = processor.normalize(&encoded(ImgFormat::Bmp)).unwrap();

        assert_eq!(from_png.data, from_bmp.data);
        assert_eq!(from_png.mime_type, CANONICAL_MIME);
        assert_eq!(from_bmp.mime_type, CANONICAL_MIME);
        assert_ne!(from_png.id, from_bmp.id);
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let processor = ImageProcessor::new(2048);
        let first = processor.normalize(&encoded(ImgFormat::Png)).unwrap();
        let bytes = general_purpose::STANDARD.decode(&first.data).unwrap();
        let second = processor.normalize(&bytes).unwrap();
        assert_eq!(first.data, second.data);
    }

    #[test]
    fn oversized_images_are_downsized() {
        let processor = ImageProcessor::new(4);
        let normalized = processor.normalize(&encoded(ImgFormat::Png)).unwrap();
        let bytes = general_purpose::STANDARD.decode(&normalized.data).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert!(img.width() <= 4 && img.height() <= 4);
    }

    #[test]
    fn garbage_is_rejected() {
        let processor = ImageProcessor::new(2048);
        let err = processor.normalize(b"definitely not an image").unwrap_err();
        assert!(matches!(err, StudioError::ImageProcessing(_)));
    }

    #[test]
    fn data_url_round_trip() {
        let url = data_url("image/png", b"\x89PNG");
        let image = image_from_data_url(&url).unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data_url(), url);

        assert!(image_from_data_url("").is_err());
        assert!(image_from_data_url("https://example.com/a.png").is_err());
    }
}
