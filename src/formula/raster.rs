//! Capture of a staged formula and image encoding
//!
//! The capture is taken at `ceil(size * scale)` pixels on an opaque white
//! background. Encoding tries PNG first and falls back to JPEG with a
//! quality floor; the result is embedded as a `data:` URI.

use std::io::Cursor;
use std::rc::Rc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{ExtendedColorType, ImageEncoder as _, RgbImage};
use log::{debug, warn};

use super::glyphs::GlyphFont;
use super::resolution::capture_dimension;
use super::staging::StagingElement;
use super::FormulaError;
use crate::theme::Rgb;

/// Lossy re-encodes never go below this quality.
pub const LOSSY_QUALITY_FLOOR: f32 = 0.8;

// ─────────────────────────────────────────────────────────────────────────────
// Capture
// ─────────────────────────────────────────────────────────────────────────────

/// Turns a staged container into a bitmap.
#[allow(async_fn_in_trait)]
pub trait Capture {
    async fn capture(
        &self,
        element: &StagingElement,
        scale: f64,
    ) -> Result<RgbImage, FormulaError>;
}

/// Draws the staged glyph run with a loaded font.
#[derive(Debug, Clone)]
pub struct GlyphCapture {
    font: Option<Rc<GlyphFont>>,
    ink: Rgb,
}

impl GlyphCapture {
    pub fn new(font: Option<Rc<GlyphFont>>) -> Self {
        Self {
            font,
            ink: Rgb::new(0, 0, 0),
        }
    }
}

impl Capture for GlyphCapture {
    async fn capture(
        &self,
        element: &StagingElement,
        scale: f64,
    ) -> Result<RgbImage, FormulaError> {
        let font = self
            .font
            .as_deref()
            .ok_or_else(|| FormulaError::Capture("no font available".to_string()))?;
        let content = element
            .content()
            .ok_or_else(|| FormulaError::Capture("staging element is empty".to_string()))?;

        let (css_w, css_h) = element.measure().max();
        let width = capture_dimension(css_w as f64, scale);
        let height = capture_dimension(css_h as f64, scale);
        if width == 0 || height == 0 {
            return Err(FormulaError::Capture(format!(
                "empty capture area {}x{}",
                width, height
            )));
        }

        let mut canvas = RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));
        let (x, y) = element.content_origin();
        let scale = scale as f32;
        font.draw(
            &content.run,
            &mut canvas,
            (x * scale, y * scale),
            content.font_size * scale,
            self.ink,
        );
        tokio::task::yield_now().await;

        debug!("Captured {}x{} px at scale {:.3}", width, height, scale);
        Ok(canvas)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

/// An image format.
pub trait ImageEncoder {
    fn mime_type(&self) -> &'static str;
    fn encode(&self, image: &RgbImage) -> Result<Vec<u8>, FormulaError>;
}

/// Lossless PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngEncoder;

impl ImageEncoder for PngEncoder {
    fn mime_type(&self) -> &'static str {
        "image/png"
    }

    fn encode(&self, image: &RgbImage) -> Result<Vec<u8>, FormulaError> {
        let mut bytes = Vec::new();
        image::codecs::png::PngEncoder::new(Cursor::new(&mut bytes))
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| FormulaError::Encode(format!("png: {}", e)))?;
        Ok(bytes)
    }
}

/// Lossy JPEG.
#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    /// Quality in `[0, 1]`, raised to at least [`LOSSY_QUALITY_FLOOR`].
    pub fn with_quality(quality: f32) -> Self {
        let quality = if quality.is_finite() { quality } else { 1.0 };
        let quality = quality.clamp(LOSSY_QUALITY_FLOOR, 1.0);
        Self {
            quality: (quality * 100.0).round() as u8,
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl ImageEncoder for JpegEncoder {
    fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }

    fn encode(&self, image: &RgbImage) -> Result<Vec<u8>, FormulaError> {
        let mut bytes = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut bytes), self.quality)
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| FormulaError::Encode(format!("jpeg: {}", e)))?;
        Ok(bytes)
    }
}

/// Encoded image bytes with their MIME type.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    /// `data:<mime>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

/// Encode with `primary`, retrying with `fallback` on failure.
pub fn encode_with(
    image: &RgbImage,
    primary: &dyn ImageEncoder,
    fallback: &dyn ImageEncoder,
) -> Result<EncodedImage, FormulaError> {
    match primary.encode(image) {
        Ok(bytes) => Ok(EncodedImage {
            mime_type: primary.mime_type(),
            bytes,
        }),
        Err(first) => {
            warn!("{}; retrying as {}", first, fallback.mime_type());
            let bytes = fallback.encode(image).map_err(|second| {
                FormulaError::Encode(format!("{}; {}", first, second))
            })?;
            Ok(EncodedImage {
                mime_type: fallback.mime_type(),
                bytes,
            })
        }
    }
}

/// PNG, then JPEG at `max(quality, 0.8)`.
pub fn encode_with_fallback(image: &RgbImage, quality: f32) -> Result<EncodedImage, FormulaError> {
    encode_with(image, &PngEncoder, &JpegEncoder::with_quality(quality))
}

/// Split a `data:` URI into MIME type and decoded bytes.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), FormulaError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| FormulaError::Encode("not a data URI".to_string()))?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| FormulaError::Encode("data URI is not base64".to_string()))?;
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| FormulaError::Encode(format!("invalid base64: {}", e)))?;
    Ok((mime.to_string(), bytes))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingEncoder;

    impl ImageEncoder for FailingEncoder {
        fn mime_type(&self) -> &'static str {
            "image/x-broken"
        }

        fn encode(&self, _image: &RgbImage) -> Result<Vec<u8>, FormulaError> {
            Err(FormulaError::Encode("broken".to_string()))
        }
    }

    fn white(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]))
    }

    #[test]
    fn test_png_first() {
        let encoded = encode_with_fallback(&white(8, 4), 1.0).unwrap();
        assert_eq!(encoded.mime_type, "image/png");
        assert_eq!(&encoded.bytes[1..4], b"PNG");
    }

    #[test]
    fn test_lossy_fallback() {
        let encoded = encode_with(&white(8, 4), &FailingEncoder, &JpegEncoder::with_quality(0.9))
            .unwrap();
        assert_eq!(encoded.mime_type, "image/jpeg");
        assert_eq!(&encoded.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_both_encoders_fail() {
        let result = encode_with(&white(8, 4), &FailingEncoder, &FailingEncoder);
        assert!(matches!(result, Err(FormulaError::Encode(_))));
    }

    #[test]
    fn test_jpeg_quality_floor() {
        assert_eq!(JpegEncoder::with_quality(0.2).quality(), 80);
        assert_eq!(JpegEncoder::with_quality(0.95).quality(), 95);
        assert_eq!(JpegEncoder::with_quality(f32::NAN).quality(), 100);
    }

    #[test]
    fn test_data_uri_decodes() {
        let encoded = encode_with_fallback(&white(3, 3), 1.0).unwrap();
        let (mime, bytes) = decode_data_uri(&encoded.data_uri()).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, encoded.bytes);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 3));
    }

    #[test]
    fn test_decode_rejects_other_uris() {
        assert!(decode_data_uri("https://example.com/x.png").is_err());
        assert!(decode_data_uri("data:image/png,raw").is_err());
    }

    #[tokio::test]
    async fn test_capture_without_font_fails() {
        use crate::formula::request::{DisplayMode, FormulaRequest};
        use crate::formula::staging::StagingArea;

        let area = StagingArea::new();
        let element = area.attach(&FormulaRequest::new("x", DisplayMode::Inline));
        let result = GlyphCapture::new(None).capture(&element, 1.0).await;
        assert!(matches!(result, Err(FormulaError::Capture(_))));
    }
}
