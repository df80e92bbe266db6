use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Invalid base64 image data: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Unrecognised image format: {0}")]
    Format(image::ImageError),

    #[error("JPEG re-encode failed: {0}")]
    Encode(image::ImageError),
}

#[derive(Debug, Clone, Copy)]
pub struct ImageLimits {
    pub max_edge: u32,
    pub jpeg_quality: u8,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self { max_edge: 1024, jpeg_quality: 80 }
    }
}

/// A screenshot ready to be attached to an upstream message.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pub mime_type: &'static str,
    pub data: String,
    pub width: u32,
    pub height: u32,
}

impl NormalizedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Strips a `data:<mime>;base64,` prefix if present.
pub fn strip_data_url(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.starts_with("data:") {
        if let Some((_, payload)) = trimmed.split_once(";base64,") {
            return payload;
        }
    }
    trimmed
}

/// Decodes a base64 screenshot, shrinks it so its longest edge fits
/// `limits.max_edge` and re-encodes it as JPEG.
pub fn normalize_image(raw: &str, limits: &ImageLimits) -> Result<NormalizedImage, ImageError> {
    let cleaned: String = strip_data_url(raw)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = BASE64.decode(cleaned.as_bytes())?;
    let mut img = image::load_from_memory(&bytes).map_err(ImageError::Format)?;

    if img.width().max(img.height()) > limits.max_edge {
        img = img.resize(limits.max_edge, limits.max_edge, FilterType::Triangle);
    }

    // JPEG carries no alpha channel.
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, limits.jpeg_quality)
        .encode_image(&rgb)
        .map_err(ImageError::Encode)?;

    Ok(NormalizedImage {
        mime_type: "image/jpeg",
        data: BASE64.encode(&out),
        width: rgb.width(),
        height: rgb.height(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ DynamicImage, ImageFormat, Rgba, RgbaImage };
    use std::io::Cursor;

    pub(crate) fn png_base64(width: u32, height: u32) -> String {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 120, 40, 255]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        BASE64.encode(&buf)
    }

    #[test]
    fn strips_data_url_prefix() {
        assert_eq!(strip_data_url("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_url("  QUJD \n"), "QUJD");
    }

    #[test]
    fn large_screenshot_is_downscaled_to_jpeg() {
        let raw = format!("data:image/png;base64,{}", png_base64(2000, 1000));
        let out = normalize_image(&raw, &ImageLimits::default()).unwrap();
        assert_eq!(out.mime_type, "image/jpeg");
        assert_eq!((out.width, out.height), (1024, 512));

        let decoded = image::load_from_memory(&BASE64.decode(&out.data).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1024, 512));
    }

    #[test]
    fn small_image_keeps_its_size() {
        let out = normalize_image(&png_base64(300, 200), &ImageLimits::default()).unwrap();
        assert_eq!((out.width, out.height), (300, 200));
        assert!(out.data_url().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn rejects_non_image_payloads() {
        assert!(matches!(normalize_image("%%%not base64%%%", &ImageLimits::default()), Err(ImageError::Decode(_))));
        let text = BASE64.encode("plain text, not pixels");
        assert!(matches!(normalize_image(&text, &ImageLimits::default()), Err(ImageError::Format(_))));
    }
}
