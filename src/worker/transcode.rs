//! Decode fetched bytes and re-encode them in the configured format

use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::DynamicImage;
use thiserror::Error;

use crate::format::{Encoder, FormatConfig};

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Failed to decode source image: {0}")]
    Decode(String),

    #[error("Failed to encode {encoder}: {message}")]
    Encode { encoder: Encoder, message: String },
}

pub type Result<T> = std::result::Result<T, TranscodeError>;

/// Transcode `source` into `format`. CPU bound; callers run it off the runtime.
pub fn transcode(source: &[u8], format: &FormatConfig) -> Result<Vec<u8>> {
    let img = image::load_from_memory(source).map_err(|e| TranscodeError::Decode(e.to_string()))?;

    let encoder = format.encoder;
    let encode_err = |message: String| TranscodeError::Encode { encoder, message };

    match encoder {
        Encoder::Webp => encode_webp(&img, format).map_err(encode_err),
        Encoder::Jpeg => {
            let mut out = Vec::new();
            // jpeg has no alpha channel
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_with_encoder(JpegEncoder::new_with_quality(&mut out, format.quality))
                .map_err(|e| encode_err(e.to_string()))?;
            Ok(out)
        }
        Encoder::Png => {
            let mut out = Vec::new();
            let compression = png_compression(format.compression_level);
            img.write_with_encoder(PngEncoder::new_with_quality(
                &mut out,
                compression,
                FilterType::Adaptive,
            ))
            .map_err(|e| encode_err(e.to_string()))?;
            Ok(out)
        }
        Encoder::Avif => {
            let mut out = Vec::new();
            let speed = avif_speed(format.effective_effort().unwrap_or(4));
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_with_encoder(AvifEncoder::new_with_speed_quality(
                    &mut out,
                    speed,
                    format.quality,
                ))
                .map_err(|e| encode_err(e.to_string()))?;
            Ok(out)
        }
    }
}

fn encode_webp(img: &DynamicImage, format: &FormatConfig) -> std::result::Result<Vec<u8>, String> {
    // libwebp only takes 8-bit RGB(A)
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
    let encoder = webp::Encoder::from_image(&rgba).map_err(str::to_string)?;

    let mut config =
        webp::WebPConfig::new().map_err(|_| "libwebp rejected default config".to_string())?;
    config.quality = f32::from(format.quality);
    config.method = format.effective_effort().unwrap_or(6) as _;
    config.lossless = format.lossless as _;

    let memory = encoder
        .encode_advanced(&config)
        .map_err(|e| format!("{:?}", e))?;
    Ok(memory.to_vec())
}

/// Map a 0-9 zlib style level onto the png encoder presets.
fn png_compression(level: Option<u8>) -> CompressionType {
    match level {
        None => CompressionType::Default,
        Some(0..=3) => CompressionType::Fast,
        Some(4..=6) => CompressionType::Default,
        Some(_) => CompressionType::Best,
    }
}

/// Effort grows with CPU spent; avif speed is the inverse, on 1..=10.
fn avif_speed(effort: u8) -> u8 {
    10u8.saturating_sub(effort).clamp(1, 10)
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 16) as u8, (y * 16) as u8, 128, 255])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded_format(bytes: &[u8]) -> image::ImageFormat {
        image::guess_format(bytes).unwrap()
    }

    #[test]
    fn test_transcode_to_each_encoder() {
        let source = sample_png(16, 16);

        let webp = transcode(&source, &FormatConfig::default()).unwrap();
        assert_eq!(decoded_format(&webp), image::ImageFormat::WebP);

        let jpeg = transcode(&source, &FormatConfig::new(Encoder::Jpeg, 85)).unwrap();
        assert_eq!(decoded_format(&jpeg), image::ImageFormat::Jpeg);

        let mut png_format = FormatConfig::new(Encoder::Png, 100);
        png_format.compression_level = Some(9);
        let png = transcode(&source, &png_format).unwrap();
        assert_eq!(decoded_format(&png), image::ImageFormat::Png);

        let mut avif_format = FormatConfig::new(Encoder::Avif, 50);
        avif_format.effort = Some(0);
        let avif = transcode(&source, &avif_format).unwrap();
        assert!(!avif.is_empty());
    }

    #[test]
    fn test_transcoded_image_keeps_dimensions() {
        let source = sample_png(20, 12);
        let jpeg = transcode(&source, &FormatConfig::new(Encoder::Jpeg, 90)).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 12));
    }

    #[test]
    fn test_garbage_input_is_decode_error() {
        let result = transcode(b"<html>not an image</html>", &FormatConfig::default());
        assert!(matches!(result, Err(TranscodeError::Decode(_))));
    }

    #[test]
    fn test_parameter_mapping() {
        assert_eq!(avif_speed(0), 10);
        assert_eq!(avif_speed(6), 4);
        assert_eq!(avif_speed(9), 1);
        assert_eq!(avif_speed(200), 1);
        assert!(matches!(png_compression(Some(1)), CompressionType::Fast));
        assert!(matches!(png_compression(Some(9)), CompressionType::Best));
        assert!(matches!(png_compression(None), CompressionType::Default));
    }
}
