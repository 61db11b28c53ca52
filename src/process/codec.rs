//! The image codec seam
//!
//! Pixel decoding and encoding are an external capability behind this trait;
//! the bundled implementation uses the `image` crate. A richer codec (full
//! TIFF tag maps, RAW formats) can be supplied through the same interface.

use crate::error::{Error, Result};
use async_trait::async_trait;
use image::{ColorType, ImageDecoder, ImageFormat, ImageReader};
use serde_json::json;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Dimension and format information extracted from one image
#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub mode: String,
    /// Format-specific tags for tagged raster formats, when the codec can
    /// extract any
    pub tags: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Trait for image codec providers
#[async_trait]
pub trait ImageCodec: Send + Sync {
    /// Decode an image far enough to report its info
    async fn probe(&self, path: &Path) -> Result<ImageInfo>;

    /// Decode an image and write it as an RGB JPEG at the given quality
    async fn encode_jpeg(&self, source: &Path, dest: &Path, quality: u8) -> Result<()>;
}

/// Create the bundled codec
pub fn create_codec() -> Box<dyn ImageCodec> {
    Box::new(ImageCrateCodec)
}

/// Codec backed by the `image` crate
pub struct ImageCrateCodec;

#[async_trait]
impl ImageCodec for ImageCrateCodec {
    async fn probe(&self, path: &Path) -> Result<ImageInfo> {
        let reader = ImageReader::open(path)
            .map_err(codec_err)?
            .with_guessed_format()
            .map_err(codec_err)?;
        let format = reader.format();
        let mut decoder = reader.into_decoder().map_err(codec_err)?;
        let icc_profile = decoder.icc_profile().ok().flatten();
        let (width, height) = decoder.dimensions();
        let color = decoder.color_type();

        let tags = if matches!(format, Some(ImageFormat::Tiff)) {
            let mut map = serde_json::Map::new();
            map.insert("color_type".to_string(), json!(format!("{:?}", color)));
            map.insert("bits_per_pixel".to_string(), json!(color.bits_per_pixel()));
            map.insert("has_icc_profile".to_string(), json!(icc_profile.is_some()));
            Some(map)
        } else {
            None
        };

        Ok(ImageInfo {
            width,
            height,
            format: format
                .map(|f| format!("{:?}", f).to_uppercase())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            mode: mode_name(color).to_string(),
            tags,
        })
    }

    async fn encode_jpeg(&self, source: &Path, dest: &Path, quality: u8) -> Result<()> {
        let img = ImageReader::open(source)
            .map_err(codec_err)?
            .with_guessed_format()
            .map_err(codec_err)?
            .decode()
            .map_err(codec_err)?;
        let rgb = img.to_rgb8();

        let file = File::create(dest)?;
        let mut writer = BufWriter::new(file);
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, quality);

        if let Err(e) = rgb.write_with_encoder(encoder) {
            // Drop the partial output so a retry starts clean
            let _ = std::fs::remove_file(dest);
            return Err(codec_err(e));
        }
        Ok(())
    }
}

/// Map a color type to its PIL-style mode name
fn mode_name(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 | ColorType::L16 => "L",
        ColorType::La8 | ColorType::La16 => "LA",
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => "RGB",
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => "RGBA",
        _ => "RGB",
    }
}

fn codec_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Codec(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_probe_png() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img.png");
        image::RgbImage::from_pixel(4, 2, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();

        let codec = ImageCrateCodec;
        let info = codec.probe(&path).await.unwrap();
        assert_eq!((info.width, info.height), (4, 2));
        assert_eq!(info.format, "PNG");
        assert_eq!(info.mode, "RGB");
        assert!(info.tags.is_none());
    }

    #[tokio::test]
    async fn test_probe_rejects_non_image() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, b"not an image").unwrap();

        let codec = ImageCrateCodec;
        assert!(matches!(codec.probe(&path).await, Err(Error::Codec(_))));
    }

    #[tokio::test]
    async fn test_encode_jpeg_normalizes() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("img.png");
        image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]))
            .save(&source)
            .unwrap();

        let dest = tmp.path().join("img.jpg");
        let codec = ImageCrateCodec;
        codec.encode_jpeg(&source, &dest, 95).await.unwrap();

        let info = codec.probe(&dest).await.unwrap();
        assert_eq!(info.format, "JPEG");
        assert_eq!((info.width, info.height), (4, 2));
    }
}
