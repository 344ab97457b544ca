//! Production codec backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP) | `image` crate, format sniffed from content |
//! | Resize | `DynamicImage::resize` with `Lanczos3` (fit-inside, never upscale) |
//! | Encode → JPEG | `mozjpeg`, progressive scans, optimized Huffman coding |
//! | Encode → PNG | `image` PNG encoder, then `oxipng` palette/bit-depth reduction |
//! | Encode → WebP | `webp` (libwebp) lossy with a fixed effort (`method`) |
//! | Thumbnail crop | `DynamicImage::resize_to_fill`, JPEG |

use super::backend::{BackendError, CodecBackend, Dimensions};
use super::calculations::fit_inside;
use super::params::{EncodeParams, OutputFormat, Quality, ThumbnailParams};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// Encoder knobs that are not per-call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    /// libwebp `method`, 0 (fast) to 6 (slowest, smallest).
    pub webp_effort: u8,
    /// oxipng preset, 0 to 6. 6 is the max compression level.
    pub png_preset: u8,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            webp_effort: 4,
            png_preset: 6,
        }
    }
}

/// Backend built on the `image` crate for decoding and per-format encoders.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend {
    settings: EncoderSettings,
}

impl RustBackend {
    pub fn new() -> Self {
        Self::with_settings(EncoderSettings::default())
    }

    pub fn with_settings(settings: EncoderSettings) -> Self {
        Self {
            settings: EncoderSettings {
                webp_effort: settings.webp_effort.min(6),
                png_preset: settings.png_preset.min(6),
            },
        }
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk. The format is sniffed from the
/// content so a mislabelled upload still decodes.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let rgb = img.to_rgb8();
    let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
    comp.set_size(rgb.width() as usize, rgb.height() as usize);
    comp.set_quality(quality.value() as f32);
    comp.set_progressive_mode();
    comp.set_optimize_coding(true);

    let mut started = comp
        .start_compress(Vec::new())
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))?;
    started
        .write_scanlines(rgb.as_raw())
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))?;
    started
        .finish()
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))
}

fn encode_png(img: &DynamicImage, preset: u8) -> Result<Vec<u8>, BackendError> {
    let mut raw = Vec::new();
    img.write_to(&mut Cursor::new(&mut raw), ImageFormat::Png)
        .map_err(|e| BackendError::ProcessingFailed(format!("PNG encode failed: {}", e)))?;

    let mut opts = oxipng::Options::from_preset(preset);
    opts.palette_reduction = true;
    opts.strip = oxipng::StripChunks::Safe;
    oxipng::optimize_from_memory(&raw, &opts)
        .map_err(|e| BackendError::ProcessingFailed(format!("PNG optimization failed: {}", e)))
}

fn encode_webp(img: &DynamicImage, quality: Quality, effort: u8) -> Result<Vec<u8>, BackendError> {
    let rgba = img.to_rgba8();
    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());
    let mut config = webp::WebPConfig::new()
        .map_err(|_| BackendError::ProcessingFailed("WebP config init failed".into()))?;
    config.lossless = 0;
    config.quality = quality.value() as f32;
    config.method = effort as i32;
    let encoded = encoder
        .encode_advanced(&config)
        .map_err(|e| BackendError::ProcessingFailed(format!("WebP encode failed: {:?}", e)))?;
    Ok(encoded.to_vec())
}

impl RustBackend {
    fn encode_bytes(
        &self,
        img: &DynamicImage,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError> {
        match format {
            OutputFormat::Jpeg => encode_jpeg(img, quality),
            OutputFormat::Png => encode_png(img, self.settings.png_preset),
            OutputFormat::WebP => encode_webp(img, quality, self.settings.webp_effort),
        }
    }
}

impl CodecBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::open(path)
            .map_err(BackendError::Io)?
            .with_guessed_format()
            .map_err(BackendError::Io)?
            .into_dimensions()
            .map_err(|e| {
                BackendError::ProcessingFailed(format!("Failed to read dimensions: {}", e))
            })?;
        Ok(Dimensions { width, height })
    }

    fn encode(&self, params: &EncodeParams) -> Result<Dimensions, BackendError> {
        let img = load_image(&params.source)?;

        let img = match params.bounds {
            Some(bounds) => {
                let (w, h) = fit_inside((img.width(), img.height()), bounds);
                if (w, h) == (img.width(), img.height()) {
                    img
                } else {
                    img.resize(w, h, FilterType::Lanczos3)
                }
            }
            None => img,
        };

        let bytes = self.encode_bytes(&img, params.format, params.quality)?;
        std::fs::write(&params.output, bytes)?;

        Ok(Dimensions {
            width: img.width(),
            height: img.height(),
        })
    }

    fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;

        // Fill-resize then center-crop to exact dimensions
        let filled = img.resize_to_fill(params.width, params.height, FilterType::Lanczos3);

        let bytes = encode_jpeg(&filled, params.quality)?;
        std::fs::write(&params.output, bytes)?;
        Ok(())
    }
}
