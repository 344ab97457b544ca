//! Codec adapter: one image on disk in, one re-encoded image out.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Resize** | Lanczos3, fit-inside, never upscale |
//! | **Encode** | `mozjpeg` (progressive JPEG), `oxipng` (PNG), `webp` (lossy WebP) |
//! | **Thumbnail** | `resize_to_fill` + JPEG |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and size math (unit testable)
//! - **Parameters**: Data structures describing codec operations
//! - **Backend**: [`CodecBackend`] trait + [`RustBackend`]
//! - **Operations**: [`optimize_file`], the never-failing adapter contract

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, CodecBackend, Dimensions};
pub use calculations::{compression_percent, fit_inside};
pub use operations::{
    OptimizationOutcome, OptimizeRequest, ThumbnailSpec, create_thumbnail, optimize_file,
};
pub use params::{EncodeParams, OutputFormat, Quality, ThumbnailParams};
pub use rust_backend::{EncoderSettings, RustBackend};
