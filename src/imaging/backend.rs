//! Codec backend trait and shared types.
//!
//! The [`CodecBackend`] trait defines the three operations every backend must
//! support: identify, encode and thumbnail.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use the recording
//! `MockBackend` defined at the bottom of this file.

use super::params::{EncodeParams, ThumbnailParams};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for codec backends.
///
/// `Sync` so a single backend can be shared across rayon workers.
pub trait CodecBackend: Sync {
    /// Get image dimensions without a full decode where possible.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode, fit inside the bounding box, re-encode. Returns the
    /// dimensions of the written image.
    fn encode(&self, params: &EncodeParams) -> Result<Dimensions, BackendError>;

    /// Cover-fit resize and center crop to exact dimensions.
    fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError>;
}
