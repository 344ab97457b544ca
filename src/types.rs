//! Persisted records shared by every stage of the pipeline.
//!
//! These are serialized verbatim into the property store, so field names
//! follow the camelCase layout the rest of the listing platform reads.

use crate::imaging::{Dimensions, OutputFormat};
use serde::{Deserialize, Serialize};

/// One image belonging to one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredImage {
    /// Opaque identifier, unique within the property's image list.
    pub id: String,
    /// Stable reference to the optimized file.
    pub url: String,
    pub alt_text: String,
    /// 1-based position; the list always holds exactly `1..=N`.
    pub order: u32,
    /// File name under the uploads directory.
    pub storage_name: String,
    pub current_size_bytes: u64,
    /// Size at ingestion time. Written once, never overwritten.
    pub original_size_bytes: u64,
    /// `round((1 - current / original) * 100)`, not clamped.
    pub compression_percent: i64,
    pub mime_type: String,
    pub is_cover: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
}

impl StoredImage {
    pub fn format(&self) -> Option<OutputFormat> {
        OutputFormat::from_mime(&self.mime_type)
    }
}

/// A listing as far as the image pipeline is concerned.
///
/// Everything the pipeline does not own rides along untouched in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub images: Vec<StoredImage>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Property {
    pub fn cover(&self) -> Option<&StoredImage> {
        self.images.iter().find(|img| img.is_cover)
    }

    pub fn image(&self, image_id: &str) -> Option<&StoredImage> {
        self.images.iter().find(|img| img.id == image_id)
    }
}

/// Keys of [`Property`] that cannot appear among its pass-through fields.
pub const RESERVED_FIELDS: &[&str] = &["id", "title", "images"];

/// Listing data supplied when creating a property with images.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProperty {
    pub title: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl NewProperty {
    /// First pass-through field that would collide with a [`Property`] key.
    pub fn reserved_field(&self) -> Option<&str> {
        self.fields
            .keys()
            .map(String::as_str)
            .find(|key| RESERVED_FIELDS.contains(key))
    }
}
