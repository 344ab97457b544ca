//! Storage-name generation for uploaded files.
//!
//! Every stored file is named after the upload it came from, followed by a
//! collision-resistant suffix:
//!
//! ```text
//! "Front Porch (1).JPG" → "Front_Porch__1_-1729341234567-482910377.jpg"
//!  └─ stem, sanitized ─┘    └ ≤20 chars ──────┘ └ millis ──┘ └ random ┘
//! ```
//!
//! Thumbnails reuse the stored stem with a `-thumb.jpg` suffix so they can
//! be found and removed alongside their image.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum length of the sanitized stem.
const MAX_STEM_LEN: usize = 20;

/// Strip the extension, replace anything that is not ASCII alphanumeric
/// with `_`, and truncate to 20 characters.
///
/// - `"Front Porch.jpg"` → `"Front_Porch"`
/// - `"küche.png"` → `"k_che"`
/// - `""` → `"image"` (nothing left to use)
pub fn sanitize_stem(original_name: &str) -> String {
    let stem = Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_STEM_LEN)
        .collect();
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

/// Lower-cased extension of an uploaded file name, if any.
pub fn extension_of(original_name: &str) -> Option<String> {
    Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Build a fresh storage name: `<stem>-<unix millis>-<random>.<ext>`.
pub fn generate_storage_name(original_name: &str, extension: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix = rand::random::<u32>() % 1_000_000_000;
    format!(
        "{}-{}-{}.{}",
        sanitize_stem(original_name),
        millis,
        suffix,
        extension
    )
}

/// Swap the extension of a storage name, keeping the unique stem.
pub fn with_extension(storage_name: &str, extension: &str) -> String {
    Path::new(storage_name)
        .with_extension(extension)
        .to_string_lossy()
        .into_owned()
}

/// Thumbnail file name for a stored image.
pub fn thumbnail_name(storage_name: &str) -> String {
    let stem = Path::new(storage_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(storage_name);
    format!("{}-thumb.jpg", stem)
}
