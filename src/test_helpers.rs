//! Shared test utilities.
//!
//! Fixture builders for stored image records and upload files, synthetic
//! images for the real codec backend, and the list invariant assertion every
//! collection test ends with.

use std::collections::HashSet;
use std::path::Path;

use crate::imaging::OutputFormat;
use crate::ingest::UploadedFile;
use crate::types::StoredImage;

// =========================================================================
// Records
// =========================================================================

/// A stored JPEG record with predictable fields derived from `id`.
pub fn sample_image(id: &str, order: u32, is_cover: bool) -> StoredImage {
    StoredImage {
        id: id.to_string(),
        url: format!("/uploads/{id}.jpg"),
        alt_text: format!("Image {order}"),
        order,
        storage_name: format!("{id}.jpg"),
        current_size_bytes: 500,
        original_size_bytes: 1000,
        compression_percent: 50,
        mime_type: "image/jpeg".to_string(),
        is_cover,
        thumbnail_url: None,
        dimensions: None,
    }
}

/// Panic unless `order` is exactly `1..=N` by position, exactly one image is
/// cover (when non-empty), and ids and storage names are unique.
pub fn assert_invariants(images: &[StoredImage]) {
    for (idx, img) in images.iter().enumerate() {
        assert_eq!(
            img.order,
            idx as u32 + 1,
            "image {} at position {} has order {}",
            img.id,
            idx,
            img.order
        );
    }

    let covers = images.iter().filter(|i| i.is_cover).count();
    if images.is_empty() {
        assert_eq!(covers, 0);
    } else {
        assert_eq!(covers, 1, "expected exactly one cover, found {covers}");
    }

    let ids: HashSet<&str> = images.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids.len(), images.len(), "duplicate image ids");
    let names: HashSet<&str> = images.iter().map(|i| i.storage_name.as_str()).collect();
    assert_eq!(names.len(), images.len(), "duplicate storage names");
}

// =========================================================================
// Files
// =========================================================================

/// Write `size` bytes to `dir/name` and describe it as an upload. The MIME
/// type is guessed from the extension.
pub fn upload_fixture(dir: &Path, name: &str, size: u64) -> UploadedFile {
    let path = dir.join(name);
    let bytes: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, bytes).unwrap();

    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let mime = OutputFormat::from_extension(&ext)
        .map(|f| f.mime_type().to_string())
        .unwrap_or_else(|| format!("image/{ext}"));

    UploadedFile::from_path(path, &mime).unwrap()
}

fn gradient(width: u32, height: u32) -> image::RgbImage {
    image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    })
}

/// Write a real JPEG of the given size.
pub fn write_test_jpeg(path: &Path, width: u32, height: u32) {
    gradient(width, height)
        .save_with_format(path, image::ImageFormat::Jpeg)
        .unwrap();
}

/// Write a real PNG of the given size.
pub fn write_test_png(path: &Path, width: u32, height: u32) {
    gradient(width, height)
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
}
