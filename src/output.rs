//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every image is shown by its position and alt text first, with the stored
//! file and size accounting as indented context lines. The cover carries a
//! `*` marker after its index so it is visible at a glance.
//!
//! # Output Format
//!
//! ## Property
//!
//! ```text
//! Canal House (4c1f…)
//! 001* Canal House - Image 1
//!     File: Canal_House-1729341234567-48291.jpg
//!     Size: 1.2 MB (was 3.4 MB, -65%)
//!     Thumbnail: /uploads/Canal_House-1729341234567-48291-thumb.jpg
//! 002 Canal House - Image 2
//!     File: ...
//! ```
//!
//! ## Stats
//!
//! ```text
//! Images: 4
//! Stored: 4.1 MB (original 11.0 MB, saved 6.9 MB)
//! Average compression: 62.5%
//! Large (>5 MB): 0
//! Sizes: <1 MB: 1, 1-5 MB: 3, >=5 MB: 0
//! Largest:
//!     1.8 MB /uploads/...
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::diagnostics::{ImageStats, ImageSuggestions};
use crate::types::{Property, StoredImage};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based position as 3-digit zero-padded.
fn format_index(pos: u32) -> String {
    format!("{:0>3}", pos)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count: `B`, `KB` or `MB` with one decimal.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

/// Signed variant for savings, which go negative when files grew.
fn format_signed_bytes(bytes: i64) -> String {
    if bytes < 0 {
        format!("-{}", format_bytes(bytes.unsigned_abs()))
    } else {
        format_bytes(bytes as u64)
    }
}

fn image_header(image: &StoredImage) -> String {
    let marker = if image.is_cover { "*" } else { "" };
    format!("{}{} {}", format_index(image.order), marker, image.alt_text)
}

// ============================================================================
// Images
// ============================================================================

/// Lines for one image: header plus indented context.
pub fn format_image(image: &StoredImage) -> Vec<String> {
    let mut lines = vec![image_header(image)];
    lines.push(format!("{}File: {}", indent(1), image.storage_name));
    lines.push(format!(
        "{}Size: {} (was {}, -{}%)",
        indent(1),
        format_bytes(image.current_size_bytes),
        format_bytes(image.original_size_bytes),
        image.compression_percent
    ));
    if let Some(d) = image.dimensions {
        lines.push(format!("{}Dimensions: {}x{}", indent(1), d.width, d.height));
    }
    if let Some(thumb) = &image.thumbnail_url {
        lines.push(format!("{}Thumbnail: {}", indent(1), thumb));
    }
    lines
}

pub fn format_images(images: &[StoredImage]) -> Vec<String> {
    if images.is_empty() {
        return vec!["No images".to_string()];
    }
    images.iter().flat_map(format_image).collect()
}

pub fn print_images(images: &[StoredImage]) {
    for line in format_images(images) {
        println!("{}", line);
    }
}

// ============================================================================
// Property
// ============================================================================

pub fn format_property(property: &Property) -> Vec<String> {
    let title = if property.title.is_empty() {
        "(untitled)"
    } else {
        property.title.as_str()
    };
    let mut lines = vec![format!("{} ({})", title, property.id)];
    lines.extend(format_images(&property.images));
    lines
}

pub fn print_property(property: &Property) {
    for line in format_property(property) {
        println!("{}", line);
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

pub fn format_stats(stats: &ImageStats) -> Vec<String> {
    let d = &stats.size_distribution;
    let mut lines = vec![
        format!("Images: {}", stats.total_images),
        format!(
            "Stored: {} (original {}, saved {})",
            format_bytes(stats.total_current_bytes),
            format_bytes(stats.total_original_bytes),
            format_signed_bytes(stats.bytes_saved)
        ),
        format!("Average compression: {:.1}%", stats.average_compression_percent),
        format!("Large (>5 MB): {}", stats.large_images),
        format!(
            "Sizes: <1 MB: {}, 1-5 MB: {}, >=5 MB: {}",
            d.under_1mb, d.from_1_to_5mb, d.over_5mb
        ),
    ];
    if !stats.largest.is_empty() {
        lines.push("Largest:".to_string());
        for img in &stats.largest {
            lines.push(format!(
                "{}{} {}",
                indent(1),
                format_bytes(img.current_size_bytes),
                img.url
            ));
        }
    }
    lines
}

pub fn print_stats(stats: &ImageStats) {
    for line in format_stats(stats) {
        println!("{}", line);
    }
}

pub fn format_suggestions(entries: &[ImageSuggestions]) -> Vec<String> {
    if entries.is_empty() {
        return vec!["No suggestions: every image is within limits".to_string()];
    }
    let mut lines = Vec::new();
    for entry in entries {
        lines.push(format!("{} ({})", entry.url, format_bytes(entry.current_size_bytes)));
        for s in &entry.suggestions {
            lines.push(format!(
                "{}{}: save ~{}",
                indent(1),
                s.message,
                format_bytes(s.estimated_savings_bytes)
            ));
        }
    }
    lines
}

pub fn print_suggestions(entries: &[ImageSuggestions]) {
    for line in format_suggestions(entries) {
        println!("{}", line);
    }
}
