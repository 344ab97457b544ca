//! Pure calculation functions for image dimensions and size accounting.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the largest size that fits inside `bounds` while keeping the
/// source aspect ratio. Never upscales: a source already inside the box is
/// returned unchanged.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `bounds` - Bounding box (max_width, max_height)
///
/// # Examples
/// ```
/// # use property_images::imaging::fit_inside;
/// // 4000x3000 into 1920x1080 → height-bound
/// assert_eq!(fit_inside((4000, 3000), (1920, 1080)), (1440, 1080));
///
/// // Already small → untouched
/// assert_eq!(fit_inside((800, 600), (1920, 1080)), (800, 600));
/// ```
pub fn fit_inside(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;

    if src_w == 0 || src_h == 0 || (src_w <= max_w && src_h <= max_h) {
        return source;
    }

    let scale = (max_w as f64 / src_w as f64).min(max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w.max(1));
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h.max(1));
    (w, h)
}

/// Percentage reduction from `original` to `current` bytes:
/// `round((1 - current / original) * 100)`.
///
/// Not clamped. A re-encode that grows the file yields a negative value.
/// A zero-byte original yields 0.
pub fn compression_percent(original: u64, current: u64) -> i64 {
    if original == 0 {
        return 0;
    }
    ((1.0 - current as f64 / original as f64) * 100.0).round() as i64
}
