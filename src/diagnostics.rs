//! Compression statistics and optimization suggestions.
//!
//! Read-only over a property's stored image list. Nothing here touches the
//! filesystem; sizes and dimensions come from the persisted records.
//!
//! ## Suggestion rules
//!
//! Evaluated independently per image, so one image can collect several:
//!
//! | Trigger | Suggestion | Estimated savings |
//! |---|---|---|
//! | size > 20 MB | aggressive compression | 70% |
//! | 10 MB < size ≤ 20 MB | moderate compression | 50% |
//! | 5 MB < size ≤ 10 MB | light compression | 30% |
//! | PNG and size > 2 MB | convert to JPEG | 60% |
//! | width > 1920 or height > 1080 | resize | 40% |
//!
//! Images that trigger nothing are left out of the result.

use crate::imaging::OutputFormat;
use crate::types::StoredImage;
use serde::Serialize;

const MB: u64 = 1024 * 1024;

/// Images above this count as "large" in [`ImageStats::large_images`].
pub const LARGE_IMAGE_BYTES: u64 = 5 * MB;
const TOP_LARGEST: usize = 5;
const RESIZE_MAX_WIDTH: u32 = 1920;
const RESIZE_MAX_HEIGHT: u32 = 1080;

/// Three-bucket histogram of current sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeDistribution {
    /// `< 1 MB`
    pub under_1mb: usize,
    /// `1 MB ≤ size < 5 MB`
    pub from_1_to_5mb: usize,
    /// `≥ 5 MB`
    pub over_5mb: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LargeImage {
    pub id: String,
    pub url: String,
    pub current_size_bytes: u64,
}

/// Aggregate statistics for one property.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStats {
    pub total_images: usize,
    pub total_current_bytes: u64,
    pub total_original_bytes: u64,
    /// `total_original_bytes - total_current_bytes`. Negative when
    /// re-encoding grew the files.
    pub bytes_saved: i64,
    pub large_images: usize,
    pub size_distribution: SizeDistribution,
    /// Mean over images with a positive compression percent; 0 when none.
    pub average_compression_percent: f64,
    /// Up to five images, largest first.
    pub largest: Vec<LargeImage>,
}

pub fn compute_stats(images: &[StoredImage]) -> ImageStats {
    let total_current_bytes: u64 = images.iter().map(|i| i.current_size_bytes).sum();
    let total_original_bytes: u64 = images.iter().map(|i| i.original_size_bytes).sum();

    let mut size_distribution = SizeDistribution::default();
    for img in images {
        match img.current_size_bytes {
            s if s < MB => size_distribution.under_1mb += 1,
            s if s < 5 * MB => size_distribution.from_1_to_5mb += 1,
            _ => size_distribution.over_5mb += 1,
        }
    }

    let compressed: Vec<i64> = images
        .iter()
        .map(|i| i.compression_percent)
        .filter(|p| *p > 0)
        .collect();
    let average_compression_percent = if compressed.is_empty() {
        0.0
    } else {
        compressed.iter().sum::<i64>() as f64 / compressed.len() as f64
    };

    let mut by_size: Vec<&StoredImage> = images.iter().collect();
    by_size.sort_by(|a, b| b.current_size_bytes.cmp(&a.current_size_bytes));
    let largest = by_size
        .into_iter()
        .take(TOP_LARGEST)
        .map(|img| LargeImage {
            id: img.id.clone(),
            url: img.url.clone(),
            current_size_bytes: img.current_size_bytes,
        })
        .collect();

    ImageStats {
        total_images: images.len(),
        total_current_bytes,
        total_original_bytes,
        bytes_saved: total_original_bytes as i64 - total_current_bytes as i64,
        large_images: images
            .iter()
            .filter(|i| i.current_size_bytes > LARGE_IMAGE_BYTES)
            .count(),
        size_distribution,
        average_compression_percent,
        largest,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestionKind {
    AggressiveCompression,
    ModerateCompression,
    LightCompression,
    ConvertToJpeg,
    Resize,
}

impl SuggestionKind {
    /// Share of the current size this suggestion is expected to save.
    pub fn savings_percent(self) -> u64 {
        match self {
            Self::AggressiveCompression => 70,
            Self::ModerateCompression => 50,
            Self::LightCompression => 30,
            Self::ConvertToJpeg => 60,
            Self::Resize => 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub message: String,
    pub estimated_savings_bytes: u64,
}

/// All suggestions for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSuggestions {
    pub image_id: String,
    pub url: String,
    pub current_size_bytes: u64,
    pub suggestions: Vec<Suggestion>,
}

fn megabytes(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / MB as f64)
}

fn suggestion(kind: SuggestionKind, size: u64, message: String) -> Suggestion {
    Suggestion {
        kind,
        message,
        estimated_savings_bytes: size * kind.savings_percent() / 100,
    }
}

/// Suggestions for a single image, possibly empty.
pub fn suggest_for(image: &StoredImage) -> Vec<Suggestion> {
    let size = image.current_size_bytes;
    let mut out = Vec::new();

    if size > 20 * MB {
        out.push(suggestion(
            SuggestionKind::AggressiveCompression,
            size,
            format!("{} is very large; re-encode at quality 60-70", megabytes(size)),
        ));
    } else if size > 10 * MB {
        out.push(suggestion(
            SuggestionKind::ModerateCompression,
            size,
            format!("{} is large; re-encode at quality 70-80", megabytes(size)),
        ));
    } else if size > 5 * MB {
        out.push(suggestion(
            SuggestionKind::LightCompression,
            size,
            format!("{}; light re-encoding at quality 80-85 would help", megabytes(size)),
        ));
    }

    if image.format() == Some(OutputFormat::Png) && size > 2 * MB {
        out.push(suggestion(
            SuggestionKind::ConvertToJpeg,
            size,
            "PNG photo; JPEG would be much smaller".to_string(),
        ));
    }

    if let Some(d) = image.dimensions
        && (d.width > RESIZE_MAX_WIDTH || d.height > RESIZE_MAX_HEIGHT)
    {
        out.push(suggestion(
            SuggestionKind::Resize,
            size,
            format!(
                "{}x{} exceeds {}x{}; resize to fit",
                d.width, d.height, RESIZE_MAX_WIDTH, RESIZE_MAX_HEIGHT
            ),
        ));
    }

    out
}

/// Suggestions for every image that triggered at least one rule, in list
/// order.
pub fn suggest(images: &[StoredImage]) -> Vec<ImageSuggestions> {
    images
        .iter()
        .filter_map(|img| {
            let suggestions = suggest_for(img);
            (!suggestions.is_empty()).then(|| ImageSuggestions {
                image_id: img.id.clone(),
                url: img.url.clone(),
                current_size_bytes: img.current_size_bytes,
                suggestions,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Dimensions;
    use crate::test_helpers::sample_image;

    fn image(id: &str, size: u64, original: u64, percent: i64) -> StoredImage {
        StoredImage {
            current_size_bytes: size,
            original_size_bytes: original,
            compression_percent: percent,
            ..sample_image(id, 1, false)
        }
    }

    fn kinds(img: &StoredImage) -> Vec<SuggestionKind> {
        suggest_for(img).into_iter().map(|s| s.kind).collect()
    }

    // =========================================================================
    // compute_stats
    // =========================================================================

    #[test]
    fn stats_of_empty_list() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.total_images, 0);
        assert_eq!(stats.bytes_saved, 0);
        assert_eq!(stats.average_compression_percent, 0.0);
        assert!(stats.largest.is_empty());
    }

    #[test]
    fn stats_sums_and_savings() {
        let images = [image("a", 100, 400, 75), image("b", 300, 600, 50)];
        let stats = compute_stats(&images);
        assert_eq!(stats.total_current_bytes, 400);
        assert_eq!(stats.total_original_bytes, 1000);
        assert_eq!(stats.bytes_saved, 600);
        assert_eq!(stats.average_compression_percent, 62.5);
    }

    #[test]
    fn average_ignores_zero_and_negative() {
        let images = [
            image("a", 50, 100, 50),
            image("b", 100, 100, 0),
            image("c", 120, 100, -20),
        ];
        assert_eq!(compute_stats(&images).average_compression_percent, 50.0);
    }

    #[test]
    fn negative_savings_are_reported() {
        let stats = compute_stats(&[image("a", 120, 100, -20)]);
        assert_eq!(stats.bytes_saved, -20);
    }

    #[test]
    fn histogram_bucket_edges() {
        let images = [
            image("a", MB - 1, 0, 0),
            image("b", MB, 0, 0),
            image("c", 5 * MB - 1, 0, 0),
            image("d", 5 * MB, 0, 0),
            image("e", 5 * MB + 1, 0, 0),
        ];
        let stats = compute_stats(&images);
        assert_eq!(
            stats.size_distribution,
            SizeDistribution {
                under_1mb: 1,
                from_1_to_5mb: 2,
                over_5mb: 2,
            }
        );
        // Exactly 5 MB lands in the top bucket but is not "large".
        assert_eq!(stats.large_images, 1);
    }

    #[test]
    fn largest_is_top_five_descending() {
        let images: Vec<_> = (1..=7)
            .map(|i| image(&format!("i{i}"), i * 10, 0, 0))
            .collect();
        let stats = compute_stats(&images);
        let ids: Vec<&str> = stats.largest.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, ["i7", "i6", "i5", "i4", "i3"]);
    }

    #[test]
    fn stats_serialize_camel_case() {
        let json = serde_json::to_value(compute_stats(&[image("a", 10, 20, 50)])).unwrap();
        assert_eq!(json["totalImages"], 1);
        assert_eq!(json["bytesSaved"], 10);
        assert_eq!(json["sizeDistribution"]["under1mb"], 1);
    }

    // =========================================================================
    // suggestions
    // =========================================================================

    #[test]
    fn scenario_d_large_png_oversized() {
        let mut img = image("d", 25 * MB, 25 * MB, 0);
        img.mime_type = "image/png".into();
        img.dimensions = Some(Dimensions {
            width: 3000,
            height: 2000,
        });

        let suggestions = suggest_for(&img);
        let kinds: Vec<_> = suggestions.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            [
                SuggestionKind::AggressiveCompression,
                SuggestionKind::ConvertToJpeg,
                SuggestionKind::Resize,
            ]
        );
        assert_eq!(suggestions[0].estimated_savings_bytes, 25 * MB * 70 / 100);
        assert_eq!(suggestions[1].estimated_savings_bytes, 25 * MB * 60 / 100);
        assert_eq!(suggestions[2].estimated_savings_bytes, 25 * MB * 40 / 100);
    }

    #[test]
    fn size_tiers_are_exclusive() {
        assert_eq!(kinds(&image("a", 20 * MB, 0, 0)), [SuggestionKind::ModerateCompression]);
        assert_eq!(kinds(&image("b", 10 * MB, 0, 0)), [SuggestionKind::LightCompression]);
        assert!(kinds(&image("c", 5 * MB, 0, 0)).is_empty());
    }

    #[test]
    fn small_png_is_not_converted() {
        let mut img = image("p", 2 * MB, 0, 0);
        img.mime_type = "image/png".into();
        assert!(kinds(&img).is_empty());
        img.current_size_bytes = 2 * MB + 1;
        assert_eq!(kinds(&img), [SuggestionKind::ConvertToJpeg]);
    }

    #[test]
    fn resize_triggers_on_either_edge() {
        let mut img = image("r", 100, 0, 0);
        img.dimensions = Some(Dimensions {
            width: 1920,
            height: 1081,
        });
        assert_eq!(kinds(&img), [SuggestionKind::Resize]);
        img.dimensions = Some(Dimensions {
            width: 1920,
            height: 1080,
        });
        assert!(kinds(&img).is_empty());
    }

    #[test]
    fn images_without_suggestions_are_omitted() {
        let images = [image("small", 100, 0, 0), image("big", 11 * MB, 0, 0)];
        let result = suggest(&images);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].image_id, "big");
    }

    #[test]
    fn suggestion_kind_serializes_kebab_case() {
        let json = serde_json::to_value(SuggestionKind::ConvertToJpeg).unwrap();
        assert_eq!(json, "convert-to-jpeg");
    }
}
