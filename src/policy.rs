//! Optimization policy: file size in, target encoding out.
//!
//! ```text
//! size > 10 MiB         → WebP, quality 70
//! 5 MiB < size ≤ 10 MiB → JPEG, quality 75
//! size ≤ 5 MiB          → JPEG, quality 85
//! ```
//!
//! Thresholds and qualities come from [`OptimizationConfig`]; the values
//! above are the defaults. The policy is a size heuristic only. Callers that
//! know better (the manual re-optimize operation) pass [`OptimizeOverrides`].

use crate::config::OptimizationConfig;
use crate::imaging::{OutputFormat, Quality};
use serde::{Deserialize, Serialize};

/// What the codec should produce for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeTarget {
    pub format: OutputFormat,
    pub quality: Quality,
    pub bounds: Option<(u32, u32)>,
}

/// Caller-supplied overrides for a single optimization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeOverrides {
    pub quality: Option<u32>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

/// Pick format and quality from the input size.
pub fn select_target(size_bytes: u64, config: &OptimizationConfig) -> OptimizeTarget {
    let (format, quality) = if size_bytes > config.large_threshold_bytes {
        (OutputFormat::WebP, config.large_quality)
    } else if size_bytes > config.medium_threshold_bytes {
        (OutputFormat::Jpeg, config.medium_quality)
    } else {
        (OutputFormat::Jpeg, config.default_quality)
    };

    OptimizeTarget {
        format,
        quality: Quality::new(quality),
        bounds: Some((config.max_width, config.max_height)),
    }
}

impl OptimizeTarget {
    /// Apply explicit overrides. A single bound override keeps the other
    /// edge from the current target.
    pub fn with_overrides(self, overrides: &OptimizeOverrides) -> Self {
        let quality = overrides
            .quality
            .map(Quality::new)
            .unwrap_or(self.quality);

        let bounds = match (overrides.max_width, overrides.max_height, self.bounds) {
            (None, None, current) => current,
            (w, h, Some((cw, ch))) => Some((w.unwrap_or(cw), h.unwrap_or(ch))),
            (w, h, None) => Some((w.unwrap_or(u32::MAX), h.unwrap_or(u32::MAX))),
        };

        Self {
            quality,
            bounds,
            ..self
        }
    }
}
