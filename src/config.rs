//! Pipeline configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults
//! are overridden by whatever the user file specifies; everything else keeps
//! its default.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [uploads]
//! root = "uploads"             # Directory holding optimized images and thumbnails
//! url_prefix = "/uploads"      # Prefix for stored image URLs
//! allowed_extensions = ["jpg", "jpeg", "png", "webp"]
//! allowed_mime_types = ["image/jpeg", "image/png", "image/webp"]
//! max_file_bytes = 52428800    # 50 MiB per file
//! max_request_bytes = 104857600 # 100 MiB per request
//! max_files = 10               # Files per request
//!
//! [optimization]
//! enabled = true
//! large_threshold_bytes = 10485760  # Above → WebP at large_quality
//! medium_threshold_bytes = 5242880  # Above → JPEG at medium_quality
//! large_quality = 70
//! medium_quality = 75
//! default_quality = 85
//! max_width = 1920
//! max_height = 1080
//! webp_effort = 4
//! png_preset = 6
//!
//! [thumbnails]
//! enabled = true
//! width = 300
//! height = 200
//! quality = 80
//!
//! [processing]
//! max_processes = 4            # Max parallel encoders (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

const MIB: u64 = 1024 * 1024;

/// Pipeline configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Upload storage and acceptance limits.
    pub uploads: UploadsConfig,
    /// Size-driven re-encoding policy.
    pub optimization: OptimizationConfig,
    /// Derived thumbnail settings.
    pub thumbnails: ThumbnailsConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl PipelineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let u = &self.uploads;
        if u.allowed_extensions.is_empty() || u.allowed_mime_types.is_empty() {
            return Err(ConfigError::Validation(
                "uploads allow-lists must not be empty".into(),
            ));
        }
        if u.max_file_bytes == 0 || u.max_request_bytes == 0 || u.max_files == 0 {
            return Err(ConfigError::Validation(
                "uploads limits must be non-zero".into(),
            ));
        }

        let o = &self.optimization;
        for (name, q) in [
            ("large_quality", o.large_quality),
            ("medium_quality", o.medium_quality),
            ("default_quality", o.default_quality),
            ("thumbnails.quality", self.thumbnails.quality),
        ] {
            if !(1..=100).contains(&q) {
                return Err(ConfigError::Validation(format!("{name} must be 1-100")));
            }
        }
        if o.medium_threshold_bytes >= o.large_threshold_bytes {
            return Err(ConfigError::Validation(
                "optimization.medium_threshold_bytes must be below large_threshold_bytes".into(),
            ));
        }
        if o.max_width == 0 || o.max_height == 0 {
            return Err(ConfigError::Validation(
                "optimization.max_width/max_height must be non-zero".into(),
            ));
        }
        if o.webp_effort > 6 || o.png_preset > 6 {
            return Err(ConfigError::Validation(
                "optimization.webp_effort and png_preset must be 0-6".into(),
            ));
        }
        if self.thumbnails.width == 0 || self.thumbnails.height == 0 {
            return Err(ConfigError::Validation(
                "thumbnails.width/height must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Upload storage and acceptance limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Directory for stored images. Created at startup if absent.
    pub root: PathBuf,
    /// Prefix joined with the storage name to form an image URL.
    pub url_prefix: String,
    /// Lower-case extensions accepted, without the dot.
    pub allowed_extensions: Vec<String>,
    /// MIME types accepted.
    pub allowed_mime_types: Vec<String>,
    /// Per-file ceiling in bytes. A file of exactly this size is accepted.
    pub max_file_bytes: u64,
    /// Ceiling for the sum of all files in one request.
    pub max_request_bytes: u64,
    /// Maximum number of files in one request.
    pub max_files: usize,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("uploads"),
            url_prefix: "/uploads".to_string(),
            allowed_extensions: ["jpg", "jpeg", "png", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_mime_types: ["image/jpeg", "image/png", "image/webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_file_bytes: 50 * MIB,
            max_request_bytes: 100 * MIB,
            max_files: 10,
        }
    }
}

/// Size-driven re-encoding policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizationConfig {
    /// Re-encode uploads at all. When off, originals are stored as-is.
    pub enabled: bool,
    /// Files strictly larger than this become WebP at `large_quality`.
    pub large_threshold_bytes: u64,
    /// Files strictly larger than this (and not large) use `medium_quality`.
    pub medium_threshold_bytes: u64,
    pub large_quality: u32,
    pub medium_quality: u32,
    pub default_quality: u32,
    /// Bounding box applied at ingestion (fit-inside, never upscale).
    pub max_width: u32,
    pub max_height: u32,
    /// libwebp method (0-6).
    pub webp_effort: u8,
    /// oxipng preset (0-6).
    pub png_preset: u8,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            large_threshold_bytes: 10 * MIB,
            medium_threshold_bytes: 5 * MIB,
            large_quality: 70,
            medium_quality: 75,
            default_quality: 85,
            max_width: 1920,
            max_height: 1080,
            webp_effort: 4,
            png_preset: 6,
        }
    }
}

/// Thumbnail generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailsConfig {
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
    pub quality: u32,
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 300,
            height: 200,
            quality: 80,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel encode workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(PipelineConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<PipelineConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PipelineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML file.
///
/// A missing file yields the stock defaults; a present but invalid file is
/// an error.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    if !path.exists() {
        return resolve_config(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    resolve_config(Some(value))
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Property Images Configuration
# =============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Uploads
# ---------------------------------------------------------------------------
[uploads]
# Directory holding optimized images and thumbnails. Created if absent.
root = "uploads"

# Stored image URLs are "<url_prefix>/<storage name>".
url_prefix = "/uploads"

# Both the extension and the MIME type must be in these lists.
allowed_extensions = ["jpg", "jpeg", "png", "webp"]
allowed_mime_types = ["image/jpeg", "image/png", "image/webp"]

# Per-file ceiling (50 MiB). A file of exactly this size is accepted.
max_file_bytes = 52428800

# Ceiling for all files in one request (100 MiB).
max_request_bytes = 104857600

# Files per request.
max_files = 10

# ---------------------------------------------------------------------------
# Optimization policy
# ---------------------------------------------------------------------------
[optimization]
# Set to false to store uploads without re-encoding.
enabled = true

# size > large_threshold_bytes            -> WebP at large_quality
# medium < size <= large_threshold_bytes  -> JPEG at medium_quality
# size <= medium_threshold_bytes          -> JPEG at default_quality
large_threshold_bytes = 10485760
medium_threshold_bytes = 5242880
large_quality = 70
medium_quality = 75
default_quality = 85

# Bounding box for stored images (fit-inside, never upscale).
max_width = 1920
max_height = 1080

# Encoder effort: libwebp method (0-6) and oxipng preset (0-6).
webp_effort = 4
png_preset = 6

# ---------------------------------------------------------------------------
# Thumbnails (cover-fit crop, always JPEG)
# ---------------------------------------------------------------------------
[thumbnails]
enabled = true
width = 300
height = 200
quality = 80

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel encode workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
