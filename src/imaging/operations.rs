//! High-level codec operations.
//!
//! [`optimize_file`] is the codec adapter contract the rest of the pipeline
//! relies on: it never returns an error. A failed encode comes back as
//! [`OptimizationOutcome::failed`] with zero sizes and the input file left
//! untouched, so the caller can keep the original upload.

use super::backend::{CodecBackend, Dimensions};
use super::calculations::compression_percent;
use super::params::{EncodeParams, OutputFormat, Quality, ThumbnailParams};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Thumbnail request attached to an optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailSpec {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
}

/// Everything needed to optimize one file on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeRequest {
    pub input: PathBuf,
    /// May equal `input`, in which case the file is replaced in place.
    pub output: PathBuf,
    pub format: OutputFormat,
    pub quality: Quality,
    pub bounds: Option<(u32, u32)>,
    pub thumbnail: Option<ThumbnailSpec>,
    /// Leave `input` on disk after a successful encode to a different path.
    /// The caller becomes responsible for removing it.
    pub keep_input: bool,
}

/// Result of [`optimize_file`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    pub success: bool,
    pub original_size_bytes: u64,
    pub optimized_size_bytes: u64,
    pub compression_percent: i64,
    pub thumbnail_path: Option<PathBuf>,
    pub dimensions: Option<Dimensions>,
}

impl OptimizationOutcome {
    pub fn failed() -> Self {
        Self {
            success: false,
            original_size_bytes: 0,
            optimized_size_bytes: 0,
            compression_percent: 0,
            thumbnail_path: None,
            dimensions: None,
        }
    }
}

/// Scratch path used when writing over an existing file.
fn scratch_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    output.with_file_name(name)
}

/// Re-encode `request.input` into `request.output`.
///
/// On success the input is deleted when it differs from the output, unless
/// `keep_input` is set. On any
/// failure the input is kept, partial output is removed, and a failed
/// outcome is returned. A thumbnail failure does not fail the optimization;
/// it only leaves `thumbnail_path` empty.
pub fn optimize_file(backend: &impl CodecBackend, request: &OptimizeRequest) -> OptimizationOutcome {
    let original_size = match std::fs::metadata(&request.input) {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!(input = %request.input.display(), error = %e, "cannot stat input");
            return OptimizationOutcome::failed();
        }
    };

    let in_place = request.input == request.output;
    let target = if in_place {
        scratch_path(&request.output)
    } else {
        request.output.clone()
    };

    let params = EncodeParams {
        source: request.input.clone(),
        output: target.clone(),
        format: request.format,
        quality: request.quality,
        bounds: request.bounds,
    };

    let dimensions = match backend.encode(&params) {
        Ok(dims) => dims,
        Err(e) => {
            warn!(input = %request.input.display(), error = %e, "encode failed, keeping original");
            let _ = std::fs::remove_file(&target);
            return OptimizationOutcome::failed();
        }
    };

    if in_place && let Err(e) = std::fs::rename(&target, &request.output) {
        warn!(output = %request.output.display(), error = %e, "cannot replace original");
        let _ = std::fs::remove_file(&target);
        return OptimizationOutcome::failed();
    }

    let optimized_size = match std::fs::metadata(&request.output) {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!(output = %request.output.display(), error = %e, "cannot stat output");
            return OptimizationOutcome::failed();
        }
    };

    if !in_place && !request.keep_input && let Err(e) = std::fs::remove_file(&request.input) {
        warn!(input = %request.input.display(), error = %e, "cannot remove original after optimization");
    }

    let thumbnail_path = request
        .thumbnail
        .as_ref()
        .and_then(|spec| create_thumbnail(backend, &request.output, spec));

    let percent = compression_percent(original_size, optimized_size);
    debug!(
        output = %request.output.display(),
        original = original_size,
        optimized = optimized_size,
        percent,
        "optimized"
    );

    OptimizationOutcome {
        success: true,
        original_size_bytes: original_size,
        optimized_size_bytes: optimized_size,
        compression_percent: percent,
        thumbnail_path,
        dimensions: Some(dimensions),
    }
}

/// Create a thumbnail from `source`. Returns the thumbnail path, or `None`
/// (after logging) when the codec fails.
///
/// The thumbnail is written to a scratch file and renamed over
/// `spec.output`, so a failure leaves any existing thumbnail intact.
pub fn create_thumbnail(
    backend: &impl CodecBackend,
    source: &Path,
    spec: &ThumbnailSpec,
) -> Option<PathBuf> {
    let scratch = scratch_path(&spec.output);
    let params = ThumbnailParams {
        source: source.to_path_buf(),
        output: scratch.clone(),
        width: spec.width,
        height: spec.height,
        quality: spec.quality,
    };
    let written = backend
        .thumbnail(&params)
        .map_err(|e| e.to_string())
        .and_then(|()| std::fs::rename(&scratch, &spec.output).map_err(|e| e.to_string()));
    match written {
        Ok(()) => Some(spec.output.clone()),
        Err(e) => {
            warn!(source = %source.display(), error = %e, "thumbnail generation failed");
            let _ = std::fs::remove_file(&scratch);
            None
        }
    }
}
