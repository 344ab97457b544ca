//! Asset ingestion: uploaded files in, [`StoredImage`] records out.
//!
//! ## Stages
//!
//! 1. **Validate** the whole batch against [`UploadsConfig`]. Any violation
//!    rejects the request before a single byte is written.
//! 2. **Stage** each upload into the uploads directory under a fresh storage
//!    name. Names are allocated sequentially so the batch never collides
//!    with itself.
//! 3. **Optimize** every staged file in parallel on the rayon pool, using
//!    the size policy to pick format and quality. Results are collected in
//!    upload order.
//! 4. **Assemble** records: `order` continues after `existing_count`, and
//!    the first image becomes cover only when nothing existed before.
//!
//! A codec failure on one file never fails the batch. The original bytes
//! stay on disk and the record reports zero compression.

use crate::config::{PipelineConfig, UploadsConfig};
use crate::imaging::{
    CodecBackend, OptimizeRequest, OutputFormat, Quality, ThumbnailSpec, create_thumbnail,
    optimize_file,
};
use crate::naming;
use crate::policy::select_target;
use crate::storage::UploadsDir;
use crate::types::StoredImage;
use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// A client upload that has already been spooled to a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// File name as sent by the client. Only used for naming and messages.
    pub original_name: String,
    /// MIME type as declared by the client.
    pub mime_type: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl UploadedFile {
    /// Describe a local file, taking the size from the filesystem.
    pub fn from_path(path: impl Into<PathBuf>, mime_type: &str) -> io::Result<Self> {
        let path = path.into();
        let size_bytes = std::fs::metadata(&path)?.len();
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            original_name,
            mime_type: mime_type.to_string(),
            path,
            size_bytes,
        })
    }
}

/// Client errors. Raised before any file or record is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("too many files: {count} (limit {limit})")]
    TooManyFiles { count: usize, limit: usize },
    #[error("{file}: extension not allowed (allowed: {allowed})")]
    DisallowedExtension { file: String, allowed: String },
    #[error("{file}: MIME type {mime} not allowed (allowed: {allowed})")]
    DisallowedMimeType {
        file: String,
        mime: String,
        allowed: String,
    },
    #[error("{file}: {size} bytes exceeds the per-file limit of {limit} bytes")]
    FileTooLarge { file: String, size: u64, limit: u64 },
    #[error("request of {total} bytes exceeds the limit of {limit} bytes")]
    RequestTooLarge { total: u64, limit: u64 },
    #[error("malformed reorder list: {0}")]
    MalformedReorder(String),
    #[error("retained image is not part of this property: {0}")]
    UnknownRetainedImage(String),
    #[error("retained image listed more than once: {0}")]
    DuplicateRetainedImage(String),
    #[error("listing field {0:?} is managed by the pipeline")]
    ReservedField(String),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("uploads storage error: {0}")]
    Storage(#[from] io::Error),
}

/// Check a batch against the configured limits.
///
/// A file of exactly `max_file_bytes` is accepted.
pub fn validate_batch(files: &[UploadedFile], limits: &UploadsConfig) -> Result<(), ValidationError> {
    if files.len() > limits.max_files {
        return Err(ValidationError::TooManyFiles {
            count: files.len(),
            limit: limits.max_files,
        });
    }

    for file in files {
        let ext_ok = naming::extension_of(&file.original_name)
            .is_some_and(|ext| limits.allowed_extensions.iter().any(|a| *a == ext));
        if !ext_ok {
            return Err(ValidationError::DisallowedExtension {
                file: file.original_name.clone(),
                allowed: limits.allowed_extensions.join(", "),
            });
        }

        let mime = file.mime_type.to_ascii_lowercase();
        if !limits.allowed_mime_types.iter().any(|a| *a == mime) {
            return Err(ValidationError::DisallowedMimeType {
                file: file.original_name.clone(),
                mime: file.mime_type.clone(),
                allowed: limits.allowed_mime_types.join(", "),
            });
        }

        if file.size_bytes > limits.max_file_bytes {
            return Err(ValidationError::FileTooLarge {
                file: file.original_name.clone(),
                size: file.size_bytes,
                limit: limits.max_file_bytes,
            });
        }
    }

    let total: u64 = files.iter().map(|f| f.size_bytes).sum();
    if total > limits.max_request_bytes {
        return Err(ValidationError::RequestTooLarge {
            total,
            limit: limits.max_request_bytes,
        });
    }
    Ok(())
}

/// Alt text for an image at `order`.
///
/// `"<title> - Image <order>"` when a title hint is available, else the
/// sanitized file stem.
pub fn alt_text(title_hint: Option<&str>, original_name: &str, order: u32) -> String {
    match title_hint.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => format!("{title} - Image {order}"),
        None => naming::sanitize_stem(original_name),
    }
}

/// One upload copied into the uploads directory, waiting for the codec.
struct Staged<'a> {
    upload: &'a UploadedFile,
    /// Storage name of the copied original.
    staged_name: String,
    /// Storage name the optimized output will take; may equal `staged_name`.
    target_name: String,
    target_format: Option<OutputFormat>,
    quality: Quality,
    bounds: Option<(u32, u32)>,
}

/// What the parallel stage produced for one upload.
struct Processed {
    storage_name: String,
    current_size_bytes: u64,
    original_size_bytes: u64,
    compression_percent: i64,
    mime_type: String,
    thumbnail_name: Option<String>,
    dimensions: Option<crate::imaging::Dimensions>,
}

/// Validate, store and optimize a batch of uploads.
///
/// Returned records are in upload order with `order` starting at
/// `existing_count + 1`. Nothing is written when validation fails. If the
/// uploads directory cannot be written, files staged so far are removed and
/// the error is returned.
pub fn ingest_images(
    backend: &impl CodecBackend,
    config: &PipelineConfig,
    uploads: &UploadsDir,
    files: &[UploadedFile],
    existing_count: usize,
    title_hint: Option<&str>,
) -> Result<Vec<StoredImage>, IngestError> {
    validate_batch(files, &config.uploads)?;
    if files.is_empty() {
        return Ok(Vec::new());
    }

    info!(files = files.len(), existing = existing_count, "ingesting batch");
    let staged = stage_all(config, uploads, files)?;

    let processed: Vec<Processed> = staged
        .par_iter()
        .map(|s| process_one(backend, config, uploads, s))
        .collect();

    let images: Vec<StoredImage> = processed
        .into_iter()
        .zip(files)
        .enumerate()
        .map(|(idx, (p, upload))| {
            let order = (existing_count + idx + 1) as u32;
            StoredImage {
                id: uuid::Uuid::new_v4().to_string(),
                url: uploads.url_for(&p.storage_name),
                alt_text: alt_text(title_hint, &upload.original_name, order),
                order,
                storage_name: p.storage_name,
                current_size_bytes: p.current_size_bytes,
                original_size_bytes: p.original_size_bytes,
                compression_percent: p.compression_percent,
                mime_type: p.mime_type,
                is_cover: existing_count == 0 && idx == 0,
                thumbnail_url: p.thumbnail_name.map(|t| uploads.url_for(&t)),
                dimensions: p.dimensions,
            }
        })
        .collect();

    let saved: u64 = images
        .iter()
        .map(|i| i.original_size_bytes.saturating_sub(i.current_size_bytes))
        .sum();
    info!(images = images.len(), bytes_saved = saved, "batch ingested");
    Ok(images)
}

/// Copy every upload into the uploads directory. All or nothing.
fn stage_all<'a>(
    config: &PipelineConfig,
    uploads: &UploadsDir,
    files: &'a [UploadedFile],
) -> Result<Vec<Staged<'a>>, IngestError> {
    let mut staged: Vec<Staged<'a>> = Vec::with_capacity(files.len());
    for upload in files {
        match stage_one(config, uploads, upload) {
            Ok(s) => staged.push(s),
            Err(e) => {
                warn!(file = %upload.original_name, error = %e, "staging failed, rolling back batch");
                for s in &staged {
                    uploads.remove_file(&s.staged_name);
                    if s.target_name != s.staged_name {
                        uploads.remove_file(&s.target_name);
                    }
                }
                return Err(IngestError::Storage(e));
            }
        }
    }
    Ok(staged)
}

fn stage_one<'a>(
    config: &PipelineConfig,
    uploads: &UploadsDir,
    upload: &'a UploadedFile,
) -> io::Result<Staged<'a>> {
    let original_ext = naming::extension_of(&upload.original_name).unwrap_or_else(|| "bin".into());

    let opt = &config.optimization;
    if !opt.enabled {
        let staged_name = uploads.allocate_name(&upload.original_name, &original_ext, None)?;
        copy_into(uploads, upload, &staged_name, None)?;
        return Ok(Staged {
            upload,
            target_name: staged_name.clone(),
            staged_name,
            target_format: None,
            quality: Quality::default(),
            bounds: None,
        });
    }

    let target = select_target(upload.size_bytes, opt);
    let target_ext = target.format.extension();
    let converted = (target_ext != original_ext).then_some(target_ext);
    let staged_name = uploads.allocate_name(&upload.original_name, &original_ext, converted)?;
    let target_name = match converted {
        Some(ext) => naming::with_extension(&staged_name, ext),
        None => staged_name.clone(),
    };
    copy_into(uploads, upload, &staged_name, converted)?;

    Ok(Staged {
        upload,
        staged_name,
        target_name,
        target_format: Some(target.format),
        quality: target.quality,
        bounds: target.bounds,
    })
}

/// Copy an upload over its reserved storage name, releasing the reservation
/// on failure.
fn copy_into(
    uploads: &UploadsDir,
    upload: &UploadedFile,
    storage_name: &str,
    converted: Option<&str>,
) -> io::Result<()> {
    match std::fs::copy(&upload.path, uploads.path_for(storage_name)) {
        Ok(_) => Ok(()),
        Err(e) => {
            uploads.release_name(storage_name, converted);
            Err(e)
        }
    }
}

fn thumbnail_spec(config: &PipelineConfig, uploads: &UploadsDir, storage_name: &str) -> Option<ThumbnailSpec> {
    let t = &config.thumbnails;
    t.enabled.then(|| ThumbnailSpec {
        output: uploads.path_for(&naming::thumbnail_name(storage_name)),
        width: t.width,
        height: t.height,
        quality: Quality::new(t.quality),
    })
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn process_one(
    backend: &impl CodecBackend,
    config: &PipelineConfig,
    uploads: &UploadsDir,
    staged: &Staged<'_>,
) -> Processed {
    let staged_path = uploads.path_for(&staged.staged_name);
    let size = staged.upload.size_bytes;

    if let Some(format) = staged.target_format {
        let request = OptimizeRequest {
            input: staged_path.clone(),
            output: uploads.path_for(&staged.target_name),
            format,
            quality: staged.quality,
            bounds: staged.bounds,
            thumbnail: thumbnail_spec(config, uploads, &staged.target_name),
            keep_input: false,
        };
        let outcome = optimize_file(backend, &request);
        if outcome.success {
            debug!(
                file = %staged.upload.original_name,
                stored = %staged.target_name,
                percent = outcome.compression_percent,
                "optimized upload"
            );
            return Processed {
                storage_name: staged.target_name.clone(),
                current_size_bytes: outcome.optimized_size_bytes,
                original_size_bytes: outcome.original_size_bytes,
                compression_percent: outcome.compression_percent,
                mime_type: format.mime_type().to_string(),
                thumbnail_name: outcome.thumbnail_path.as_deref().and_then(file_name_of),
                dimensions: outcome.dimensions,
            };
        }
        warn!(file = %staged.upload.original_name, "optimization failed, keeping original upload");
        return Processed {
            storage_name: staged.staged_name.clone(),
            current_size_bytes: size,
            original_size_bytes: size,
            compression_percent: 0,
            mime_type: staged.upload.mime_type.to_ascii_lowercase(),
            thumbnail_name: None,
            dimensions: backend.identify(&staged_path).ok(),
        };
    }

    // Optimization disabled: store as uploaded, still derive a thumbnail.
    let thumbnail_name = thumbnail_spec(config, uploads, &staged.staged_name)
        .and_then(|spec| create_thumbnail(backend, &staged_path, &spec))
        .as_deref()
        .and_then(file_name_of);
    Processed {
        storage_name: staged.staged_name.clone(),
        current_size_bytes: size,
        original_size_bytes: size,
        compression_percent: 0,
        mime_type: staged.upload.mime_type.to_ascii_lowercase(),
        thumbnail_name,
        dimensions: backend.identify(&staged_path).ok(),
    }
}
