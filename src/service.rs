//! The image pipeline service.
//!
//! [`ImagePipeline`] is what a controller talks to. It combines a codec
//! backend, a property store and the uploads directory, and runs each
//! operation as load → mutate list → save → clean up files.
//!
//! ## Failure handling
//!
//! | Failure | Effect |
//! |---|---|
//! | validation, unknown property or image | error, nothing written |
//! | codec failure on one file | original kept, zero compression, warning logged |
//! | file deletion failure | warning logged, operation succeeds |
//! | uploads directory unwritable | error, staged files removed |
//! | store save failure | error, files written by this operation removed |
//!
//! Files of images dropped from a list are deleted only after the record
//! without them has been saved, so a failed save never leaves metadata
//! pointing at missing files.
//!
//! ## Concurrency
//!
//! Mutating operations on the same property id are serialized through a
//! per-id lock. Different properties proceed in parallel.

use crate::collection;
use crate::config::PipelineConfig;
use crate::diagnostics::{self, ImageStats, ImageSuggestions};
use crate::imaging::{CodecBackend, OptimizeRequest, Quality, ThumbnailSpec, compression_percent, optimize_file};
use crate::ingest::{self, IngestError, UploadedFile, ValidationError};
use crate::naming;
use crate::policy::{OptimizeOverrides, select_target};
use crate::storage::UploadsDir;
use crate::store::{PropertyStore, StoreError};
use crate::types::{NewProperty, Property, StoredImage};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("property not found: {0}")]
    PropertyNotFound(String),
    #[error("image {image} not found in property {property}")]
    ImageNotFound { property: String, image: String },
    #[error("uploads storage error: {0}")]
    Storage(#[from] io::Error),
    #[error("property store error: {0}")]
    Store(StoreError),
}

impl From<IngestError> for PipelineError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Validation(v) => Self::Validation(v),
            IngestError::Storage(io) => Self::Storage(io),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::PropertyNotFound(id),
            other => Self::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

pub struct ImagePipeline<B, S> {
    backend: B,
    store: S,
    uploads: UploadsDir,
    config: PipelineConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<B: CodecBackend, S: PropertyStore> ImagePipeline<B, S> {
    /// Open the uploads directory from `config` and build the pipeline.
    ///
    /// Fails if the uploads root cannot be created or written.
    pub fn new(backend: B, store: S, config: PipelineConfig) -> Result<Self> {
        let uploads = UploadsDir::open(&config.uploads.root, &config.uploads.url_prefix)?;
        Ok(Self::with_uploads(backend, store, uploads, config))
    }

    pub fn with_uploads(backend: B, store: S, uploads: UploadsDir, config: PipelineConfig) -> Self {
        Self {
            backend,
            store,
            uploads,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn uploads(&self) -> &UploadsDir {
        &self.uploads
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run `op` while holding the lock for `property_id`.
    ///
    /// The table entry is dropped afterwards unless another caller holds a
    /// handle to it, so ids that are never seen again do not accumulate.
    fn with_property_lock<T>(&self, property_id: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self
            .lock_table()
            .entry(property_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            // The guarded value is (), so a poisoned lock carries no bad state.
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            op()
        };

        let mut table = self.lock_table();
        // Handles are only cloned under the table lock: one in the table plus
        // ours means nobody is waiting.
        if Arc::strong_count(&lock) == 2 {
            table.remove(property_id);
        }
        result
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Save `property`. If the save fails, delete the files of
    /// `written` (images ingested by this operation) before returning.
    fn save_or_discard(&self, property: &Property, written: &[StoredImage]) -> Result<Property> {
        match self.store.save_property(property) {
            Ok(saved) => Ok(saved),
            Err(e) => {
                warn!(property = %property.id, error = %e, "save failed, discarding new files");
                self.uploads.remove_all(written);
                Err(e.into())
            }
        }
    }

    fn image_not_found(property: &str, image: &str) -> PipelineError {
        PipelineError::ImageNotFound {
            property: property.to_string(),
            image: image.to_string(),
        }
    }

    // =========================================================================
    // Ingestion-backed operations
    // =========================================================================

    /// Validate and optimize a batch without attaching it to a property.
    pub fn ingest_images(&self, files: &[UploadedFile], title_hint: Option<&str>) -> Result<Vec<StoredImage>> {
        Ok(ingest::ingest_images(
            &self.backend,
            &self.config,
            &self.uploads,
            files,
            0,
            title_hint,
        )?)
    }

    /// Create a property whose image list is exactly `files`, in order.
    ///
    /// Extra listing fields may not use the keys the pipeline manages
    /// (`id`, `title`, `images`).
    pub fn create_with_images(&self, data: NewProperty, files: &[UploadedFile]) -> Result<Property> {
        if let Some(key) = data.reserved_field() {
            return Err(ValidationError::ReservedField(key.to_string()).into());
        }
        let images = self.ingest_images(files, Some(&data.title))?;
        let property = Property {
            id: uuid::Uuid::new_v4().to_string(),
            title: data.title,
            images: collection::create(images),
            fields: data.fields,
        };
        let saved = self.save_or_discard(&property, &property.images)?;
        info!(property = %saved.id, images = saved.images.len(), "property created");
        Ok(saved)
    }

    /// Replace the image list with the retained images (in the given order)
    /// followed by newly uploaded files. Images not retained are deleted.
    pub fn update_images(
        &self,
        property_id: &str,
        retained_urls: &[String],
        new_files: &[UploadedFile],
    ) -> Result<Property> {
        self.with_property_lock(property_id, || {
            self.update_images_locked(property_id, retained_urls, new_files)
        })
    }

    fn update_images_locked(
        &self,
        property_id: &str,
        retained_urls: &[String],
        new_files: &[UploadedFile],
    ) -> Result<Property> {
        let mut property = self.store.load_property(property_id)?;
        collection::check_retained(&property.images, retained_urls)?;

        let new_images = ingest::ingest_images(
            &self.backend,
            &self.config,
            &self.uploads,
            new_files,
            retained_urls.len(),
            Some(&property.title),
        )?;

        let existing = std::mem::take(&mut property.images);
        let merge = collection::merge_retained(existing, retained_urls, new_images.clone())?;
        property.images = merge.images;

        let saved = self.save_or_discard(&property, &new_images)?;
        let files_removed = self.uploads.remove_all(&merge.removed);
        info!(
            property = %property_id,
            kept = retained_urls.len(),
            added = new_images.len(),
            removed = merge.removed.len(),
            files_removed,
            "images updated"
        );
        Ok(saved)
    }

    /// Append uploads after the current images.
    pub fn add_images(&self, property_id: &str, new_files: &[UploadedFile]) -> Result<Property> {
        self.with_property_lock(property_id, || self.add_images_locked(property_id, new_files))
    }

    fn add_images_locked(&self, property_id: &str, new_files: &[UploadedFile]) -> Result<Property> {
        let mut property = self.store.load_property(property_id)?;
        let new_images = ingest::ingest_images(
            &self.backend,
            &self.config,
            &self.uploads,
            new_files,
            property.images.len(),
            Some(&property.title),
        )?;
        collection::append(&mut property.images, new_images.clone());

        let saved = self.save_or_discard(&property, &new_images)?;
        info!(property = %property_id, added = new_images.len(), total = saved.images.len(), "images added");
        Ok(saved)
    }

    // =========================================================================
    // List operations
    // =========================================================================

    pub fn delete_image(&self, property_id: &str, image_id: &str) -> Result<Property> {
        self.with_property_lock(property_id, || {
            let mut property = self.store.load_property(property_id)?;
            let removed = collection::remove(&mut property.images, image_id)
                .ok_or_else(|| Self::image_not_found(property_id, image_id))?;

            let saved = self.store.save_property(&property)?;
            self.uploads.remove_image_files(&removed);
            info!(property = %property_id, image = %image_id, "image deleted");
            Ok(saved)
        })
    }

    pub fn set_cover(&self, property_id: &str, image_id: &str) -> Result<Property> {
        self.with_property_lock(property_id, || {
            let mut property = self.store.load_property(property_id)?;
            if !collection::set_cover(&mut property.images, image_id) {
                return Err(Self::image_not_found(property_id, image_id));
            }
            Ok(self.store.save_property(&property)?)
        })
    }

    pub fn reorder_images(&self, property_id: &str, ordered_ids: &[String]) -> Result<Property> {
        self.with_property_lock(property_id, || {
            let mut property = self.store.load_property(property_id)?;
            collection::reorder(&mut property.images, ordered_ids)?;
            Ok(self.store.save_property(&property)?)
        })
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub fn property(&self, property_id: &str) -> Result<Property> {
        Ok(self.store.load_property(property_id)?)
    }

    pub fn image_stats(&self, property_id: &str) -> Result<ImageStats> {
        let property = self.store.load_property(property_id)?;
        Ok(diagnostics::compute_stats(&property.images))
    }

    pub fn optimization_suggestions(&self, property_id: &str) -> Result<Vec<ImageSuggestions>> {
        let property = self.store.load_property(property_id)?;
        Ok(diagnostics::suggest(&property.images))
    }

    // =========================================================================
    // Re-optimization and deletion
    // =========================================================================

    /// Re-encode one stored image with the size policy plus `overrides`.
    ///
    /// The policy is driven by the size recorded at ingestion, and the
    /// compression percent is recomputed against that same size, so running
    /// this repeatedly never compounds. If the codec fails the image is
    /// returned unchanged.
    ///
    /// When the format changes the old file is removed only after the record
    /// naming the new one has been saved. If the save fails, the new file is
    /// removed instead.
    pub fn reoptimize_image(
        &self,
        property_id: &str,
        image_id: &str,
        overrides: &OptimizeOverrides,
    ) -> Result<StoredImage> {
        self.with_property_lock(property_id, || {
            self.reoptimize_image_locked(property_id, image_id, overrides)
        })
    }

    fn reoptimize_image_locked(
        &self,
        property_id: &str,
        image_id: &str,
        overrides: &OptimizeOverrides,
    ) -> Result<StoredImage> {
        let mut property = self.store.load_property(property_id)?;
        let idx = property
            .images
            .iter()
            .position(|img| img.id == image_id)
            .ok_or_else(|| Self::image_not_found(property_id, image_id))?;

        let current = property.images[idx].clone();
        let target = select_target(current.original_size_bytes, &self.config.optimization)
            .with_overrides(overrides);
        let target_name = naming::with_extension(&current.storage_name, target.format.extension());
        let thumb_name = naming::thumbnail_name(&target_name);
        let renamed = target_name != current.storage_name;

        let thumbnails = &self.config.thumbnails;
        let request = OptimizeRequest {
            input: self.uploads.path_for(&current.storage_name),
            output: self.uploads.path_for(&target_name),
            format: target.format,
            quality: target.quality,
            bounds: target.bounds,
            thumbnail: thumbnails.enabled.then(|| ThumbnailSpec {
                output: self.uploads.path_for(&thumb_name),
                width: thumbnails.width,
                height: thumbnails.height,
                quality: Quality::new(thumbnails.quality),
            }),
            keep_input: renamed,
        };

        let outcome = optimize_file(&self.backend, &request);
        if !outcome.success {
            warn!(property = %property_id, image = %image_id, "re-optimization failed, image unchanged");
            return Ok(current);
        }

        let updated = &mut property.images[idx];
        updated.storage_name = target_name.clone();
        updated.url = self.uploads.url_for(&target_name);
        updated.mime_type = target.format.mime_type().to_string();
        updated.current_size_bytes = outcome.optimized_size_bytes;
        updated.compression_percent =
            compression_percent(updated.original_size_bytes, outcome.optimized_size_bytes);
        if outcome.dimensions.is_some() {
            updated.dimensions = outcome.dimensions;
        }
        // A failed thumbnail leaves the previous one in place.
        if outcome.thumbnail_path.is_some() {
            updated.thumbnail_url = Some(self.uploads.url_for(&thumb_name));
        }
        let result = updated.clone();

        if let Err(e) = self.store.save_property(&property) {
            warn!(property = %property_id, image = %image_id, error = %e, "save failed, discarding re-encoded file");
            if renamed {
                self.uploads.remove_file(&target_name);
            }
            if current.thumbnail_url.is_none() && outcome.thumbnail_path.is_some() {
                self.uploads.remove_file(&thumb_name);
            }
            return Err(e.into());
        }
        if renamed {
            self.uploads.remove_file(&current.storage_name);
        }

        info!(
            property = %property_id,
            image = %image_id,
            size = result.current_size_bytes,
            percent = result.compression_percent,
            "image re-optimized"
        );
        Ok(result)
    }

    /// Delete every image file of a property, then the record. File errors
    /// are logged and do not stop the record deletion.
    pub fn delete_property(&self, property_id: &str) -> Result<()> {
        self.with_property_lock(property_id, || {
            let property = self.store.load_property(property_id)?;
            let files_removed = self.uploads.remove_all(&property.images);
            self.store.delete_property(property_id)?;
            info!(property = %property_id, files_removed, "property deleted");
            Ok(())
        })
    }
}
