//! # Property Images
//!
//! The image pipeline behind a property listing platform: uploaded photos go
//! in, optimized files plus an ordered, single-cover image list come out.
//!
//! # Architecture
//!
//! ```text
//! uploads ─► ingest ──────────► collection ──────► store
//!            validate            merge / append     save the whole record
//!            stage               resequence
//!            optimize (rayon)    reconcile cover
//!                 │
//!                 ▼
//!            imaging (codec adapter) + policy (size → format, quality)
//!
//! store ─► diagnostics (stats, suggestions; read-only)
//! ```
//!
//! [`service::ImagePipeline`] wires the stages together and exposes one method
//! per operation a controller needs.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Codec adapter: identify, fit-inside resize, JPEG/PNG/WebP encode, thumbnails |
//! | [`policy`] | Size-driven choice of output format and quality, plus caller overrides |
//! | [`naming`] | Collision-resistant storage names and thumbnail names |
//! | [`ingest`] | Upload validation and batch optimization into [`types::StoredImage`] records |
//! | [`collection`] | Pure list operations that keep `order` contiguous and exactly one cover |
//! | [`diagnostics`] | Compression statistics and per-image optimization suggestions |
//! | [`storage`] | The uploads directory: opening, file paths, URLs, best-effort removal |
//! | [`store`] | The property store seam, with in-memory and JSON-directory implementations |
//! | [`service`] | The pipeline service: every operation, with per-property locking |
//! | [`config`] | `config.toml` loading, validation and merging |
//! | [`types`] | Persisted records (`StoredImage`, `Property`) |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Codec failures never lose an upload
//!
//! [`imaging::optimize_file`] reports failure as data, not as an error. When a
//! file cannot be decoded or encoded, ingestion keeps the original bytes and
//! records zero compression, and the rest of the batch carries on.
//!
//! ## One place restores the cover invariant
//!
//! Every list operation ends with [`collection::resequence`] and
//! [`collection::reconcile_cover`], instead of each operation deciding for
//! itself which image becomes cover.
//!
//! ## Original size is written once
//!
//! `originalSizeBytes` is recorded at ingestion and never touched again.
//! Re-optimizing an image measures compression against that value, so
//! repeated passes report the true total reduction.
//!
//! ## Compression percent is not clamped
//!
//! A re-encode that grows a file yields a negative percent. It is reported as
//! is rather than hidden.

pub mod collection;
pub mod config;
pub mod diagnostics;
pub mod imaging;
pub mod ingest;
pub mod naming;
pub mod output;
pub mod policy;
pub mod service;
pub mod storage;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
