//! Property store collaborator.
//!
//! The pipeline never owns persistence. It loads a [`Property`], edits its
//! image list, and hands the whole record back through [`PropertyStore`].
//! Saves are full replacements of the record, so repeating one is harmless.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`]: a locked `HashMap`, used by tests and embedding code.
//! - [`JsonDirStore`]: one pretty-printed `<id>.json` per property, used by
//!   the CLI.

use crate::types::Property;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("property not found: {0}")]
    NotFound(String),
    #[error("invalid property id: {0:?}")]
    InvalidId(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Load, save and delete property records.
pub trait PropertyStore: Send + Sync {
    fn load_property(&self, id: &str) -> Result<Property, StoreError>;

    /// Replace the stored record with `property` and return what was stored.
    fn save_property(&self, property: &Property) -> Result<Property, StoreError>;

    fn delete_property(&self, id: &str) -> Result<(), StoreError>;
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Property>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PropertyStore for MemoryStore {
    fn load_property(&self, id: &str) -> Result<Property, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn save_property(&self, property: &Property) -> Result<Property, StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records.insert(property.id.clone(), property.clone());
        Ok(property.clone())
    }

    fn delete_property(&self, id: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

// =============================================================================
// JSON directory store
// =============================================================================

/// One JSON file per property under a directory.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Open (and create if needed) a store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ids become file names, so only `[A-Za-z0-9_-]` is accepted.
    fn record_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

impl PropertyStore for JsonDirStore {
    fn load_property(&self, id: &str) -> Result<Property, StoreError> {
        let path = self.record_path(id)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    fn save_property(&self, property: &Property) -> Result<Property, StoreError> {
        let path = self.record_path(&property.id)?;
        let json = serde_json::to_string_pretty(property)?;
        // Write beside the record and rename so readers never see half a file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(property.clone())
    }

    fn delete_property(&self, id: &str) -> Result<(), StoreError> {
        let path = self.record_path(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
