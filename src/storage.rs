//! The uploads directory.
//!
//! One [`UploadsDir`] is opened at startup from configuration and handed to
//! the pipeline. Opening creates the directory if needed and proves it is
//! writable, so an unusable root fails fast instead of mid-request.
//!
//! Removal is best-effort: a file that cannot be deleted is logged and left
//! behind as an orphan, and the metadata change that triggered the removal
//! still goes through.

use crate::naming;
use crate::types::StoredImage;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Attempts before giving up on finding an unused storage name.
const MAX_NAME_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
pub struct UploadsDir {
    root: PathBuf,
    url_prefix: String,
}

impl UploadsDir {
    /// Ensure `root` exists and is writable.
    pub fn open(root: impl Into<PathBuf>, url_prefix: &str) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let probe = root.join(".write-probe");
        std::fs::write(&probe, b"")?;
        std::fs::remove_file(&probe)?;

        Ok(Self {
            root,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, storage_name: &str) -> PathBuf {
        self.root.join(storage_name)
    }

    pub fn url_for(&self, storage_name: &str) -> String {
        format!("{}/{}", self.url_prefix, storage_name)
    }

    /// Generate a storage name and reserve it by creating an empty file with
    /// `create_new`, so two concurrent uploads can never get the same name.
    ///
    /// When `converted` is set, the same name with that extension is
    /// reserved too, for the file the optimizer will write.
    pub fn allocate_name(
        &self,
        original_name: &str,
        extension: &str,
        converted: Option<&str>,
    ) -> io::Result<String> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = naming::generate_storage_name(original_name, extension);
            if !self.reserve(&name)? {
                continue;
            }
            match converted {
                Some(ext) if !self.reserve(&naming::with_extension(&name, ext))? => {
                    let _ = std::fs::remove_file(self.path_for(&name));
                }
                _ => return Ok(name),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free storage name for {original_name}"),
        ))
    }

    /// Drop the placeholders created by [`allocate_name`](Self::allocate_name).
    pub fn release_name(&self, name: &str, converted: Option<&str>) {
        let _ = std::fs::remove_file(self.path_for(name));
        if let Some(ext) = converted {
            let _ = std::fs::remove_file(self.path_for(&naming::with_extension(name, ext)));
        }
    }

    /// Create `storage_name` exclusively. `Ok(false)` means it was taken.
    fn reserve(&self, storage_name: &str) -> io::Result<bool> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path_for(storage_name))
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove an image file and its thumbnail. Returns how many files were
    /// actually deleted; failures are logged, never returned.
    pub fn remove_image_files(&self, image: &StoredImage) -> usize {
        let mut removed = 0;
        if self.remove_file(&image.storage_name) {
            removed += 1;
        }
        if image.thumbnail_url.is_some()
            && self.remove_file(&naming::thumbnail_name(&image.storage_name))
        {
            removed += 1;
        }
        removed
    }

    /// Remove the files of every image in `images`.
    pub fn remove_all(&self, images: &[StoredImage]) -> usize {
        images.iter().map(|img| self.remove_image_files(img)).sum()
    }

    /// Delete one file by storage name. Returns whether it was deleted.
    pub fn remove_file(&self, storage_name: &str) -> bool {
        let path = self.path_for(storage_name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(file = %path.display(), "removed");
                true
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to delete stored file");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::sample_image;
    use tempfile::TempDir;

    #[test]
    fn open_creates_missing_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("nested/uploads");
        let dir = UploadsDir::open(&root, "/uploads").unwrap();
        assert!(root.is_dir());
        assert_eq!(dir.root(), root.as_path());
        assert!(!root.join(".write-probe").exists());
    }

    #[test]
    fn open_fails_when_root_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        assert!(UploadsDir::open(&file, "/uploads").is_err());
    }

    #[test]
    fn url_for_joins_prefix_without_double_slash() {
        let tmp = TempDir::new().unwrap();
        let dir = UploadsDir::open(tmp.path(), "/uploads/").unwrap();
        assert_eq!(dir.url_for("a.jpg"), "/uploads/a.jpg");
    }

    #[test]
    fn allocate_name_uses_extension_and_reserves_it() {
        let tmp = TempDir::new().unwrap();
        let dir = UploadsDir::open(tmp.path(), "/uploads").unwrap();
        let name = dir.allocate_name("Garden View.PNG", "webp", None).unwrap();
        assert!(name.starts_with("Garden_View-"));
        assert!(name.ends_with(".webp"));
        assert_eq!(std::fs::metadata(dir.path_for(&name)).unwrap().len(), 0);
    }

    #[test]
    fn allocate_name_reserves_converted_name() {
        let tmp = TempDir::new().unwrap();
        let dir = UploadsDir::open(tmp.path(), "/uploads").unwrap();
        let name = dir.allocate_name("porch.png", "png", Some("jpg")).unwrap();
        let converted = naming::with_extension(&name, "jpg");
        assert!(dir.path_for(&name).exists());
        assert!(dir.path_for(&converted).exists());

        dir.release_name(&name, Some("jpg"));
        assert!(!dir.path_for(&name).exists());
        assert!(!dir.path_for(&converted).exists());
    }

    #[test]
    fn allocate_name_never_hands_out_a_name_twice() {
        let tmp = TempDir::new().unwrap();
        let dir = UploadsDir::open(tmp.path(), "/uploads").unwrap();
        let names: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| dir.allocate_name("same.jpg", "jpg", Some("webp")).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let unique: std::collections::HashSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert_eq!(std::fs::read_dir(dir.root()).unwrap().count(), 16);
    }

    #[test]
    fn remove_image_files_removes_thumbnail_too() {
        let tmp = TempDir::new().unwrap();
        let dir = UploadsDir::open(tmp.path(), "/uploads").unwrap();

        let mut img = sample_image("a", 1, true);
        img.storage_name = "porch-1-2.jpg".into();
        img.thumbnail_url = Some("/uploads/porch-1-2-thumb.jpg".into());
        std::fs::write(dir.path_for("porch-1-2.jpg"), b"img").unwrap();
        std::fs::write(dir.path_for("porch-1-2-thumb.jpg"), b"thumb").unwrap();

        assert_eq!(dir.remove_image_files(&img), 2);
        assert!(!dir.path_for("porch-1-2.jpg").exists());
        assert!(!dir.path_for("porch-1-2-thumb.jpg").exists());
    }

    #[test]
    fn remove_missing_file_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let dir = UploadsDir::open(tmp.path(), "/uploads").unwrap();
        let img = sample_image("ghost", 1, true);
        assert_eq!(dir.remove_image_files(&img), 0);
    }
}
