//! Raw blob storage for one project
//!
//! Copies imported bytes into the project's `raw/` tree under
//! collision-resolved names and never silently overwrites an existing blob.

use crate::error::{Error, Result};
use crate::sidecar::SIDECAR_FILE;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Blob store scoped to one project's raw tree
pub struct BlobStore {
    raw_dir: PathBuf,
}

impl BlobStore {
    pub fn new(raw_dir: PathBuf) -> Self {
        Self { raw_dir }
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    /// Absolute path of a stored blob
    pub fn path(&self, filename: &str) -> PathBuf {
        self.raw_dir.join(filename)
    }

    /// Whether a blob with this name exists
    pub fn contains(&self, filename: &str) -> bool {
        self.path(filename).is_file()
    }

    /// Copy a source file into the raw tree, resolving name collisions by
    /// appending a numeric suffix before the extension (`name.ext`,
    /// `name_1.ext`, `name_2.ext`, ...). Returns the stored filename.
    pub fn put(&self, source: &Path) -> Result<String> {
        let original = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidPath(source.display().to_string()))?;

        fs::create_dir_all(&self.raw_dir)?;

        let stored = self.unique_name(original);
        let dest = self.raw_dir.join(&stored);
        fs::copy(source, &dest)?;

        debug!("Stored blob {:?} as {}", source, stored);
        Ok(stored)
    }

    /// Resolve a unique name against the blobs on disk, not catalog rows, so
    /// uniqueness survives catalog/blob drift
    fn unique_name(&self, original: &str) -> String {
        if !self.contains(original) {
            return original.to_string();
        }

        let (stem, ext) = split_name(original);
        let mut counter = 1;
        loop {
            let candidate = if ext.is_empty() {
                format!("{}_{}", stem, counter)
            } else {
                format!("{}_{}.{}", stem, counter, ext)
            };
            if !self.contains(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Remove a blob; a missing file is an error at this layer
    pub fn remove(&self, filename: &str) -> Result<()> {
        let path = self.path(filename);
        if !path.is_file() {
            return Err(Error::ImageNotFound(filename.to_string()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    /// Rename a blob, refusing to overwrite an existing target. The new name
    /// must be a bare file name; anything that would resolve outside the raw
    /// tree is rejected.
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        validate_filename(new)?;
        let old_path = self.path(old);
        let new_path = self.path(new);
        if !old_path.is_file() {
            return Err(Error::ImageNotFound(old.to_string()));
        }
        if new_path.exists() {
            return Err(Error::AlreadyExists(new.to_string()));
        }
        fs::rename(old_path, new_path)?;
        Ok(())
    }

    /// Open a blob for reading
    pub fn open(&self, filename: &str) -> Result<File> {
        let path = self.path(filename);
        if !path.is_file() {
            return Err(Error::ImageNotFound(filename.to_string()));
        }
        Ok(File::open(path)?)
    }

    /// Filesystem metadata of a blob
    pub fn metadata(&self, filename: &str) -> Result<fs::Metadata> {
        let path = self.path(filename);
        if !path.is_file() {
            return Err(Error::ImageNotFound(filename.to_string()));
        }
        Ok(fs::metadata(path)?)
    }

    /// Sorted listing of raw blobs, skipping the sidecar document
    pub fn files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if !self.raw_dir.is_dir() {
            return Ok(names);
        }
        for entry in fs::read_dir(&self.raw_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name == SIDECAR_FILE {
                continue;
            }
            names.push(name.to_string());
        }
        names.sort();
        Ok(names)
    }
}

/// A blob name must be a single normal path component
pub fn validate_filename(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\');
    if !valid {
        return Err(Error::InvalidPath(name.to_string()));
    }
    Ok(())
}

/// Split a filename into stem and extension (no dot)
fn split_name(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (name, ""),
    }
}
