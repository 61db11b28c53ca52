//! The sidecar index: a denormalized JSON mirror of the catalog
//!
//! One document per project (`raw/raw_metadata.json`), keyed by image id and
//! rewritten wholesale on every mutation. The catalog stays authoritative; a
//! divergent sidecar indicates a crash mid-operation and readers resolve it
//! in the catalog's favor.

use crate::catalog::ImageRecord;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// Sidecar document filename inside the raw tree
pub const SIDECAR_FILE: &str = "raw_metadata.json";

/// One sidecar entry, mirroring an image record minus the id key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarEntry {
    pub filename: String,
    pub original_filename: String,
    pub added: String,
}

impl From<&ImageRecord> for SidecarEntry {
    fn from(record: &ImageRecord) -> Self {
        Self {
            filename: record.filename.clone(),
            original_filename: record.original_filename.clone(),
            added: record.added.clone(),
        }
    }
}

/// Sidecar index handle, scoped to one project
pub struct SidecarIndex {
    path: PathBuf,
}

impl SidecarIndex {
    pub fn new(raw_dir: PathBuf) -> Self {
        Self {
            path: raw_dir.join(SIDECAR_FILE),
        }
    }

    /// Load the whole document; a missing or corrupt document is recovered
    /// as empty, never propagated
    pub fn load(&self) -> BTreeMap<String, SidecarEntry> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Corrupt sidecar index at {:?}: {}; treating as empty", self.path, e);
                BTreeMap::new()
            }
        }
    }

    /// Write the whole document atomically (temp file + rename in the same
    /// directory)
    fn store(&self, entries: &BTreeMap<String, SidecarEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Insert or replace the entry for an id
    pub fn upsert(&self, id: &str, entry: SidecarEntry) -> Result<()> {
        let mut entries = self.load();
        entries.insert(id.to_string(), entry);
        self.store(&entries)
    }

    /// Remove the entry for an id; unknown ids are a no-op
    pub fn remove(&self, id: &str) -> Result<()> {
        let mut entries = self.load();
        entries.remove(id);
        self.store(&entries)
    }

    /// Get the entry for an id
    pub fn get(&self, id: &str) -> Option<SidecarEntry> {
        self.load().remove(id)
    }

    /// The full document
    pub fn all(&self) -> BTreeMap<String, SidecarEntry> {
        self.load()
    }
}
