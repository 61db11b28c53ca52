//! Per-image annotation documents
//!
//! One JSON document per image under `processed/<stem>.json`, keyed by the
//! raw image's stem. Saves are whole-document replacements; callers carrying
//! a partial update are responsible for preserving prior `annotations` and
//! `history` content.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// One event in an annotation's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationEvent {
    pub action: String,
    #[serde(default)]
    pub by: Option<String>,
    #[serde(default)]
    pub at: Option<String>,
}

/// A per-image annotation document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub image_id: String,
    pub filename: String,
    pub parent_raw_filename: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub mode: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_specific_tags: Option<serde_json::Map<String, serde_json::Value>>,
    pub ingested_at: String,
    #[serde(default)]
    pub annotations: Vec<serde_json::Value>,
    #[serde(default)]
    pub history: Vec<AnnotationEvent>,
}

/// Annotation store scoped to one project's processed tree
pub struct AnnotationStore {
    processed_dir: PathBuf,
}

impl AnnotationStore {
    pub fn new(processed_dir: PathBuf) -> Self {
        Self { processed_dir }
    }

    /// Document path for an image filename (keyed by its stem)
    pub fn path_for(&self, image_filename: &str) -> PathBuf {
        self.processed_dir.join(format!("{}.json", stem(image_filename)))
    }

    /// Whether a document already exists for this image
    pub fn exists(&self, image_filename: &str) -> bool {
        self.path_for(image_filename).is_file()
    }

    /// Fetch the annotation document for an image
    pub fn get(&self, image_filename: &str) -> Result<Annotation> {
        let path = self.path_for(image_filename);
        let content = fs::read_to_string(&path)
            .map_err(|_| Error::AnnotationNotFound(image_filename.to_string()))?;
        let annotation = serde_json::from_str(&content)
            .map_err(|e| Error::Corrupt(format!("{}: {}", path.display(), e)))?;
        Ok(annotation)
    }

    /// Write (create or replace) the full annotation document atomically
    pub fn save(&self, image_filename: &str, annotation: &Annotation) -> Result<()> {
        fs::create_dir_all(&self.processed_dir)?;
        let path = self.path_for(image_filename);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(annotation)?;
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

/// Stem of a filename (everything before the last dot)
pub fn stem(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    }
}
