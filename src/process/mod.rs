//! The processing pipeline: raw blobs to normalized processed output
//!
//! Blob-driven on purpose: the raw tree is iterated directly, decoupled from
//! the catalog, so orphaned files are still processed. The metadata document
//! is regenerated wholesale each run; annotation skeletons are only ever
//! written when absent, so user annotations survive re-runs.

mod codec;

pub use codec::*;

use crate::annotate::{stem, Annotation, AnnotationEvent, AnnotationStore};
use crate::blob::BlobStore;
use crate::error::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Processed metadata document filename
pub const METADATA_FILE: &str = "metadata.json";

/// Metadata recorded for one successfully processed asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedAsset {
    pub original_filename: String,
    pub processed_filename: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub mode: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_specific_tags: Option<serde_json::Map<String, serde_json::Value>>,
}

/// One entry of the processed metadata document: an asset keyed by its
/// processed filename, or an error keyed by the raw filename
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataEntry {
    Asset(ProcessedAsset),
    Error { error: String },
}

impl MetadataEntry {
    pub fn is_error(&self) -> bool {
        matches!(self, MetadataEntry::Error { .. })
    }
}

/// The full processed metadata document, regenerated wholesale per run.
/// A BTreeMap keeps repeated runs over an unchanged raw set byte-identical.
pub type ProcessedMetadata = BTreeMap<String, MetadataEntry>;

/// Processing pipeline over one project
pub struct Processor<'a> {
    blobs: &'a BlobStore,
    annotations: &'a AnnotationStore,
    codec: &'a dyn ImageCodec,
    processed_dir: PathBuf,
    jpeg_quality: u8,
    processed_extension: String,
}

impl<'a> Processor<'a> {
    pub fn new(
        blobs: &'a BlobStore,
        annotations: &'a AnnotationStore,
        codec: &'a dyn ImageCodec,
        processed_dir: PathBuf,
        jpeg_quality: u8,
        processed_extension: String,
    ) -> Self {
        Self {
            blobs,
            annotations,
            codec,
            processed_dir,
            jpeg_quality,
            processed_extension,
        }
    }

    /// Process every raw blob: decode, normalize to JPEG, record metadata,
    /// and materialize annotation skeletons for images that have none.
    ///
    /// A per-file decode failure becomes an error entry under that file's
    /// name; remaining files still process. Existing processed output and
    /// existing annotation documents are left alone, so an interrupted run
    /// resumes without redoing completed work.
    pub async fn process(&self) -> Result<ProcessedMetadata> {
        fs::create_dir_all(&self.processed_dir)?;

        let mut metadata = ProcessedMetadata::new();

        for raw_name in self.blobs.files()? {
            match self.process_file(&raw_name).await {
                Ok((processed_name, asset)) => {
                    metadata.insert(processed_name, MetadataEntry::Asset(asset));
                }
                Err(e) => {
                    warn!("Processing {} failed: {}", raw_name, e);
                    metadata.insert(
                        raw_name,
                        MetadataEntry::Error {
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        self.write_metadata(&metadata)?;
        Ok(metadata)
    }

    async fn process_file(&self, raw_name: &str) -> Result<(String, ProcessedAsset)> {
        let raw_path = self.blobs.path(raw_name);
        let info = self.codec.probe(&raw_path).await?;

        let processed_name = format!("{}.{}", stem(raw_name), self.processed_extension);
        let dest = self.processed_dir.join(&processed_name);
        if dest.is_file() {
            debug!("Processed output {} already present, skipping encode", processed_name);
        } else {
            self.codec
                .encode_jpeg(&raw_path, &dest, self.jpeg_quality)
                .await?;
        }

        let size_bytes = self.blobs.metadata(raw_name)?.len();
        let asset = ProcessedAsset {
            original_filename: raw_name.to_string(),
            processed_filename: processed_name.clone(),
            width: info.width,
            height: info.height,
            format: info.format.clone(),
            mode: info.mode.clone(),
            size_bytes,
            format_specific_tags: info.tags.clone(),
        };

        // Never clobber an existing annotation document
        if !self.annotations.exists(raw_name) {
            let now = Utc::now().to_rfc3339();
            let skeleton = Annotation {
                image_id: stem(raw_name).to_string(),
                filename: processed_name.clone(),
                parent_raw_filename: raw_name.to_string(),
                width: info.width,
                height: info.height,
                format: info.format,
                mode: info.mode,
                size_bytes,
                format_specific_tags: info.tags,
                ingested_at: now.clone(),
                annotations: Vec::new(),
                history: vec![AnnotationEvent {
                    action: "created".to_string(),
                    by: None,
                    at: Some(now),
                }],
            };
            self.annotations.save(raw_name, &skeleton)?;
        }

        Ok((processed_name, asset))
    }

    /// Rewrite the metadata document wholesale, atomically
    fn write_metadata(&self, metadata: &ProcessedMetadata) -> Result<()> {
        let path = self.processed_dir.join(METADATA_FILE);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(metadata)?;
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}
