//! The ingestion pipeline: importing external files into managed storage
//!
//! Write ordering is blob, then catalog with its paired history entry in one
//! transaction, then sidecar. Each step after the first compensates on
//! failure, so a crash strands at worst an orphaned blob. Items are isolated:
//! one bad file never aborts the batch.

use crate::blob::BlobStore;
use crate::catalog::{Catalog, ImageRecord};
use crate::error::{Error, Result};
use crate::sidecar::SidecarIndex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// A successfully imported image
#[derive(Debug, Clone, Serialize)]
pub struct ImportedImage {
    pub id: String,
    pub filename: String,
    pub original_filename: String,
    pub source: PathBuf,
}

/// A per-item import failure
#[derive(Debug, Clone, Serialize)]
pub struct ImportFailure {
    pub source: PathBuf,
    pub error: String,
}

/// The per-item result of a batch import
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ImportOutcome {
    Imported(ImportedImage),
    Failed(ImportFailure),
}

impl ImportOutcome {
    pub fn is_imported(&self) -> bool {
        matches!(self, ImportOutcome::Imported(_))
    }
}

/// Import a batch of already-materialized local files into a project.
///
/// Returns one outcome per source path, in order; failures are collected
/// structurally rather than aborting the batch.
pub async fn import_images(
    catalog: &Catalog,
    blobs: &BlobStore,
    sidecar: &SidecarIndex,
    sources: &[PathBuf],
) -> Vec<ImportOutcome> {
    let mut outcomes = Vec::with_capacity(sources.len());
    for source in sources {
        match import_one(catalog, blobs, sidecar, source).await {
            Ok(imported) => outcomes.push(ImportOutcome::Imported(imported)),
            Err(e) => {
                warn!("Import of {:?} failed: {}", source, e);
                outcomes.push(ImportOutcome::Failed(ImportFailure {
                    source: source.clone(),
                    error: e.to_string(),
                }));
            }
        }
    }
    outcomes
}

async fn import_one(
    catalog: &Catalog,
    blobs: &BlobStore,
    sidecar: &SidecarIndex,
    source: &Path,
) -> Result<ImportedImage> {
    let original_filename = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidPath(source.display().to_string()))?
        .to_string();

    let filename = blobs.put(source)?;
    let record = ImageRecord::new(
        Uuid::new_v4().to_string(),
        filename.clone(),
        original_filename.clone(),
    );

    let details = serde_json::json!({ "src_path": source.display().to_string() });
    if let Err(e) = catalog.insert_with_history(&record, Some(details)).await {
        // The blob is the only thing written so far; take it back out
        if let Err(cleanup) = blobs.remove(&filename) {
            warn!("Failed to clean up blob {} after catalog error: {}", filename, cleanup);
        }
        return Err(e);
    }

    if let Err(e) = sidecar.upsert(&record.id, (&record).into()) {
        let rollback = serde_json::json!({ "reason": "import rollback" });
        if let Err(cleanup) = catalog.delete_with_history(&record.id, Some(rollback)).await {
            warn!("Failed to revert catalog row {} after sidecar error: {}", record.id, cleanup);
        }
        if let Err(cleanup) = blobs.remove(&filename) {
            warn!("Failed to clean up blob {} after sidecar error: {}", filename, cleanup);
        }
        return Err(e);
    }

    debug!("Imported {:?} as {} ({})", source, record.filename, record.id);
    Ok(ImportedImage {
        id: record.id,
        filename: record.filename,
        original_filename: record.original_filename,
        source: source.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        catalog: Catalog,
        blobs: BlobStore,
        sidecar: SidecarIndex,
        tmp: TempDir,
    }

    async fn setup() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project");
        fs::create_dir_all(project.join("raw")).unwrap();
        Fixture {
            catalog: Catalog::open(&project).await.unwrap(),
            blobs: BlobStore::new(project.join("raw")),
            sidecar: SidecarIndex::new(project.join("raw")),
            tmp,
        }
    }

    impl Fixture {
        fn source(&self, name: &str, content: &[u8]) -> PathBuf {
            let dir = self.tmp.path().join("incoming");
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join(name);
            fs::write(&path, content).unwrap();
            path
        }
    }

    #[tokio::test]
    async fn test_import_writes_all_three_stores() {
        let fx = setup().await;
        let sources = vec![fx.source("a.png", b"a"), fx.source("b.png", b"b")];

        let outcomes = import_images(&fx.catalog, &fx.blobs, &fx.sidecar, &sources).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.is_imported()));

        let records = fx.catalog.list_all().await.unwrap();
        assert_eq!(records.len(), 2);

        let sidecar_ids: Vec<_> = fx.sidecar.all().into_keys().collect();
        let mut catalog_ids: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
        catalog_ids.sort();
        assert_eq!(catalog_ids, sidecar_ids);

        for record in &records {
            assert!(fx.blobs.contains(&record.filename));
        }
        assert_eq!(fx.catalog.list_history().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_bad_item_does_not_abort_batch() {
        let fx = setup().await;
        let sources = vec![
            fx.source("a.png", b"a"),
            fx.tmp.path().join("incoming").join("missing.png"),
            fx.source("c.png", b"c"),
        ];

        let outcomes = import_images(&fx.catalog, &fx.blobs, &fx.sidecar, &sources).await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_imported());
        assert!(!outcomes[1].is_imported());
        assert!(outcomes[2].is_imported());

        assert_eq!(fx.catalog.count().await.unwrap(), 2);
        assert_eq!(fx.sidecar.all().len(), 2);
    }

    #[tokio::test]
    async fn test_identical_basenames_get_distinct_filenames() {
        let fx = setup().await;
        let a = fx.source("photo.png", b"first");
        let other = fx.tmp.path().join("elsewhere");
        fs::create_dir_all(&other).unwrap();
        let b = other.join("photo.png");
        fs::write(&b, b"second").unwrap();

        let outcomes = import_images(&fx.catalog, &fx.blobs, &fx.sidecar, &[a, b]).await;
        let filenames: Vec<_> = outcomes
            .iter()
            .map(|o| match o {
                ImportOutcome::Imported(i) => i.filename.clone(),
                ImportOutcome::Failed(f) => panic!("unexpected failure: {}", f.error),
            })
            .collect();

        assert_eq!(filenames, vec!["photo.png", "photo_1.png"]);
        assert!(fx.blobs.contains("photo.png"));
        assert!(fx.blobs.contains("photo_1.png"));

        // Both keep their supplied original name
        for record in fx.catalog.list_all().await.unwrap() {
            assert_eq!(record.original_filename, "photo.png");
        }
    }

    #[tokio::test]
    async fn test_uniqueness_checked_against_blobs_not_catalog() {
        let fx = setup().await;

        // A blob with no catalog row (drift from a crashed operation)
        fs::write(fx.blobs.raw_dir().join("photo.png"), b"orphan").unwrap();

        let outcomes = import_images(
            &fx.catalog,
            &fx.blobs,
            &fx.sidecar,
            &[fx.source("photo.png", b"new")],
        )
        .await;
        let ImportOutcome::Imported(imported) = &outcomes[0] else {
            panic!("import failed");
        };
        assert_eq!(imported.filename, "photo_1.png");
        assert_eq!(fs::read(fx.blobs.path("photo.png")).unwrap(), b"orphan");
    }
}
