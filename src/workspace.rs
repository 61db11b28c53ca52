//! The workspace: the collaborator-facing API over all stores
//!
//! An explicit handle, not a process-wide singleton: per-project store
//! handles are constructed per call from the project's path layout. A
//! registry of per-project async locks serializes every catalog-, sidecar-
//! or blob-mutating operation for one project; operations on different
//! projects proceed independently.

use crate::annotate::{Annotation, AnnotationStore};
use crate::blob::BlobStore;
use crate::catalog::{Catalog, HistoryEntry, ImageRecord};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingest::{self, ImportOutcome};
use crate::process::{create_codec, ImageCodec, ProcessedMetadata, Processor};
use crate::registry::{
    ProjectConfig, ProjectFilter, ProjectPaths, ProjectRegistry, ProjectSort,
};
use crate::sidecar::{SidecarEntry, SidecarIndex};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

/// An image listing entry: the catalog record plus derived file metadata
#[derive(Debug, Clone, Serialize)]
pub struct ImageEntry {
    #[serde(flatten)]
    pub record: ImageRecord,
    pub blob_exists: bool,
    pub size_bytes: Option<u64>,
    pub mime_type: Option<String>,
}

/// Workspace handle over a base directory of projects
pub struct Workspace {
    config: Config,
    registry: ProjectRegistry,
    codec: Box<dyn ImageCodec>,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl Workspace {
    /// Create a workspace with the bundled codec
    pub fn new(config: Config) -> Self {
        Self::with_codec(config, create_codec())
    }

    /// Create a workspace with an externally supplied codec
    pub fn with_codec(config: Config, codec: Box<dyn ImageCodec>) -> Self {
        let registry = ProjectRegistry::new(config.paths.projects_dir.clone());
        Self {
            config,
            registry,
            codec,
            locks: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The per-project lock guard, created on first use
    async fn lock_for(&self, project: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(project) {
                return lock.clone();
            }
        }
        let mut locks = self.locks.write().await;
        locks
            .entry(project.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Per-call store handles for an existing project
    fn stores(&self, project: &str) -> Result<(ProjectPaths, BlobStore, SidecarIndex)> {
        let paths = self.registry.existing(project)?;
        let blobs = BlobStore::new(paths.raw_dir());
        let sidecar = SidecarIndex::new(paths.raw_dir());
        Ok((paths, blobs, sidecar))
    }

    // ===== Project Operations =====

    pub async fn create_project(&self, name: &str) -> Result<PathBuf> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;
        self.registry.create(name).await
    }

    pub async fn rename_project(&self, old: &str, new: &str) -> Result<PathBuf> {
        let lock = self.lock_for(old).await;
        let _guard = lock.lock().await;
        self.registry.rename(old, new)
    }

    pub async fn delete_project(&self, name: &str) -> Result<()> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;
        self.registry.delete(name)
    }

    pub async fn set_project_archived(&self, name: &str, archived: bool) -> Result<ProjectConfig> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;
        self.registry.set_archived(name, archived)
    }

    pub async fn touch_project(&self, name: &str) -> Result<String> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;
        self.registry.touch_last_accessed(name)
    }

    pub async fn get_project(&self, name: &str) -> Result<ProjectConfig> {
        self.registry.get(name)
    }

    pub async fn list_projects(
        &self,
        filter: &ProjectFilter,
        sort: &ProjectSort,
    ) -> Result<Vec<ProjectConfig>> {
        self.registry.list(filter, sort)
    }

    // ===== Image Operations =====

    /// Import a batch of local files; per-item failures are collected, not
    /// propagated
    pub async fn import_images(
        &self,
        project: &str,
        sources: &[PathBuf],
    ) -> Result<Vec<ImportOutcome>> {
        let lock = self.lock_for(project).await;
        let _guard = lock.lock().await;

        let (paths, blobs, sidecar) = self.stores(project)?;
        let catalog = Catalog::open(paths.root()).await?;
        Ok(ingest::import_images(&catalog, &blobs, &sidecar, sources).await)
    }

    /// List images from the catalog (authoritative), with derived file
    /// metadata from the blob store
    pub async fn list_images(&self, project: &str) -> Result<Vec<ImageEntry>> {
        let (paths, blobs, _) = self.stores(project)?;
        let catalog = Catalog::open(paths.root()).await?;

        let entries = catalog
            .list_all()
            .await?
            .into_iter()
            .map(|record| {
                let size_bytes = blobs.metadata(&record.filename).ok().map(|m| m.len());
                let mime_type = mime_guess::from_path(&record.filename)
                    .first()
                    .map(|m| m.to_string());
                ImageEntry {
                    blob_exists: size_bytes.is_some(),
                    size_bytes,
                    mime_type,
                    record,
                }
            })
            .collect();
        Ok(entries)
    }

    /// Rename an image: the blob is renamed and catalog/sidecar filenames
    /// stay identical. Compensates fully when a later step fails.
    pub async fn rename_image(
        &self,
        project: &str,
        id: &str,
        new_filename: &str,
    ) -> Result<ImageRecord> {
        let lock = self.lock_for(project).await;
        let _guard = lock.lock().await;

        let (paths, blobs, sidecar) = self.stores(project)?;
        let catalog = Catalog::open(paths.root()).await?;

        let record = catalog
            .get(id)
            .await?
            .ok_or_else(|| Error::ImageNotFound(id.to_string()))?;
        let old_filename = record.filename.clone();

        blobs.rename(&old_filename, new_filename)?;

        let details = serde_json::json!({ "from": old_filename, "to": new_filename });
        let updated = match catalog
            .update_filename_with_history(id, new_filename, Some(details))
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                if let Err(cleanup) = blobs.rename(new_filename, &old_filename) {
                    warn!("Failed to restore blob {} after catalog error: {}", old_filename, cleanup);
                }
                return Err(e);
            }
        };

        if let Err(e) = sidecar.upsert(id, (&updated).into()) {
            let rollback = serde_json::json!({
                "from": new_filename,
                "to": old_filename,
                "reason": "rename rollback",
            });
            if let Err(cleanup) = catalog
                .update_filename_with_history(id, &old_filename, Some(rollback))
                .await
            {
                warn!("Failed to revert catalog row {} after sidecar error: {}", id, cleanup);
            }
            if let Err(cleanup) = blobs.rename(new_filename, &old_filename) {
                warn!("Failed to restore blob {} after sidecar error: {}", old_filename, cleanup);
            }
            return Err(e);
        }

        Ok(updated)
    }

    /// Delete an image: catalog row and its `remove` history entry first,
    /// then blob and sidecar cleanup. Once the catalog commit is durable a
    /// failed cleanup leaves garbage, not corruption, and is only logged.
    pub async fn delete_image(&self, project: &str, id: &str) -> Result<ImageRecord> {
        let lock = self.lock_for(project).await;
        let _guard = lock.lock().await;

        let (paths, blobs, sidecar) = self.stores(project)?;
        let catalog = Catalog::open(paths.root()).await?;

        let details = serde_json::json!({ "reason": "user delete" });
        let removed = catalog.delete_with_history(id, Some(details)).await?;

        match blobs.remove(&removed.filename) {
            Ok(()) => {}
            Err(Error::ImageNotFound(_)) => {
                // Already absent; the history entry tombstones the id
            }
            Err(e) => warn!("Failed to remove blob {}: {}", removed.filename, e),
        }
        if let Err(e) = sidecar.remove(id) {
            warn!("Failed to remove sidecar entry {}: {}", id, e);
        }

        Ok(removed)
    }

    // ===== Processing =====

    /// Run the processing pipeline over a project's raw blobs
    pub async fn process_project(&self, project: &str) -> Result<ProcessedMetadata> {
        let lock = self.lock_for(project).await;
        let _guard = lock.lock().await;

        let (paths, blobs, _) = self.stores(project)?;
        let annotations = AnnotationStore::new(paths.processed_dir());
        let processor = Processor::new(
            &blobs,
            &annotations,
            self.codec.as_ref(),
            paths.processed_dir(),
            self.config.processing.jpeg_quality,
            self.config.processing.processed_extension.clone(),
        );
        processor.process().await
    }

    // ===== Annotations =====

    pub async fn get_annotation(&self, project: &str, image_filename: &str) -> Result<Annotation> {
        let paths = self.registry.existing(project)?;
        AnnotationStore::new(paths.processed_dir()).get(image_filename)
    }

    pub async fn save_annotation(
        &self,
        project: &str,
        image_filename: &str,
        annotation: &Annotation,
    ) -> Result<()> {
        let lock = self.lock_for(project).await;
        let _guard = lock.lock().await;

        let paths = self.registry.existing(project)?;
        AnnotationStore::new(paths.processed_dir()).save(image_filename, annotation)
    }

    // ===== History and Sidecar =====

    pub async fn history(&self, project: &str) -> Result<Vec<HistoryEntry>> {
        let paths = self.registry.existing(project)?;
        let catalog = Catalog::open(paths.root()).await?;
        catalog.list_history().await
    }

    pub async fn raw_metadata(&self, project: &str) -> Result<BTreeMap<String, SidecarEntry>> {
        let (_, _, sidecar) = self.stores(project)?;
        Ok(sidecar.all())
    }

    /// Read a raw blob's path for external consumers
    pub fn blob_path(&self, project: &str, filename: &str) -> Result<PathBuf> {
        let (_, blobs, _) = self.stores(project)?;
        let path = blobs.path(filename);
        if !path.is_file() {
            return Err(Error::ImageNotFound(filename.to_string()));
        }
        Ok(path)
    }
}

/// Build a workspace from a base directory, loading (or defaulting) its
/// config
pub fn open_workspace(base_dir: Option<&Path>) -> Result<Workspace> {
    let config = Config::load_from(base_dir.map(Path::to_path_buf))?;
    Ok(Workspace::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    async fn setup() -> (Workspace, TempDir) {
        let tmp = TempDir::new().unwrap();
        let workspace = open_workspace(Some(tmp.path())).unwrap();
        (workspace, tmp)
    }

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        image::RgbImage::from_pixel(4, 2, image::Rgb([9, 9, 9]))
            .save(&path)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_operations_require_existing_project() {
        let (workspace, tmp) = setup().await;
        let source = write_png(&tmp.path().join("incoming"), "a.png");

        assert!(matches!(
            workspace.import_images("ghost", &[source]).await,
            Err(Error::ProjectNotFound(_))
        ));
        assert!(matches!(
            workspace.list_images("ghost").await,
            Err(Error::ProjectNotFound(_))
        ));
        assert!(matches!(
            workspace.process_project("ghost").await,
            Err(Error::ProjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_images_reports_derived_metadata() {
        let (workspace, tmp) = setup().await;
        workspace.create_project("p").await.unwrap();
        let source = write_png(&tmp.path().join("incoming"), "a.png");
        workspace.import_images("p", &[source]).await.unwrap();

        let images = workspace.list_images("p").await.unwrap();
        assert_eq!(images.len(), 1);
        assert!(images[0].blob_exists);
        assert!(images[0].size_bytes.unwrap() > 0);
        assert_eq!(images[0].mime_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_delete_image_tolerates_missing_blob() {
        let (workspace, tmp) = setup().await;
        workspace.create_project("p").await.unwrap();
        let source = write_png(&tmp.path().join("incoming"), "a.png");
        let outcomes = workspace.import_images("p", &[source]).await.unwrap();
        let ImportOutcome::Imported(imported) = &outcomes[0] else {
            panic!("import failed");
        };

        // Simulate drift: the blob vanished outside the workspace
        let blob = workspace.blob_path("p", &imported.filename).unwrap();
        fs::remove_file(blob).unwrap();

        let removed = workspace.delete_image("p", &imported.id).await.unwrap();
        assert_eq!(removed.id, imported.id);
        assert!(workspace.list_images("p").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_project_operations_reject_traversal_names() {
        let (workspace, tmp) = setup().await;
        workspace.create_project("p").await.unwrap();

        // The base dir holds more than the projects tree; a traversal name
        // must not be able to touch it
        let marker = tmp.path().join("curator.toml.bak");
        fs::write(&marker, b"keep").unwrap();

        assert!(matches!(
            workspace.delete_project("..").await,
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            workspace.create_project("../evil").await,
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            workspace.rename_project("p", "../p2").await,
            Err(Error::InvalidPath(_))
        ));

        assert!(marker.is_file());
        assert!(tmp.path().join("projects").join("p").is_dir());
    }

    #[tokio::test]
    async fn test_rename_image_rejects_escaping_filename() {
        let (workspace, tmp) = setup().await;
        workspace.create_project("p").await.unwrap();
        let source = write_png(&tmp.path().join("incoming"), "a.png");
        let outcomes = workspace.import_images("p", &[source]).await.unwrap();
        let ImportOutcome::Imported(imported) = &outcomes[0] else {
            panic!("import failed");
        };

        assert!(matches!(
            workspace
                .rename_image("p", &imported.id, "../../escaped.png")
                .await,
            Err(Error::InvalidPath(_))
        ));

        // The blob stayed inside raw/ and the catalog row is untouched
        assert!(workspace.blob_path("p", "a.png").is_ok());
        assert!(!tmp.path().join("escaped.png").exists());
        let images = workspace.list_images("p").await.unwrap();
        assert_eq!(images[0].record.filename, "a.png");
    }

    #[tokio::test]
    async fn test_independent_projects_do_not_contend() {
        let (workspace, tmp) = setup().await;
        let workspace = Arc::new(workspace);
        workspace.create_project("p1").await.unwrap();
        workspace.create_project("p2").await.unwrap();

        let a = write_png(&tmp.path().join("incoming"), "a.png");
        let b = write_png(&tmp.path().join("incoming"), "b.png");

        let w1 = workspace.clone();
        let w2 = workspace.clone();
        let a = [a];
        let b = [b];
        let (r1, r2) = tokio::join!(
            w1.import_images("p1", &a),
            w2.import_images("p2", &b),
        );
        assert!(r1.unwrap()[0].is_imported());
        assert!(r2.unwrap()[0].is_imported());
    }
}
