//! The project registry: per-project lifecycle configuration
//!
//! Projects live as directories under the workspace's projects dir; identity
//! is the directory name. Each directory carries a `project.json` parsed
//! defensively: a missing or corrupt config is synthesized from the directory
//! itself rather than failing the caller.

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Project config filename
pub const PROJECT_CONFIG_FILE: &str = "project.json";

/// Subdirectories created for every project
pub const PROJECT_SUBDIRS: &[&str] = &["raw", "annotations", "versions", "temp"];

/// Per-project configuration (`project.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default = "default_version")]
    pub version: i64,
    #[serde(default)]
    pub last_accessed: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
}

fn default_version() -> i64 {
    1
}

impl ProjectConfig {
    fn synthesized(name: &str, path: &Path) -> Self {
        Self {
            name: name.to_string(),
            path: path.display().to_string(),
            created: None,
            version: default_version(),
            last_accessed: None,
            is_archived: false,
        }
    }
}

/// Path layout of one project directory
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    pub fn annotations_dir(&self) -> PathBuf {
        self.root.join("annotations")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("temp")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(PROJECT_CONFIG_FILE)
    }
}

/// Filter for project listing
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    /// Keep only projects matching this archive flag
    pub archived: Option<bool>,
}

/// Sort key for project listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectSortBy {
    Name,
    LastAccessed,
    Created,
}

/// Sort order for project listing
#[derive(Debug, Clone)]
pub struct ProjectSort {
    pub by: ProjectSortBy,
    pub descending: bool,
    pub limit: Option<usize>,
}

impl Default for ProjectSort {
    fn default() -> Self {
        Self {
            by: ProjectSortBy::Name,
            descending: false,
            limit: None,
        }
    }
}

/// Registry over all project directories
pub struct ProjectRegistry {
    projects_dir: PathBuf,
}

impl ProjectRegistry {
    pub fn new(projects_dir: PathBuf) -> Self {
        Self { projects_dir }
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// Path layout for a project, without checking existence
    pub fn paths(&self, name: &str) -> ProjectPaths {
        ProjectPaths::new(self.projects_dir.join(name))
    }

    /// Path layout for an existing project
    pub fn existing(&self, name: &str) -> Result<ProjectPaths> {
        validate_name(name)?;
        let paths = self.paths(name);
        if !paths.root().is_dir() {
            return Err(Error::ProjectNotFound(name.to_string()));
        }
        Ok(paths)
    }

    /// Create a new project: directory tree, catalog schema, initial config
    pub async fn create(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        let paths = self.paths(name);
        if paths.root().exists() {
            return Err(Error::AlreadyExists(name.to_string()));
        }

        for subdir in PROJECT_SUBDIRS {
            fs::create_dir_all(paths.root().join(subdir))?;
        }

        // Opening the catalog once brings the schema to the current version
        Catalog::open(paths.root()).await?;

        let now = Utc::now().to_rfc3339();
        let config = ProjectConfig {
            name: name.to_string(),
            path: paths.root().display().to_string(),
            created: Some(now.clone()),
            version: default_version(),
            last_accessed: Some(now),
            is_archived: false,
        };
        self.write_config(&paths, &config)?;

        info!("Created project '{}' at {:?}", name, paths.root());
        Ok(paths.root().to_path_buf())
    }

    /// Rename a project: directory move first, then config rewrite.
    ///
    /// If the config rewrite fails after the move, the move is not rolled
    /// back; the error surfaces and the next defensive config read
    /// synthesizes the new name from the directory.
    pub fn rename(&self, old: &str, new: &str) -> Result<PathBuf> {
        let old_paths = self.existing(old)?;
        validate_name(new)?;
        let new_paths = self.paths(new);
        if new_paths.root().exists() {
            return Err(Error::AlreadyExists(new.to_string()));
        }

        fs::rename(old_paths.root(), new_paths.root())?;

        let mut config = self.read_config(new, &new_paths);
        config.name = new.to_string();
        config.path = new_paths.root().display().to_string();
        self.write_config(&new_paths, &config)?;

        info!("Renamed project '{}' to '{}'", old, new);
        Ok(new_paths.root().to_path_buf())
    }

    /// Delete a project's entire subtree, irreversibly
    pub fn delete(&self, name: &str) -> Result<()> {
        let paths = self.existing(name)?;
        fs::remove_dir_all(paths.root())?;
        info!("Deleted project '{}'", name);
        Ok(())
    }

    /// Update the last-accessed timestamp, returning it
    pub fn touch_last_accessed(&self, name: &str) -> Result<String> {
        let paths = self.existing(name)?;
        let mut config = self.read_config(name, &paths);
        let now = Utc::now().to_rfc3339();
        config.last_accessed = Some(now.clone());
        self.write_config(&paths, &config)?;
        Ok(now)
    }

    /// Set or clear the archive flag
    pub fn set_archived(&self, name: &str, archived: bool) -> Result<ProjectConfig> {
        let paths = self.existing(name)?;
        let mut config = self.read_config(name, &paths);
        config.is_archived = archived;
        self.write_config(&paths, &config)?;
        Ok(config)
    }

    /// Current config of a project, parsed defensively
    pub fn get(&self, name: &str) -> Result<ProjectConfig> {
        let paths = self.existing(name)?;
        Ok(self.read_config(name, &paths))
    }

    /// List projects: scan, defensive parse, filter, stable sort, truncate
    pub fn list(&self, filter: &ProjectFilter, sort: &ProjectSort) -> Result<Vec<ProjectConfig>> {
        let mut projects = Vec::new();
        if !self.projects_dir.is_dir() {
            return Ok(projects);
        }

        for entry in fs::read_dir(&self.projects_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let paths = ProjectPaths::new(entry.path());
            let config = self.read_config(name, &paths);

            if let Some(archived) = filter.archived {
                if config.is_archived != archived {
                    continue;
                }
            }
            projects.push(config);
        }

        // Reversing inside the comparator keeps the stable sort stable for
        // equal keys in descending order too
        projects.sort_by(|a, b| {
            let ordering = match sort.by {
                ProjectSortBy::Name => a.name.cmp(&b.name),
                ProjectSortBy::LastAccessed => {
                    parse_timestamp(&a.last_accessed).cmp(&parse_timestamp(&b.last_accessed))
                }
                ProjectSortBy::Created => {
                    parse_timestamp(&a.created).cmp(&parse_timestamp(&b.created))
                }
            };
            if sort.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        if let Some(limit) = sort.limit {
            projects.truncate(limit);
        }

        Ok(projects)
    }

    /// Read a project config, tolerating a missing or corrupt file by
    /// synthesizing a minimal one from the directory
    fn read_config(&self, name: &str, paths: &ProjectPaths) -> ProjectConfig {
        let config_path = paths.config_file();
        let content = match fs::read_to_string(&config_path) {
            Ok(content) => content,
            Err(_) => {
                return ProjectConfig::synthesized(name, paths.root());
            }
        };
        match serde_json::from_str::<ProjectConfig>(&content) {
            Ok(mut config) => {
                // The directory is the identity; a stale name field loses
                if config.name != name {
                    config.name = name.to_string();
                }
                config
            }
            Err(e) => {
                warn!("Corrupt project config at {:?}: {}; using defaults", config_path, e);
                ProjectConfig::synthesized(name, paths.root())
            }
        }
    }

    fn write_config(&self, paths: &ProjectPaths, config: &ProjectConfig) -> Result<()> {
        let content = serde_json::to_string_pretty(config)?;
        fs::write(paths.config_file(), content)?;
        Ok(())
    }
}

/// A project name must be a single normal path component: joined onto the
/// projects dir it must never resolve outside it
pub fn validate_name(name: &str) -> Result<()> {
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

/// Unparsable or missing timestamps compare as the minimum sentinel, keeping
/// the sort total and stable
fn parse_timestamp(value: &Option<String>) -> DateTime<Utc> {
    value
        .as_deref()
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (ProjectRegistry, TempDir) {
        let tmp = TempDir::new().unwrap();
        let registry = ProjectRegistry::new(tmp.path().join("projects"));
        (registry, tmp)
    }

    #[tokio::test]
    async fn test_create_builds_structure() {
        let (registry, _tmp) = setup();

        let root = registry.create("alpha").await.unwrap();
        for subdir in PROJECT_SUBDIRS {
            assert!(root.join(subdir).is_dir());
        }
        assert!(root.join(PROJECT_CONFIG_FILE).is_file());
        assert!(root.join(crate::catalog::CATALOG_FILE).is_file());

        let config = registry.get("alpha").unwrap();
        assert_eq!(config.name, "alpha");
        assert_eq!(config.version, 1);
        assert!(!config.is_archived);
    }

    #[tokio::test]
    async fn test_create_twice_fails_and_keeps_first() {
        let (registry, _tmp) = setup();

        let root = registry.create("alpha").await.unwrap();
        let marker = root.join("raw").join("keep.png");
        fs::write(&marker, b"data").unwrap();

        let err = registry.create("alpha").await;
        assert!(matches!(err, Err(Error::AlreadyExists(_))));
        assert!(marker.is_file());
        for subdir in PROJECT_SUBDIRS {
            assert!(root.join(subdir).is_dir());
        }
    }

    #[tokio::test]
    async fn test_rename_moves_directory_and_rewrites_config() {
        let (registry, _tmp) = setup();
        registry.create("alpha").await.unwrap();

        let new_root = registry.rename("alpha", "beta").unwrap();
        assert!(new_root.ends_with("beta"));
        assert!(registry.existing("alpha").is_err());

        let config = registry.get("beta").unwrap();
        assert_eq!(config.name, "beta");
    }

    #[tokio::test]
    async fn test_rename_collision_and_missing() {
        let (registry, _tmp) = setup();
        registry.create("alpha").await.unwrap();
        registry.create("beta").await.unwrap();

        assert!(matches!(
            registry.rename("alpha", "beta"),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            registry.rename("gamma", "delta"),
            Err(Error::ProjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_config_is_synthesized() {
        let (registry, _tmp) = setup();
        registry.create("alpha").await.unwrap();

        let config_path = registry.paths("alpha").config_file();
        fs::write(&config_path, b"{broken").unwrap();

        // Reads synthesize instead of failing
        let config = registry.get("alpha").unwrap();
        assert_eq!(config.name, "alpha");
        assert!(!config.is_archived);

        // A mutation rewrites a valid config
        registry.set_archived("alpha", true).unwrap();
        let config = registry.get("alpha").unwrap();
        assert!(config.is_archived);
    }

    #[tokio::test]
    async fn test_list_filters_sorts_truncates() {
        let (registry, _tmp) = setup();

        for (name, archived, accessed) in [
            ("p1", false, "2025-01-03T00:00:00+00:00"),
            ("p2", false, "2025-01-05T00:00:00+00:00"),
            ("p3", false, "2025-01-01T00:00:00+00:00"),
            ("p4", true, "2025-01-04T00:00:00+00:00"),
            ("p5", true, "2025-01-02T00:00:00+00:00"),
        ] {
            registry.create(name).await.unwrap();
            let paths = registry.paths(name);
            let mut config = registry.get(name).unwrap();
            config.is_archived = archived;
            config.last_accessed = Some(accessed.to_string());
            registry.write_config(&paths, &config).unwrap();
        }

        let listed = registry
            .list(
                &ProjectFilter {
                    archived: Some(false),
                },
                &ProjectSort {
                    by: ProjectSortBy::LastAccessed,
                    descending: true,
                    limit: Some(2),
                },
            )
            .unwrap();

        let names: Vec<_> = listed.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["p2", "p1"]);
    }

    #[tokio::test]
    async fn test_delete_removes_subtree() {
        let (registry, _tmp) = setup();
        let root = registry.create("alpha").await.unwrap();

        registry.delete("alpha").unwrap();
        assert!(!root.exists());
        assert!(matches!(
            registry.delete("alpha"),
            Err(Error::ProjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_traversal_names_rejected() {
        let (registry, tmp) = setup();
        registry.create("alpha").await.unwrap();

        // A name that resolves to the parent must never reach the filesystem
        let marker = tmp.path().join("outside.txt");
        fs::write(&marker, b"keep").unwrap();

        for bad in ["..", ".", "", "a/b", "a\\b", "../alpha"] {
            assert!(matches!(
                registry.create(bad).await,
                Err(Error::InvalidPath(_))
            ));
            assert!(matches!(registry.delete(bad), Err(Error::InvalidPath(_))));
            assert!(matches!(
                registry.rename("alpha", bad),
                Err(Error::InvalidPath(_))
            ));
            assert!(matches!(registry.get(bad), Err(Error::InvalidPath(_))));
        }

        assert!(marker.is_file());
        assert!(registry.existing("alpha").is_ok());
    }

    #[tokio::test]
    async fn test_descending_sort_keeps_tie_order() {
        let (registry, _tmp) = setup();

        // Identical last-accessed timestamps: the scan (name) order must
        // survive both directions of the sort
        for name in ["a1", "a2", "a3"] {
            registry.create(name).await.unwrap();
            let paths = registry.paths(name);
            let mut config = registry.get(name).unwrap();
            config.last_accessed = Some("2025-01-01T00:00:00+00:00".to_string());
            registry.write_config(&paths, &config).unwrap();
        }

        let order = |descending| {
            registry
                .list(
                    &ProjectFilter::default(),
                    &ProjectSort {
                        by: ProjectSortBy::LastAccessed,
                        descending,
                        limit: None,
                    },
                )
                .unwrap()
                .into_iter()
                .map(|p| p.name)
                .collect::<Vec<_>>()
        };

        assert_eq!(order(false), order(true));
    }
}
