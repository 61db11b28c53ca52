//! Configuration management for curator
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name of the projects directory under the base dir
    #[serde(default = "default_projects_dir_name")]
    pub projects_dir_name: String,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// JPEG quality for normalized output (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Extension used for normalized output files
    #[serde(default = "default_processed_extension")]
    pub processed_extension: String,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for curator data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Directory holding all project subtrees
    pub projects_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            projects_dir_name: default_projects_dir_name(),
            processing: ProcessingConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            processed_extension: default_processed_extension(),
        }
    }
}

impl Config {
    /// Get the default base directory for curator (~/.curator)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".curator")
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            projects_dir: base.join(&self.projects_dir_name),
            base_dir: base,
        };
    }

    /// Load configuration from a specific base directory, falling back to
    /// defaults when no config file exists there
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = PathsConfig {
                config_file: config.paths.config_file,
                projects_dir: config.paths.base_dir.join(&loaded.projects_dir_name),
                base_dir: config.paths.base_dir,
            };
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.processing.jpeg_quality == 0 || self.processing.jpeg_quality > 100 {
            return Err(Error::Config(
                "processing.jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.processing.processed_extension.is_empty() {
            return Err(Error::Config(
                "processing.processed_extension must not be empty".to_string(),
            ));
        }

        if self.projects_dir_name.is_empty() {
            return Err(Error::Config(
                "projects_dir_name must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.processing.jpeg_quality, 95);
        assert_eq!(config.processing.processed_extension, "jpg");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.processing.jpeg_quality = 80;

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.processing.jpeg_quality, 80);
        assert_eq!(loaded.paths.projects_dir, tmp.path().join("projects"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.processing.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config.processing.jpeg_quality = 101;
        assert!(config.validate().is_err());

        config.processing.jpeg_quality = 95;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(config.processing.jpeg_quality, 95);
        assert_eq!(config.paths.base_dir, tmp.path());
    }
}
