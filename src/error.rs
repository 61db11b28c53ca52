//! Custom error types for curator

use thiserror::Error;

/// Main error type for curator operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Annotation not found: {0}")]
    AnnotationNotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Corrupt document: {0}")]
    Corrupt(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Result type alias for curator
pub type Result<T> = std::result::Result<T, Error>;
