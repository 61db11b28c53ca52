//! curator - a local image-dataset management store
//!
//! This crate provides:
//! - A project registry over per-project directories and lifecycle config
//! - A SQLite catalog per project with an append-only dataset history
//! - A JSON sidecar index mirroring the catalog for bulk reads
//! - Ingestion of raw image files into managed blob storage
//! - Processing of raw blobs into normalized output plus annotations

pub mod annotate;
pub mod blob;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ingest;
pub mod process;
pub mod registry;
pub mod sidecar;
pub mod workspace;

pub use config::Config;
pub use error::{Error, Result};
pub use workspace::Workspace;
