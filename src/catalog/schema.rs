//! SQLite schema definition, applied in explicit versioned steps
//!
//! Each step is gated on `PRAGMA user_version` at open, so re-opening an
//! up-to-date database applies nothing.

/// Version 1: base tables
pub const SCHEMA_V1: &str = r#"
-- Images: the authoritative image records
CREATE TABLE IF NOT EXISTS images (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    added TEXT NOT NULL
);

-- Annotations: catalog-side annotation rows
CREATE TABLE IF NOT EXISTS annotations (
    id TEXT PRIMARY KEY,
    image_id TEXT REFERENCES images(id),
    data TEXT,
    created TEXT NOT NULL
);

-- Versions: named dataset versions
CREATE TABLE IF NOT EXISTS versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    created TEXT NOT NULL
);
"#;

/// Version 2: original filenames and the append-only audit trail
pub const SCHEMA_V2: &str = r#"
ALTER TABLE images ADD COLUMN original_filename TEXT NOT NULL DEFAULT '';

-- Dataset history: append-only, one entry per catalog-affecting operation
CREATE TABLE IF NOT EXISTS dataset_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    action TEXT NOT NULL,
    filename TEXT NOT NULL,
    original_filename TEXT NOT NULL,
    details TEXT
);
"#;

/// Current schema version; bump when adding a migration step
pub const SCHEMA_VERSION: i64 = 2;
