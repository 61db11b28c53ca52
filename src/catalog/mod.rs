//! The catalog: authoritative image records and the append-only history
//!
//! One SQLite database per project (`database.sqlite`). Every catalog
//! mutation performed through the `*_with_history` operations commits with
//! exactly one history append in the same transaction.

mod schema;

pub use schema::*;

use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Database filename inside a project directory
pub const CATALOG_FILE: &str = "database.sqlite";

/// History actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Add,
    Rename,
    Remove,
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryAction::Add => write!(f, "add"),
            HistoryAction::Rename => write!(f, "rename"),
            HistoryAction::Remove => write!(f, "remove"),
        }
    }
}

impl FromStr for HistoryAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "add" => Ok(HistoryAction::Add),
            "rename" => Ok(HistoryAction::Rename),
            "remove" => Ok(HistoryAction::Remove),
            _ => Err(Error::Corrupt(format!("Unknown history action: {}", s))),
        }
    }
}

/// An image record, mirrored into the sidecar index
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub filename: String,
    pub original_filename: String,
    pub added: String,
}

impl ImageRecord {
    pub fn new(id: String, filename: String, original_filename: String) -> Self {
        Self {
            id,
            filename,
            original_filename,
            added: Utc::now().to_rfc3339(),
        }
    }
}

/// An append-only audit entry
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub timestamp: String,
    pub action: String,
    pub filename: String,
    pub original_filename: String,
    pub details: Option<String>,
}

impl HistoryEntry {
    pub fn get_action(&self) -> Result<HistoryAction> {
        self.action.parse()
    }
}

/// Catalog database handle, scoped to one project
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Open (creating if missing) the catalog for a project directory and
    /// bring the schema up to the current version
    pub async fn open(project_path: &Path) -> Result<Self> {
        let db_path = project_path.join(CATALOG_FILE);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let catalog = Self { pool };
        catalog.migrate().await?;
        Ok(catalog)
    }

    /// Apply pending schema versions; a no-op on an up-to-date database
    async fn migrate(&self) -> Result<()> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;

        if version < 1 {
            info!("Applying catalog schema version 1");
            sqlx::query(SCHEMA_V1).execute(&self.pool).await?;
            sqlx::query("PRAGMA user_version = 1")
                .execute(&self.pool)
                .await?;
        }

        if version < 2 {
            info!("Applying catalog schema version 2");
            sqlx::query(SCHEMA_V2).execute(&self.pool).await?;
            sqlx::query("PRAGMA user_version = 2")
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Current schema version of the open database
    pub async fn schema_version(&self) -> Result<i64> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    // ===== Image Operations =====

    /// Insert a new image record
    pub async fn insert(&self, record: &ImageRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO images (id, filename, original_filename, added) VALUES (?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.filename)
        .bind(&record.original_filename)
        .bind(&record.added)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get an image record by id
    pub async fn get(&self, id: &str) -> Result<Option<ImageRecord>> {
        let record = sqlx::query_as::<_, ImageRecord>("SELECT * FROM images WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// List all image records, ordered by filename
    pub async fn list_all(&self) -> Result<Vec<ImageRecord>> {
        let records = sqlx::query_as::<_, ImageRecord>("SELECT * FROM images ORDER BY filename")
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// Count image records
    pub async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Update an image's filename without a history append; pipelines use
    /// `update_filename_with_history` instead
    pub async fn update_filename(&self, id: &str, new_filename: &str) -> Result<()> {
        let result = sqlx::query("UPDATE images SET filename = ? WHERE id = ?")
            .bind(new_filename)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::ImageNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete an image record without a history append, returning the
    /// removed record; pipelines use `delete_with_history` instead
    pub async fn delete(&self, id: &str) -> Result<ImageRecord> {
        let record = self
            .get(id)
            .await?
            .ok_or_else(|| Error::ImageNotFound(id.to_string()))?;
        sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(record)
    }

    // ===== Paired Mutation + History Operations =====

    /// Insert an image record together with its `add` history entry
    pub async fn insert_with_history(
        &self,
        record: &ImageRecord,
        details: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO images (id, filename, original_filename, added) VALUES (?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.filename)
        .bind(&record.original_filename)
        .bind(&record.added)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO dataset_history (timestamp, action, filename, original_filename, details)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(HistoryAction::Add.to_string())
        .bind(&record.filename)
        .bind(&record.original_filename)
        .bind(details.map(|d| d.to_string()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Update an image's filename together with its `rename` history entry
    pub async fn update_filename_with_history(
        &self,
        id: &str,
        new_filename: &str,
        details: Option<serde_json::Value>,
    ) -> Result<ImageRecord> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, ImageRecord>("SELECT * FROM images WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::ImageNotFound(id.to_string()))?;

        sqlx::query("UPDATE images SET filename = ? WHERE id = ?")
            .bind(new_filename)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO dataset_history (timestamp, action, filename, original_filename, details)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(HistoryAction::Rename.to_string())
        .bind(new_filename)
        .bind(&record.original_filename)
        .bind(details.map(|d| d.to_string()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ImageRecord {
            filename: new_filename.to_string(),
            ..record
        })
    }

    /// Delete an image record together with its `remove` history entry,
    /// returning the removed record
    pub async fn delete_with_history(
        &self,
        id: &str,
        details: Option<serde_json::Value>,
    ) -> Result<ImageRecord> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, ImageRecord>("SELECT * FROM images WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::ImageNotFound(id.to_string()))?;

        sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO dataset_history (timestamp, action, filename, original_filename, details)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(HistoryAction::Remove.to_string())
        .bind(&record.filename)
        .bind(&record.original_filename)
        .bind(details.map(|d| d.to_string()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    // ===== History Operations =====

    /// Append a standalone history entry
    pub async fn append_history(
        &self,
        action: HistoryAction,
        filename: &str,
        original_filename: &str,
        details: Option<serde_json::Value>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dataset_history (timestamp, action, filename, original_filename, details)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(action.to_string())
        .bind(filename)
        .bind(original_filename)
        .bind(details.map(|d| d.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List all history entries, oldest first
    pub async fn list_history(&self) -> Result<Vec<HistoryEntry>> {
        let entries =
            sqlx::query_as::<_, HistoryEntry>("SELECT * FROM dataset_history ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(entries)
    }
}
