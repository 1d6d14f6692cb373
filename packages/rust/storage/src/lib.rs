//! Turso Embedded / libSQL storage layer for the BrandGraph entity graph.
//!
//! The [`Storage`] struct wraps a libSQL database holding organizations,
//! individuals, membership and relation edges, web pages, scrape queue
//! entries, theses, and generation markers.
//!
//! Every write runs inside one `BEGIN IMMEDIATE` transaction so read-then-write
//! merges are atomic. Natural-key uniqueness (normalized URL, LinkedIn URL,
//! domain, alias key) is enforced by the schema; concurrent upserts on one key
//! merge through `ON CONFLICT`.
//!
//! **Access rules:**
//! - CLI: read-write via [`Storage::open`]
//! - Reporting consumers: read-only via [`Storage::open_readonly`]

mod articles;
mod generation;
mod graph;
mod individuals;
mod migrations;
mod organizations;
mod pages;
mod relations;
mod theses;

use std::path::Path;

use brandgraph_shared::{BrandGraphError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::params::IntoParams;
use libsql::{Connection, Database, Row, Transaction, TransactionBehavior, params};

pub use generation::{
    GenerationCompleted, GenerationKind, GenerationScope, GenerationStarted, GenerationState,
    GenerationStateReport, StaleGeneration,
};
pub use graph::{ArticleList, OrganizationWithRelations};
pub use individuals::MembershipStatusChange;
pub use pages::{PageIngestRow, ScrapeQueueRow};
pub use relations::{RelationOutcome, RelationStatusChange, RelationUpsertRow};
pub use theses::{ThesisIngestRow, ThesisStatusUpdated};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BrandGraphError::io(parent, e))?;
        }

        let storage = Self::connect(path, false).await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        Self::connect(path, true).await
    }

    async fn connect(path: &Path, readonly: bool) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(storage_err)?;

        Ok(Self { db, conn, readonly })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        BrandGraphError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    pub async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) AS schema_version FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(BrandGraphError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Start an immediate (write-locking) transaction. Pair with [`finish`].
    async fn begin(&self) -> Result<Transaction> {
        self.check_writable()?;
        self.conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(storage_err)
    }
}

/// Commit on success, roll back on any error.
async fn finish<T>(tx: Transaction, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(storage_err)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Row and timestamp helpers
// ---------------------------------------------------------------------------

pub(crate) fn storage_err(e: libsql::Error) -> BrandGraphError {
    BrandGraphError::Storage(e.to_string())
}

/// Fixed-width UTC timestamp so stored values sort lexically.
pub(crate) fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now_ts() -> String {
    ts(&Utc::now())
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BrandGraphError::Storage(format!("bad timestamp '{raw}': {e}")))
}

pub(crate) fn col_text(row: &Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(storage_err)
}

/// Nullable text column; NULL reads as `None`.
pub(crate) fn col_opt_text(row: &Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

pub(crate) fn col_ts(row: &Row, idx: i32) -> Result<DateTime<Utc>> {
    parse_ts(&col_text(row, idx)?)
}

pub(crate) fn col_opt_ts(row: &Row, idx: i32) -> Result<Option<DateTime<Utc>>> {
    col_opt_text(row, idx).as_deref().map(parse_ts).transpose()
}

/// First column of the first row, if any row matched and the value is not NULL.
pub(crate) async fn query_opt_text(
    conn: &Connection,
    sql: &str,
    params: impl IntoParams,
) -> Result<Option<String>> {
    let mut rows = conn.query(sql, params).await.map_err(storage_err)?;
    match rows.next().await.map_err(storage_err)? {
        Some(row) => Ok(col_opt_text(&row, 0)),
        None => Ok(None),
    }
}

/// Element-level failures that skip one record of a bulk call.
pub(crate) fn is_element_error(e: &BrandGraphError) -> bool {
    matches!(
        e,
        BrandGraphError::Validation { .. } | BrandGraphError::Conflict { .. }
    )
}

#[cfg(test)]
pub(crate) async fn test_storage() -> Storage {
    let tmp = std::env::temp_dir().join(format!("bg_test_{}.db", uuid::Uuid::now_v7()));
    Storage::open(&tmp).await.expect("open test db")
}
