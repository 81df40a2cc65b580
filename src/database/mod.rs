pub mod models;
pub mod schema;

use std::str::FromStr;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::audit::entry::GENESIS_HASH;
use crate::error::{AuditError, AuditResult};
pub use models::{AuditRecord, NewRecord, RecordId};

/// Persistence collaborator for the audit chain.
///
/// Append-only: there is deliberately no update or delete operation.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Insert `record` only if the current chain head (or the genesis value
    /// for an empty chain) still equals `record.previous_hash`.
    ///
    /// Returns `AuditError::ChainConflict` without writing anything when
    /// another writer got there first.
    async fn insert_linked(&self, record: NewRecord) -> AuditResult<RecordId>;

    /// The record with the highest id
    async fn latest_record(&self) -> AuditResult<Option<AuditRecord>>;

    /// Every record in ascending id order, without loading the whole table
    fn stream_records(&self) -> BoxStream<'_, AuditResult<AuditRecord>>;

    async fn record_by_id(&self, id: RecordId) -> AuditResult<Option<AuditRecord>>;

    /// Newest first
    async fn recent_records(&self, limit: u32) -> AuditResult<Vec<AuditRecord>>;
}

/// SQLite-backed audit store
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Database { pool })
    }

    /// Single-connection in-memory database; the data lives as long as the
    /// pool does.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let database = Database { pool };
        database.run_migrations().await?;
        Ok(database)
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(schema::AUDIT_TRAIL_SCHEMA)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl AuditStore for Database {
    async fn insert_linked(&self, record: NewRecord) -> AuditResult<RecordId> {
        // Single statement: the head check and the insert are atomic.
        let result = sqlx::query(
            r#"
            INSERT INTO secure_audit_trails (event_type, ciphertext, event_hash, previous_hash, created_at)
            SELECT ?1, ?2, ?3, ?4, ?5
            WHERE COALESCE(
                (SELECT event_hash FROM secure_audit_trails ORDER BY id DESC LIMIT 1),
                ?6
            ) = ?4
            "#,
        )
        .bind(&record.event_type)
        .bind(&record.ciphertext)
        .bind(&record.event_hash)
        .bind(&record.previous_hash)
        .bind(record.created_at)
        .bind(GENESIS_HASH)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuditError::chain_conflict(&record.previous_hash));
        }

        let id = result.last_insert_rowid();
        debug!("Inserted audit record {} ({})", id, record.event_hash);
        Ok(id)
    }

    async fn latest_record(&self) -> AuditResult<Option<AuditRecord>> {
        let record = sqlx::query_as::<_, AuditRecord>(
            r#"
            SELECT id, event_type, ciphertext, event_hash, previous_hash, created_at
            FROM secure_audit_trails
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    fn stream_records(&self) -> BoxStream<'_, AuditResult<AuditRecord>> {
        sqlx::query_as::<_, AuditRecord>(
            r#"
            SELECT id, event_type, ciphertext, event_hash, previous_hash, created_at
            FROM secure_audit_trails
            ORDER BY id ASC
            "#,
        )
        .fetch(&self.pool)
        .map(|row| row.map_err(AuditError::from))
        .boxed()
    }

    async fn record_by_id(&self, id: RecordId) -> AuditResult<Option<AuditRecord>> {
        let record = sqlx::query_as::<_, AuditRecord>(
            r#"
            SELECT id, event_type, ciphertext, event_hash, previous_hash, created_at
            FROM secure_audit_trails
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn recent_records(&self, limit: u32) -> AuditResult<Vec<AuditRecord>> {
        let records = sqlx::query_as::<_, AuditRecord>(
            r#"
            SELECT id, event_type, ciphertext, event_hash, previous_hash, created_at
            FROM secure_audit_trails
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
