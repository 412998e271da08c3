use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tasksync_core::{QueueEntry, QueuedAction};

use crate::ClientResult;

/// SQL queries for the local mirror and the persisted sync queue
pub struct Queries;

impl Queries {
    pub const SCHEMA: &'static str = r#"
        CREATE TABLE IF NOT EXISTS task_mirror (
            namespace TEXT PRIMARY KEY,
            snapshot JSON NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            namespace TEXT NOT NULL,
            action TEXT NOT NULL,
            payload JSON NOT NULL,
            enqueued_at TIMESTAMP NOT NULL,
            CHECK (action IN ('add', 'update', 'delete'))
        );

        CREATE INDEX IF NOT EXISTS idx_sync_queue_namespace ON sync_queue(namespace, id);
    "#;

    // Mirror queries
    pub const GET_SNAPSHOT: &'static str =
        "SELECT snapshot FROM task_mirror WHERE namespace = ?1";

    pub const UPSERT_SNAPSHOT: &'static str = r#"
        INSERT INTO task_mirror (namespace, snapshot, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(namespace) DO UPDATE SET
            snapshot = excluded.snapshot,
            updated_at = excluded.updated_at
    "#;

    // Sync queue queries
    pub const INSERT_SYNC_QUEUE: &'static str = r#"
        INSERT INTO sync_queue (namespace, action, payload, enqueued_at)
        VALUES (?1, ?2, ?3, ?4)
    "#;

    pub const GET_SYNC_QUEUE: &'static str = r#"
        SELECT id, action, payload, enqueued_at
        FROM sync_queue
        WHERE namespace = ?1
        ORDER BY id ASC
    "#;

    pub const DELETE_QUEUE_ROWS_UP_TO: &'static str =
        "DELETE FROM sync_queue WHERE namespace = ?1 AND id <= ?2";

    pub const COUNT_SYNC_QUEUE: &'static str =
        "SELECT COUNT(*) as count FROM sync_queue WHERE namespace = ?1";
}

/// Helper functions for common database operations
pub struct DbHelpers;

impl DbHelpers {
    pub async fn init_schema(pool: &SqlitePool) -> ClientResult<()> {
        sqlx::query(Queries::SCHEMA).execute(pool).await?;
        Ok(())
    }

    /// Parse a queue entry from a `sync_queue` row, returning its row id too.
    pub fn parse_queue_entry(row: &SqliteRow) -> ClientResult<(i64, QueueEntry)> {
        let id: i64 = row.try_get("id")?;
        let payload: String = row.try_get("payload")?;
        let enqueued_at: String = row.try_get("enqueued_at")?;

        let action: QueuedAction = serde_json::from_str(&payload)?;
        Ok((
            id,
            QueueEntry {
                action,
                enqueued_at: DateTime::parse_from_rfc3339(&enqueued_at)?.with_timezone(&Utc),
            },
        ))
    }
}
