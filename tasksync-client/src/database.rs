use std::str::FromStr;

use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};
use tasksync_core::{QueueEntry, Task};

use crate::queries::{DbHelpers, Queries};
use crate::ClientResult;

/// Durable local state: the per-namespace task snapshot and, when enabled,
/// the persisted sync queue.
pub struct ClientDatabase {
    pub pool: SqlitePool,
}

impl ClientDatabase {
    pub async fn new(database_url: &str) -> ClientResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Each connection to an in-memory database is a separate database,
        // so keep exactly one alive for the pool's lifetime.
        let pool = if is_memory_url(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        Ok(Self { pool })
    }

    pub async fn in_memory() -> ClientResult<Self> {
        let db = Self::new("sqlite::memory:").await?;
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> ClientResult<()> {
        DbHelpers::init_schema(&self.pool).await
    }

    /// The stored snapshot for `namespace`, or an empty list if none exists.
    pub async fn load_snapshot(&self, namespace: &str) -> ClientResult<Vec<Task>> {
        let row = sqlx::query(Queries::GET_SNAPSHOT)
            .bind(namespace)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let snapshot: String = row.try_get("snapshot")?;
                Ok(serde_json::from_str(&snapshot)?)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Overwrites the snapshot for `namespace`.
    pub async fn save_snapshot(&self, namespace: &str, tasks: &[Task]) -> ClientResult<()> {
        let snapshot = serde_json::to_string(tasks)?;

        sqlx::query(Queries::UPSERT_SNAPSHOT)
            .bind(namespace)
            .bind(snapshot)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Appends `entry` to the persisted queue and returns its row id.
    pub async fn enqueue_entry(&self, namespace: &str, entry: &QueueEntry) -> ClientResult<i64> {
        let payload = serde_json::to_string(&entry.action)?;

        let result = sqlx::query(Queries::INSERT_SYNC_QUEUE)
            .bind(namespace)
            .bind(entry.kind().to_string())
            .bind(payload)
            .bind(entry.enqueued_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Persisted entries for `namespace` in insertion order, with their row ids.
    pub async fn load_queue(&self, namespace: &str) -> ClientResult<Vec<(i64, QueueEntry)>> {
        let rows = sqlx::query(Queries::GET_SYNC_QUEUE)
            .bind(namespace)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(DbHelpers::parse_queue_entry).collect()
    }

    /// Removes rows up to and including `last_id`, leaving later inserts alone.
    pub async fn remove_queue_rows_up_to(&self, namespace: &str, last_id: i64) -> ClientResult<()> {
        sqlx::query(Queries::DELETE_QUEUE_ROWS_UP_TO)
            .bind(namespace)
            .bind(last_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_queue(&self, namespace: &str) -> ClientResult<i64> {
        let row = sqlx::query(Queries::COUNT_SYNC_QUEUE)
            .bind(namespace)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}
