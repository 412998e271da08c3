pub mod client;
pub mod config;
pub mod connectivity;
pub mod database;
pub mod errors;
pub mod events;
pub mod offline_queue;
pub mod queries;
pub mod remote;

pub use client::{MutationOutcome, TaskClient};
pub use config::ClientConfig;
pub use connectivity::{ConnectivityMonitor, ConnectivityStatus};
pub use database::ClientDatabase;
pub use errors::ClientError;
pub use events::{EventDispatcher, EventType, SyncEvent};
pub use offline_queue::{DrainReport, OfflineQueue};
pub use remote::{MemoryRemoteStore, RemoteCall, RemoteStore};

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::Row;
    use tasksync_core::{QueueEntry, QueuedAction, Task, TaskPatch};

    fn task(id: &str, text: &str) -> Task {
        Task {
            id: id.to_string(),
            owner_id: "u1".to_string(),
            text: text.to_string(),
            completed: false,
            created_at: Utc::now(),
            parent_id: None,
            order: 0,
        }
    }

    #[tokio::test]
    async fn test_snapshot_is_overwritten_per_namespace() {
        let db = ClientDatabase::in_memory().await.unwrap();
        assert!(db.load_snapshot("todos-u1").await.unwrap().is_empty());

        let first = vec![task("a", "milk"), task("b", "bread")];
        db.save_snapshot("todos-u1", &first).await.unwrap();
        db.save_snapshot("todos-u2", &[task("c", "eggs")]).await.unwrap();
        assert_eq!(db.load_snapshot("todos-u1").await.unwrap(), first);

        let second = vec![task("b", "bread")];
        db.save_snapshot("todos-u1", &second).await.unwrap();
        assert_eq!(db.load_snapshot("todos-u1").await.unwrap(), second);
        assert_eq!(db.load_snapshot("todos-u2").await.unwrap().len(), 1);

        let row = sqlx::query("SELECT COUNT(*) AS count FROM task_mirror")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        let count: i64 = row.try_get("count").unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_queue_rows_keep_insertion_order() {
        let db = ClientDatabase::in_memory().await.unwrap();

        let update = QueueEntry::new(QueuedAction::Update {
            id: "a".into(),
            updates: TaskPatch::completed(true),
        });
        let delete = QueueEntry::new(QueuedAction::Delete { id: "a".into() });
        let first = db.enqueue_entry("todos-u1", &update).await.unwrap();
        let second = db.enqueue_entry("todos-u1", &delete).await.unwrap();
        assert!(second > first);

        let loaded = db.load_queue("todos-u1").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].1.action, update.action);
        assert_eq!(loaded[1].1.action, delete.action);

        db.remove_queue_rows_up_to("todos-u1", first).await.unwrap();
        assert_eq!(db.count_queue("todos-u1").await.unwrap(), 1);
    }
}
