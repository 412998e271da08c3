//! Remote document store seam.
//!
//! The engine only ever sees `Arc<dyn RemoteStore>`; a hosted backend, an HTTP
//! client or the in-process [`MemoryRemoteStore`] can sit behind it. Every
//! error is treated the same way by the caller (remote unavailable), so
//! implementations do not need a fine-grained error type.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tasksync_core::{NewTask, SyncError, SyncResult, Task, TaskPatch};
use uuid::Uuid;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All tasks owned by `owner_id`, newest first.
    async fn list(&self, owner_id: &str) -> SyncResult<Vec<Task>>;
    /// Stores `task` and returns the id the store assigned to it.
    async fn create(&self, task: &NewTask) -> SyncResult<String>;
    async fn update(&self, id: &str, updates: &TaskPatch) -> SyncResult<()>;
    async fn delete(&self, id: &str) -> SyncResult<()>;
}

/// A call observed by [`MemoryRemoteStore`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    List { owner_id: String },
    Create { task: NewTask },
    Update { id: String, updates: TaskPatch },
    Delete { id: String },
}

/// In-process document store with switchable failures.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    tasks: Mutex<Vec<Task>>,
    calls: Mutex<Vec<RemoteCall>>,
    unavailable: AtomicBool,
    failing_ids: Mutex<HashSet<String>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            ..Default::default()
        }
    }

    /// While unavailable every call fails, as if the network were down.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Makes `update`/`delete` of this id fail until cleared.
    pub fn fail_writes_to(&self, id: impl Into<String>) {
        lock(&self.failing_ids).insert(id.into());
    }

    pub fn clear_failures(&self) {
        lock(&self.failing_ids).clear();
        self.set_available(true);
    }

    pub fn tasks(&self) -> Vec<Task> {
        lock(&self.tasks).clone()
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        lock(&self.tasks).iter().find(|t| t.id == id).cloned()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).clone()
    }

    /// Calls other than `list`, in arrival order.
    pub fn write_calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| !matches!(c, RemoteCall::List { .. }))
            .cloned()
            .collect()
    }

    fn record(&self, call: RemoteCall) -> SyncResult<()> {
        lock(&self.calls).push(call);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::remote("store is unreachable"));
        }
        Ok(())
    }

    fn check_id(&self, id: &str) -> SyncResult<()> {
        if lock(&self.failing_ids).contains(id) {
            return Err(SyncError::remote(format!("write to {id} rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn list(&self, owner_id: &str) -> SyncResult<Vec<Task>> {
        self.record(RemoteCall::List {
            owner_id: owner_id.to_string(),
        })?;

        let mut owned: Vec<Task> = lock(&self.tasks)
            .iter()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn create(&self, task: &NewTask) -> SyncResult<String> {
        self.record(RemoteCall::Create { task: task.clone() })?;

        let id = Uuid::new_v4().simple().to_string();
        lock(&self.tasks).push(task.clone().into_task(id.clone(), Utc::now()));
        Ok(id)
    }

    async fn update(&self, id: &str, updates: &TaskPatch) -> SyncResult<()> {
        self.record(RemoteCall::Update {
            id: id.to_string(),
            updates: updates.clone(),
        })?;
        self.check_id(id)?;

        let mut tasks = lock(&self.tasks);
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| SyncError::remote(format!("no document with id {id}")))?;
        task.apply_patch(updates);
        Ok(())
    }

    async fn delete(&self, id: &str) -> SyncResult<()> {
        self.record(RemoteCall::Delete { id: id.to_string() })?;
        self.check_id(id)?;

        // Deleting a missing document is not an error.
        lock(&self.tasks).retain(|t| t.id != id);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasksync_core::WriteTimestamp;

    fn new_task(owner: &str, text: &str) -> NewTask {
        NewTask {
            owner_id: owner.to_string(),
            text: text.to_string(),
            completed: false,
            created_at: WriteTimestamp::ServerTimestamp,
            parent_id: None,
            order: 0,
        }
    }

    #[tokio::test]
    async fn test_crud_round() {
        let store = MemoryRemoteStore::new();
        let first = store.create(&new_task("u1", "first")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = store.create(&new_task("u1", "second")).await.unwrap();
        store.create(&new_task("u2", "someone else")).await.unwrap();

        let listed = store.list("u1").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec![second.clone(), first.clone()]);

        store.update(&first, &TaskPatch::completed(true)).await.unwrap();
        assert!(store.get(&first).unwrap().completed);

        store.delete(&second).await.unwrap();
        assert!(store.get(&second).is_none());
        store.delete("never-existed").await.unwrap();
        assert!(store.update("never-existed", &TaskPatch::completed(true)).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let store = MemoryRemoteStore::new();
        store.set_available(false);
        assert!(store.create(&new_task("u1", "x")).await.is_err());
        assert!(store.tasks().is_empty());

        store.set_available(true);
        let id = store.create(&new_task("u1", "x")).await.unwrap();
        store.fail_writes_to(id.clone());
        assert!(store.delete(&id).await.is_err());
        assert!(store.get(&id).is_some());

        store.clear_failures();
        store.delete(&id).await.unwrap();
        assert_eq!(store.write_calls().len(), 4);
        assert!(store.tasks().is_empty());
    }
}
