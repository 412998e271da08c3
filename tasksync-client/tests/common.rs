use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tasksync_client::{
    ClientConfig, ConnectivityMonitor, MemoryRemoteStore, RemoteStore, TaskClient,
};
use tasksync_core::{NewTask, SyncResult, Task, TaskPatch};
use tokio::sync::Notify;

pub const USER: &str = "u1";

/// Builds a client for `USER` over an in-memory mirror, loaded and ready.
#[allow(dead_code)]
pub async fn setup_client(
    remote: Arc<dyn RemoteStore>,
    online: bool,
) -> (TaskClient, ConnectivityMonitor) {
    let monitor = ConnectivityMonitor::new(online);
    let config = ClientConfig::default().with_user(USER);
    let client = TaskClient::new(config, remote, monitor.clone()).await.unwrap();
    client.load().await.unwrap();
    (client, monitor)
}

/// A remote task owned by `USER`; `age_secs` pushes it back in time so list
/// order is deterministic.
#[allow(dead_code)]
pub fn make_task(id: &str, text: &str, completed: bool, age_secs: i64) -> Task {
    Task {
        id: id.to_string(),
        owner_id: USER.to_string(),
        text: text.to_string(),
        completed,
        created_at: Utc::now() - ChronoDuration::seconds(age_secs),
        parent_id: None,
        order: 0,
    }
}

#[allow(dead_code)]
pub fn make_subtask(id: &str, parent: &str, completed: bool, order: i64) -> Task {
    Task {
        parent_id: Some(parent.to_string()),
        order,
        ..make_task(id, &format!("step {order}"), completed, 100 - order)
    }
}

/// Unique on-disk database URL for tests that need a restart.
#[allow(dead_code)]
pub fn temp_database_url() -> String {
    let path = std::env::temp_dir().join(format!("tasksync-test-{}.sqlite3", uuid::Uuid::new_v4()));
    format!("sqlite:{}", path.display())
}

/// Polls `check` until it holds or a second has passed.
#[allow(dead_code)]
pub async fn wait_for<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Remote store whose `create` blocks until released, to observe the client
/// while a write is in flight.
#[allow(dead_code)]
pub struct GatedRemoteStore {
    pub inner: MemoryRemoteStore,
    entered: Notify,
    release: Notify,
}

#[allow(dead_code)]
impl GatedRemoteStore {
    pub fn new(inner: MemoryRemoteStore) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Resolves once a `create` call is waiting at the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl RemoteStore for GatedRemoteStore {
    async fn list(&self, owner_id: &str) -> SyncResult<Vec<Task>> {
        self.inner.list(owner_id).await
    }

    async fn create(&self, task: &NewTask) -> SyncResult<String> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.create(task).await
    }

    async fn update(&self, id: &str, updates: &TaskPatch) -> SyncResult<()> {
        self.inner.update(id, updates).await
    }

    async fn delete(&self, id: &str) -> SyncResult<()> {
        self.inner.delete(id).await
    }
}
