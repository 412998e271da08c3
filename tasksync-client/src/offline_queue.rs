use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tasksync_core::{QueueEntry, QueuedAction, SyncResult};

use crate::database::ClientDatabase;
use crate::ClientResult;

#[derive(Debug, Clone)]
struct PendingEntry {
    /// Row in `sync_queue` when the queue is persisted.
    row_id: Option<i64>,
    entry: QueueEntry,
}

/// Outcome of one pass over the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub replayed: usize,
    pub failed: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.replayed + self.failed
    }
}

/// FIFO log of remote writes deferred while offline.
///
/// Entries are never reordered or merged. A drain replays every entry exactly
/// once and then forgets all of them, including the ones that failed.
pub struct OfflineQueue {
    entries: Mutex<Vec<PendingEntry>>,
    db: Option<Arc<ClientDatabase>>,
    namespace: Mutex<String>,
}

impl OfflineQueue {
    pub fn in_memory() -> Self {
        Self::in_memory_for(String::new())
    }

    /// An in-memory queue that starts out in `namespace`.
    pub fn in_memory_for(namespace: impl Into<String>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            db: None,
            namespace: Mutex::new(namespace.into()),
        }
    }

    /// A queue that writes every entry through to `db` under `namespace`.
    pub fn persistent(db: Arc<ClientDatabase>, namespace: impl Into<String>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            db: Some(db),
            namespace: Mutex::new(namespace.into()),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }

    /// Replaces the in-memory entries with the persisted ones. Returns how
    /// many were restored; a non-persistent queue restores nothing.
    pub async fn restore(&self) -> ClientResult<usize> {
        let Some(db) = &self.db else {
            return Ok(0);
        };

        let namespace = self.namespace();
        let restored: Vec<PendingEntry> = db
            .load_queue(&namespace)
            .await?
            .into_iter()
            .map(|(row_id, entry)| PendingEntry {
                row_id: Some(row_id),
                entry,
            })
            .collect();

        let count = restored.len();
        *lock(&self.entries) = restored;
        if count > 0 {
            tracing::info!("Restored {} queued actions for {}", count, namespace);
        }
        Ok(count)
    }

    /// Points the queue at another user's entries.
    ///
    /// A persistent queue reloads that namespace's rows; the previous ones stay
    /// on disk for when it returns. An in-memory queue has nowhere to keep them
    /// and discards them, so one user's writes never replay under another.
    pub async fn switch_namespace(&self, namespace: impl Into<String>) -> ClientResult<()> {
        let namespace = namespace.into();
        if *lock(&self.namespace) == namespace {
            return Ok(());
        }
        *lock(&self.namespace) = namespace.clone();

        if self.is_persistent() {
            self.restore().await?;
            return Ok(());
        }

        let dropped = std::mem::take(&mut *lock(&self.entries)).len();
        if dropped > 0 {
            tracing::warn!(
                "Discarded {} queued actions on switch to {}",
                dropped,
                namespace
            );
        }
        Ok(())
    }

    /// Appends an action at the tail. Persistence failures are logged; the
    /// in-memory entry is kept either way.
    pub async fn enqueue(&self, action: QueuedAction) {
        let entry = QueueEntry::new(action);

        let row_id = match &self.db {
            Some(db) => match db.enqueue_entry(&self.namespace(), &entry).await {
                Ok(row_id) => Some(row_id),
                Err(e) => {
                    tracing::error!("Failed to persist queued {}: {}", entry.kind(), e);
                    None
                }
            },
            None => None,
        };

        tracing::debug!(
            "Queued {} for {}",
            entry.kind(),
            entry.action.task_id().unwrap_or("new task")
        );
        lock(&self.entries).push(PendingEntry { row_id, entry });
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    pub fn entries(&self) -> Vec<QueueEntry> {
        lock(&self.entries).iter().map(|p| p.entry.clone()).collect()
    }

    /// Replays every entry in insertion order through `replay_fn`.
    ///
    /// A failing entry is logged and skipped; it is not retried. The entries
    /// are taken out before replay starts, so anything enqueued while the
    /// drain runs waits for the next one.
    pub async fn drain<F, Fut>(&self, mut replay_fn: F) -> DrainReport
    where
        F: FnMut(QueueEntry) -> Fut,
        Fut: Future<Output = SyncResult<()>>,
    {
        let taken = std::mem::take(&mut *lock(&self.entries));
        let last_row = taken.iter().filter_map(|p| p.row_id).max();

        let mut report = DrainReport::default();
        for pending in taken {
            let kind = pending.entry.kind();
            match replay_fn(pending.entry).await {
                Ok(()) => report.replayed += 1,
                Err(e) => {
                    tracing::warn!("Replay of queued {} failed, dropping it: {}", kind, e);
                    report.failed += 1;
                }
            }
        }

        if let (Some(db), Some(last_row)) = (&self.db, last_row) {
            if let Err(e) = db.remove_queue_rows_up_to(&self.namespace(), last_row).await {
                tracing::error!("Failed to clear persisted queue: {}", e);
            }
        }

        report
    }

    fn namespace(&self) -> String {
        lock(&self.namespace).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
