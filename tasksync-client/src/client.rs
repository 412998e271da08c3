use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures_util::future::join_all;
use tasksync_core::{
    count_tasks, filter_tasks, group_subtasks, is_temporary_id, next_subtask_order,
    subtask_progress, ActionKind, Filter, NewTask, Progress, QueueEntry, QueuedAction, SyncError,
    SyncResult, SyncStatus, Task, TaskCounts, TaskPatch, TaskTree, ValidationError,
    WriteTimestamp,
};
use tokio::task::JoinHandle;

use crate::config::{namespace_for, ClientConfig};
use crate::connectivity::ConnectivityMonitor;
use crate::database::ClientDatabase;
use crate::events::{EventDispatcher, SyncEvent};
use crate::offline_queue::{DrainReport, OfflineQueue};
use crate::remote::RemoteStore;
use crate::ClientResult;

/// How a mutation ended from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The remote store accepted the write.
    Confirmed,
    /// Offline: the write waits in the sync queue.
    Queued,
    /// The remote store rejected the write and local state was restored.
    RolledBack,
}

struct EngineState {
    tasks: Vec<Task>,
    user_id: Option<String>,
    namespace: String,
}

/// Clears the draining flag when a drain ends, however it ends.
struct DrainGuard(Arc<AtomicBool>);

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the task list and decides, per mutation, whether it goes straight to
/// the remote store or waits in the offline queue.
///
/// Every mutation is applied to memory and the local mirror before any remote
/// call. Mutations and drains run one at a time; reads never wait on them and
/// always see the optimistic state.
#[derive(Clone)]
pub struct TaskClient {
    db: Arc<ClientDatabase>,
    remote: Arc<dyn RemoteStore>,
    connectivity: ConnectivityMonitor,
    queue: Arc<OfflineQueue>,
    event_dispatcher: Arc<EventDispatcher>,
    state: Arc<Mutex<EngineState>>,
    op_lock: Arc<tokio::sync::Mutex<()>>,
    draining: Arc<AtomicBool>,
    temp_seq: Arc<AtomicU64>,
    namespace_prefix: String,
}

impl TaskClient {
    pub async fn new(
        config: ClientConfig,
        remote: Arc<dyn RemoteStore>,
        connectivity: ConnectivityMonitor,
    ) -> ClientResult<Self> {
        let db = Arc::new(ClientDatabase::new(&config.database_url).await?);
        db.run_migrations().await?;

        let namespace = config.namespace();
        let queue = if config.persist_queue {
            OfflineQueue::persistent(db.clone(), namespace.clone())
        } else {
            OfflineQueue::in_memory_for(namespace.clone())
        };
        queue.restore().await?;

        let tasks = match db.load_snapshot(&namespace).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!("Failed to read local mirror {}: {}", namespace, e);
                Vec::new()
            }
        };
        tracing::info!(
            "Task client started for {} with {} cached tasks, {} queued actions",
            namespace,
            tasks.len(),
            queue.len()
        );

        let event_dispatcher = Arc::new(EventDispatcher::new());
        let events_for_connectivity = event_dispatcher.clone();
        connectivity.on_change(move |online| {
            events_for_connectivity.emit(SyncEvent::ConnectionChanged { online });
        });

        Ok(Self {
            db,
            remote,
            connectivity,
            queue: Arc::new(queue),
            event_dispatcher,
            state: Arc::new(Mutex::new(EngineState {
                tasks,
                user_id: config.user_id,
                namespace,
            })),
            op_lock: Arc::new(tokio::sync::Mutex::new(())),
            draining: Arc::new(AtomicBool::new(false)),
            temp_seq: Arc::new(AtomicU64::new(0)),
            namespace_prefix: config.namespace_prefix,
        })
    }

    pub fn event_dispatcher(&self) -> Arc<EventDispatcher> {
        self.event_dispatcher.clone()
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn database(&self) -> Arc<ClientDatabase> {
        self.db.clone()
    }

    // ---------------------------------------------------------------------
    // Read access
    // ---------------------------------------------------------------------

    pub fn tasks(&self) -> Vec<Task> {
        self.lock_state().tasks.clone()
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_actions(&self) -> Vec<QueueEntry> {
        self.queue.entries()
    }

    pub fn user_id(&self) -> Option<String> {
        self.lock_state().user_id.clone()
    }

    pub fn namespace(&self) -> String {
        self.lock_state().namespace.clone()
    }

    pub fn filtered_view(&self, filter: Filter) -> Vec<Task> {
        filter_tasks(&self.lock_state().tasks, filter)
    }

    pub fn subtask_progress(&self, task_id: &str) -> Option<Progress> {
        subtask_progress(&self.lock_state().tasks, task_id)
    }

    pub fn task_tree(&self) -> TaskTree {
        group_subtasks(&self.lock_state().tasks)
    }

    pub fn counts(&self) -> TaskCounts {
        count_tasks(&self.lock_state().tasks)
    }

    pub fn sync_status(&self) -> SyncStatus {
        SyncStatus::from_parts(self.is_online(), self.pending_count())
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Adds a task, or a subtask of `parent_id`. Top-level tasks go to the
    /// front of the list; subtasks go to the back, after their siblings.
    pub async fn add_task(&self, text: &str, parent_id: Option<&str>) -> ClientResult<MutationOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText.into());
        }

        let _op = self.op_lock.lock().await;
        let owner_id = self.user_id().ok_or(ValidationError::NotSignedIn)?;

        let before = self.tasks();
        let order = parent_id.map_or(0, |parent| next_subtask_order(&before, parent));
        let new_task = NewTask {
            owner_id,
            text: text.to_string(),
            completed: false,
            created_at: WriteTimestamp::ServerTimestamp,
            parent_id: parent_id.map(str::to_string),
            order,
        };

        let temp_id = self.next_temp_id(parent_id.is_some());
        let optimistic = Task::from_new(temp_id.clone(), &new_task, Utc::now());
        let mut after = before.clone();
        if parent_id.is_some() {
            after.push(optimistic);
        } else {
            after.insert(0, optimistic);
        }
        self.commit(after).await;
        tracing::info!("Added task {} locally", temp_id);

        if self.should_defer(parent_id) {
            self.queue
                .enqueue(QueuedAction::Add {
                    local_id: Some(temp_id),
                    task: new_task,
                })
                .await;
            self.drain_if_online_locked().await;
            return Ok(MutationOutcome::Queued);
        }

        match self.remote.create(&new_task).await {
            Ok(id) => {
                tracing::info!("Task {} confirmed as {}", temp_id, id);
                let mut ids = HashMap::new();
                ids.insert(temp_id, id.clone());
                self.apply_id_map(&ids).await;
                self.event_dispatcher.emit(SyncEvent::TaskAdded {
                    id,
                    text: new_task.text,
                });
                Ok(MutationOutcome::Confirmed)
            }
            Err(e) => {
                tracing::warn!("Failed to create task {}: {}. Rolling back", temp_id, e);
                self.rollback(before, ActionKind::Add).await;
                Ok(MutationOutcome::RolledBack)
            }
        }
    }

    /// Flips `completed` on a task or subtask.
    pub async fn toggle_task(&self, id: &str) -> ClientResult<MutationOutcome> {
        let _op = self.op_lock.lock().await;

        let before = self.tasks();
        let task = find_task(&before, id)?;
        let updates = TaskPatch::completed(!task.completed);

        let after: Vec<Task> = before
            .iter()
            .map(|t| {
                let mut t = t.clone();
                if t.id == id {
                    t.apply_patch(&updates);
                }
                t
            })
            .collect();
        self.commit(after).await;

        if self.should_defer(Some(id)) {
            self.queue
                .enqueue(QueuedAction::Update {
                    id: id.to_string(),
                    updates,
                })
                .await;
            self.drain_if_online_locked().await;
            return Ok(MutationOutcome::Queued);
        }

        match self.remote.update(id, &updates).await {
            Ok(()) => {
                self.event_dispatcher.emit(SyncEvent::TaskUpdated {
                    id: id.to_string(),
                    completed: updates.completed.unwrap_or_default(),
                });
                Ok(MutationOutcome::Confirmed)
            }
            Err(e) => {
                tracing::warn!("Failed to update task {}: {}. Rolling back", id, e);
                self.rollback(before, ActionKind::Update).await;
                Ok(MutationOutcome::RolledBack)
            }
        }
    }

    /// Removes a task. Its subtasks are left in place and show up as orphans.
    pub async fn delete_task(&self, id: &str) -> ClientResult<MutationOutcome> {
        let _op = self.op_lock.lock().await;

        let before = self.tasks();
        let removed = find_task(&before, id)?.clone();
        let after: Vec<Task> = before.iter().filter(|t| t.id != id).cloned().collect();
        self.commit(after).await;

        if self.should_defer(Some(id)) {
            self.queue
                .enqueue(QueuedAction::Delete { id: id.to_string() })
                .await;
            self.drain_if_online_locked().await;
            return Ok(MutationOutcome::Queued);
        }

        match self.remote.delete(id).await {
            Ok(()) => {
                self.event_dispatcher.emit(SyncEvent::TaskDeleted {
                    id: removed.id,
                    text: removed.text,
                });
                Ok(MutationOutcome::Confirmed)
            }
            Err(e) => {
                tracing::warn!("Failed to delete task {}: {}. Rolling back", id, e);
                self.rollback(before, ActionKind::Delete).await;
                Ok(MutationOutcome::RolledBack)
            }
        }
    }

    /// Removes every completed task. Online, the deletes run concurrently and
    /// a single rejection restores the whole pre-call list.
    pub async fn clear_completed(&self) -> ClientResult<MutationOutcome> {
        let _op = self.op_lock.lock().await;

        let before = self.tasks();
        let (completed, active): (Vec<Task>, Vec<Task>) =
            before.iter().cloned().partition(|t| t.completed);
        if completed.is_empty() {
            return Ok(MutationOutcome::Confirmed);
        }
        self.commit(active).await;

        let (deferred, direct): (Vec<Task>, Vec<Task>) = completed
            .into_iter()
            .partition(|t| self.should_defer(Some(t.id.as_str())));

        if !direct.is_empty() {
            let results = join_all(direct.iter().map(|t| self.remote.delete(&t.id))).await;
            let failures: Vec<SyncError> = results.into_iter().filter_map(Result::err).collect();
            if let Some(first) = failures.first() {
                tracing::warn!(
                    "{} of {} deletes failed while clearing completed tasks ({}). Rolling back",
                    failures.len(),
                    direct.len(),
                    first
                );
                // Nothing was queued yet, so the rollback leaves the queue untouched.
                self.rollback(before, ActionKind::Delete).await;
                return Ok(MutationOutcome::RolledBack);
            }
        }

        for task in &deferred {
            self.queue
                .enqueue(QueuedAction::Delete { id: task.id.clone() })
                .await;
        }
        self.drain_if_online_locked().await;
        if direct.is_empty() {
            return Ok(MutationOutcome::Queued);
        }

        tracing::info!("Cleared {} completed tasks", direct.len() + deferred.len());
        self.event_dispatcher.emit(SyncEvent::CompletedCleared {
            count: direct.len() + deferred.len(),
        });
        Ok(MutationOutcome::Confirmed)
    }

    // ---------------------------------------------------------------------
    // Loading and synchronization
    // ---------------------------------------------------------------------

    /// Initial fetch. Offline or signed out the mirror is all there is;
    /// online, queued writes are replayed first and the remote list replaces
    /// the local one.
    pub async fn load(&self) -> ClientResult<()> {
        let _op = self.op_lock.lock().await;
        self.load_locked().await;
        Ok(())
    }

    /// Switches to another user's namespace (or the anonymous one) and loads it.
    pub async fn set_user(&self, user_id: Option<String>) -> ClientResult<()> {
        let _op = self.op_lock.lock().await;

        let namespace = namespace_for(&self.namespace_prefix, user_id.as_deref());
        tracing::info!("Switching task list to {}", namespace);
        self.queue.switch_namespace(namespace.clone()).await?;

        let cached = match self.db.load_snapshot(&namespace).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!("Failed to read local mirror {}: {}", namespace, e);
                Vec::new()
            }
        };
        {
            let mut state = self.lock_state();
            state.user_id = user_id;
            state.namespace = namespace;
            state.tasks = cached;
        }

        self.load_locked().await;
        Ok(())
    }

    /// Replays the offline queue against the remote store, then refreshes.
    ///
    /// Returns `None` without doing anything while offline or while another
    /// drain is running; the next reconnect triggers another attempt.
    pub async fn sync_pending(&self) -> ClientResult<Option<DrainReport>> {
        if !self.is_online() {
            tracing::debug!("Offline - not draining {} queued actions", self.pending_count());
            return Ok(None);
        }
        let Some(guard) = self.try_begin_drain() else {
            tracing::info!("Drain already in progress, ignoring request");
            return Ok(None);
        };

        let _op = self.op_lock.lock().await;
        // Connectivity may have dropped while a mutation held the lock.
        if !self.is_online() {
            tracing::info!(
                "Went offline before draining, keeping {} queued actions",
                self.pending_count()
            );
            return Ok(None);
        }
        let report = self.drain_locked(guard).await;
        Ok(Some(report))
    }

    /// Spawns a task that drains the queue on every offline → online transition.
    pub fn spawn_reconnect_listener(&self) -> JoinHandle<()> {
        let client = self.clone();
        let mut rx = self.connectivity.subscribe();

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if !online {
                    continue;
                }
                match client.sync_pending().await {
                    Ok(Some(report)) => tracing::info!(
                        "Reconnect sync finished: {} replayed, {} failed",
                        report.replayed,
                        report.failed
                    ),
                    Ok(None) => {}
                    Err(e) => tracing::error!("Reconnect sync failed: {}", e),
                }
            }
            tracing::debug!("Connectivity monitor dropped, reconnect listener exiting");
        })
    }

    async fn load_locked(&self) {
        let signed_in = self.user_id().is_some();
        if self.is_online() && signed_in && !self.queue.is_empty() {
            if let Some(guard) = self.try_begin_drain() {
                self.drain_locked(guard).await;
                return;
            }
        }
        self.refresh_locked().await;
    }

    async fn drain_locked(&self, _guard: DrainGuard) -> DrainReport {
        let pending = self.queue.len();
        if pending > 0 {
            tracing::info!("Draining {} queued actions", pending);
        }
        self.event_dispatcher.emit(SyncEvent::SyncStarted { pending });

        let remote = self.remote.clone();
        let ids: Arc<Mutex<HashMap<String, String>>> = Arc::new(Mutex::new(HashMap::new()));
        let ids_for_replay = ids.clone();
        let report = self
            .queue
            .drain(move |entry| {
                let remote = remote.clone();
                let ids = ids_for_replay.clone();
                async move { replay_entry(remote.as_ref(), entry.action, &ids).await }
            })
            .await;

        let confirmed_ids = lock(&ids).clone();
        if !confirmed_ids.is_empty() {
            self.apply_id_map(&confirmed_ids).await;
        }

        if report.failed > 0 {
            self.event_dispatcher.emit(SyncEvent::SyncError {
                message: format!("{} queued actions could not be replayed", report.failed),
            });
        }
        self.event_dispatcher.emit(SyncEvent::SyncCompleted {
            replayed: report.replayed,
            failed: report.failed,
        });

        self.refresh_locked().await;
        report
    }

    /// Replaces the local list with the remote one when possible; otherwise
    /// keeps what the mirror holds.
    async fn refresh_locked(&self) {
        let Some(user_id) = self.user_id() else {
            return;
        };
        if !self.is_online() {
            return;
        }

        match self.remote.list(&user_id).await {
            Ok(tasks) => {
                tracing::info!("Fetched {} tasks from remote store", tasks.len());
                self.commit(tasks).await;
            }
            Err(e) => {
                tracing::warn!("Failed to fetch tasks, keeping local copy: {}", e);
                self.event_dispatcher.emit(SyncEvent::SyncError {
                    message: e.to_string(),
                });
            }
        }
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    /// Writes queue instead of hitting the store while offline, and while the
    /// target still has a temporary id (its create is queued ahead of it).
    fn should_defer(&self, target_id: Option<&str>) -> bool {
        !self.is_online() || target_id.is_some_and(is_temporary_id)
    }

    /// A write queued while online (its target still has a temporary id) is
    /// replayed right away instead of waiting for the next reconnect. Skipped
    /// when another drain already holds the guard; that one picks it up.
    async fn drain_if_online_locked(&self) {
        if !self.is_online() || self.queue.is_empty() {
            return;
        }
        if let Some(guard) = self.try_begin_drain() {
            self.drain_locked(guard).await;
        }
    }

    fn try_begin_drain(&self) -> Option<DrainGuard> {
        self.draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| DrainGuard(self.draining.clone()))
    }

    fn next_temp_id(&self, subtask: bool) -> String {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let millis = Utc::now().timestamp_millis();
        if subtask {
            format!("temp-sub-{}-{}", millis, seq)
        } else {
            format!("temp-{}-{}", millis, seq)
        }
    }

    async fn commit(&self, tasks: Vec<Task>) {
        let namespace = {
            let mut state = self.lock_state();
            state.tasks = tasks.clone();
            state.namespace.clone()
        };

        if let Err(e) = self.db.save_snapshot(&namespace, &tasks).await {
            tracing::error!("Failed to write local mirror {}: {}", namespace, e);
        }
    }

    async fn rollback(&self, snapshot: Vec<Task>, kind: ActionKind) {
        self.commit(snapshot).await;
        self.event_dispatcher
            .emit(SyncEvent::MutationRolledBack { kind });
    }

    /// Swaps temporary ids for store-assigned ones, in task ids and parent links.
    async fn apply_id_map(&self, ids: &HashMap<String, String>) {
        let remapped: Vec<Task> = self
            .tasks()
            .into_iter()
            .map(|mut task| {
                if let Some(id) = ids.get(&task.id) {
                    task.id = id.clone();
                }
                if let Some(parent) = task.parent_id.as_ref().and_then(|p| ids.get(p)) {
                    task.parent_id = Some(parent.clone());
                }
                task
            })
            .collect();
        self.commit(remapped).await;
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        lock(&self.state)
    }
}

fn find_task<'a>(tasks: &'a [Task], id: &str) -> Result<&'a Task, ValidationError> {
    tasks
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| ValidationError::UnknownTask(id.to_string()))
}

/// Sends one queued action to the store, translating temporary ids created
/// earlier in the same drain.
async fn replay_entry(
    remote: &dyn RemoteStore,
    action: QueuedAction,
    ids: &Mutex<HashMap<String, String>>,
) -> SyncResult<()> {
    let kind = action.kind();
    let failure = |e: SyncError| SyncError::QueuedReplayFailure {
        action: kind,
        message: e.to_string(),
    };

    match action {
        QueuedAction::Add { local_id, mut task } => {
            if let Some(parent) = task.parent_id.take() {
                // An unresolved temporary parent is kept as a dangling reference.
                task.parent_id = Some(lock(ids).get(&parent).cloned().unwrap_or(parent));
            }
            let id = remote.create(&task).await.map_err(failure)?;
            if let Some(local_id) = local_id {
                lock(ids).insert(local_id, id);
            }
            Ok(())
        }
        QueuedAction::Update { id, updates } => {
            let id = resolve_id(&id, ids, kind)?;
            remote.update(&id, &updates).await.map_err(failure)
        }
        QueuedAction::Delete { id } => {
            let id = resolve_id(&id, ids, kind)?;
            remote.delete(&id).await.map_err(failure)
        }
    }
}

fn resolve_id(
    id: &str,
    ids: &Mutex<HashMap<String, String>>,
    kind: ActionKind,
) -> SyncResult<String> {
    if !is_temporary_id(id) {
        return Ok(id.to_string());
    }
    lock(ids)
        .get(id)
        .cloned()
        .ok_or_else(|| SyncError::QueuedReplayFailure {
            action: kind,
            message: format!("task {} was never created remotely", id),
        })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
