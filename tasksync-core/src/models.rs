use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of client-generated ids that the remote store has not confirmed yet.
pub const TEMP_ID_PREFIX: &str = "temp-";

pub fn is_temporary_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub owner_id: String,
    pub text: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Position among siblings sharing `parent_id`.
    #[serde(default)]
    pub order: i64,
}

impl Task {
    pub fn is_subtask(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn is_temporary(&self) -> bool {
        is_temporary_id(&self.id)
    }

    /// Builds the locally visible task for a write that has no remote id yet.
    pub fn from_new(id: String, new_task: &NewTask, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: new_task.owner_id.clone(),
            text: new_task.text.clone(),
            completed: new_task.completed,
            created_at,
            parent_id: new_task.parent_id.clone(),
            order: new_task.order,
        }
    }

    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(text) = &patch.text {
            self.text = text.clone();
        }
        if let Some(order) = patch.order {
            self.order = order;
        }
    }
}

/// Creation time as written to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WriteTimestamp {
    /// Placeholder the store replaces with its own clock on write.
    ServerTimestamp,
    At(DateTime<Utc>),
}

impl WriteTimestamp {
    pub fn resolve(self, server_now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            WriteTimestamp::ServerTimestamp => server_now,
            WriteTimestamp::At(at) => at,
        }
    }
}

/// A task as sent to `create`: everything but the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub owner_id: String,
    pub text: String,
    pub completed: bool,
    pub created_at: WriteTimestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub order: i64,
}

impl NewTask {
    pub fn into_task(self, id: String, server_now: DateTime<Utc>) -> Task {
        Task {
            id,
            owner_id: self.owner_id,
            text: self.text,
            completed: self.completed,
            created_at: self.created_at.resolve(server_now),
            parent_id: self.parent_id,
            order: self.order,
        }
    }
}

/// Partial field update sent to `update`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

impl TaskPatch {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_none() && self.text.is_none() && self.order.is_none()
    }
}

/// What the presentation layer shows next to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    /// Disconnected; `pending` writes wait for the next reconnect.
    Offline { pending: usize },
    /// Connected with writes still queued.
    Syncing { pending: usize },
    Idle,
}

impl SyncStatus {
    pub fn from_parts(online: bool, pending: usize) -> Self {
        match (online, pending) {
            (false, pending) => SyncStatus::Offline { pending },
            (true, 0) => SyncStatus::Idle,
            (true, pending) => SyncStatus::Syncing { pending },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task {
            id: "abc".to_string(),
            owner_id: "user-1".to_string(),
            text: "write report".to_string(),
            completed: false,
            created_at: Utc::now(),
            parent_id: None,
            order: 0,
        }
    }

    #[test]
    fn test_temporary_ids() {
        assert!(is_temporary_id("temp-1700000000000-0"));
        assert!(is_temporary_id("temp-sub-1700000000000-3"));
        assert!(!is_temporary_id("Xy12abc"));

        let mut task = sample_task();
        assert!(!task.is_temporary());
        task.id = "temp-1".to_string();
        assert!(task.is_temporary());
    }

    #[test]
    fn test_apply_patch_only_touches_present_fields() {
        let mut task = sample_task();
        task.apply_patch(&TaskPatch::completed(true));
        assert!(task.completed);
        assert_eq!(task.text, "write report");
        assert_eq!(task.order, 0);

        task.apply_patch(&TaskPatch {
            text: Some("write the report".to_string()),
            order: Some(4),
            ..Default::default()
        });
        assert!(task.completed);
        assert_eq!(task.text, "write the report");
        assert_eq!(task.order, 4);
    }

    #[test]
    fn test_server_timestamp_resolution() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::hours(1);
        assert_eq!(WriteTimestamp::ServerTimestamp.resolve(now), now);
        assert_eq!(WriteTimestamp::At(earlier).resolve(now), earlier);
    }

    #[test]
    fn test_new_task_into_task() {
        let now = Utc::now();
        let new_task = NewTask {
            owner_id: "user-1".to_string(),
            text: "subtask".to_string(),
            completed: false,
            created_at: WriteTimestamp::ServerTimestamp,
            parent_id: Some("parent".to_string()),
            order: 2,
        };
        let task = new_task.into_task("remote-1".to_string(), now);
        assert_eq!(task.id, "remote-1");
        assert_eq!(task.created_at, now);
        assert_eq!(task.parent_id.as_deref(), Some("parent"));
        assert!(task.is_subtask());
    }

    #[test]
    fn test_patch_serialization_skips_absent_fields() {
        let json = serde_json::to_value(TaskPatch::completed(false)).unwrap();
        assert_eq!(json, serde_json::json!({"completed": false}));
    }

    #[test]
    fn test_sync_status_from_parts() {
        assert_eq!(SyncStatus::from_parts(false, 0), SyncStatus::Offline { pending: 0 });
        assert_eq!(SyncStatus::from_parts(false, 2), SyncStatus::Offline { pending: 2 });
        assert_eq!(SyncStatus::from_parts(true, 3), SyncStatus::Syncing { pending: 3 });
        assert_eq!(SyncStatus::from_parts(true, 0), SyncStatus::Idle);
    }
}
