use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::{NewTask, TaskPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    Add,
    Update,
    Delete,
}

/// A deferred remote write, shaped like the CRUD call it replays as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum QueuedAction {
    Add {
        /// Temporary id the task carries locally until the create lands.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_id: Option<String>,
        task: NewTask,
    },
    Update {
        id: String,
        updates: TaskPatch,
    },
    Delete {
        id: String,
    },
}

impl QueuedAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            QueuedAction::Add { .. } => ActionKind::Add,
            QueuedAction::Update { .. } => ActionKind::Update,
            QueuedAction::Delete { .. } => ActionKind::Delete,
        }
    }

    /// Id of the task this action targets, if it already has one.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            QueuedAction::Add { local_id, .. } => local_id.as_deref(),
            QueuedAction::Update { id, .. } | QueuedAction::Delete { id } => Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub action: QueuedAction,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(action: QueuedAction) -> Self {
        Self {
            action,
            enqueued_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WriteTimestamp;
    use std::str::FromStr;

    #[test]
    fn test_action_kind_strings() {
        assert_eq!(ActionKind::Add.to_string(), "add");
        assert_eq!(ActionKind::Update.to_string(), "update");
        assert_eq!(ActionKind::from_str("delete").unwrap(), ActionKind::Delete);
        assert!(ActionKind::from_str("rename").is_err());
    }

    #[test]
    fn test_queue_entry_wire_shape() {
        let entry = QueueEntry::new(QueuedAction::Update {
            id: "abc".to_string(),
            updates: TaskPatch::completed(true),
        });
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["action"]["kind"], "update");
        assert_eq!(json["action"]["data"]["id"], "abc");
        assert_eq!(json["action"]["data"]["updates"]["completed"], true);
        assert!(json["enqueued_at"].is_string());

        let back: QueueEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_task_id_extraction() {
        let add = QueuedAction::Add {
            local_id: Some("temp-1".to_string()),
            task: NewTask {
                owner_id: "user-1".to_string(),
                text: "buy milk".to_string(),
                completed: false,
                created_at: WriteTimestamp::ServerTimestamp,
                parent_id: None,
                order: 0,
            },
        };
        assert_eq!(add.kind(), ActionKind::Add);
        assert_eq!(add.task_id(), Some("temp-1"));

        let delete = QueuedAction::Delete { id: "xyz".to_string() };
        assert_eq!(delete.kind(), ActionKind::Delete);
        assert_eq!(delete.task_id(), Some("xyz"));
    }
}
