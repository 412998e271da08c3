//! Event callbacks for the presentation layer.
//!
//! The engine emits an event after each state change worth telling the user
//! about: confirmed writes, rollbacks, queue drains and connectivity changes.
//! Callbacks run synchronously on the task that emitted the event, so they
//! should hand work off rather than block.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use strum::Display;
use tasksync_core::ActionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    TaskAdded,
    TaskUpdated,
    TaskDeleted,
    CompletedCleared,
    MutationRolledBack,
    SyncStarted,
    SyncCompleted,
    SyncError,
    ConnectionChanged,
}

/// Serializes as `{"type": "task_added", ...}` for forwarding to a UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A task was confirmed by the remote store.
    TaskAdded { id: String, text: String },
    TaskUpdated { id: String, completed: bool },
    TaskDeleted { id: String, text: String },
    CompletedCleared { count: usize },
    /// A direct write failed and local state was restored.
    MutationRolledBack { kind: ActionKind },
    SyncStarted { pending: usize },
    SyncCompleted { replayed: usize, failed: usize },
    SyncError { message: String },
    ConnectionChanged { online: bool },
}

impl SyncEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            SyncEvent::TaskAdded { .. } => EventType::TaskAdded,
            SyncEvent::TaskUpdated { .. } => EventType::TaskUpdated,
            SyncEvent::TaskDeleted { .. } => EventType::TaskDeleted,
            SyncEvent::CompletedCleared { .. } => EventType::CompletedCleared,
            SyncEvent::MutationRolledBack { .. } => EventType::MutationRolledBack,
            SyncEvent::SyncStarted { .. } => EventType::SyncStarted,
            SyncEvent::SyncCompleted { .. } => EventType::SyncCompleted,
            SyncEvent::SyncError { .. } => EventType::SyncError,
            SyncEvent::ConnectionChanged { .. } => EventType::ConnectionChanged,
        }
    }
}

type Callback = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

struct CallbackEntry {
    callback: Callback,
    event_filter: Option<EventType>,
}

pub struct EventDispatcher {
    callbacks: Mutex<Vec<CallbackEntry>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.push(Arc::new(callback), None);
    }

    /// Register a callback that only receives events of `event_filter`.
    pub fn register_callback_filtered<F>(&self, callback: F, event_filter: EventType)
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.push(Arc::new(callback), Some(event_filter));
    }

    pub fn callback_count(&self) -> usize {
        match self.callbacks.lock() {
            Ok(callbacks) => callbacks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn emit(&self, event: SyncEvent) {
        let event_type = event.event_type();
        let targets: Vec<Callback> = {
            let callbacks = match self.callbacks.lock() {
                Ok(callbacks) => callbacks,
                Err(_) => {
                    tracing::error!("Failed to acquire callback lock for event emission");
                    return;
                }
            };
            callbacks
                .iter()
                .filter(|entry| entry.event_filter.map_or(true, |f| f == event_type))
                .map(|entry| entry.callback.clone())
                .collect()
        };
        tracing::debug!("Emitting {} to {} callbacks", event_type, targets.len());

        for callback in targets {
            callback(&event);
        }
    }

    fn push(&self, callback: Callback, event_filter: Option<EventType>) {
        let mut callbacks = match self.callbacks.lock() {
            Ok(callbacks) => callbacks,
            Err(poisoned) => poisoned.into_inner(),
        };
        callbacks.push(CallbackEntry {
            callback,
            event_filter,
        });
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
