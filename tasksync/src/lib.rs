//! Tasksync - offline-tolerant task lists
//!
//! This crate provides a unified API for the tasksync client and its
//! shared data types.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tasksync::{ClientConfig, ConnectivityMonitor, MemoryRemoteStore, TaskClient};
//!
//! let client = TaskClient::new(
//!     ClientConfig::default().with_user("uid-1"),
//!     Arc::new(MemoryRemoteStore::new()),
//!     ConnectivityMonitor::default(),
//! )
//! .await?;
//! client.add_task("buy milk", None).await?;
//! ```

// Re-export client types
pub use tasksync_client::{
    ClientConfig, ClientError, ClientResult, ConnectivityMonitor, DrainReport, EventType,
    MemoryRemoteStore, MutationOutcome, RemoteStore, SyncEvent, TaskClient,
};

// Re-export core types that external applications may need
pub use tasksync_core::errors::{SyncError, ValidationError};
pub use tasksync_core::models::{NewTask, SyncStatus, Task, TaskPatch};
pub use tasksync_core::protocol::{ActionKind, QueueEntry, QueuedAction};
pub use tasksync_core::views::{Filter, Progress, TaskCounts, TaskTree};
pub use tasksync_core::SyncResult;
