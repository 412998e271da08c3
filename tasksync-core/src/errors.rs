use thiserror::Error;

use crate::protocol::ActionKind;

/// Input rejected before any state change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Task text must not be empty")]
    EmptyText,

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("No user is signed in")]
    NotSignedIn,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Queued {action} failed during replay: {message}")]
    QueuedReplayFailure { action: ActionKind, message: String },
}

impl SyncError {
    pub fn remote(message: impl Into<String>) -> Self {
        SyncError::RemoteUnavailable(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err: SyncError = ValidationError::EmptyText.into();
        assert!(matches!(err, SyncError::Validation(ValidationError::EmptyText)));
        assert_eq!(err.to_string(), "Validation failed: Task text must not be empty");

        let err = SyncError::QueuedReplayFailure {
            action: ActionKind::Update,
            message: SyncError::remote("timeout").to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Queued update failed during replay: Remote store unavailable: timeout"
        );
    }
}
