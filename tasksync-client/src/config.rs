use std::env;

use crate::{errors::ClientError, ClientResult};

pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";
pub const DEFAULT_NAMESPACE_PREFIX: &str = "todos";
const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub database_url: String,
    /// Signed-in user; `None` keeps the mirror in the shared anonymous namespace.
    pub user_id: Option<String>,
    /// Write queued actions through to SQLite and restore them on startup.
    pub persist_queue: bool,
    pub namespace_prefix: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            user_id: None,
            persist_queue: false,
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_persisted_queue(mut self, persist: bool) -> Self {
        self.persist_queue = persist;
        self
    }

    pub fn from_env() -> ClientResult<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var("TASKSYNC_DATABASE_URL") {
            config.database_url = url;
        }
        config.user_id = env::var("TASKSYNC_USER").ok().filter(|u| !u.trim().is_empty());
        if let Ok(flag) = env::var("TASKSYNC_PERSIST_QUEUE") {
            config.persist_queue = parse_flag(&flag).ok_or_else(|| {
                ClientError::Config(format!("TASKSYNC_PERSIST_QUEUE must be a boolean, got {flag:?}"))
            })?;
        }
        if let Ok(prefix) = env::var("TASKSYNC_NAMESPACE_PREFIX") {
            if prefix.trim().is_empty() {
                return Err(ClientError::Config(
                    "TASKSYNC_NAMESPACE_PREFIX must not be empty".to_string(),
                ));
            }
            config.namespace_prefix = prefix;
        }

        Ok(config)
    }

    /// Mirror key for the current user.
    pub fn namespace(&self) -> String {
        namespace_for(&self.namespace_prefix, self.user_id.as_deref())
    }
}

pub fn namespace_for(prefix: &str, user_id: Option<&str>) -> String {
    format!("{}-{}", prefix, user_id.unwrap_or(ANONYMOUS))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces() {
        let config = ClientConfig::default();
        assert_eq!(config.namespace(), "todos-anonymous");

        let config = config.with_user("uid-42");
        assert_eq!(config.namespace(), "todos-uid-42");
        assert_eq!(namespace_for("tasks", None), "tasks-anonymous");
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert!(!config.persist_queue);
        assert!(config.user_id.is_none());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
