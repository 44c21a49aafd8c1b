use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{CreateTaskData, TaskFilters, TaskPage, UpdateTaskData, User};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Remote,
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Remote => f.write_str("remote"),
            BackendKind::Local => f.write_str("local"),
        }
    }
}

/// Task persistence as seen by the task service. Every read is scoped to one
/// `user_id`.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Stores a new task and returns the id the backend assigned.
    async fn create_task(&self, data: &CreateTaskData, user_id: &str) -> Result<String>;

    async fn list_tasks(&self, user_id: &str, filters: &TaskFilters, page: u32) -> Result<TaskPage>;

    /// Fails with `NotFound` when no task has `update.id`.
    async fn update_task(&self, update: &UpdateTaskData) -> Result<()>;

    /// Deleting an unknown id succeeds.
    async fn delete_task(&self, id: &str) -> Result<()>;
}

/// Session establishment against one backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn signup(&self, email: &str, password: &str) -> Result<User>;

    async fn login(&self, email: &str, password: &str) -> Result<User>;

    async fn logout(&self) -> Result<()>;

    async fn current_user(&self) -> Result<Option<User>>;
}
