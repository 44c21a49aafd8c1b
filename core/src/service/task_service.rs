use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{Result, TaskflowError};
use crate::model::{CreateTaskData, TaskFilters, TaskPage, UpdateTaskData};
use crate::storage::{BackendKind, TaskBackend};

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Routes task operations to the remote backend until it fails once, then
/// to the local backend for the rest of the service's life.
pub struct TaskService {
    active: RwLock<Arc<dyn TaskBackend>>,
    local: Arc<dyn TaskBackend>,
    mode: watch::Sender<BackendKind>,
    remote_timeout: Duration,
}

impl TaskService {
    pub fn new(remote: Arc<dyn TaskBackend>, local: Arc<dyn TaskBackend>) -> Self {
        Self::with_timeout(remote, local, DEFAULT_REMOTE_TIMEOUT)
    }

    pub fn with_timeout(
        remote: Arc<dyn TaskBackend>,
        local: Arc<dyn TaskBackend>,
        remote_timeout: Duration,
    ) -> Self {
        let (mode, _) = watch::channel(remote.kind());
        Self {
            active: RwLock::new(remote),
            local,
            mode,
            remote_timeout,
        }
    }

    /// A service with no remote backend configured.
    pub fn local_only(local: Arc<dyn TaskBackend>) -> Self {
        let (mode, _) = watch::channel(BackendKind::Local);
        Self {
            active: RwLock::new(local.clone()),
            local,
            mode,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    pub fn mode(&self) -> BackendKind {
        *self.mode.borrow()
    }

    pub fn remote_enabled(&self) -> bool {
        self.mode() == BackendKind::Remote
    }

    /// Observers see the switch to [`BackendKind::Local`] when it happens.
    pub fn subscribe_mode(&self) -> watch::Receiver<BackendKind> {
        self.mode.subscribe()
    }

    pub async fn create_task(&self, data: &CreateTaskData, user_id: &str) -> Result<String> {
        self.route("create_task", |backend| async move {
            backend.create_task(data, user_id).await
        })
        .await
    }

    pub async fn list_tasks(&self, user_id: &str, filters: &TaskFilters, page: u32) -> Result<TaskPage> {
        self.route("list_tasks", |backend| async move {
            backend.list_tasks(user_id, filters, page).await
        })
        .await
    }

    pub async fn update_task(&self, update: &UpdateTaskData) -> Result<()> {
        self.route("update_task", |backend| async move {
            backend.update_task(update).await
        })
        .await
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        self.route("delete_task", |backend| async move { backend.delete_task(id).await })
            .await
    }

    async fn route<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Fn(Arc<dyn TaskBackend>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let backend = self.active.read().clone();
        if backend.kind() == BackendKind::Local {
            debug!(op, "serving from local backend");
            return call(backend).await;
        }

        let outcome = match tokio::time::timeout(self.remote_timeout, call(backend)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TaskflowError::unavailable(format!(
                "{} timed out after {:?}",
                op, self.remote_timeout
            ))),
        };

        match outcome {
            Err(err) if err.triggers_fallback() => {
                self.downgrade(op, &err);
                call(self.local.clone()).await
            }
            other => other,
        }
    }

    fn downgrade(&self, op: &str, cause: &TaskflowError) {
        *self.active.write() = self.local.clone();
        let previous = self.mode.send_replace(BackendKind::Local);
        if previous == BackendKind::Remote {
            warn!(op, error = %cause, "remote backend failed; using local storage for the rest of this session");
        }
    }
}
