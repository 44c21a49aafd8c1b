//! On-device backend: the whole task collection and the current user live
//! as JSON documents in a [`KeyValueStore`].

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, TaskflowError};
use crate::model::{CreateTaskData, Task, TaskFilters, TaskPage, TaskStatus, UpdateTaskData, User};
use crate::pagination::paginate;
use crate::storage::kv::KeyValueStore;
use crate::storage::traits::{AuthBackend, BackendKind, TaskBackend};
use crate::time::{decode_timestamp, encode_timestamp};
use crate::validation::PASSWORD_MIN_CHARS;

pub const TASKS_KEY: &str = "taskflow_tasks";
pub const USER_KEY: &str = "taskflow_user";

/// Persisted shape of a task. Timestamps stay strings until
/// [`StoredTask::into_task`] re-hydrates them.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct StoredTask {
    id: String,
    title: String,
    description: String,
    status: TaskStatus,
    due_date: String,
    created_at: String,
    updated_at: String,
    user_id: String,
}

impl StoredTask {
    fn from_task(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status,
            due_date: encode_timestamp(&task.due_date),
            created_at: encode_timestamp(&task.created_at),
            updated_at: encode_timestamp(&task.updated_at),
            user_id: task.user_id.clone(),
        }
    }

    fn into_task(self) -> Result<Task> {
        Ok(Task {
            due_date: decode_timestamp(&self.due_date)?,
            created_at: decode_timestamp(&self.created_at)?,
            updated_at: decode_timestamp(&self.updated_at)?,
            id: self.id,
            title: self.title,
            description: self.description,
            status: self.status,
            user_id: self.user_id,
        })
    }
}

/// Fresh opaque id: time-ordered prefix with a random tail.
pub fn generate_id() -> String {
    Uuid::now_v7().simple().to_string()
}

pub struct LocalBackend<K: KeyValueStore> {
    store: K,
    write_lock: Mutex<()>,
}

impl<K: KeyValueStore> LocalBackend<K> {
    pub fn new(store: K) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Loads every stored task. Any unreadable record discards the whole
    /// collection rather than returning part of it.
    fn read_tasks(&self) -> Result<Vec<Task>> {
        let raw = match self.store.get(TASKS_KEY)? {
            Some(raw) => raw,
            None => return Ok(Vec::new()),
        };
        match decode_tasks(&raw) {
            Ok(tasks) => Ok(tasks),
            Err(err) => {
                warn!(error = %err, "discarding unreadable local task collection");
                Ok(Vec::new())
            }
        }
    }

    fn write_tasks(&self, tasks: &[Task]) -> Result<()> {
        let stored: Vec<StoredTask> = tasks.iter().map(StoredTask::from_task).collect();
        let raw = serde_json::to_string(&stored)?;
        self.store.set(TASKS_KEY, &raw)
    }

    fn store_user(&self, user: &User) -> Result<()> {
        let raw = serde_json::to_string(user)?;
        self.store.set(USER_KEY, &raw)
    }

    pub fn current_user_from_storage(&self) -> Result<Option<User>> {
        let raw = match self.store.get(USER_KEY)? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(err) => {
                warn!(error = %err, "discarding unreadable local user record");
                Ok(None)
            }
        }
    }

    fn fabricate_user(&self, email: &str) -> Result<User> {
        let user = User::new(generate_id(), email);
        self.store_user(&user)?;
        debug!(uid = %user.uid, "stored local user");
        Ok(user)
    }
}

fn decode_tasks(raw: &str) -> Result<Vec<Task>> {
    let stored: Vec<StoredTask> = serde_json::from_str(raw)
        .map_err(|e| TaskflowError::CorruptState(format!("task collection: {}", e)))?;
    stored.into_iter().map(StoredTask::into_task).collect()
}

fn require_credentials(email: &str, password: &str) -> Result<()> {
    if email.is_empty() || password.is_empty() {
        return Err(TaskflowError::validation("email and password are required"));
    }
    Ok(())
}

#[async_trait]
impl<K: KeyValueStore> TaskBackend for LocalBackend<K> {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn create_task(&self, data: &CreateTaskData, user_id: &str) -> Result<String> {
        let _guard = self.write_lock.lock();
        let mut tasks = self.read_tasks()?;
        let now = Utc::now();
        let task = Task {
            id: generate_id(),
            title: data.title.clone(),
            description: data.description.clone(),
            status: data.status,
            due_date: data.due_date,
            created_at: now,
            updated_at: now,
            user_id: user_id.to_string(),
        };
        let id = task.id.clone();
        tasks.push(task);
        self.write_tasks(&tasks)?;
        Ok(id)
    }

    async fn list_tasks(&self, user_id: &str, filters: &TaskFilters, page: u32) -> Result<TaskPage> {
        let tasks: Vec<Task> = self
            .read_tasks()?
            .into_iter()
            .filter(|t| t.user_id == user_id)
            .collect();
        Ok(paginate(tasks, filters, page))
    }

    async fn update_task(&self, update: &UpdateTaskData) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut tasks = self.read_tasks()?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == update.id)
            .ok_or_else(|| TaskflowError::NotFound(update.id.clone()))?;
        update.apply_to(task);
        task.updated_at = Utc::now();
        self.write_tasks(&tasks)
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut tasks = self.read_tasks()?;
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        if tasks.len() == before {
            debug!(id, "delete of unknown local task ignored");
            return Ok(());
        }
        self.write_tasks(&tasks)
    }
}

/// Placeholder identity layer: credentials are checked for shape only and
/// never stored.
#[async_trait]
impl<K: KeyValueStore> AuthBackend for LocalBackend<K> {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn signup(&self, email: &str, password: &str) -> Result<User> {
        require_credentials(email, password)?;
        if password.chars().count() < PASSWORD_MIN_CHARS {
            return Err(TaskflowError::validation(format!(
                "password must be at least {} characters",
                PASSWORD_MIN_CHARS
            )));
        }
        self.fabricate_user(email)
    }

    async fn login(&self, email: &str, password: &str) -> Result<User> {
        require_credentials(email, password)?;
        self.fabricate_user(email)
    }

    async fn logout(&self) -> Result<()> {
        self.store.remove(USER_KEY)
    }

    async fn current_user(&self) -> Result<Option<User>> {
        self.current_user_from_storage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::{FileKeyValueStore, MemoryKeyValueStore};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn backend() -> (Arc<MemoryKeyValueStore>, LocalBackend<Arc<MemoryKeyValueStore>>) {
        let store = Arc::new(MemoryKeyValueStore::new());
        (store.clone(), LocalBackend::new(store))
    }

    fn data(title: &str, status: TaskStatus) -> CreateTaskData {
        CreateTaskData {
            title: title.to_string(),
            description: "details".to_string(),
            status,
            due_date: Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let (_, local) = backend();
        let input = data("Buy milk", TaskStatus::Pending);
        let id = local.create_task(&input, "u1").await.unwrap();

        let page = local.list_tasks("u1", &TaskFilters::default(), 1).await.unwrap();
        assert_eq!(page.tasks.len(), 1);
        let task = &page.tasks[0];
        assert_eq!(task.id, id);
        assert_eq!(task.title, input.title);
        assert_eq!(task.description, input.description);
        assert_eq!(task.status, input.status);
        assert_eq!(task.due_date, input.due_date);
        assert_eq!(task.created_at, task.updated_at);
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_user() {
        let (_, local) = backend();
        local.create_task(&data("Mine", TaskStatus::Pending), "u1").await.unwrap();
        local.create_task(&data("Theirs", TaskStatus::Pending), "u2").await.unwrap();

        let page = local.list_tasks("u1", &TaskFilters::default(), 1).await.unwrap();
        assert_eq!(page.pagination.total_tasks, 1);
        assert_eq!(page.tasks[0].title, "Mine");
    }

    #[tokio::test]
    async fn test_update_changes_only_patched_fields() {
        let (_, local) = backend();
        let id = local.create_task(&data("Write report", TaskStatus::Pending), "u1").await.unwrap();
        let before = local.list_tasks("u1", &TaskFilters::default(), 1).await.unwrap().tasks[0].clone();

        local
            .update_task(&UpdateTaskData::new(&id).with_status(TaskStatus::Completed))
            .await
            .unwrap();

        let after = local.list_tasks("u1", &TaskFilters::default(), 1).await.unwrap().tasks[0].clone();
        assert_eq!(after.status, TaskStatus::Completed);
        assert_eq!(after.title, before.title);
        assert_eq!(after.description, before.description);
        assert_eq!(after.due_date, before.due_date);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at >= before.updated_at);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let (_, local) = backend();
        let err = local
            .update_task(&UpdateTaskData::new("missing").with_status(TaskStatus::Completed))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskflowError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_, local) = backend();
        let id = local.create_task(&data("Temp", TaskStatus::Pending), "u1").await.unwrap();

        local.delete_task(&id).await.unwrap();
        local.delete_task(&id).await.unwrap();

        let page = local.list_tasks("u1", &TaskFilters::default(), 1).await.unwrap();
        assert!(page.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_timestamp_empties_the_read() {
        let (store, local) = backend();
        local.create_task(&data("Good", TaskStatus::Pending), "u1").await.unwrap();

        let raw = store.get(TASKS_KEY).unwrap().unwrap();
        let mut records: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let mut extra = records[0].clone();
        extra["id"] = "broken".into();
        extra["dueDate"] = "yesterday-ish".into();
        records.as_array_mut().unwrap().push(extra);
        store.set(TASKS_KEY, &records.to_string()).unwrap();

        let page = local.list_tasks("u1", &TaskFilters::default(), 1).await.unwrap();
        assert!(page.tasks.is_empty());
        assert_eq!(page.pagination.total_tasks, 0);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let (_, local) = backend();
        let a = local.create_task(&data("One", TaskStatus::Pending), "u1").await.unwrap();
        let b = local.create_task(&data("Two", TaskStatus::Pending), "u1").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_file_backed_collection_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = Some(dir.path().to_path_buf());
        let due = Utc::now() + Duration::days(2);
        {
            let local = LocalBackend::new(FileKeyValueStore::new(path.clone()).unwrap());
            let mut input = data("Persisted", TaskStatus::InProgress);
            input.due_date = due;
            local.create_task(&input, "u1").await.unwrap();
        }
        let local = LocalBackend::new(FileKeyValueStore::new(path).unwrap());
        let page = local.list_tasks("u1", &TaskFilters::default(), 1).await.unwrap();
        assert_eq!(page.tasks.len(), 1);
        assert_eq!(page.tasks[0].status, TaskStatus::InProgress);
        assert_eq!(page.tasks[0].due_date, due);
    }

    #[tokio::test]
    async fn test_signup_login_logout() {
        let (_, local) = backend();
        assert!(local.signup("ada@example.com", "").await.is_err());
        assert!(local.signup("ada@example.com", "12345").await.is_err());

        let user = local.signup("ada@example.com", "123456").await.unwrap();
        assert_eq!(user.display_name.as_deref(), Some("ada"));
        assert_eq!(local.current_user().await.unwrap(), Some(user));

        local.logout().await.unwrap();
        assert_eq!(local.current_user().await.unwrap(), None);

        // login only checks presence
        let user = local.login("grace@example.com", "x").await.unwrap();
        assert_eq!(user.email, "grace@example.com");
        assert!(local.login("", "x").await.is_err());
    }
}
