//! Remote backend: tasks are documents in the `tasks` collection of a
//! [`DocumentStore`]. Ids and `createdAt`/`updatedAt` come from the store.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, TaskflowError};
use crate::model::{
    CreateTaskData, PaginationInfo, Task, TaskFilters, TaskPage, TaskStatus, UpdateTaskData,
};
use crate::pagination::{normalize_page, page_offset, TASKS_PER_PAGE};
use crate::storage::document::{Direction, Document, DocumentStore, FieldValue, Fields, FilterOp, Query};
use crate::storage::traits::{BackendKind, TaskBackend};

pub const TASKS_COLLECTION: &str = "tasks";

const TITLE: &str = "title";
const DESCRIPTION: &str = "description";
const STATUS: &str = "status";
const DUE_DATE: &str = "dueDate";
const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";
const USER_ID: &str = "userId";

pub struct RemoteBackend<D: DocumentStore> {
    store: D,
}

impl<D: DocumentStore> RemoteBackend<D> {
    pub fn new(store: D) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    fn base_query(user_id: &str, filters: &TaskFilters) -> Query {
        let mut query = Query::collection(TASKS_COLLECTION)
            .filter(USER_ID, FilterOp::Equal, FieldValue::String(user_id.to_string()))
            .order_by(CREATED_AT, Direction::Descending);

        if let Some(status) = filters.status {
            query = query.filter(STATUS, FilterOp::Equal, FieldValue::String(status.to_string()));
        }
        if let Some(start) = filters.due_date_start {
            query = query.filter(DUE_DATE, FilterOp::GreaterOrEqual, FieldValue::Timestamp(start));
        }
        if let Some(end) = filters.due_date_end {
            query = query.filter(DUE_DATE, FilterOp::LessOrEqual, FieldValue::Timestamp(end));
        }
        query
    }
}

fn string_field(doc: &Document, name: &str) -> Result<String> {
    doc.fields
        .get(name)
        .and_then(FieldValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| malformed(doc, name))
}

fn timestamp_field(doc: &Document, name: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    doc.fields
        .get(name)
        .and_then(FieldValue::as_timestamp)
        .ok_or_else(|| malformed(doc, name))
}

fn malformed(doc: &Document, field: &str) -> TaskflowError {
    TaskflowError::unavailable(format!(
        "malformed document {}: missing or mistyped '{}'",
        doc.id, field
    ))
}

/// Normalizes a stored document into a [`Task`]. Shape problems are remote
/// failures, not local corruption.
fn task_from_document(doc: &Document) -> Result<Task> {
    let status: TaskStatus = string_field(doc, STATUS)?
        .parse()
        .map_err(|_| malformed(doc, STATUS))?;
    Ok(Task {
        id: doc.id.clone(),
        title: string_field(doc, TITLE)?,
        description: doc
            .fields
            .get(DESCRIPTION)
            .and_then(FieldValue::as_str)
            .unwrap_or_default()
            .to_string(),
        status,
        due_date: timestamp_field(doc, DUE_DATE)?,
        created_at: timestamp_field(doc, CREATED_AT)?,
        updated_at: timestamp_field(doc, UPDATED_AT)?,
        user_id: string_field(doc, USER_ID)?,
    })
}

#[async_trait]
impl<D: DocumentStore> TaskBackend for RemoteBackend<D> {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn create_task(&self, data: &CreateTaskData, user_id: &str) -> Result<String> {
        let mut fields = Fields::new();
        fields.insert(TITLE.into(), FieldValue::String(data.title.clone()));
        fields.insert(DESCRIPTION.into(), FieldValue::String(data.description.clone()));
        fields.insert(STATUS.into(), FieldValue::String(data.status.to_string()));
        fields.insert(DUE_DATE.into(), FieldValue::Timestamp(data.due_date));
        fields.insert(USER_ID.into(), FieldValue::String(user_id.to_string()));
        fields.insert(CREATED_AT.into(), FieldValue::ServerTimestamp);
        fields.insert(UPDATED_AT.into(), FieldValue::ServerTimestamp);

        let id = self.store.add(TASKS_COLLECTION, fields).await?;
        debug!(id = %id, "created remote task");
        Ok(id)
    }

    async fn list_tasks(&self, user_id: &str, filters: &TaskFilters, page: u32) -> Result<TaskPage> {
        let page = normalize_page(page);
        let query = Self::base_query(user_id, filters);
        let total_tasks = self.store.count(&query).await?;
        let pagination = PaginationInfo::new(page, total_tasks, TASKS_PER_PAGE);

        let offset = page_offset(page);
        if offset as u64 >= total_tasks {
            return Ok(TaskPage {
                tasks: Vec::new(),
                pagination,
            });
        }

        let window = query.offset(offset).limit(TASKS_PER_PAGE as usize);
        let tasks = self
            .store
            .fetch(&window)
            .await?
            .iter()
            .map(task_from_document)
            .collect::<Result<Vec<_>>>()?;

        Ok(TaskPage { tasks, pagination })
    }

    async fn update_task(&self, update: &UpdateTaskData) -> Result<()> {
        let mut fields = Fields::new();
        if let Some(title) = &update.title {
            fields.insert(TITLE.into(), FieldValue::String(title.clone()));
        }
        if let Some(description) = &update.description {
            fields.insert(DESCRIPTION.into(), FieldValue::String(description.clone()));
        }
        if let Some(status) = update.status {
            fields.insert(STATUS.into(), FieldValue::String(status.to_string()));
        }
        if let Some(due_date) = update.due_date {
            fields.insert(DUE_DATE.into(), FieldValue::Timestamp(due_date));
        }
        fields.insert(UPDATED_AT.into(), FieldValue::ServerTimestamp);

        self.store.update(TASKS_COLLECTION, &update.id, fields).await
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        self.store.delete(TASKS_COLLECTION, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::document::MemoryDocumentStore;
    use chrono::{Duration, TimeZone, Utc};

    fn data(title: &str, status: TaskStatus, due_days: i64) -> CreateTaskData {
        CreateTaskData {
            title: title.to_string(),
            description: String::new(),
            status,
            due_date: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap() + Duration::days(due_days),
        }
    }

    #[test]
    fn test_absent_filters_are_omitted_from_query() {
        let query = RemoteBackend::<MemoryDocumentStore>::base_query("u1", &TaskFilters::default());
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters[0].field, USER_ID);

        let filters = TaskFilters {
            status: Some(TaskStatus::Completed),
            due_date_end: Some(Utc::now()),
            ..Default::default()
        };
        let query = RemoteBackend::<MemoryDocumentStore>::base_query("u1", &filters);
        let fields: Vec<&str> = query.filters.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec![USER_ID, STATUS, DUE_DATE]);
        assert_eq!(query.filters[2].op, FilterOp::LessOrEqual);
    }

    #[tokio::test]
    async fn test_create_stamps_server_timestamps() {
        let remote = RemoteBackend::new(MemoryDocumentStore::new());
        let input = data("Plan trip", TaskStatus::Pending, 3);
        let id = remote.create_task(&input, "u1").await.unwrap();

        let page = remote.list_tasks("u1", &TaskFilters::default(), 1).await.unwrap();
        let task = &page.tasks[0];
        assert_eq!(task.id, id);
        assert_eq!(task.due_date, input.due_date);
        assert_eq!(task.created_at, task.updated_at);
    }

    #[tokio::test]
    async fn test_second_page_is_offset() {
        let remote = RemoteBackend::new(MemoryDocumentStore::new());
        for i in 0..7 {
            remote
                .create_task(&data(&format!("Task {}", i), TaskStatus::Pending, i), "u1")
                .await
                .unwrap();
        }
        let first = remote.list_tasks("u1", &TaskFilters::default(), 1).await.unwrap();
        let second = remote.list_tasks("u1", &TaskFilters::default(), 2).await.unwrap();
        assert_eq!(first.tasks.len(), 6);
        assert_eq!(second.tasks.len(), 1);
        assert_eq!(second.pagination.total_pages, 2);
        assert!(first.tasks.iter().all(|t| t.id != second.tasks[0].id));
    }

    #[tokio::test]
    async fn test_page_past_the_end_skips_the_fetch() {
        let remote = RemoteBackend::new(MemoryDocumentStore::new());
        remote
            .create_task(&data("Only one", TaskStatus::Pending, 1), "u1")
            .await
            .unwrap();
        let calls = remote.store().calls();

        let page = remote.list_tasks("u1", &TaskFilters::default(), u32::MAX).await.unwrap();
        assert!(page.tasks.is_empty());
        assert_eq!(page.pagination.total_tasks, 1);
        assert!(!page.pagination.has_next_page);
        // count only
        assert_eq!(remote.store().calls(), calls + 1);
    }

    #[tokio::test]
    async fn test_update_missing_task_is_not_found() {
        let remote = RemoteBackend::new(MemoryDocumentStore::new());
        let err = remote
            .update_task(&UpdateTaskData::new("ghost").with_status(TaskStatus::Completed))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskflowError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_malformed_document_is_a_remote_failure() {
        let store = MemoryDocumentStore::new();
        let mut fields = Fields::new();
        fields.insert(USER_ID.into(), FieldValue::String("u1".into()));
        fields.insert(CREATED_AT.into(), FieldValue::ServerTimestamp);
        store.add(TASKS_COLLECTION, fields).await.unwrap();

        let remote = RemoteBackend::new(store);
        let err = remote.list_tasks("u1", &TaskFilters::default(), 1).await.unwrap_err();
        assert!(err.triggers_fallback());
    }
}
