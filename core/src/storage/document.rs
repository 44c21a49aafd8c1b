//! Minimal document-database contract the remote adapter is written
//! against: collections of documents with string/timestamp fields, queries
//! with equality and range filters, one ordering, offset, limit and count.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::distr::{Alphanumeric, SampleString};

use crate::error::{Result, TaskflowError};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Timestamp(DateTime<Utc>),
    /// Replaced by the store's own clock when the write is applied.
    ServerTimestamp,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::String(a), FieldValue::String(b)) => Some(a.cmp(b)),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

pub type Fields = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    GreaterOrEqual,
    LessOrEqual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl FieldFilter {
    fn matches(&self, fields: &Fields) -> bool {
        let Some(actual) = fields.get(&self.field) else {
            return false;
        };
        match actual.compare(&self.value) {
            Some(ord) => match self.op {
                FilterOp::Equal => ord == Ordering::Equal,
                FilterOp::GreaterOrEqual => ord != Ordering::Less,
                FilterOp::LessOrEqual => ord != Ordering::Greater,
            },
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Query over one collection. Filters are conjunctive; only the filters
/// actually added are part of the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<OrderBy>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            offset: None,
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: FieldValue) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            op,
            value,
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates a document and returns its store-assigned id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String>;

    /// Merges `fields` into an existing document; `NotFound` if absent.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    /// Idempotent.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    async fn fetch(&self, query: &Query) -> Result<Vec<Document>>;

    /// Number of documents matching the query's filters; offset and limit
    /// are ignored.
    async fn count(&self, query: &Query) -> Result<u64>;
}

/// 20 random alphanumerics, the shape of remote auto-ids.
pub fn auto_id() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 20)
}

/// In-process document store. It stamps server timestamps from its own
/// clock, can be taken offline, and counts every call it receives.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Fields>>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with `BackendUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(TaskflowError::unavailable("document store is offline"));
        }
        Ok(())
    }

    fn matching(&self, query: &Query) -> Vec<Document> {
        let collections = self.collections.lock();
        let mut docs: Vec<Document> = collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| query.filters.iter().all(|f| f.matches(fields)))
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order_by {
            docs.sort_by(|a, b| {
                let ord = match (a.fields.get(&order.field), b.fields.get(&order.field)) {
                    (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        docs
    }
}

fn resolve_server_timestamps(fields: Fields, now: DateTime<Utc>) -> Fields {
    fields
        .into_iter()
        .map(|(k, v)| match v {
            FieldValue::ServerTimestamp => (k, FieldValue::Timestamp(now)),
            other => (k, other),
        })
        .collect()
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn add(&self, collection: &str, fields: Fields) -> Result<String> {
        self.enter()?;
        let id = auto_id();
        let fields = resolve_server_timestamps(fields, Utc::now());
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.enter()?;
        let fields = resolve_server_timestamps(fields, Utc::now());
        let mut collections = self.collections.lock();
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| TaskflowError::NotFound(id.to_string()))?;
        doc.extend(fields);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.enter()?;
        if let Some(docs) = self.collections.lock().get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Document>> {
        self.enter()?;
        let docs = self.matching(query);
        let skip = query.offset.unwrap_or(0);
        let take = query.limit.unwrap_or(usize::MAX);
        Ok(docs.into_iter().skip(skip).take(take).collect())
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        self.enter()?;
        Ok(self.matching(query).len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(user: &str, status: &str) -> Fields {
        let mut f = Fields::new();
        f.insert("userId".into(), FieldValue::String(user.into()));
        f.insert("status".into(), FieldValue::String(status.into()));
        f.insert("createdAt".into(), FieldValue::ServerTimestamp);
        f
    }

    #[tokio::test]
    async fn test_server_timestamps_are_resolved() {
        let store = MemoryDocumentStore::new();
        let id = store.add("tasks", fields("u1", "pending")).await.unwrap();
        assert_eq!(id.len(), 20);

        let docs = store.fetch(&Query::collection("tasks")).await.unwrap();
        assert!(docs[0].fields["createdAt"].as_timestamp().is_some());
    }

    #[tokio::test]
    async fn test_query_filters_order_and_window() {
        let store = MemoryDocumentStore::new();
        for status in ["pending", "completed", "completed", "completed"] {
            store.add("tasks", fields("u1", status)).await.unwrap();
        }
        store.add("tasks", fields("u2", "completed")).await.unwrap();

        let query = Query::collection("tasks")
            .filter("userId", FilterOp::Equal, FieldValue::String("u1".into()))
            .filter("status", FilterOp::Equal, FieldValue::String("completed".into()))
            .order_by("createdAt", Direction::Descending);

        assert_eq!(store.count(&query).await.unwrap(), 3);
        let window = store.fetch(&query.clone().offset(1).limit(5)).await.unwrap();
        assert_eq!(window.len(), 2);
        // count ignores the window
        assert_eq!(store.count(&query.limit(1)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let store = MemoryDocumentStore::new();
        let err = store.update("tasks", "nope", Fields::new()).await.unwrap_err();
        assert!(matches!(err, TaskflowError::NotFound(_)));
        // delete of the same id is fine
        store.delete("tasks", "nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_offline_store_fails_and_counts_calls() {
        let store = MemoryDocumentStore::new();
        store.set_offline(true);
        let err = store.fetch(&Query::collection("tasks")).await.unwrap_err();
        assert!(err.triggers_fallback());
        assert_eq!(store.calls(), 1);
    }
}
