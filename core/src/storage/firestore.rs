//! Cloud Firestore (REST v1) document store and Firebase email/password
//! auth (Identity Toolkit REST v1).

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::{Result, TaskflowError};
use crate::model::user::display_name_from_email;
use crate::model::User;
use crate::storage::document::{
    auto_id, Direction, Document, DocumentStore, FieldFilter, FieldValue, Fields, FilterOp, Query,
};
use crate::storage::kv::KeyValueStore;
use crate::storage::traits::{AuthBackend, BackendKind};
use crate::time::{decode_timestamp, encode_timestamp};

pub const DEFAULT_FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com";
pub const DEFAULT_IDENTITY_ENDPOINT: &str = "https://identitytoolkit.googleapis.com";
pub const REMOTE_SESSION_KEY: &str = "taskflow_remote_session";

const COUNT_ALIAS: &str = "total";

#[derive(Clone)]
pub struct FirestoreStore {
    http: reqwest::Client,
    endpoint: String,
    database: String,
    id_token: Option<String>,
}

impl FirestoreStore {
    pub fn new(http: reqwest::Client, endpoint: &str, project_id: &str) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            database: format!("projects/{}/databases/(default)", project_id),
            id_token: None,
        }
    }

    /// Requests carry this token as a bearer credential.
    pub fn with_id_token(mut self, id_token: Option<String>) -> Self {
        self.id_token = id_token;
        self
    }

    fn documents_path(&self) -> String {
        format!("{}/documents", self.database)
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_path(), collection, id)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/v1/{}", self.endpoint, path);
        let builder = self.http.request(method, url);
        match &self.id_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn commit(&self, write: Value, missing: Option<&str>) -> Result<()> {
        let path = format!("{}:commit", self.documents_path());
        let body = json!({ "writes": [write] });
        send(self.request(Method::POST, &path).json(&body), missing).await?;
        Ok(())
    }

    fn write_for(&self, collection: &str, id: &str, fields: &Fields, exists: bool) -> Value {
        let (encoded, transforms) = encode_fields(fields);
        let mut write = json!({
            "update": {
                "name": self.document_name(collection, id),
                "fields": encoded,
            },
            "currentDocument": { "exists": exists },
        });
        if !transforms.is_empty() {
            write["updateTransforms"] = Value::Array(transforms);
        }
        write
    }
}

/// Sends a request and decodes the JSON body. A 404 is `NotFound(id)` only
/// when the call targets the single document `missing`; a missing project,
/// database or endpoint answers 404 too and means the remote cannot serve
/// the call, like every other failure.
async fn send(builder: RequestBuilder, missing: Option<&str>) -> Result<Value> {
    let response = builder.send().await?;
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        if let Some(id) = missing {
            return Err(TaskflowError::NotFound(id.to_string()));
        }
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TaskflowError::unavailable(format!(
            "firestore returned {}: {}",
            status, body
        )));
    }
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| TaskflowError::unavailable(format!("malformed firestore response: {}", e)))
}

fn encode_value(value: &FieldValue) -> Option<Value> {
    match value {
        FieldValue::String(s) => Some(json!({ "stringValue": s })),
        FieldValue::Timestamp(ts) => Some(json!({ "timestampValue": encode_timestamp(ts) })),
        FieldValue::ServerTimestamp => None,
    }
}

/// Splits fields into the encoded map and the server-side transforms.
fn encode_fields(fields: &Fields) -> (Map<String, Value>, Vec<Value>) {
    let mut encoded = Map::new();
    let mut transforms = Vec::new();
    for (name, value) in fields {
        match encode_value(value) {
            Some(v) => {
                encoded.insert(name.clone(), v);
            }
            None => transforms.push(json!({
                "fieldPath": name,
                "setToServerValue": "REQUEST_TIME",
            })),
        }
    }
    (encoded, transforms)
}

fn decode_value(value: &Value) -> Option<FieldValue> {
    if let Some(s) = value.get("stringValue").and_then(Value::as_str) {
        return Some(FieldValue::String(s.to_string()));
    }
    value
        .get("timestampValue")
        .and_then(Value::as_str)
        .and_then(|raw| decode_timestamp(raw).ok())
        .map(FieldValue::Timestamp)
}

fn decode_document(doc: &Value) -> Result<Document> {
    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| TaskflowError::unavailable("firestore document without a name"))?;
    let id = name.rsplit('/').next().unwrap_or(name).to_string();
    let fields = doc
        .get("fields")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| decode_value(v).map(|fv| (k.clone(), fv)))
                .collect()
        })
        .unwrap_or_default();
    Ok(Document { id, fields })
}

fn encode_filter(filter: &FieldFilter) -> Value {
    let op = match filter.op {
        FilterOp::Equal => "EQUAL",
        FilterOp::GreaterOrEqual => "GREATER_THAN_OR_EQUAL",
        FilterOp::LessOrEqual => "LESS_THAN_OR_EQUAL",
    };
    json!({
        "fieldFilter": {
            "field": { "fieldPath": filter.field },
            "op": op,
            "value": encode_value(&filter.value).unwrap_or(Value::Null),
        }
    })
}

fn structured_query(query: &Query, windowed: bool) -> Value {
    let mut sq = json!({ "from": [{ "collectionId": query.collection }] });
    match query.filters.as_slice() {
        [] => {}
        [single] => sq["where"] = encode_filter(single),
        many => {
            sq["where"] = json!({
                "compositeFilter": {
                    "op": "AND",
                    "filters": many.iter().map(encode_filter).collect::<Vec<_>>(),
                }
            })
        }
    }
    if let Some(order) = &query.order_by {
        let direction = match order.direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        sq["orderBy"] = json!([{ "field": { "fieldPath": order.field }, "direction": direction }]);
    }
    if windowed {
        if let Some(offset) = query.offset.filter(|o| *o > 0) {
            sq["offset"] = json!(offset);
        }
        if let Some(limit) = query.limit {
            sq["limit"] = json!(limit);
        }
    }
    sq
}

fn parse_count(body: &Value) -> Option<u64> {
    body.as_array()?.iter().find_map(|item| {
        let total = item.pointer(&format!("/result/aggregateFields/{}/integerValue", COUNT_ALIAS))?;
        match total {
            Value::String(s) => s.parse().ok(),
            other => other.as_u64(),
        }
    })
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn add(&self, collection: &str, fields: Fields) -> Result<String> {
        let id = auto_id();
        let write = self.write_for(collection, &id, &fields, false);
        self.commit(write, None).await?;
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let mut write = self.write_for(collection, id, &fields, true);
        let mask: Vec<&String> = fields
            .iter()
            .filter(|(_, v)| !matches!(v, FieldValue::ServerTimestamp))
            .map(|(k, _)| k)
            .collect();
        write["updateMask"] = json!({ "fieldPaths": mask });
        self.commit(write, Some(id)).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let path = self.document_name(collection, id);
        match send(self.request(Method::DELETE, &path), Some(id)).await {
            Ok(_) | Err(TaskflowError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Document>> {
        let path = format!("{}:runQuery", self.documents_path());
        let body = json!({ "structuredQuery": structured_query(query, true) });
        let response = send(self.request(Method::POST, &path).json(&body), None).await?;
        let items = response
            .as_array()
            .ok_or_else(|| TaskflowError::unavailable("runQuery response is not an array"))?;
        items
            .iter()
            .filter_map(|item| item.get("document"))
            .map(decode_document)
            .collect()
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        let path = format!("{}:runAggregationQuery", self.documents_path());
        let body = json!({
            "structuredAggregationQuery": {
                "structuredQuery": structured_query(query, false),
                "aggregations": [{ "alias": COUNT_ALIAS, "count": {} }],
            }
        });
        let response = send(self.request(Method::POST, &path).json(&body), None).await?;
        parse_count(&response)
            .ok_or_else(|| TaskflowError::unavailable("aggregation response without a count"))
    }
}

/// What is kept on the device for a remote login.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct RemoteSession {
    uid: String,
    email: String,
    display_name: Option<String>,
    id_token: String,
    refresh_token: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct IdentityResponse {
    local_id: String,
    email: String,
    id_token: String,
    refresh_token: Option<String>,
    display_name: Option<String>,
}

// Identity Toolkit error codes that mean "these credentials were refused".
const CREDENTIAL_ERRORS: &[&str] = &[
    "EMAIL_EXISTS",
    "EMAIL_NOT_FOUND",
    "INVALID_PASSWORD",
    "INVALID_LOGIN_CREDENTIALS",
    "INVALID_EMAIL",
    "MISSING_PASSWORD",
    "WEAK_PASSWORD",
    "USER_DISABLED",
];

pub struct FirebaseAuth<K: KeyValueStore> {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    sessions: K,
}

impl<K: KeyValueStore> FirebaseAuth<K> {
    pub fn new(http: reqwest::Client, endpoint: &str, api_key: &str, sessions: K) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            sessions,
        }
    }

    /// Bearer token of the persisted remote session, if any.
    pub fn id_token(&self) -> Result<Option<String>> {
        Ok(self.load_session()?.map(|s| s.id_token))
    }

    fn load_session(&self) -> Result<Option<RemoteSession>> {
        match self.sessions.get(REMOTE_SESSION_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    async fn authenticate(&self, action: &str, email: &str, password: &str) -> Result<User> {
        let url = format!("{}/v1/accounts:{}?key={}", self.endpoint, action, self.api_key);
        let body = json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });
        let response = self.http.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(identity_error(status, &body));
        }
        let identity: IdentityResponse = response
            .json()
            .await
            .map_err(|e| TaskflowError::unavailable(format!("malformed identity response: {}", e)))?;

        let display_name = identity
            .display_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| display_name_from_email(&identity.email));
        let session = RemoteSession {
            uid: identity.local_id,
            email: identity.email,
            display_name: Some(display_name),
            id_token: identity.id_token,
            refresh_token: identity.refresh_token,
        };
        self.sessions
            .set(REMOTE_SESSION_KEY, &serde_json::to_string(&session)?)?;
        info!(uid = %session.uid, action, "remote session established");

        Ok(User {
            uid: session.uid,
            email: session.email,
            display_name: session.display_name,
        })
    }
}

fn identity_error(status: StatusCode, body: &Value) -> TaskflowError {
    let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let code = message
        .split(|c: char| c == ' ' || c == ':')
        .next()
        .unwrap_or_default();
    if status == StatusCode::BAD_REQUEST && CREDENTIAL_ERRORS.contains(&code) {
        TaskflowError::validation(format!("credentials rejected: {}", message))
    } else {
        TaskflowError::unavailable(format!("identity service returned {}: {}", status, message))
    }
}

#[async_trait]
impl<K: KeyValueStore> AuthBackend for FirebaseAuth<K> {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn signup(&self, email: &str, password: &str) -> Result<User> {
        self.authenticate("signUp", email, password).await
    }

    async fn login(&self, email: &str, password: &str) -> Result<User> {
        self.authenticate("signInWithPassword", email, password).await
    }

    async fn logout(&self) -> Result<()> {
        debug!("clearing remote session");
        self.sessions.remove(REMOTE_SESSION_KEY)
    }

    // TODO: exchange the stored refresh token at securetoken.googleapis.com
    // once the id token has expired instead of letting the 401 downgrade.
    async fn current_user(&self) -> Result<Option<User>> {
        Ok(self.load_session()?.map(|s| User {
            uid: s.uid,
            email: s.email,
            display_name: s.display_name,
        }))
    }
}
