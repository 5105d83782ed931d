use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, error};

use crate::constants::FIRESTORE_API_BASE;
use super::traits::{Document, FieldValue, Fields, PresenceStore};

/// Presence store backed by the Firestore REST API.
///
/// Plain values go into the document body; array unions and server
/// timestamps are sent as field transforms on the same write so they apply
/// atomically with it.
#[derive(Debug, Clone)]
pub struct FirestorePresenceStore {
    client: Client,
    project_id: String,
    access_token: String,
    base_url: String,
}

impl FirestorePresenceStore {
    pub fn new(project_id: String, access_token: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            project_id,
            access_token,
            base_url: FIRESTORE_API_BASE.to_string(),
        })
    }

    fn database_root(&self) -> String {
        format!("projects/{}/databases/(default)/documents", self.project_id)
    }

    fn document_name(&self, path: &str) -> String {
        format!("{}/{}", self.database_root(), path.trim_matches('/'))
    }

    async fn commit(&self, write: Value) -> Result<()> {
        let url = format!("{}/{}:commit", self.base_url, self.database_root());
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "writes": [write] }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Firestore commit failed {}: {}", status, body);
            anyhow::bail!("Firestore commit error {}: {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl PresenceStore for FirestorePresenceStore {
    async fn get(&self, path: &str) -> Result<Option<Document>> {
        let url = format!("{}/{}", self.base_url, self.document_name(path));
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Presence document {} does not exist", path);
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Firestore get error {}: {}", status, body);
        }

        let body: Value = response.json().await?;
        Ok(Some(decode_fields(body.get("fields"))))
    }

    async fn set(&self, path: &str, fields: Fields) -> Result<()> {
        self.commit(build_write(&self.document_name(path), &fields, false))
            .await
    }

    async fn update(&self, path: &str, fields: Fields) -> Result<()> {
        self.commit(build_write(&self.document_name(path), &fields, true))
            .await
    }
}

/// Stand-in when no presence backend is configured. Every call fails, so
/// matches keep `presence_synced_at` unset until the reconciler runs against
/// a configured store.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredPresenceStore;

#[async_trait]
impl PresenceStore for UnconfiguredPresenceStore {
    async fn get(&self, path: &str) -> Result<Option<Document>> {
        anyhow::bail!("presence store not configured, cannot read {}", path)
    }

    async fn set(&self, path: &str, _fields: Fields) -> Result<()> {
        anyhow::bail!("presence store not configured, cannot write {}", path)
    }

    async fn update(&self, path: &str, _fields: Fields) -> Result<()> {
        anyhow::bail!("presence store not configured, cannot write {}", path)
    }
}

/// Build a single Firestore `Write`. A merge write only touches the listed
/// fields and requires the document to exist.
pub(crate) fn build_write(name: &str, fields: &Fields, merge: bool) -> Value {
    let mut static_fields = Map::new();
    let mut transforms = Vec::new();

    for (key, value) in fields {
        match value {
            FieldValue::Value(v) => {
                static_fields.insert(key.clone(), encode_value(v));
            }
            FieldValue::ArrayUnion(items) => transforms.push(json!({
                "fieldPath": key,
                "appendMissingElements": { "values": items.iter().map(encode_value).collect::<Vec<_>>() },
            })),
            FieldValue::ServerTimestamp => transforms.push(json!({
                "fieldPath": key,
                "setToServerValue": "REQUEST_TIME",
            })),
        }
    }

    let mask: Vec<String> = static_fields.keys().cloned().collect();
    let mut write = json!({
        "update": { "name": name, "fields": Value::Object(static_fields) },
    });
    if !transforms.is_empty() {
        write["updateTransforms"] = Value::Array(transforms);
    }
    if merge {
        write["updateMask"] = json!({ "fieldPaths": mask });
        write["currentDocument"] = json!({ "exists": true });
    }
    write
}

/// JSON value -> Firestore typed value.
pub(crate) fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => {
            let fields: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

/// Firestore typed value -> JSON value. Timestamps and references come back
/// as strings.
pub(crate) fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|obj| obj.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => inner.clone(),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| inner.clone()),
        "doubleValue" => inner.clone(),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(decode_fields(inner.get("fields"))),
        other => {
            debug!("Unhandled Firestore value kind {}", other);
            inner.clone()
        }
    }
}

fn decode_fields(fields: Option<&Value>) -> Document {
    fields
        .and_then(Value::as_object)
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), decode_value(v))).collect())
        .unwrap_or_default()
}
