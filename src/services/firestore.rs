use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{with_bearer, StatusStore};
use crate::error::{PipelineError, Result};
use crate::models::StatusUpdate;

/// Fields stored as Firestore timestamps rather than strings
const TIMESTAMP_FIELDS: &[&str] = &["received_at", "finished_at"];

/// Configuration for the Firestore REST client
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub access_token: Option<String>,
    /// REST root, e.g. "https://firestore.googleapis.com/v1"
    pub api_url: String,
    pub database: String,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            project_id: project_id.into(),
            access_token,
            api_url: "https://firestore.googleapis.com/v1".to_string(),
            database: "(default)".to_string(),
        }
    }
}

/// Job status store backed by Firestore documents.
///
/// Each update is a PATCH with an `updateMask` naming exactly the fields it
/// carries, so untouched fields of the document are preserved.
pub struct FirestoreStatusStore {
    client: Client,
    config: FirestoreConfig,
}

impl FirestoreStatusStore {
    pub fn new(config: FirestoreConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn document_url(&self, reference: &str, field_names: &[&str]) -> Result<Url> {
        let segments = document_path(reference)?;

        let mut url = Url::parse(&self.config.api_url).map_err(|e| {
            PipelineError::persistence(format!("Invalid Firestore URL {}: {}", self.config.api_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| PipelineError::persistence("Firestore URL cannot be a base"))?
            .pop_if_empty()
            .extend([
                "projects",
                self.config.project_id.as_str(),
                "databases",
                self.config.database.as_str(),
                "documents",
            ])
            .extend(segments);

        {
            let mut query = url.query_pairs_mut();
            for name in field_names {
                query.append_pair("updateMask.fieldPaths", name);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl StatusStore for FirestoreStatusStore {
    async fn update(&self, reference: &str, update: &StatusUpdate) -> Result<()> {
        let field_names = update.field_names();
        let url = self.document_url(reference, &field_names)?;
        let body = json!({ "fields": encode_fields(update)? });

        let request = self.client.patch(url).json(&body);
        let response = with_bearer(request, self.config.access_token.as_deref())
            .send()
            .await
            .map_err(|e| PipelineError::persistence(format!("Firestore request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::persistence(format!(
                "Firestore error for {}: {} - {}",
                reference, status, body
            )));
        }

        debug!("Updated {} fields {:?}", reference, field_names);
        Ok(())
    }
}

/// Split `collection/document[/collection/document...]`
fn document_path(reference: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = reference.split('/').collect();
    if segments.len() < 2 || segments.len() % 2 != 0 || segments.iter().any(|s| s.is_empty()) {
        return Err(PipelineError::persistence(format!(
            "Invalid document reference {:?}, expected collection/document",
            reference
        )));
    }
    Ok(segments)
}

/// Encode an update as a Firestore `fields` map
fn encode_fields(update: &StatusUpdate) -> Result<Map<String, Value>> {
    let value = serde_json::to_value(update)
        .map_err(|e| PipelineError::persistence(format!("Failed to encode update: {}", e)))?;

    let Value::Object(object) = value else {
        return Err(PipelineError::persistence("Status update did not encode to an object"));
    };

    Ok(object
        .into_iter()
        .map(|(key, value)| {
            let encoded = match value {
                Value::String(ts) if TIMESTAMP_FIELDS.contains(&key.as_str()) => {
                    json!({ "timestampValue": ts })
                }
                other => encode_value(other),
            };
            (key, encoded)
        })
        .collect())
}

/// Map a JSON value onto Firestore's typed value representation
fn encode_value(value: Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // Firestore carries 64-bit integers as strings
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.into_iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(object) => {
            let fields: Map<String, Value> = object
                .into_iter()
                .map(|(k, v)| (k, encode_value(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}
