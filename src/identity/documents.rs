//! Role store backed by a document database REST API.
//!
//! Documents live at `{base}/{collection}/{uid}` and carry string fields only. Requests
//! authenticate with the bearer token of whoever is currently signed in, read from the auth
//! stream at call time.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::provider::AuthStream;
use super::store::RoleStore;
use crate::error::{AppError, AppResult};
use crate::model::RoleRecord;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    name: String,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    #[serde(default)]
    document: Option<Document>,
}

/// Encode a record as `{"fields": {name: {"stringValue": v}}}`. Absent optionals are omitted.
fn encode(record: &RoleRecord) -> Value {
    let mut fields = serde_json::Map::new();
    let mut put = |k: &str, v: &str| {
        fields.insert(k.to_string(), json!({ "stringValue": v }));
    };
    put("username", &record.username);
    put("email", &record.email);
    put("first_name", &record.first_name);
    put("last_name", &record.last_name);
    if let Some(role) = &record.role {
        put("role", role);
    }
    if let Some(token) = &record.id_token {
        put("idToken", token);
    }
    json!({ "fields": fields })
}

fn decode(doc: &Document) -> RoleRecord {
    let text = |k: &str| -> Option<String> {
        doc.fields.get(k).and_then(|v| v.get("stringValue")).and_then(Value::as_str).map(str::to_string)
    };
    RoleRecord {
        username: text("username").unwrap_or_default(),
        email: text("email").unwrap_or_default(),
        first_name: text("first_name").unwrap_or_default(),
        last_name: text("last_name").unwrap_or_default(),
        role: text("role"),
        id_token: text("idToken"),
    }
}

/// Document key is the last path segment of the resource name.
fn doc_id(name: &str) -> &str { name.rsplit('/').next().unwrap_or(name) }

pub struct DocumentRoleStore {
    client: Client,
    base: String,
    collection: String,
    tokens: AuthStream,
}

impl DocumentRoleStore {
    /// `base` is the documents root, e.g. `.../projects/{project}/databases/(default)/documents`.
    pub fn new(client: Client, base: &str, collection: &str, tokens: AuthStream) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            tokens,
        }
    }

    fn doc_url(&self, uid: &str) -> String { format!("{}/{}/{}", self.base, self.collection, uid) }

    fn bearer(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self.tokens.borrow().as_ref().map(|p| p.id_token.clone()).filter(|t| !t.is_empty());
        match token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn fail(resp: reqwest::Response, what: &str) -> AppError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        debug!(target: "ispdesk::roles", "{} failed status={} body={}", what, status, body);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                AppError::forbidden("role_store_denied", format!("Role store refused {}", what))
            }
            _ => AppError::backend(status.as_u16(), format!("Role store {} failed", what)),
        }
    }
}

#[async_trait]
impl RoleStore for DocumentRoleStore {
    async fn get(&self, uid: &str) -> AppResult<Option<RoleRecord>> {
        let resp = self.bearer(self.client.get(self.doc_url(uid))).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "read").await);
        }
        let doc: Document = resp.json().await?;
        Ok(Some(decode(&doc)))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<(String, RoleRecord)>> {
        let query = json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.collection }],
                "where": { "fieldFilter": {
                    "field": { "fieldPath": "email" },
                    "op": "EQUAL",
                    "value": { "stringValue": email }
                }},
                "limit": 1
            }
        });
        let url = format!("{}:runQuery", self.base);
        let resp = self.bearer(self.client.post(url)).json(&query).send().await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "query").await);
        }
        let rows: Vec<QueryRow> = resp.json().await?;
        Ok(rows
            .into_iter()
            .find_map(|r| r.document)
            .map(|d| (doc_id(&d.name).to_string(), decode(&d))))
    }

    async fn put(&self, uid: &str, record: &RoleRecord) -> AppResult<()> {
        let resp = self.bearer(self.client.patch(self.doc_url(uid))).json(&encode(record)).send().await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "write").await);
        }
        debug!(target: "ispdesk::roles", "role document written uid={}", uid);
        Ok(())
    }

    async fn delete(&self, uid: &str) -> AppResult<()> {
        let resp = self.bearer(self.client.delete(self.doc_url(uid))).send().await?;
        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::fail(resp, "delete").await)
    }
}
