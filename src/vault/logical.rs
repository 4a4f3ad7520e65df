//! The logical API seam.
//!
//! Every resource talks to Vault through the [`Logical`] trait: plain
//! read/write/delete/list/patch calls against an API path relative to `/v1/`.
//! The HTTP implementation lives in [`crate::vault::client`]; an in-process
//! implementation for tests lives in [`crate::vault::memory`].

use crate::vault::VaultError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Vault's response envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub lease_id: String,
    #[serde(default)]
    pub lease_duration: i64,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
    #[serde(default)]
    pub auth: Option<Value>,
}

impl Secret {
    pub fn from_data(data: Map<String, Value>) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    /// The `data` object, or an empty map when Vault returned `null`.
    pub fn data(&self) -> Map<String, Value> {
        self.data.clone().unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// `auth.<key>` as a string, used by token-issuing endpoints.
    pub fn auth_str(&self, key: &str) -> Option<&str> {
        self.auth.as_ref().and_then(|a| a.get(key)).and_then(Value::as_str)
    }
}

#[async_trait]
pub trait Logical: Send + Sync {
    /// Reads `path`. A 404 from Vault yields `Ok(None)`.
    async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError>;

    /// Writes `data` to `path`. Endpoints answering 204 yield `Ok(None)`.
    async fn write(&self, path: &str, data: Value) -> Result<Option<Secret>, VaultError>;

    /// JSON merge-patch against `path`.
    async fn patch(&self, path: &str, data: Value) -> Result<Option<Secret>, VaultError>;

    async fn delete(&self, path: &str) -> Result<Option<Secret>, VaultError>;

    /// Lists keys under `path`. A 404 yields `Ok(None)`.
    async fn list(&self, path: &str) -> Result<Option<Secret>, VaultError>;

    /// A handle whose requests are scoped to `namespace`, nested under any
    /// namespace this handle already carries.
    fn with_namespace(&self, namespace: &str) -> Arc<dyn Logical>;
}

/// Joins a parent and child namespace the way Vault nests them.
pub fn join_namespace(parent: Option<&str>, child: &str) -> String {
    let child = child.trim_matches('/');
    match parent.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(parent) if !child.is_empty() => format!("{}/{}", parent, child),
        Some(parent) => parent.to_string(),
        None => child.to_string(),
    }
}

/// Extracts `data.keys` from a list response.
pub fn list_keys(secret: Option<&Secret>) -> Vec<String> {
    secret
        .and_then(|s| s.get("keys"))
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
