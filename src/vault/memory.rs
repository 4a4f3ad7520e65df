//! In-process [`Logical`] backend.
//!
//! Stores objects in a map keyed by API path and imitates the handful of Vault
//! conventions the resources rely on: ID-minting collections (`identity/group`
//! → `identity/group/id/<id>`), mount tables (`sys/auth` lists every
//! `sys/auth/<path>`), `<path>/tune` writes folding into the mount's `config`,
//! and `sys/remount`. Writes to identity items merge into the stored object,
//! other writes replace it. Canned responses and injected failures cover the
//! rest.

use crate::vault::logical::{join_namespace, Logical, Secret};
use crate::vault::VaultError;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub op: &'static str,
    pub namespace: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone)]
struct Collection {
    create_path: String,
    item_prefix: String,
    id_field: String,
}

#[derive(Debug, Clone)]
struct InjectedError {
    status: u16,
    message: String,
}

#[derive(Default)]
struct Inner {
    store: BTreeMap<String, Map<String, Value>>,
    collections: Vec<Collection>,
    tables: Vec<String>,
    write_stubs: HashMap<String, Secret>,
    errors: HashMap<(String, String), InjectedError>,
    requests: Vec<RecordedRequest>,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
    namespace: Option<String>,
}

fn key(namespace: Option<&str>, path: &str) -> String {
    let path = path.trim_matches('/');
    match namespace {
        Some(ns) => format!("{}::{}", ns, path),
        None => path.to_string(),
    }
}

fn as_object(data: Value) -> Map<String, Value> {
    match data {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend pre-loaded with the identity, MFA and mount conventions.
    pub fn with_vault_conventions() -> Self {
        let backend = Self::new();
        backend.register_collection("identity/group", "identity/group/id", "id");
        backend.register_collection("identity/entity", "identity/entity/id", "id");
        backend.register_collection(
            "identity/mfa/method/totp",
            "identity/mfa/method/totp",
            "method_id",
        );
        backend.register_table("sys/auth");
        backend.register_table("sys/mounts");
        backend
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes to `create_path` mint a UUID stored under `item_prefix/<uuid>`.
    pub fn register_collection(&self, create_path: &str, item_prefix: &str, id_field: &str) {
        self.lock().collections.push(Collection {
            create_path: create_path.trim_matches('/').to_string(),
            item_prefix: item_prefix.trim_matches('/').to_string(),
            id_field: id_field.to_string(),
        });
    }

    /// Reads of `path` return every direct child keyed as `<child>/`.
    pub fn register_table(&self, path: &str) {
        self.lock().tables.push(path.trim_matches('/').to_string());
    }

    /// Canned `data` returned by writes to `path`.
    pub fn stub_write(&self, path: &str, data: Value) {
        let key = key(self.namespace.as_deref(), path);
        self.lock()
            .write_stubs
            .insert(key, Secret::from_data(as_object(data)));
    }

    /// Canned `auth` block returned by writes to `path`, as token-issuing
    /// endpoints answer.
    pub fn stub_auth(&self, path: &str, auth: Value) {
        let key = key(self.namespace.as_deref(), path);
        let secret = Secret {
            auth: Some(auth),
            ..Default::default()
        };
        self.lock().write_stubs.insert(key, secret);
    }

    /// Makes every `op` ("read", "write", "delete", "list", "patch") against
    /// `path` fail with the given status and message.
    pub fn fail(&self, op: &str, path: &str, status: u16, message: &str) {
        let key = key(self.namespace.as_deref(), path);
        self.lock().errors.insert(
            (op.to_string(), key),
            InjectedError {
                status,
                message: message.to_string(),
            },
        );
    }

    pub fn clear_failures(&self) {
        self.lock().errors.clear();
    }

    /// Seeds an object directly, bypassing the request log.
    pub fn put(&self, path: &str, data: Value) {
        let key = key(self.namespace.as_deref(), path);
        self.lock().store.insert(key, as_object(data));
    }

    /// The stored object at `path`, if any.
    pub fn get(&self, path: &str) -> Option<Map<String, Value>> {
        let key = key(self.namespace.as_deref(), path);
        self.lock().store.get(&key).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Deletes an object behind the provider's back.
    pub fn remove(&self, path: &str) -> Option<Map<String, Value>> {
        let key = key(self.namespace.as_deref(), path);
        self.lock().store.remove(&key)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn count_requests(&self, op: &str, path: &str) -> usize {
        let path = path.trim_matches('/');
        self.lock()
            .requests
            .iter()
            .filter(|r| r.op == op && r.path == path)
            .count()
    }

    fn begin(&self, op: &'static str, path: &str) -> Result<String, VaultError> {
        let path = path.trim_matches('/').to_string();
        let mut inner = self.lock();
        inner.requests.push(RecordedRequest {
            op,
            namespace: self.namespace.clone(),
            path: path.clone(),
        });
        let k = key(self.namespace.as_deref(), &path);
        if let Some(err) = inner.errors.get(&(op.to_string(), k)) {
            return Err(VaultError::Response {
                method: op.to_uppercase(),
                path,
                status: err.status,
                errors: vec![err.message.clone()],
            });
        }
        Ok(path)
    }

    fn read_path(&self, path: &str) -> Option<Secret> {
        let ns = self.namespace.as_deref();
        let inner = self.lock();
        if let Some(obj) = inner.store.get(&key(ns, path)) {
            return Some(Secret::from_data(obj.clone()));
        }
        if inner.tables.iter().any(|t| t == path) {
            let prefix = format!("{}/", key(ns, path));
            let mut table = Map::new();
            for (k, v) in inner.store.range(prefix.clone()..) {
                let Some(rest) = k.strip_prefix(&prefix) else {
                    break;
                };
                if rest.ends_with("/tune") {
                    continue;
                }
                table.insert(format!("{}/", rest), Value::Object(v.clone()));
            }
            return Some(Secret::from_data(table));
        }
        None
    }

    fn write_path(&self, path: &str, data: Value, merge: bool) -> Option<Secret> {
        let ns = self.namespace.as_deref();
        let mut inner = self.lock();
        let data = as_object(data);

        if let Some(stub) = inner.write_stubs.get(&key(ns, path)).cloned() {
            return Some(stub);
        }

        if path == "sys/remount" {
            let from = data.get("from").and_then(Value::as_str).unwrap_or_default();
            let to = data.get("to").and_then(Value::as_str).unwrap_or_default();
            let (from_key, to_key) = match (from.strip_prefix("auth/"), to.strip_prefix("auth/")) {
                (Some(f), Some(t)) => (format!("sys/auth/{}", f), format!("sys/auth/{}", t)),
                _ => (format!("sys/mounts/{}", from), format!("sys/mounts/{}", to)),
            };
            if let Some(obj) = inner.store.remove(&key(ns, from_key.trim_matches('/'))) {
                inner.store.insert(key(ns, to_key.trim_matches('/')), obj);
            }
            return Some(Secret::from_data(
                json!({"migration_id": Uuid::new_v4().to_string()})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            ));
        }

        if let Some(mount) = path.strip_suffix("/tune") {
            if let Some(obj) = inner.store.get_mut(&key(ns, mount)) {
                let mut config = obj
                    .get("config")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                for (k, v) in data {
                    if matches!(k.as_str(), "description" | "options" | "plugin_version") {
                        obj.insert(k, v);
                    } else {
                        config.insert(k, v);
                    }
                }
                obj.insert("config".to_string(), Value::Object(config));
            }
            return None;
        }

        let collection = inner
            .collections
            .iter()
            .find(|c| c.create_path == path)
            .cloned();
        if let Some(c) = collection {
            let id = Uuid::new_v4().to_string();
            let mut obj = data;
            obj.insert(c.id_field.clone(), Value::String(id.clone()));
            let mut response = Map::new();
            response.insert(c.id_field.clone(), Value::String(id.clone()));
            if let Some(name) = obj.get("name") {
                response.insert("name".to_string(), name.clone());
            }
            inner
                .store
                .insert(key(ns, &format!("{}/{}", c.item_prefix, id)), obj);
            return Some(Secret::from_data(response));
        }

        let merge = merge
            || inner
                .collections
                .iter()
                .any(|c| path.starts_with(&format!("{}/", c.item_prefix)));
        let k = key(ns, path);
        match inner.store.get_mut(&k) {
            Some(existing) if merge => {
                for (field, value) in data {
                    existing.insert(field, value);
                }
            }
            _ => {
                inner.store.insert(k, data);
            }
        }
        None
    }
}

#[async_trait]
impl Logical for MemoryBackend {
    async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        let path = self.begin("read", path)?;
        Ok(self.read_path(&path))
    }

    async fn write(&self, path: &str, data: Value) -> Result<Option<Secret>, VaultError> {
        let path = self.begin("write", path)?;
        Ok(self.write_path(&path, data, false))
    }

    async fn patch(&self, path: &str, data: Value) -> Result<Option<Secret>, VaultError> {
        let path = self.begin("patch", path)?;
        if self.get(&path).is_none() {
            return Err(VaultError::Response {
                method: "PATCH".to_string(),
                path,
                status: 404,
                errors: vec![],
            });
        }
        Ok(self.write_path(&path, data, true))
    }

    async fn delete(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        let path = self.begin("delete", path)?;
        let k = key(self.namespace.as_deref(), &path);
        self.lock().store.remove(&k);
        Ok(None)
    }

    async fn list(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        let path = self.begin("list", path)?;
        let prefix = format!("{}/", key(self.namespace.as_deref(), &path));
        let inner = self.lock();
        let mut keys: Vec<String> = Vec::new();
        for k in inner.store.keys() {
            let Some(rest) = k.strip_prefix(&prefix) else {
                continue;
            };
            let entry = match rest.split_once('/') {
                Some((dir, _)) => format!("{}/", dir),
                None => rest.to_string(),
            };
            if !keys.contains(&entry) {
                keys.push(entry);
            }
        }
        if keys.is_empty() {
            return Ok(None);
        }
        Ok(Some(Secret::from_data(
            json!({ "keys": keys }).as_object().cloned().unwrap_or_default(),
        )))
    }

    fn with_namespace(&self, namespace: &str) -> Arc<dyn Logical> {
        Arc::new(Self {
            inner: Arc::clone(&self.inner),
            namespace: Some(join_namespace(self.namespace.as_deref(), namespace)),
        })
    }
}
