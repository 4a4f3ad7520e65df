//! `vault_generic_secret` resource and data source.
//!
//! Writes arbitrary JSON to a path. KV version 2 mounts are detected through
//! `sys/internal/ui/mounts/<path>`; for those the payload is wrapped in
//! `{"data": ...}` and sent to `<mount>data/<rest>`.

use crate::provider::error::on;
use crate::provider::{
    DataSource, Field, ProviderError, ProviderMeta, Resource, ResourceData, Schema, Validator,
};
use crate::resources::util::mark_gone;
use crate::vault::Logical;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

pub struct GenericSecretResource;
pub struct GenericSecretDataSource;

/// Where a logical secret path lives once the mount type is known.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct KvPath {
    pub mount: String,
    pub rest: String,
    pub v2: bool,
}

impl KvPath {
    fn v1(path: &str) -> Self {
        Self {
            mount: String::new(),
            rest: path.to_string(),
            v2: false,
        }
    }

    pub fn data_path(&self) -> String {
        if self.v2 {
            format!("{}data/{}", self.mount, self.rest)
        } else {
            self.rest.clone()
        }
    }

    pub fn metadata_path(&self) -> String {
        if self.v2 {
            format!("{}metadata/{}", self.mount, self.rest)
        } else {
            self.rest.clone()
        }
    }
}

/// Asks Vault which mount `path` belongs to. Tokens without access to the
/// internal endpoint fall back to KV version 1 semantics.
pub(crate) async fn resolve_kv_path(client: &dyn Logical, path: &str) -> KvPath {
    let path = path.trim_matches('/');
    let probe = format!("sys/internal/ui/mounts/{}", path);
    let secret = match client.read(&probe).await {
        Ok(Some(secret)) => secret,
        Ok(None) => return KvPath::v1(path),
        Err(e) => {
            debug!("Could not determine mount of {}: {}", path, e);
            return KvPath::v1(path);
        }
    };

    let version = secret
        .get("options")
        .and_then(|o| o.get("version"))
        .and_then(Value::as_str)
        .unwrap_or("1");
    let mount = secret.get_str("path").unwrap_or_default().to_string();
    if version != "2" || mount.is_empty() {
        return KvPath::v1(path);
    }
    let rest = path
        .strip_prefix(mount.as_str())
        .or_else(|| path.strip_prefix(mount.trim_end_matches('/')))
        .unwrap_or(path)
        .trim_start_matches('/')
        .to_string();
    KvPath {
        mount,
        rest,
        v2: true,
    }
}

/// Reads the secret's payload, unwrapping the KV v2 envelope.
async fn read_payload(
    client: &dyn Logical,
    kv: &KvPath,
) -> Result<Option<(Map<String, Value>, crate::vault::Secret)>, ProviderError> {
    let path = kv.data_path();
    let Some(secret) = client.read(&path).await.map_err(on(&path))? else {
        return Ok(None);
    };
    let data = if kv.v2 {
        match secret.get("data") {
            Some(Value::Object(inner)) => inner.clone(),
            // Latest version deleted or destroyed.
            _ => return Ok(None),
        }
    } else {
        secret.data()
    };
    Ok(Some((data, secret)))
}

/// Flattens `data` into a map of strings; non-string values are encoded as JSON.
fn string_map(data: &Map<String, Value>) -> Map<String, Value> {
    data.iter()
        .map(|(k, v)| {
            let s = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), Value::String(s))
        })
        .collect()
}

fn parse_data_json(d: &ResourceData) -> Result<Map<String, Value>, ProviderError> {
    let raw = d.get_string("data_json");
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(ProviderError::Validation(vec![
            "data_json: must be a JSON object".to_string(),
        ])),
    }
}

#[async_trait]
impl Resource for GenericSecretResource {
    fn type_name(&self) -> &'static str {
        "vault_generic_secret"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("Arbitrary secret data written to a path.")
            .field(
                "path",
                Field::string()
                    .required()
                    .force_new()
                    .validate(Validator::NoLeadingTrailingSlashes)
                    .description("Full path where the generic secret will be written."),
            )
            .field(
                "data_json",
                Field::string()
                    .required()
                    .sensitive()
                    .validate(Validator::JsonObject)
                    .description("JSON-encoded secret data to write."),
            )
            .field(
                "disable_read",
                Field::bool()
                    .optional()
                    .default(false)
                    .description("Don't read the secret back; drift goes undetected."),
            )
            .field(
                "delete_all_versions",
                Field::bool()
                    .optional()
                    .default(false)
                    .description("On KV v2 mounts, delete every version and the metadata."),
            )
            .field("data", Field::map().computed().sensitive())
            .namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.get_string("path");
        let client = meta.client_for(d);
        let payload = parse_data_json(d)?;
        let kv = resolve_kv_path(client.as_ref(), &path).await;

        let body = if kv.v2 {
            json!({ "data": payload })
        } else {
            Value::Object(payload.clone())
        };
        let api_path = kv.data_path();
        debug!("Writing generic secret to {}", api_path);
        client.write(&api_path, body).await.map_err(on(&api_path))?;

        d.set_id(path);
        d.set("data", string_map(&payload));
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.id().to_string();
        d.set("path", path.clone());
        if d.get_bool("disable_read").unwrap_or(false) {
            debug!("Skipping read of {}: disable_read is set", path);
            return Ok(());
        }

        let client = meta.client_for(d);
        let kv = resolve_kv_path(client.as_ref(), &path).await;
        let Some((data, _)) = read_payload(client.as_ref(), &kv).await? else {
            mark_gone(d, &kv.data_path());
            return Ok(());
        };

        // Keep the configured text when it decodes to the same object, so
        // formatting differences don't show up as drift.
        let unchanged = serde_json::from_str::<Value>(&d.get_string("data_json"))
            .ok()
            .is_some_and(|known| known == Value::Object(data.clone()));
        if !unchanged {
            if d.get("data_json").is_some() {
                warn!("Secret at {} changed outside of terravault", path);
            }
            d.set("data_json", Value::Object(data.clone()).to_string());
        }
        d.set("data", string_map(&data));
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        if d.has_change("data_json") {
            let client = meta.client_for(d);
            let payload = parse_data_json(d)?;
            let kv = resolve_kv_path(client.as_ref(), d.id()).await;
            let body = if kv.v2 {
                json!({ "data": payload })
            } else {
                Value::Object(payload.clone())
            };
            let api_path = kv.data_path();
            client.write(&api_path, body).await.map_err(on(&api_path))?;
            d.set("data", string_map(&payload));
        }
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = meta.client_for(d);
        let kv = resolve_kv_path(client.as_ref(), d.id()).await;
        let api_path = if kv.v2 && d.get_bool("delete_all_versions").unwrap_or(false) {
            kv.metadata_path()
        } else {
            kv.data_path()
        };
        debug!("Deleting generic secret at {}", api_path);
        client.delete(&api_path).await.map_err(on(&api_path))?;
        Ok(())
    }
}

#[async_trait]
impl DataSource for GenericSecretDataSource {
    fn type_name(&self) -> &'static str {
        "vault_generic_secret"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("Reads arbitrary secret data from a path.")
            .field("path", Field::string().required())
            .field(
                "version",
                Field::int()
                    .optional()
                    .validate(Validator::IntAtLeast(0))
                    .description("KV v2 version to read; the latest when unset."),
            )
            .field("data_json", Field::string().computed().sensitive())
            .field("data", Field::map().computed().sensitive())
            .field("lease_id", Field::string().computed())
            .field("lease_duration", Field::int().computed())
            .field("lease_renewable", Field::bool().computed())
            .namespaced()
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.get_string("path").trim_matches('/').to_string();
        let client = meta.client_for(d);
        let mut kv = resolve_kv_path(client.as_ref(), &path).await;
        if let (true, Some(version)) = (kv.v2, d.get_i64("version").filter(|v| *v > 0)) {
            kv.rest = format!("{}?version={}", kv.rest, version);
        }
        let (data, secret) = read_payload(client.as_ref(), &kv)
            .await?
            .ok_or_else(|| ProviderError::unexpected(kv.data_path(), "no secret found at path"))?;

        d.set_id(path);
        d.set("data_json", Value::Object(data.clone()).to_string());
        d.set("data", string_map(&data));
        d.set("lease_id", secret.lease_id.clone());
        d.set("lease_duration", secret.lease_duration);
        d.set("lease_renewable", secret.renewable);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::MemoryBackend;
    use std::sync::Arc;

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn kv2_backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.put(
            "sys/internal/ui/mounts/secret/app/db",
            json!({"path": "secret/", "type": "kv", "options": {"version": "2"}}),
        );
        backend
    }

    #[tokio::test]
    async fn test_kv1_create_and_read() {
        let backend = MemoryBackend::new();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), None);
        let mut d = ResourceData::new(attrs(json!({
            "path": "kv/app",
            "data_json": "{ \"user\": \"admin\", \"port\": 5432 }"
        })));
        GenericSecretResource.create(&meta, &mut d).await.unwrap();

        assert_eq!(d.id(), "kv/app");
        assert_eq!(backend.get("kv/app").unwrap()["user"], "admin");
        // Formatting of the configured JSON is preserved.
        assert_eq!(d.get_str("data_json"), Some("{ \"user\": \"admin\", \"port\": 5432 }"));
        assert_eq!(d.get_map("data")["port"], "5432");
    }

    #[tokio::test]
    async fn test_kv2_paths() {
        let backend = kv2_backend();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), None);
        let mut d = ResourceData::new(attrs(json!({
            "path": "secret/app/db",
            "data_json": "{\"password\": \"hunter2\"}",
            "delete_all_versions": true
        })));
        GenericSecretResource.create(&meta, &mut d).await.unwrap();
        assert_eq!(
            backend.get("secret/data/app/db").unwrap()["data"]["password"],
            "hunter2"
        );

        GenericSecretResource.delete(&meta, &mut d).await.unwrap();
        assert_eq!(backend.count_requests("delete", "secret/metadata/app/db"), 1);
    }

    #[tokio::test]
    async fn test_drift_rewrites_data_json() {
        let backend = MemoryBackend::new();
        backend.put("kv/app", json!({"user": "changed"}));
        let meta = ProviderMeta::new(Arc::new(backend), None);
        let mut d = ResourceData::from_state(
            "kv/app",
            attrs(json!({"path": "kv/app", "data_json": "{\"user\": \"admin\"}"})),
        );
        GenericSecretResource.read(&meta, &mut d).await.unwrap();
        assert_eq!(d.get_str("data_json"), Some("{\"user\":\"changed\"}"));
    }

    #[tokio::test]
    async fn test_disable_read_and_gone() {
        let meta = ProviderMeta::new(Arc::new(MemoryBackend::new()), None);
        let mut d = ResourceData::from_state(
            "kv/missing",
            attrs(json!({"data_json": "{}", "disable_read": true})),
        );
        GenericSecretResource.read(&meta, &mut d).await.unwrap();
        assert_eq!(d.id(), "kv/missing");

        let mut d = ResourceData::from_state("kv/missing", attrs(json!({"data_json": "{}"})));
        GenericSecretResource.read(&meta, &mut d).await.unwrap();
        assert!(d.id().is_empty());
    }

    #[tokio::test]
    async fn test_data_source_reads_kv2() {
        let backend = kv2_backend();
        backend.put(
            "secret/data/app/db",
            json!({"data": {"password": "hunter2"}, "metadata": {"version": 3}}),
        );
        let meta = ProviderMeta::new(Arc::new(backend), None);
        let mut d = ResourceData::new(attrs(json!({"path": "secret/app/db"})));
        GenericSecretDataSource.read(&meta, &mut d).await.unwrap();
        assert_eq!(d.get_map("data")["password"], "hunter2");
        assert_eq!(d.get_str("data_json"), Some("{\"password\":\"hunter2\"}"));
    }
}
