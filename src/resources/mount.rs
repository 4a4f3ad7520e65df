//! `vault_mount`: secret engines enabled at `sys/mounts/<path>`.

use crate::provider::error::on;
use crate::provider::{
    Field, FieldType, ProviderError, ProviderMeta, Resource, ResourceData, Schema, Validator,
};
use crate::resources::util::mark_gone;
use crate::vault::version::{VAULT_VERSION_110, VAULT_VERSION_112, VAULT_VERSION_116};
use crate::vault::Logical;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

pub struct MountResource;

/// Attribute name → key inside the mount's `config` object.
const CONFIG_FIELDS: &[(&str, &str)] = &[
    ("default_lease_ttl_seconds", "default_lease_ttl"),
    ("max_lease_ttl_seconds", "max_lease_ttl"),
    ("audit_non_hmac_request_keys", "audit_non_hmac_request_keys"),
    ("audit_non_hmac_response_keys", "audit_non_hmac_response_keys"),
    ("listing_visibility", "listing_visibility"),
    ("passthrough_request_headers", "passthrough_request_headers"),
    ("allowed_response_headers", "allowed_response_headers"),
    ("allowed_managed_keys", "allowed_managed_keys"),
    ("identity_token_key", "identity_token_key"),
];

/// Reads one entry of a mount table (`sys/mounts` or `sys/auth`).
///
/// Servers from 1.10 on answer `GET <table>/<path>` directly; older ones only
/// serve the whole table, keyed by `<path>/`.
pub(crate) async fn read_mount_entry(
    client: &dyn Logical,
    meta: &ProviderMeta,
    table: &str,
    mount_path: &str,
) -> Result<Option<Map<String, Value>>, ProviderError> {
    if meta.is_at_least(&VAULT_VERSION_110) {
        let path = format!("{}/{}", table, mount_path);
        let secret = client.read(&path).await.map_err(on(&path))?;
        return Ok(secret.map(|s| s.data()));
    }
    let secret = client.read(table).await.map_err(on(table))?;
    let key = format!("{}/", mount_path.trim_end_matches('/'));
    Ok(secret
        .and_then(|s| s.get(&key).cloned())
        .and_then(|v| v.as_object().cloned()))
}

fn mount_path(path: &str) -> String {
    format!("sys/mounts/{}", path)
}

fn config_payload(d: &ResourceData, only_changed: bool) -> Map<String, Value> {
    let mut config = Map::new();
    for (attr, key) in CONFIG_FIELDS {
        if only_changed && !d.has_change(attr) {
            continue;
        }
        if let Some(value) = d.get(attr) {
            config.insert(key.to_string(), value.clone());
        }
    }
    config
}

#[async_trait]
impl Resource for MountResource {
    fn type_name(&self) -> &'static str {
        "vault_mount"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("Secret engine mount.")
            .field(
                "path",
                Field::string()
                    .required()
                    .validate(Validator::NoLeadingTrailingSlashes)
                    .description("Where the secret backend will be mounted."),
            )
            .field(
                "type",
                Field::string()
                    .required()
                    .force_new()
                    .description("Type of the backend, such as \"kv\"."),
            )
            .field("description", Field::string().optional())
            .field("default_lease_ttl_seconds", Field::int().optional().computed())
            .field("max_lease_ttl_seconds", Field::int().optional().computed())
            .field(
                "audit_non_hmac_request_keys",
                Field::list(FieldType::String).optional().computed(),
            )
            .field(
                "audit_non_hmac_response_keys",
                Field::list(FieldType::String).optional().computed(),
            )
            .field(
                "listing_visibility",
                Field::string()
                    .optional()
                    .validate(Validator::OneOf(&["unauth", "hidden", ""])),
            )
            .field(
                "passthrough_request_headers",
                Field::list(FieldType::String).optional(),
            )
            .field("allowed_response_headers", Field::list(FieldType::String).optional())
            .field("allowed_managed_keys", Field::set(FieldType::String).optional())
            .field(
                "identity_token_key",
                Field::string().optional().min_version(&VAULT_VERSION_116),
            )
            .field("local", Field::bool().optional().force_new())
            .field("seal_wrap", Field::bool().optional().computed().force_new())
            .field("external_entropy_access", Field::bool().optional().force_new())
            .field("options", Field::map().optional())
            .field(
                "plugin_version",
                Field::string().optional().min_version(&VAULT_VERSION_112),
            )
            .field("accessor", Field::string().computed())
            .namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.get_string("path");
        let api_path = mount_path(&path);

        let mut payload = Map::new();
        payload.insert("type".into(), json!(d.get_string("type")));
        for key in ["description", "local", "seal_wrap", "external_entropy_access", "options"] {
            if let Some(value) = d.get(key) {
                payload.insert(key.into(), value.clone());
            }
        }
        if meta.is_at_least(&VAULT_VERSION_112) {
            if let Some(version) = d.get("plugin_version") {
                payload.insert("plugin_version".into(), version.clone());
            }
        }
        payload.insert("config".into(), Value::Object(config_payload(d, false)));

        info!("Mounting {} at {}", d.get_string("type"), path);
        meta.client_for(d)
            .write(&api_path, Value::Object(payload))
            .await
            .map_err(on(&api_path))?;
        d.set_id(path);
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.id().to_string();
        let client = meta.client_for(d);
        let Some(mount) = read_mount_entry(client.as_ref(), meta, "sys/mounts", &path).await? else {
            mark_gone(d, &mount_path(&path));
            return Ok(());
        };

        d.set("path", path);
        for key in [
            "type",
            "description",
            "accessor",
            "local",
            "seal_wrap",
            "external_entropy_access",
            "options",
        ] {
            if let Some(value) = mount.get(key).filter(|v| !v.is_null()) {
                d.set(key, value.clone());
            }
        }
        if meta.is_at_least(&VAULT_VERSION_112) {
            if let Some(version) = mount.get("plugin_version").and_then(Value::as_str) {
                if !version.is_empty() {
                    d.set("plugin_version", version);
                }
            }
        }
        if let Some(config) = mount.get("config").and_then(Value::as_object) {
            for (attr, key) in CONFIG_FIELDS {
                if let Some(value) = config.get(*key).filter(|v| !v.is_null()) {
                    d.set(attr, value.clone());
                }
            }
        }
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = meta.client_for(d);
        let mut path = d.id().to_string();

        if d.has_change("path") {
            let new_path = d.get_string("path");
            info!("Remounting {} to {}", path, new_path);
            client
                .write("sys/remount", json!({ "from": path, "to": new_path }))
                .await
                .map_err(on("sys/remount"))?;
            path = new_path;
            d.set_id(path.clone());
        }

        let mut tune = config_payload(d, true);
        for key in ["description", "options"] {
            if d.has_change(key) {
                tune.insert(key.into(), d.get(key).cloned().unwrap_or(json!("")));
            }
        }
        if meta.is_at_least(&VAULT_VERSION_112) && d.has_change("plugin_version") {
            tune.insert("plugin_version".into(), json!(d.get_string("plugin_version")));
        }
        if !tune.is_empty() {
            let tune_path = format!("{}/tune", mount_path(&path));
            debug!("Tuning mount {}", path);
            client
                .write(&tune_path, Value::Object(tune))
                .await
                .map_err(on(&tune_path))?;
        }
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = mount_path(d.id());
        info!("Unmounting {}", d.id());
        meta.client_for(d).delete(&path).await.map_err(on(&path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{MemoryBackend, VaultVersion};
    use std::sync::Arc;

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_sends_config_block() {
        let backend = MemoryBackend::with_vault_conventions();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), None);
        let mut d = ResourceData::new(attrs(json!({
            "path": "kv",
            "type": "kv",
            "options": {"version": "2"},
            "default_lease_ttl_seconds": 3600
        })));
        MountResource.create(&meta, &mut d).await.unwrap();

        let stored = backend.get("sys/mounts/kv").unwrap();
        assert_eq!(stored["type"], "kv");
        assert_eq!(stored["config"]["default_lease_ttl"], 3600);
        assert_eq!(d.id(), "kv");
        assert_eq!(d.get_i64("default_lease_ttl_seconds"), Some(3600));
        assert_eq!(d.get_map("options")["version"], "2");
    }

    #[tokio::test]
    async fn test_remount_and_tune_on_update() {
        let backend = MemoryBackend::with_vault_conventions();
        backend.put(
            "sys/mounts/old",
            json!({"type": "kv", "description": "", "config": {"max_lease_ttl": 0}}),
        );
        let meta = ProviderMeta::new(Arc::new(backend.clone()), None);
        let prior = attrs(json!({"path": "old", "type": "kv", "max_lease_ttl_seconds": 0}));
        let planned = attrs(json!({
            "path": "new",
            "type": "kv",
            "max_lease_ttl_seconds": 7200,
            "description": "moved"
        }));
        let mut d = ResourceData::for_update("old", prior, planned);
        MountResource.update(&meta, &mut d).await.unwrap();

        assert_eq!(d.id(), "new");
        assert!(!backend.contains("sys/mounts/old"));
        let stored = backend.get("sys/mounts/new").unwrap();
        assert_eq!(stored["config"]["max_lease_ttl"], 7200);
        assert_eq!(stored["description"], "moved");
    }

    #[tokio::test]
    async fn test_read_uses_table_on_old_servers() {
        let backend = MemoryBackend::with_vault_conventions();
        backend.put("sys/mounts/pki", json!({"type": "pki", "accessor": "pki_1"}));
        let meta = ProviderMeta::new(Arc::new(backend.clone()), Some(VaultVersion::new(1, 9, 0)));

        let mut d = ResourceData::from_state("pki", Map::new());
        MountResource.read(&meta, &mut d).await.unwrap();
        assert_eq!(d.get_str("accessor"), Some("pki_1"));
        assert_eq!(backend.count_requests("read", "sys/mounts"), 1);
        assert_eq!(backend.count_requests("read", "sys/mounts/pki"), 0);
    }

    #[tokio::test]
    async fn test_plugin_version_not_sent_to_old_servers() {
        let backend = MemoryBackend::with_vault_conventions();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), Some(VaultVersion::new(1, 11, 0)));
        let mut d = ResourceData::new(attrs(json!({
            "path": "db",
            "type": "database",
            "plugin_version": "v1.0.0"
        })));
        MountResource.create(&meta, &mut d).await.unwrap();
        assert!(backend.get("sys/mounts/db").unwrap().get("plugin_version").is_none());
    }

    #[tokio::test]
    async fn test_gone_mount_is_removed() {
        let meta = ProviderMeta::new(Arc::new(MemoryBackend::with_vault_conventions()), None);
        let mut d = ResourceData::from_state("nope", Map::new());
        MountResource.read(&meta, &mut d).await.unwrap();
        assert!(d.id().is_empty());
    }
}
