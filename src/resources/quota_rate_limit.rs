//! `vault_quota_rate_limit`: request rate limits at
//! `sys/quotas/rate-limit/<name>`.

use crate::provider::error::on;
use crate::provider::{
    Field, ProviderError, ProviderMeta, Resource, ResourceData, Schema, Validator,
};
use crate::resources::util::{mark_gone, set_from};
use crate::vault::version::{VAULT_VERSION_112, VAULT_VERSION_115};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub struct QuotaRateLimitResource;

fn quota_path(name: &str) -> String {
    format!("sys/quotas/rate-limit/{}", name)
}

fn quota_payload(meta: &ProviderMeta, d: &ResourceData) -> Value {
    let mut payload = Map::new();
    payload.insert("path".into(), json!(d.get_string("path")));
    payload.insert("rate".into(), json!(d.get_f64("rate").unwrap_or_default()));
    for field in ["interval", "block_interval"] {
        if let Some(value) = d.get(field) {
            payload.insert(field.into(), value.clone());
        }
    }
    if meta.is_at_least(&VAULT_VERSION_112) {
        if let Some(role) = d.get_non_empty("role") {
            payload.insert("role".into(), json!(role));
        }
    }
    if meta.is_at_least(&VAULT_VERSION_115) {
        if let Some(inheritable) = d.get_bool("inheritable") {
            payload.insert("inheritable".into(), json!(inheritable));
        }
    }
    Value::Object(payload)
}

#[async_trait]
impl Resource for QuotaRateLimitResource {
    fn type_name(&self) -> &'static str {
        "vault_quota_rate_limit"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("Rate limit quota.")
            .field("name", Field::string().required().force_new())
            .field(
                "path",
                Field::string()
                    .optional()
                    .default("")
                    .description("Mount or namespace path the quota applies to; empty means global."),
            )
            .field(
                "rate",
                Field::float()
                    .required()
                    .description("Maximum requests per interval."),
            )
            .field(
                "interval",
                Field::int()
                    .optional()
                    .computed()
                    .validate(Validator::IntAtLeast(1))
                    .description("Duration in seconds over which the rate is enforced."),
            )
            .field(
                "block_interval",
                Field::int().optional().validate(Validator::IntAtLeast(0)),
            )
            .field(
                "role",
                Field::string().optional().min_version(&VAULT_VERSION_112),
            )
            .field(
                "inheritable",
                Field::bool()
                    .optional()
                    .computed()
                    .min_version(&VAULT_VERSION_115),
            )
            .namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let name = d.get_string("name");
        let path = quota_path(&name);
        meta.client_for(d)
            .write(&path, quota_payload(meta, d))
            .await
            .map_err(on(&path))?;
        d.set_id(name);
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = quota_path(d.id());
        let Some(secret) = meta.client_for(d).read(&path).await.map_err(on(&path))? else {
            mark_gone(d, &path);
            return Ok(());
        };
        let data = secret.data();
        let name = d.id().to_string();
        d.set("name", name);
        set_from(d, &data, &["path", "rate", "interval", "block_interval"]);
        if meta.is_at_least(&VAULT_VERSION_112) {
            if let Some(role) = data.get("role").and_then(Value::as_str) {
                if !role.is_empty() || d.get("role").is_some() {
                    d.set("role", role);
                }
            }
        }
        if meta.is_at_least(&VAULT_VERSION_115) {
            set_from(d, &data, &["inheritable"]);
        }
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = quota_path(d.id());
        meta.client_for(d)
            .write(&path, quota_payload(meta, d))
            .await
            .map_err(on(&path))?;
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = quota_path(d.id());
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
    async fn test_create_global_quota() {
        let backend = MemoryBackend::new();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), None);
        let mut d = ResourceData::new(attrs(json!({"name": "global", "path": "", "rate": 100.0, "interval": 1})));
        QuotaRateLimitResource.create(&meta, &mut d).await.unwrap();
        assert_eq!(d.id(), "global");
        assert_eq!(backend.get("sys/quotas/rate-limit/global").unwrap()["rate"], 100.0);
        assert_eq!(d.get_f64("rate"), Some(100.0));
    }

    #[tokio::test]
    async fn test_role_and_inheritable_gated() {
        let backend = MemoryBackend::new();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), Some(VaultVersion::new(1, 12, 0)));
        let mut d = ResourceData::new(attrs(json!({
            "name": "login",
            "path": "auth/approle/",
            "rate": 5.0,
            "role": "web",
            "inheritable": false
        })));
        QuotaRateLimitResource.create(&meta, &mut d).await.unwrap();
        let stored = backend.get("sys/quotas/rate-limit/login").unwrap();
        assert_eq!(stored["role"], "web");
        assert!(stored.get("inheritable").is_none());
    }
}
