//! `vault_mfa_totp`: login MFA TOTP methods at `identity/mfa/method/totp`.
//! Needs Vault 1.10 or newer.

use crate::provider::error::on;
use crate::provider::{
    Field, ProviderError, ProviderMeta, Resource, ResourceData, Schema, Validator,
};
use crate::resources::util::{mark_gone, payload_from, set_from};
use crate::vault::version::VAULT_VERSION_110;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

pub struct MfaTotpResource;

const METHOD_PATH: &str = "identity/mfa/method/totp";

const FIELDS: &[&str] = &[
    "issuer",
    "period",
    "key_size",
    "qr_size",
    "algorithm",
    "digits",
    "skew",
    "max_validation_attempts",
];

const COMPUTED: &[&str] = &["method_id", "mount_accessor", "name", "type", "namespace_id"];

fn method_path(id: &str) -> String {
    format!("{}/{}", METHOD_PATH, id)
}

#[async_trait]
impl Resource for MfaTotpResource {
    fn type_name(&self) -> &'static str {
        "vault_mfa_totp"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("Login MFA TOTP method.")
            .min_version(&VAULT_VERSION_110)
            .field("issuer", Field::string().required())
            .field("period", Field::int().optional().default(30))
            .field("key_size", Field::int().optional().default(20))
            .field("qr_size", Field::int().optional().default(200))
            .field(
                "algorithm",
                Field::string()
                    .optional()
                    .default("SHA256")
                    .validate(Validator::OneOf(&["SHA1", "SHA256", "SHA512"])),
            )
            .field("digits", Field::int().optional().default(6))
            .field("skew", Field::int().optional().default(1))
            .field(
                "max_validation_attempts",
                Field::int()
                    .optional()
                    .default(5)
                    .validate(Validator::IntAtLeast(0)),
            )
            .field("method_id", Field::string().computed())
            .field("mount_accessor", Field::string().computed())
            .field("name", Field::string().computed())
            .field("type", Field::string().computed())
            .field("namespace_id", Field::string().computed())
            .namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        meta.require_version("MFA TOTP methods", &VAULT_VERSION_110)?;
        let response = meta
            .client_for(d)
            .write(METHOD_PATH, Value::Object(payload_from(d, FIELDS)))
            .await
            .map_err(on(METHOD_PATH))?;
        let id = response
            .as_ref()
            .and_then(|s| s.get_str("method_id"))
            .ok_or_else(|| ProviderError::unexpected(METHOD_PATH, "no method_id returned"))?
            .to_string();
        info!("Created TOTP MFA method {}", id);
        d.set_id(id);
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        meta.require_version("MFA TOTP methods", &VAULT_VERSION_110)?;
        let path = method_path(d.id());
        let Some(secret) = meta.client_for(d).read(&path).await.map_err(on(&path))? else {
            mark_gone(d, &path);
            return Ok(());
        };
        let data = secret.data();
        set_from(d, &data, FIELDS);
        set_from(d, &data, COMPUTED);
        if d.get("method_id").is_none() {
            let id = d.id().to_string();
            d.set("method_id", id);
        }
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        meta.require_version("MFA TOTP methods", &VAULT_VERSION_110)?;
        let path = method_path(d.id());
        meta.client_for(d)
            .write(&path, Value::Object(payload_from(d, FIELDS)))
            .await
            .map_err(on(&path))?;
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = method_path(d.id());
        meta.client_for(d).delete(&path).await.map_err(on(&path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{MemoryBackend, VaultVersion};
    use serde_json::{json, Map};
    use std::sync::Arc;

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_and_update() {
        let backend = MemoryBackend::with_vault_conventions();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), Some(VaultVersion::new(1, 15, 0)));
        let mut d = ResourceData::new(attrs(json!({"issuer": "acme", "period": 30})));
        MfaTotpResource.create(&meta, &mut d).await.unwrap();
        let id = d.id().to_string();
        assert_eq!(d.get_str("method_id"), Some(id.as_str()));

        let prior = d.attributes().clone();
        let mut planned = prior.clone();
        planned.insert("period".into(), json!(60));
        let mut d = ResourceData::for_update(id.clone(), prior, planned);
        MfaTotpResource.update(&meta, &mut d).await.unwrap();
        let stored = backend.get(&format!("identity/mfa/method/totp/{}", id)).unwrap();
        assert_eq!(stored["period"], 60);
        assert_eq!(stored["issuer"], "acme");
    }

    #[tokio::test]
    async fn test_rejected_on_old_servers() {
        let backend = MemoryBackend::with_vault_conventions();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), Some(VaultVersion::new(1, 9, 4)));
        let mut d = ResourceData::new(attrs(json!({"issuer": "acme"})));
        let err = MfaTotpResource.create(&meta, &mut d).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedVersion { .. }));
        assert!(backend.requests().is_empty());

        assert!(MfaTotpResource
            .schema()
            .validate(&attrs(json!({"issuer": "acme"})), Some(&VaultVersion::new(1, 9, 4)))
            .is_err());
    }
}
