//! `vault_identity_oidc_client`: OIDC provider clients at
//! `identity/oidc/client/<name>`.

use crate::provider::error::on;
use crate::provider::{
    Field, FieldType, ProviderError, ProviderMeta, Resource, ResourceData, Schema, Validator,
};
use crate::resources::util::{mark_gone, payload_from, set_from, set_lists_from};
use crate::vault::version::VAULT_VERSION_113;
use async_trait::async_trait;
use serde_json::Value;

pub struct OidcClientResource;

const FIELDS: &[&str] = &["key", "redirect_uris", "assignments", "id_token_ttl", "access_token_ttl"];

fn client_path(name: &str) -> String {
    format!("identity/oidc/client/{}", name)
}

fn payload(meta: &ProviderMeta, d: &ResourceData) -> Value {
    let mut body = payload_from(d, FIELDS);
    if d.is_new_resource() && meta.is_at_least(&VAULT_VERSION_113) {
        if let Some(client_type) = d.get("client_type") {
            body.insert("client_type".into(), client_type.clone());
        }
    }
    Value::Object(body)
}

#[async_trait]
impl Resource for OidcClientResource {
    fn type_name(&self) -> &'static str {
        "vault_identity_oidc_client"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("OIDC provider client application.")
            .field("name", Field::string().required().force_new())
            .field(
                "key",
                Field::string()
                    .optional()
                    .default("default")
                    .description("Key used to sign ID tokens."),
            )
            .field("redirect_uris", Field::set(FieldType::String).optional())
            .field("assignments", Field::set(FieldType::String).optional())
            .field("id_token_ttl", Field::int().optional().computed())
            .field("access_token_ttl", Field::int().optional().computed())
            .field(
                "client_type",
                Field::string()
                    .optional()
                    .computed()
                    .force_new()
                    .min_version(&VAULT_VERSION_113)
                    .validate(Validator::OneOf(&["confidential", "public"])),
            )
            .field("client_id", Field::string().computed())
            .field("client_secret", Field::string().computed().sensitive())
            .namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let name = d.get_string("name");
        let path = client_path(&name);
        meta.client_for(d)
            .write(&path, payload(meta, d))
            .await
            .map_err(on(&path))?;
        d.set_id(name);
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = client_path(d.id());
        let Some(secret) = meta.client_for(d).read(&path).await.map_err(on(&path))? else {
            mark_gone(d, &path);
            return Ok(());
        };
        let data = secret.data();
        let name = d.id().to_string();
        d.set("name", name);
        set_from(
            d,
            &data,
            &["key", "id_token_ttl", "access_token_ttl", "client_id", "client_secret"],
        );
        set_lists_from(d, &data, &["redirect_uris", "assignments"]);
        if meta.is_at_least(&VAULT_VERSION_113) {
            set_from(d, &data, &["client_type"]);
        }
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = client_path(d.id());
        meta.client_for(d)
            .write(&path, payload(meta, d))
            .await
            .map_err(on(&path))?;
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = client_path(d.id());
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
    async fn test_create_reads_generated_credentials() {
        let backend = MemoryBackend::new();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), None);
        let mut d = ResourceData::new(attrs(json!({
            "name": "app",
            "key": "default",
            "redirect_uris": ["https://app/callback"],
            "client_type": "public"
        })));
        OidcClientResource.create(&meta, &mut d).await.unwrap();
        assert_eq!(backend.get("identity/oidc/client/app").unwrap()["client_type"], "public");

        backend.put(
            "identity/oidc/client/app",
            json!({"key": "default", "client_id": "cid", "client_secret": "shh", "redirect_uris": null}),
        );
        OidcClientResource.read(&meta, &mut d).await.unwrap();
        assert_eq!(d.get_str("client_id"), Some("cid"));
        assert_eq!(d.get_str("client_secret"), Some("shh"));
        assert!(d.get_string_list("redirect_uris").is_empty());
    }

    #[tokio::test]
    async fn test_client_type_not_sent_before_1_13() {
        let backend = MemoryBackend::new();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), Some(VaultVersion::new(1, 12, 3)));
        let mut d = ResourceData::new(attrs(json!({"name": "app", "client_type": "public"})));
        OidcClientResource.create(&meta, &mut d).await.unwrap();
        assert!(backend.get("identity/oidc/client/app").unwrap().get("client_type").is_none());
    }
}
