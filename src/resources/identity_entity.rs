//! `vault_identity_entity`.

use crate::provider::error::on;
use crate::provider::lock::lock;
use crate::provider::{Field, FieldType, ProviderError, ProviderMeta, Resource, ResourceData, Schema};
use crate::resources::util::{mark_gone, set_from, set_lists_from};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;

pub struct IdentityEntityResource;

pub(crate) const ENTITY_PATH: &str = "identity/entity";

pub(crate) fn entity_id_path(id: &str) -> String {
    format!("{}/id/{}", ENTITY_PATH, id)
}

fn entity_payload(d: &ResourceData) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("name".into(), json!(d.get_string("name")));
    payload.insert("metadata".into(), Value::Object(d.get_map("metadata")));
    payload.insert("disabled".into(), json!(d.get_bool("disabled").unwrap_or(false)));
    if !d.get_bool("external_policies").unwrap_or(false) {
        payload.insert("policies".into(), json!(d.get_string_list("policies")));
    }
    payload
}

#[async_trait]
impl Resource for IdentityEntityResource {
    fn type_name(&self) -> &'static str {
        "vault_identity_entity"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("Identity entity.")
            .field("name", Field::string().optional().computed())
            .field("policies", Field::set(FieldType::String).optional())
            .field("metadata", Field::map().optional())
            .field("disabled", Field::bool().optional().default(false))
            .field(
                "external_policies",
                Field::bool()
                    .optional()
                    .default(false)
                    .description("Policies are managed by vault_identity_entity_policies."),
            )
            .namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let response = meta
            .client_for(d)
            .write(ENTITY_PATH, Value::Object(entity_payload(d)))
            .await
            .map_err(on(ENTITY_PATH))?;
        let id = response
            .as_ref()
            .and_then(|s| s.get_str("id"))
            .ok_or_else(|| ProviderError::unexpected(ENTITY_PATH, "no entity ID returned"))?
            .to_string();
        info!("Created identity entity {}", id);
        d.set_id(id);
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = entity_id_path(d.id());
        let Some(secret) = meta.client_for(d).read(&path).await.map_err(on(&path))? else {
            mark_gone(d, &path);
            return Ok(());
        };
        let data = secret.data();
        set_from(d, &data, &["name", "disabled"]);
        let metadata = data.get("metadata").filter(|v| v.is_object()).cloned();
        d.set("metadata", metadata.unwrap_or_else(|| json!({})));
        if !d.get_bool("external_policies").unwrap_or(false) {
            set_lists_from(d, &data, &["policies"]);
        }
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = entity_id_path(d.id());
        let _guard = lock(&path).await;
        meta.client_for(d)
            .write(&path, Value::Object(entity_payload(d)))
            .await
            .map_err(on(&path))?;
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = entity_id_path(d.id());
        let _guard = lock(&path).await;
        meta.client_for(d).delete(&path).await.map_err(on(&path))?;
        Ok(())
    }
}
