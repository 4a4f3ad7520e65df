//! `vault_identity_group` resource and the `vault_identity_group` lookup.

use crate::provider::error::on;
use crate::provider::lock::lock;
use crate::provider::{
    DataSource, Field, FieldType, ProviderError, ProviderMeta, Resource, ResourceData, Schema,
    Validator,
};
use crate::resources::util::{mark_gone, set_from, set_lists_from};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

pub struct IdentityGroupResource;
pub struct IdentityGroupDataSource;

pub(crate) const GROUP_PATH: &str = "identity/group";

pub(crate) fn group_id_path(id: &str) -> String {
    format!("{}/id/{}", GROUP_PATH, id)
}

fn is_external(d: &ResourceData) -> bool {
    d.get_str("type") == Some("external")
}

fn group_payload(d: &ResourceData) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("name".into(), json!(d.get_string("name")));
    payload.insert("type".into(), json!(d.get_string("type")));
    payload.insert("metadata".into(), Value::Object(d.get_map("metadata")));
    if !d.get_bool("external_policies").unwrap_or(false) {
        payload.insert("policies".into(), json!(d.get_string_list("policies")));
    }
    if !is_external(d) {
        if !d.get_bool("external_member_entity_ids").unwrap_or(false) {
            payload.insert(
                "member_entity_ids".into(),
                json!(d.get_string_list("member_entity_ids")),
            );
        }
        if !d.get_bool("external_member_group_ids").unwrap_or(false) {
            payload.insert(
                "member_group_ids".into(),
                json!(d.get_string_list("member_group_ids")),
            );
        }
    }
    payload
}

fn check_members(d: &ResourceData) -> Result<(), ProviderError> {
    if !is_external(d) {
        return Ok(());
    }
    let errors: Vec<String> = ["member_entity_ids", "member_group_ids"]
        .iter()
        .filter(|f| !d.get_string_list(f).is_empty())
        .map(|f| format!("{}: cannot be set on external groups", f))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::Validation(errors))
    }
}

#[async_trait]
impl Resource for IdentityGroupResource {
    fn type_name(&self) -> &'static str {
        "vault_identity_group"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("Identity group.")
            .field("name", Field::string().optional().computed())
            .field(
                "type",
                Field::string()
                    .optional()
                    .default("internal")
                    .force_new()
                    .validate(Validator::OneOf(&["internal", "external"])),
            )
            .field("metadata", Field::map().optional())
            .field("policies", Field::set(FieldType::String).optional())
            .field("member_group_ids", Field::set(FieldType::String).optional())
            .field("member_entity_ids", Field::set(FieldType::String).optional())
            .field("external_policies", Field::bool().optional().default(false))
            .field("external_member_entity_ids", Field::bool().optional().default(false))
            .field("external_member_group_ids", Field::bool().optional().default(false))
            .namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        check_members(d)?;
        let response = meta
            .client_for(d)
            .write(GROUP_PATH, Value::Object(group_payload(d)))
            .await
            .map_err(on(GROUP_PATH))?;
        let id = response
            .as_ref()
            .and_then(|s| s.get_str("id"))
            .ok_or_else(|| ProviderError::unexpected(GROUP_PATH, "no group ID returned"))?
            .to_string();
        info!("Created identity group {}", id);
        d.set_id(id);
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = group_id_path(d.id());
        let Some(secret) = meta.client_for(d).read(&path).await.map_err(on(&path))? else {
            mark_gone(d, &path);
            return Ok(());
        };
        let data = secret.data();
        set_from(d, &data, &["name", "type"]);
        let metadata = data.get("metadata").filter(|v| v.is_object()).cloned();
        d.set("metadata", metadata.unwrap_or_else(|| json!({})));
        if !d.get_bool("external_policies").unwrap_or(false) {
            set_lists_from(d, &data, &["policies"]);
        }
        if !d.get_bool("external_member_entity_ids").unwrap_or(false) {
            set_lists_from(d, &data, &["member_entity_ids"]);
        }
        if !d.get_bool("external_member_group_ids").unwrap_or(false) {
            set_lists_from(d, &data, &["member_group_ids"]);
        }
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        check_members(d)?;
        let path = group_id_path(d.id());
        let _guard = lock(&path).await;
        meta.client_for(d)
            .write(&path, Value::Object(group_payload(d)))
            .await
            .map_err(on(&path))?;
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = group_id_path(d.id());
        let _guard = lock(&path).await;
        meta.client_for(d).delete(&path).await.map_err(on(&path))?;
        Ok(())
    }
}

const LOOKUP_PATH: &str = "identity/lookup/group";

#[async_trait]
impl DataSource for IdentityGroupDataSource {
    fn type_name(&self) -> &'static str {
        "vault_identity_group"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("Looks up an identity group by name, ID or alias.")
            .field("group_name", Field::string().optional().computed())
            .field("group_id", Field::string().optional().computed())
            .field("alias_id", Field::string().optional().computed())
            .field("alias_name", Field::string().optional().computed())
            .field("alias_mount_accessor", Field::string().optional().computed())
            .field("type", Field::string().computed())
            .field("policies", Field::set(FieldType::String).computed())
            .field("metadata", Field::map().computed())
            .field("member_entity_ids", Field::set(FieldType::String).computed())
            .field("member_group_ids", Field::set(FieldType::String).computed())
            .field("parent_group_ids", Field::set(FieldType::String).computed())
            .field("namespace_id", Field::string().computed())
            .field("creation_time", Field::string().computed())
            .field("last_update_time", Field::string().computed())
            .field("data_json", Field::string().computed())
            .namespaced()
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let mut query = Map::new();
        if let Some(name) = d.get_non_empty("group_name") {
            query.insert("name".into(), json!(name));
        } else if let Some(id) = d.get_non_empty("group_id") {
            query.insert("id".into(), json!(id));
        } else if let Some(alias_id) = d.get_non_empty("alias_id") {
            query.insert("alias_id".into(), json!(alias_id));
        } else if let (Some(name), Some(accessor)) = (
            d.get_non_empty("alias_name"),
            d.get_non_empty("alias_mount_accessor"),
        ) {
            query.insert("alias_name".into(), json!(name));
            query.insert("alias_mount_accessor".into(), json!(accessor));
        } else {
            return Err(ProviderError::Validation(vec![
                "one of group_name, group_id, alias_id or alias_name with alias_mount_accessor is required"
                    .to_string(),
            ]));
        }

        let response = meta
            .client_for(d)
            .write(LOOKUP_PATH, Value::Object(query.clone()))
            .await
            .map_err(on(LOOKUP_PATH))?;
        let Some(secret) = response else {
            warn!("No identity group matched {:?}", query);
            return Err(ProviderError::unexpected(LOOKUP_PATH, "no group found"));
        };
        let data = secret.data();
        let id = data
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::unexpected(LOOKUP_PATH, "group has no ID"))?
            .to_string();

        d.set_id(id.clone());
        d.set("group_id", id);
        if let Some(name) = data.get("name") {
            d.set("group_name", name.clone());
        }
        set_from(
            d,
            &data,
            &["type", "namespace_id", "creation_time", "last_update_time"],
        );
        let metadata = data.get("metadata").filter(|v| v.is_object()).cloned();
        d.set("metadata", metadata.unwrap_or_else(|| json!({})));
        set_lists_from(
            d,
            &data,
            &["policies", "member_entity_ids", "member_group_ids", "parent_group_ids"],
        );
        if let Some(alias) = data.get("alias").and_then(Value::as_object) {
            for (attr, key) in [
                ("alias_id", "id"),
                ("alias_name", "name"),
                ("alias_mount_accessor", "mount_accessor"),
            ] {
                if let Some(v) = alias.get(key).and_then(Value::as_str) {
                    d.set(attr, v);
                }
            }
        }
        d.set("data_json", Value::Object(data).to_string());
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

    #[tokio::test]
    async fn test_create_internal_group() {
        let backend = MemoryBackend::with_vault_conventions();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), None);
        let mut d = ResourceData::new(attrs(json!({
            "name": "devs",
            "type": "internal",
            "policies": ["dev"],
            "member_entity_ids": ["e1"]
        })));
        IdentityGroupResource.create(&meta, &mut d).await.unwrap();
        let stored = backend.get(&group_id_path(d.id())).unwrap();
        assert_eq!(stored["member_entity_ids"], json!(["e1"]));
        assert_eq!(d.get_str("name"), Some("devs"));
    }

    #[tokio::test]
    async fn test_external_group_rejects_members() {
        let meta = ProviderMeta::new(Arc::new(MemoryBackend::with_vault_conventions()), None);
        let mut d = ResourceData::new(attrs(json!({
            "name": "ldap-admins",
            "type": "external",
            "member_entity_ids": ["e1"]
        })));
        let err = IdentityGroupResource.create(&meta, &mut d).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_keeps_externally_managed_members() {
        let backend = MemoryBackend::with_vault_conventions();
        backend.put(
            "identity/group/id/g1",
            json!({"id": "g1", "name": "ops", "type": "internal", "member_entity_ids": ["x", "y"]}),
        );
        let meta = ProviderMeta::new(Arc::new(backend.clone()), None);
        let prior = attrs(json!({"name": "ops", "type": "internal", "external_member_entity_ids": true}));
        let planned = attrs(json!({
            "name": "ops",
            "type": "internal",
            "external_member_entity_ids": true,
            "policies": ["ops"]
        }));
        let mut d = ResourceData::for_update("g1", prior, planned);
        IdentityGroupResource.update(&meta, &mut d).await.unwrap();
        let stored = backend.get("identity/group/id/g1").unwrap();
        assert_eq!(stored["member_entity_ids"], json!(["x", "y"]));
        assert_eq!(stored["policies"], json!(["ops"]));
    }

    #[tokio::test]
    async fn test_lookup_by_name() {
        let backend = MemoryBackend::with_vault_conventions();
        backend.stub_write(
            LOOKUP_PATH,
            json!({"id": "g1", "name": "ops", "type": "internal", "policies": ["ops"], "member_entity_ids": null}),
        );
        let meta = ProviderMeta::new(Arc::new(backend), None);
        let mut d = ResourceData::new(attrs(json!({"group_name": "ops"})));
        IdentityGroupDataSource.read(&meta, &mut d).await.unwrap();
        assert_eq!(d.id(), "g1");
        assert_eq!(d.get_str("group_id"), Some("g1"));
        assert_eq!(d.get_string_list("policies"), vec!["ops"]);
        assert!(d.get_string_list("member_entity_ids").is_empty());

        let mut none = ResourceData::new(Map::new());
        assert!(IdentityGroupDataSource.read(&meta, &mut none).await.is_err());
    }
}
