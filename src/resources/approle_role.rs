//! `vault_approle_auth_backend_role`: roles at `auth/<backend>/role/<name>`.

use crate::provider::error::on;
use crate::provider::{Field, FieldType, ProviderError, ProviderMeta, Resource, ResourceData, Schema};
use crate::resources::util::{
    mark_gone, read_token_fields, set_from, set_lists_from, split_id, token_payload,
    with_token_fields,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

pub struct AppRoleRoleResource;

const ROLE_FIELDS: &[&str] = &[
    "bind_secret_id",
    "secret_id_bound_cidrs",
    "secret_id_num_uses",
    "secret_id_ttl",
    "local_secret_ids",
];

fn role_path(backend: &str, name: &str) -> String {
    format!("auth/{}/role/{}", backend.trim_matches('/'), name)
}

/// `auth/<backend>/role/<name>` back into its parts.
fn parse_role_id(id: &str) -> Result<(String, String), ProviderError> {
    let invalid = |reason: &str| ProviderError::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    };
    let (mount, name) = split_id(id, "/role/").ok_or_else(|| invalid("expected auth/<backend>/role/<name>"))?;
    let backend = mount
        .strip_prefix("auth/")
        .filter(|b| !b.is_empty())
        .ok_or_else(|| invalid("expected the path to start with auth/"))?;
    Ok((backend.to_string(), name.to_string()))
}

#[async_trait]
impl Resource for AppRoleRoleResource {
    fn type_name(&self) -> &'static str {
        "vault_approle_auth_backend_role"
    }

    fn schema(&self) -> Schema {
        with_token_fields(
            Schema::new()
                .description("AppRole auth backend role.")
                .field(
                    "backend",
                    Field::string().optional().default("approle").force_new(),
                )
                .field("role_name", Field::string().required().force_new())
                .field(
                    "role_id",
                    Field::string()
                        .optional()
                        .computed()
                        .description("Fixed RoleID; Vault generates one when unset."),
                )
                .field("bind_secret_id", Field::bool().optional().default(true))
                .field("secret_id_bound_cidrs", Field::set(FieldType::String).optional())
                .field("secret_id_num_uses", Field::int().optional())
                .field("secret_id_ttl", Field::int().optional())
                .field(
                    "local_secret_ids",
                    Field::bool().optional().default(false).force_new(),
                ),
        )
        .namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = role_path(&d.get_string("backend"), &d.get_string("role_name"));
        let client = meta.client_for(d);

        let mut payload = Map::new();
        for field in ROLE_FIELDS {
            if let Some(value) = d.get(field) {
                payload.insert(field.to_string(), value.clone());
            }
        }
        token_payload(d, &mut payload);
        debug!("Writing AppRole role {}", path);
        client
            .write(&path, Value::Object(payload))
            .await
            .map_err(on(&path))?;

        if let Some(role_id) = d.get_non_empty("role_id") {
            let role_id_path = format!("{}/role-id", path);
            client
                .write(&role_id_path, json!({ "role_id": role_id }))
                .await
                .map_err(on(&role_id_path))?;
        }
        d.set_id(path);
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.id().to_string();
        let (backend, name) = parse_role_id(&path)?;
        let client = meta.client_for(d);
        let Some(secret) = client.read(&path).await.map_err(on(&path))? else {
            mark_gone(d, &path);
            return Ok(());
        };
        let data = secret.data();
        d.set("backend", backend);
        d.set("role_name", name);
        set_from(
            d,
            &data,
            &["bind_secret_id", "secret_id_num_uses", "secret_id_ttl", "local_secret_ids"],
        );
        set_lists_from(d, &data, &["secret_id_bound_cidrs"]);
        read_token_fields(d, &data);

        let role_id_path = format!("{}/role-id", path);
        let role_id = client
            .read(&role_id_path)
            .await
            .map_err(on(&role_id_path))?;
        if let Some(role_id) = role_id.as_ref().and_then(|s| s.get_str("role_id")) {
            d.set("role_id", role_id);
        }
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.id().to_string();
        let client = meta.client_for(d);

        let mut payload = Map::new();
        for field in ROLE_FIELDS {
            if d.has_change(field) {
                payload.insert(field.to_string(), d.get(field).cloned().unwrap_or(Value::Null));
            }
        }
        token_payload(d, &mut payload);
        if !payload.is_empty() {
            client
                .write(&path, Value::Object(payload))
                .await
                .map_err(on(&path))?;
        }

        if d.has_change("role_id") {
            if let Some(role_id) = d.get_non_empty("role_id") {
                let role_id_path = format!("{}/role-id", path);
                client
                    .write(&role_id_path, json!({ "role_id": role_id }))
                    .await
                    .map_err(on(&role_id_path))?;
            }
        }
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.id().to_string();
        meta.client_for(d).delete(&path).await.map_err(on(&path))?;
        Ok(())
    }

    fn import(&self, id: &str, d: &mut ResourceData) -> Result<(), ProviderError> {
        parse_role_id(id)?;
        d.set_id(id);
        Ok(())
    }
}
