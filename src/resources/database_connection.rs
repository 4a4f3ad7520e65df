//! `vault_database_secret_backend_connection`: database plugin connections at
//! `<backend>/config/<name>`.
//!
//! Vault never returns the password, so it is carried over from state on
//! every read.

use crate::provider::error::on;
use crate::provider::{Field, FieldType, ProviderError, ProviderMeta, Resource, ResourceData, Schema};
use crate::resources::util::{mark_gone, set_from, set_lists_from, split_id};
use crate::vault::version::{VAULT_VERSION_112, VAULT_VERSION_119};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;

pub struct DatabaseConnectionResource;

/// Plugin parameters Vault echoes back inside `connection_details`.
const CONNECTION_FIELDS: &[&str] = &[
    "connection_url",
    "username",
    "username_template",
    "max_open_connections",
    "max_idle_connections",
    "max_connection_lifetime",
    "password_authentication",
    "tls_ca",
];

fn parse_connection_id(id: &str) -> Result<(String, String), ProviderError> {
    split_id(id, "/config/")
        .map(|(backend, name)| (backend.to_string(), name.to_string()))
        .ok_or_else(|| ProviderError::InvalidId {
            id: id.to_string(),
            reason: "expected <backend>/config/<name>".to_string(),
        })
}

fn connection_payload(meta: &ProviderMeta, d: &ResourceData) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("plugin_name".into(), json!(d.get_string("plugin_name")));
    payload.insert(
        "verify_connection".into(),
        json!(d.get_bool("verify_connection").unwrap_or(true)),
    );
    payload.insert("allowed_roles".into(), json!(d.get_string_list("allowed_roles")));
    payload.insert(
        "root_rotation_statements".into(),
        json!(d.get_string_list("root_rotation_statements")),
    );
    for field in CONNECTION_FIELDS.iter().chain(["password"].iter()) {
        if let Some(value) = d.get(field) {
            payload.insert(field.to_string(), value.clone());
        }
    }
    for (k, v) in d.get_map("data") {
        payload.entry(k).or_insert(v);
    }
    if meta.is_at_least(&VAULT_VERSION_112) {
        if let Some(version) = d.get_non_empty("plugin_version") {
            payload.insert("plugin_version".into(), json!(version));
        }
    }
    if meta.is_at_least(&VAULT_VERSION_119) {
        if let Some(skip) = d.get_bool("skip_static_role_import_rotation") {
            payload.insert("skip_static_role_import_rotation".into(), json!(skip));
        }
    }
    payload
}

#[async_trait]
impl Resource for DatabaseConnectionResource {
    fn type_name(&self) -> &'static str {
        "vault_database_secret_backend_connection"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("Database secrets engine connection.")
            .field("backend", Field::string().required().force_new())
            .field("name", Field::string().required().force_new())
            .field(
                "plugin_name",
                Field::string()
                    .required()
                    .description("Database plugin, such as postgresql-database-plugin."),
            )
            .field("verify_connection", Field::bool().optional().default(true))
            .field("allowed_roles", Field::list(FieldType::String).optional())
            .field(
                "root_rotation_statements",
                Field::list(FieldType::String).optional(),
            )
            .field("connection_url", Field::string().optional())
            .field("username", Field::string().optional())
            .field("password", Field::string().optional().sensitive())
            .field("username_template", Field::string().optional())
            .field("max_open_connections", Field::int().optional().computed())
            .field("max_idle_connections", Field::int().optional().computed())
            .field("max_connection_lifetime", Field::int().optional().computed())
            .field("password_authentication", Field::string().optional())
            .field("tls_ca", Field::string().optional())
            .field(
                "data",
                Field::map()
                    .optional()
                    .sensitive()
                    .description("Extra plugin parameters sent as-is."),
            )
            .field(
                "plugin_version",
                Field::string().optional().min_version(&VAULT_VERSION_112),
            )
            .field(
                "skip_static_role_import_rotation",
                Field::bool().optional().min_version(&VAULT_VERSION_119),
            )
            .namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let backend = d.get_string("backend");
        let name = d.get_string("name");
        let path = format!("{}/config/{}", backend.trim_matches('/'), name);
        info!("Configuring database connection {}", path);
        meta.client_for(d)
            .write(&path, Value::Object(connection_payload(meta, d)))
            .await
            .map_err(on(&path))?;
        d.set_id(path);
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.id().to_string();
        let (backend, name) = parse_connection_id(&path)?;
        let Some(secret) = meta.client_for(d).read(&path).await.map_err(on(&path))? else {
            mark_gone(d, &path);
            return Ok(());
        };
        let data = secret.data();
        d.set("backend", backend);
        d.set("name", name);
        set_from(d, &data, &["plugin_name", "verify_connection"]);
        set_lists_from(d, &data, &["allowed_roles", "root_rotation_statements"]);

        if let Some(details) = data.get("connection_details").and_then(Value::as_object) {
            for field in CONNECTION_FIELDS {
                // Only track what the configuration manages.
                if d.get(field).is_none() && *field != "connection_url" && *field != "username" {
                    continue;
                }
                if let Some(value) = details.get(*field).filter(|v| !v.is_null()) {
                    d.set(field, value.clone());
                }
            }
        }
        if meta.is_at_least(&VAULT_VERSION_112) {
            if let Some(version) = data.get("plugin_version").and_then(Value::as_str) {
                if !version.is_empty() {
                    d.set("plugin_version", version);
                }
            }
        }
        if meta.is_at_least(&VAULT_VERSION_119) {
            set_from(d, &data, &["skip_static_role_import_rotation"]);
        }
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.id().to_string();
        meta.client_for(d)
            .write(&path, Value::Object(connection_payload(meta, d)))
            .await
            .map_err(on(&path))?;
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.id().to_string();
        meta.client_for(d).delete(&path).await.map_err(on(&path))?;
        Ok(())
    }

    fn import(&self, id: &str, d: &mut ResourceData) -> Result<(), ProviderError> {
        parse_connection_id(id)?;
        d.set_id(id);
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

    fn config() -> Map<String, Value> {
        attrs(json!({
            "backend": "database",
            "name": "pg",
            "plugin_name": "postgresql-database-plugin",
            "connection_url": "postgresql://{{username}}:{{password}}@db:5432/app",
            "username": "vault",
            "password": "s3cret",
            "allowed_roles": ["readonly"],
            "plugin_version": "v1.2.0",
            "skip_static_role_import_rotation": true
        }))
    }

    #[tokio::test]
    async fn test_password_survives_read() {
        let backend = MemoryBackend::new();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), Some(VaultVersion::new(1, 19, 0)));
        let mut d = ResourceData::new(config());
        DatabaseConnectionResource.create(&meta, &mut d).await.unwrap();
        assert_eq!(d.id(), "database/config/pg");

        // What Vault actually answers on read.
        backend.put(
            "database/config/pg",
            json!({
                "plugin_name": "postgresql-database-plugin",
                "allowed_roles": ["readonly"],
                "verify_connection": true,
                "connection_details": {
                    "connection_url": "postgresql://{{username}}:{{password}}@db:5432/app",
                    "username": "vault",
                    "max_open_connections": 4
                },
                "plugin_version": "v1.2.0",
                "skip_static_role_import_rotation": true
            }),
        );
        DatabaseConnectionResource.read(&meta, &mut d).await.unwrap();
        assert_eq!(d.get_str("password"), Some("s3cret"));
        assert_eq!(d.get_str("username"), Some("vault"));
        assert!(d.get("max_open_connections").is_none());
        assert_eq!(d.get_bool("skip_static_role_import_rotation"), Some(true));
    }

    #[tokio::test]
    async fn test_version_gated_fields_dropped_on_old_servers() {
        let backend = MemoryBackend::new();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), Some(VaultVersion::new(1, 11, 0)));
        let mut d = ResourceData::new(config());
        DatabaseConnectionResource.create(&meta, &mut d).await.unwrap();
        let stored = backend.get("database/config/pg").unwrap();
        assert!(stored.get("plugin_version").is_none());
        assert!(stored.get("skip_static_role_import_rotation").is_none());
        assert_eq!(stored["password"], "s3cret");
    }

    #[test]
    fn test_parse_connection_id() {
        assert_eq!(
            parse_connection_id("db/prod/config/pg").unwrap(),
            ("db/prod".to_string(), "pg".to_string())
        );
        assert!(parse_connection_id("database/pg").is_err());
    }
}
