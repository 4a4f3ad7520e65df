//! `vault_secrets_sync_aws_destination`: AWS Secrets Manager sync
//! destinations at `sys/sync/destinations/aws-sm/<name>`. Needs Vault 1.16
//! or newer. Updates are sent as JSON merge patches.

use crate::provider::error::on;
use crate::provider::{
    Field, ProviderError, ProviderMeta, Resource, ResourceData, Schema, Validator,
};
use crate::resources::util::mark_gone;
use crate::vault::version::VAULT_VERSION_116;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

pub struct AwsSyncDestinationResource;

const DESTINATION_TYPE: &str = "aws-sm";

/// Credentials Vault masks on read; state keeps the configured values.
const CREDENTIAL_FIELDS: &[&str] = &["access_key_id", "secret_access_key"];

const CONNECTION_FIELDS: &[&str] = &["region", "role_arn", "external_id"];

fn destination_path(name: &str) -> String {
    format!("sys/sync/destinations/{}/{}", DESTINATION_TYPE, name)
}

fn field_payload(d: &ResourceData, only_changed: bool) -> Map<String, Value> {
    let mut payload = Map::new();
    let fields = CREDENTIAL_FIELDS
        .iter()
        .chain(CONNECTION_FIELDS)
        .chain(&["secret_name_template", "granularity"]);
    for field in fields {
        if only_changed && !d.has_change(field) {
            continue;
        }
        match d.get(field) {
            Some(value) => {
                payload.insert(field.to_string(), value.clone());
            }
            None if only_changed => {
                payload.insert(field.to_string(), json!(""));
            }
            None => {}
        }
    }
    payload
}

#[async_trait]
impl Resource for AwsSyncDestinationResource {
    fn type_name(&self) -> &'static str {
        "vault_secrets_sync_aws_destination"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("AWS Secrets Manager destination for secrets sync.")
            .min_version(&VAULT_VERSION_116)
            .field("name", Field::string().required().force_new())
            .field("access_key_id", Field::string().optional().sensitive())
            .field("secret_access_key", Field::string().optional().sensitive())
            .field("region", Field::string().optional().computed())
            .field("role_arn", Field::string().optional())
            .field("external_id", Field::string().optional())
            .field("custom_tags", Field::map().optional())
            .field("secret_name_template", Field::string().optional().computed())
            .field(
                "granularity",
                Field::string()
                    .optional()
                    .computed()
                    .validate(Validator::OneOf(&["secret-path", "secret-key"])),
            )
            .field("type", Field::string().computed())
            .namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        meta.require_version("secrets sync", &VAULT_VERSION_116)?;
        let name = d.get_string("name");
        let path = destination_path(&name);

        let mut payload = field_payload(d, false);
        payload.insert("custom_tags".into(), Value::Object(d.get_map("custom_tags")));
        debug!("Creating sync destination {}", path);
        meta.client_for(d)
            .write(&path, Value::Object(payload))
            .await
            .map_err(on(&path))?;
        d.set_id(name);
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        meta.require_version("secrets sync", &VAULT_VERSION_116)?;
        let path = destination_path(d.id());
        let Some(secret) = meta.client_for(d).read(&path).await.map_err(on(&path))? else {
            mark_gone(d, &path);
            return Ok(());
        };
        let data = secret.data();
        let name = d.id().to_string();
        d.set("name", name);
        d.set("type", DESTINATION_TYPE);

        if let Some(details) = data.get("connection_details").and_then(Value::as_object) {
            for field in CONNECTION_FIELDS {
                if let Some(value) = details.get(*field).filter(|v| !v.is_null()) {
                    d.set(field, value.clone());
                }
            }
        }
        if let Some(options) = data.get("options").and_then(Value::as_object) {
            if let Some(template) = options.get("secret_name_template") {
                d.set("secret_name_template", template.clone());
            }
            if let Some(granularity) = options.get("granularity_level") {
                d.set("granularity", granularity.clone());
            }
            let tags = options
                .get("custom_tags")
                .filter(|v| v.is_object())
                .cloned()
                .unwrap_or_else(|| json!({}));
            d.set("custom_tags", tags);
        }
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        meta.require_version("secrets sync", &VAULT_VERSION_116)?;
        let path = destination_path(d.id());

        let mut patch = field_payload(d, true);
        if d.has_change("custom_tags") {
            let (old, new) = d.get_change("custom_tags");
            let new_tags = new.and_then(Value::as_object).cloned().unwrap_or_default();
            let removed: Vec<String> = old
                .and_then(Value::as_object)
                .map(|old| {
                    old.keys()
                        .filter(|k| !new_tags.contains_key(*k))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            patch.insert("custom_tags".into(), Value::Object(new_tags));
            if !removed.is_empty() {
                patch.insert("tags_to_remove".into(), json!(removed));
            }
        }
        if !patch.is_empty() {
            meta.client_for(d)
                .patch(&path, Value::Object(patch))
                .await
                .map_err(on(&path))?;
        }
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = destination_path(d.id());
        meta.client_for(d).delete(&path).await.map_err(on(&path))?;
        Ok(())
    }
}
