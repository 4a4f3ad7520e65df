//! `vault_auth_backend` resource and data source: auth methods enabled at
//! `sys/auth/<path>`.

use crate::provider::error::on;
use crate::provider::{
    DataSource, Field, FieldType, ProviderError, ProviderMeta, Resource, ResourceData, Schema,
    Validator,
};
use crate::resources::mount::read_mount_entry;
use crate::resources::util::mark_gone;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;

pub struct AuthBackendResource;
pub struct AuthBackendDataSource;

const TUNE_FIELDS: &[(&str, &str)] = &[
    ("default_lease_ttl_seconds", "default_lease_ttl"),
    ("max_lease_ttl_seconds", "max_lease_ttl"),
    ("listing_visibility", "listing_visibility"),
    ("audit_non_hmac_request_keys", "audit_non_hmac_request_keys"),
    ("audit_non_hmac_response_keys", "audit_non_hmac_response_keys"),
    ("passthrough_request_headers", "passthrough_request_headers"),
    ("allowed_response_headers", "allowed_response_headers"),
    ("token_type", "token_type"),
];

fn auth_path(path: &str) -> String {
    format!("sys/auth/{}", path)
}

fn tune_payload(d: &ResourceData, only_changed: bool) -> Map<String, Value> {
    let mut tune = Map::new();
    for (attr, key) in TUNE_FIELDS {
        if only_changed && !d.has_change(attr) {
            continue;
        }
        if let Some(value) = d.get(attr) {
            tune.insert(key.to_string(), value.clone());
        }
    }
    tune
}

fn set_mount_fields(d: &mut ResourceData, mount: &Map<String, Value>) {
    for key in ["type", "description", "accessor", "local"] {
        if let Some(value) = mount.get(key).filter(|v| !v.is_null()) {
            d.set(key, value.clone());
        }
    }
    if let Some(config) = mount.get("config").and_then(Value::as_object) {
        for (attr, key) in TUNE_FIELDS {
            if let Some(value) = config.get(*key).filter(|v| !v.is_null()) {
                d.set(attr, value.clone());
            }
        }
    }
}

fn tune_schema(schema: Schema) -> Schema {
    schema
        .field("default_lease_ttl_seconds", Field::int().optional().computed())
        .field("max_lease_ttl_seconds", Field::int().optional().computed())
        .field(
            "listing_visibility",
            Field::string()
                .optional()
                .computed()
                .validate(Validator::OneOf(&["unauth", "hidden", ""])),
        )
        .field(
            "audit_non_hmac_request_keys",
            Field::list(FieldType::String).optional(),
        )
        .field(
            "audit_non_hmac_response_keys",
            Field::list(FieldType::String).optional(),
        )
        .field(
            "passthrough_request_headers",
            Field::list(FieldType::String).optional(),
        )
        .field("allowed_response_headers", Field::list(FieldType::String).optional())
        .field(
            "token_type",
            Field::string().optional().computed().validate(Validator::OneOf(&[
                "default-service",
                "default-batch",
                "service",
                "batch",
            ])),
        )
}

#[async_trait]
impl Resource for AuthBackendResource {
    fn type_name(&self) -> &'static str {
        "vault_auth_backend"
    }

    fn schema(&self) -> Schema {
        tune_schema(
            Schema::new()
                .description("Auth method mount.")
                .field(
                    "type",
                    Field::string()
                        .required()
                        .force_new()
                        .description("Name of the auth method type."),
                )
                .field(
                    "path",
                    Field::string()
                        .optional()
                        .computed()
                        .validate(Validator::NoLeadingTrailingSlashes)
                        .description("Mount path; defaults to the type."),
                )
                .field("description", Field::string().optional())
                .field("local", Field::bool().optional().force_new())
                .field(
                    "disable_remount",
                    Field::bool()
                        .optional()
                        .default(false)
                        .description("Fail instead of remounting when the path changes."),
                )
                .field("accessor", Field::string().computed()),
        )
        .namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let mount_type = d.get_string("type");
        let path = d
            .get_non_empty("path")
            .map(str::to_string)
            .unwrap_or_else(|| mount_type.clone());
        let api_path = auth_path(&path);

        let mut payload = Map::new();
        payload.insert("type".into(), json!(mount_type));
        for key in ["description", "local"] {
            if let Some(value) = d.get(key) {
                payload.insert(key.into(), value.clone());
            }
        }
        payload.insert("config".into(), Value::Object(tune_payload(d, false)));

        info!("Enabling auth method {} at {}", mount_type, path);
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
        let Some(mount) = read_mount_entry(client.as_ref(), meta, "sys/auth", &path).await? else {
            mark_gone(d, &auth_path(&path));
            return Ok(());
        };
        d.set("path", path);
        set_mount_fields(d, &mount);
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = meta.client_for(d);
        let mut path = d.id().to_string();

        let new_path = d.get_non_empty("path").map(str::to_string);
        if let Some(new_path) = new_path.filter(|p| *p != path) {
            if d.get_bool("disable_remount").unwrap_or(false) {
                return Err(ProviderError::Validation(vec![format!(
                    "path: cannot move auth method from {:?} to {:?} with disable_remount set",
                    path, new_path
                )]));
            }
            info!("Remounting auth method {} to {}", path, new_path);
            client
                .write(
                    "sys/remount",
                    json!({ "from": format!("auth/{}", path), "to": format!("auth/{}", new_path) }),
                )
                .await
                .map_err(on("sys/remount"))?;
            path = new_path;
            d.set_id(path.clone());
        }

        let mut tune = tune_payload(d, true);
        if d.has_change("description") {
            tune.insert("description".into(), json!(d.get_string("description")));
        }
        if !tune.is_empty() {
            let tune_path = format!("{}/tune", auth_path(&path));
            client
                .write(&tune_path, Value::Object(tune))
                .await
                .map_err(on(&tune_path))?;
        }
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = auth_path(d.id());
        info!("Disabling auth method at {}", d.id());
        meta.client_for(d).delete(&path).await.map_err(on(&path))?;
        Ok(())
    }
}

#[async_trait]
impl DataSource for AuthBackendDataSource {
    fn type_name(&self) -> &'static str {
        "vault_auth_backend"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("Looks up an enabled auth method by path.")
            .field("path", Field::string().required())
            .field("type", Field::string().computed())
            .field("description", Field::string().computed())
            .field("accessor", Field::string().computed())
            .field("local", Field::bool().computed())
            .field("default_lease_ttl_seconds", Field::int().computed())
            .field("max_lease_ttl_seconds", Field::int().computed())
            .field("listing_visibility", Field::string().computed())
            .field("audit_non_hmac_request_keys", Field::list(FieldType::String).computed())
            .field("audit_non_hmac_response_keys", Field::list(FieldType::String).computed())
            .field("passthrough_request_headers", Field::list(FieldType::String).computed())
            .field("allowed_response_headers", Field::list(FieldType::String).computed())
            .field("token_type", Field::string().computed())
            .namespaced()
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.get_string("path").trim_matches('/').to_string();
        let client = meta.client_for(d);
        let table = client.read("sys/auth").await.map_err(on("sys/auth"))?;
        let mount = table
            .as_ref()
            .and_then(|t| t.get(&format!("{}/", path)))
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| ProviderError::InvalidId {
                id: path.clone(),
                reason: "no auth backend is mounted at this path".to_string(),
            })?;
        set_mount_fields(d, &mount);
        d.set_id(path);
        Ok(())
    }
}
