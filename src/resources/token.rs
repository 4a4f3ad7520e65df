//! `vault_token`: tokens minted through `auth/token/create`.
//!
//! The resource ID is the token's accessor. Tokens that expired or were
//! revoked outside of terravault drop out of state on the next read.

use crate::provider::error::on;
use crate::provider::{Field, FieldType, ProviderError, ProviderMeta, Resource, ResourceData, Schema};
use crate::resources::util::mark_gone;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

pub struct TokenResource;

const LOOKUP_PATH: &str = "auth/token/lookup-accessor";
const REVOKE_PATH: &str = "auth/token/revoke-accessor";
const RENEW_PATH: &str = "auth/token/renew";

const CREATE_FIELDS: &[&str] = &[
    "policies",
    "no_default_policy",
    "renewable",
    "ttl",
    "explicit_max_ttl",
    "display_name",
    "num_uses",
    "period",
    "entity_alias",
];

fn create_path(d: &ResourceData) -> String {
    match d.get_non_empty("role_name") {
        Some(role) => format!("auth/token/create/{}", role),
        None if d.get_bool("no_parent").unwrap_or(false) => "auth/token/create-orphan".to_string(),
        None => "auth/token/create".to_string(),
    }
}

fn auth_i64(auth: Option<&Value>, key: &str) -> Option<i64> {
    auth.and_then(|a| a.get(key)).and_then(Value::as_i64)
}

#[async_trait]
impl Resource for TokenResource {
    fn type_name(&self) -> &'static str {
        "vault_token"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("Vault token.")
            .field("role_name", Field::string().optional().force_new())
            .field("policies", Field::set(FieldType::String).optional().force_new())
            .field("no_parent", Field::bool().optional().force_new())
            .field("no_default_policy", Field::bool().optional().force_new())
            .field("renewable", Field::bool().optional().computed().force_new())
            .field(
                "ttl",
                Field::string()
                    .optional()
                    .force_new()
                    .description("Initial TTL, such as \"1h\"."),
            )
            .field("explicit_max_ttl", Field::string().optional().force_new())
            .field(
                "display_name",
                Field::string().optional().default("token").force_new(),
            )
            .field("num_uses", Field::int().optional().computed().force_new())
            .field("period", Field::string().optional().force_new())
            .field("entity_alias", Field::string().optional().force_new())
            .field("metadata", Field::map().optional().force_new())
            .field(
                "renew_min_lease",
                Field::int()
                    .optional()
                    .description("Renew on read once fewer seconds than this remain."),
            )
            .field(
                "renew_increment",
                Field::int()
                    .optional()
                    .description("Seconds requested when renewing."),
            )
            .field("client_token", Field::string().computed().sensitive())
            .field("lease_duration", Field::int().computed())
            .field("lease_started", Field::string().computed())
            .namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = create_path(d);
        let mut payload = Map::new();
        for field in CREATE_FIELDS {
            if let Some(value) = d.get(field) {
                payload.insert(field.to_string(), value.clone());
            }
        }
        if let Some(metadata) = d.get("metadata") {
            payload.insert("meta".into(), metadata.clone());
        }
        if d.get_non_empty("role_name").is_some() && d.get_bool("no_parent").unwrap_or(false) {
            payload.insert("no_parent".into(), json!(true));
        }

        let response = meta
            .client_for(d)
            .write(&path, Value::Object(payload))
            .await
            .map_err(on(&path))?
            .ok_or_else(|| ProviderError::unexpected(&path, "empty response"))?;
        let accessor = response
            .auth_str("accessor")
            .ok_or_else(|| ProviderError::unexpected(&path, "no token accessor returned"))?
            .to_string();
        if let Some(token) = response.auth_str("client_token") {
            d.set("client_token", token);
        }
        if let Some(lease) = auth_i64(response.auth.as_ref(), "lease_duration") {
            d.set("lease_duration", lease);
        }
        info!("Created token with accessor {}", accessor);
        d.set_id(accessor);
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = meta.client_for(d);
        let accessor = d.id().to_string();
        let lookup = match client
            .write(LOOKUP_PATH, json!({ "accessor": accessor }))
            .await
        {
            Ok(lookup) => lookup,
            Err(e) if e.is_expired_token() => {
                warn!("Token {} has expired or was revoked: {}", accessor, e);
                d.set_id("");
                return Ok(());
            }
            Err(e) => return Err(ProviderError::vault(LOOKUP_PATH, e)),
        };
        let Some(lookup) = lookup else {
            mark_gone(d, LOOKUP_PATH);
            return Ok(());
        };
        let data = lookup.data();

        let mut policies = crate::provider::data::string_list(data.get("policies"));
        let wants_default = d.get_string_list("policies").iter().any(|p| p == "default");
        if !wants_default {
            policies.retain(|p| p != "default");
        }
        d.set("policies", policies);
        for (attr, key) in [
            ("renewable", "renewable"),
            ("num_uses", "num_uses"),
            ("lease_duration", "ttl"),
            ("lease_started", "issue_time"),
            ("entity_alias", "entity_alias"),
        ] {
            if let Some(value) = data.get(key).filter(|v| !v.is_null()) {
                d.set(attr, value.clone());
            }
        }
        if let Some(metadata) = data.get("meta").filter(|v| v.is_object()) {
            d.set("metadata", metadata.clone());
        }

        let renewable = d.get_bool("renewable").unwrap_or(false);
        let remaining = d.get_i64("lease_duration").unwrap_or_default();
        if let (true, Some(min_lease)) = (renewable, d.get_i64("renew_min_lease")) {
            if remaining < min_lease {
                self.renew(meta, d).await?;
            }
        }
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        // Only the renewal knobs are updatable; they take effect on read.
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let accessor = d.id().to_string();
        match meta
            .client_for(d)
            .write(REVOKE_PATH, json!({ "accessor": accessor }))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_expired_token() => {
                warn!("Token {} already gone: {}", accessor, e);
                Ok(())
            }
            Err(e) => Err(ProviderError::vault(REVOKE_PATH, e)),
        }
    }
}

impl TokenResource {
    async fn renew(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let Some(token) = d.get_non_empty("client_token").map(str::to_string) else {
            return Ok(());
        };
        let mut body = Map::new();
        body.insert("token".into(), json!(token));
        if let Some(increment) = d.get_i64("renew_increment") {
            body.insert("increment".into(), json!(increment));
        }
        info!("Renewing token {}", d.id());
        let response = meta
            .client_for(d)
            .write(RENEW_PATH, Value::Object(body))
            .await
            .map_err(on(RENEW_PATH))?;
        if let Some(lease) = response.and_then(|r| auth_i64(r.auth.as_ref(), "lease_duration")) {
            d.set("lease_duration", lease);
        }
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

    fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.stub_auth(
            "auth/token/create-orphan",
            json!({"client_token": "hvs.orphan", "accessor": "acc-1", "lease_duration": 3600}),
        );
        backend.stub_write(
            LOOKUP_PATH,
            json!({"policies": ["default", "dev"], "renewable": true, "ttl": 3590, "num_uses": 0}),
        );
        backend
    }

    #[tokio::test]
    async fn test_create_orphan_token() {
        let backend = backend();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), None);
        let mut d = ResourceData::new(attrs(json!({
            "policies": ["dev"],
            "no_parent": true,
            "ttl": "1h"
        })));
        TokenResource.create(&meta, &mut d).await.unwrap();
        assert_eq!(d.id(), "acc-1");
        assert_eq!(d.get_str("client_token"), Some("hvs.orphan"));
        assert_eq!(d.get_string_list("policies"), vec!["dev"]);
        assert_eq!(d.get_i64("lease_duration"), Some(3590));
        assert_eq!(backend.count_requests("write", "auth/token/create-orphan"), 1);
    }

    #[tokio::test]
    async fn test_expired_token_drops_from_state() {
        let backend = MemoryBackend::new();
        backend.fail("write", LOOKUP_PATH, 400, "invalid accessor");
        let meta = ProviderMeta::new(Arc::new(backend.clone()), None);
        let mut d = ResourceData::from_state("acc-1", Map::new());
        TokenResource.read(&meta, &mut d).await.unwrap();
        assert!(d.id().is_empty());

        backend.fail("write", REVOKE_PATH, 400, "invalid accessor");
        let mut d = ResourceData::from_state("acc-1", Map::new());
        TokenResource.delete(&meta, &mut d).await.unwrap();
    }

    #[tokio::test]
    async fn test_other_errors_propagate() {
        let backend = MemoryBackend::new();
        backend.fail("write", LOOKUP_PATH, 403, "permission denied");
        let meta = ProviderMeta::new(Arc::new(backend), None);
        let mut d = ResourceData::from_state("acc-1", Map::new());
        assert!(TokenResource.read(&meta, &mut d).await.is_err());
        assert_eq!(d.id(), "acc-1");
    }

    #[tokio::test]
    async fn test_renews_when_lease_is_short() {
        let backend = backend();
        backend.stub_auth(RENEW_PATH, json!({"lease_duration": 7200}));
        let meta = ProviderMeta::new(Arc::new(backend.clone()), None);
        let mut d = ResourceData::from_state(
            "acc-1",
            attrs(json!({"client_token": "hvs.orphan", "renew_min_lease": 4000, "renew_increment": 7200})),
        );
        TokenResource.read(&meta, &mut d).await.unwrap();
        assert_eq!(backend.count_requests("write", RENEW_PATH), 1);
        assert_eq!(d.get_i64("lease_duration"), Some(7200));
    }
}
