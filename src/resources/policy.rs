//! `vault_policy`: ACL policies at `sys/policies/acl/<name>`.

use crate::provider::error::on;
use crate::provider::{Field, ProviderError, ProviderMeta, Resource, ResourceData, Schema};
use crate::resources::util::mark_gone;
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

pub struct PolicyResource;

fn policy_path(name: &str) -> String {
    format!("sys/policies/acl/{}", name)
}

#[async_trait]
impl Resource for PolicyResource {
    fn type_name(&self) -> &'static str {
        "vault_policy"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("ACL policy.")
            .field(
                "name",
                Field::string()
                    .required()
                    .force_new()
                    .description("Name of the policy."),
            )
            .field(
                "policy",
                Field::string()
                    .required()
                    .description("The policy document, in HCL."),
            )
            .namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let name = d.get_string("name");
        let path = policy_path(&name);
        debug!("Writing policy {} to Vault", name);
        meta.client_for(d)
            .write(&path, json!({ "policy": d.get_string("policy") }))
            .await
            .map_err(on(&path))?;
        d.set_id(name);
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = policy_path(d.id());
        let Some(secret) = meta.client_for(d).read(&path).await.map_err(on(&path))? else {
            mark_gone(d, &path);
            return Ok(());
        };
        let name = d.id().to_string();
        d.set("name", name);
        // Older servers answer with `rules` instead of `policy`.
        if let Some(policy) = secret.get_str("policy").or_else(|| secret.get_str("rules")) {
            d.set("policy", policy);
        }
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = policy_path(d.id());
        if d.has_change("policy") {
            meta.client_for(d)
                .write(&path, json!({ "policy": d.get_string("policy") }))
                .await
                .map_err(on(&path))?;
        }
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = policy_path(d.id());
        meta.client_for(d).delete(&path).await.map_err(on(&path))?;
        Ok(())
    }
}
