//! Resources that manage one list field of an identity entity or group:
//! `vault_identity_entity_policies`, `vault_identity_group_policies`,
//! `vault_identity_group_member_entity_ids` and
//! `vault_identity_group_member_group_ids`.
//!
//! With `exclusive = true` the resource owns the whole list. Otherwise several
//! resources may each contribute members; every change is a read-modify-write
//! under the object's path lock, adding this resource's new members and
//! removing only the ones it previously added.

use crate::provider::error::on;
use crate::provider::lock::lock;
use crate::provider::reconcile::{intersect, reconcile_non_exclusive, remove_all};
use crate::provider::{Field, FieldType, ProviderError, ProviderMeta, Resource, ResourceData, Schema};
use crate::resources::identity_entity::entity_id_path;
use crate::resources::identity_group::group_id_path;
use crate::resources::util::mark_gone;
use crate::vault::Logical;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityObject {
    Entity,
    Group,
}

impl IdentityObject {
    fn id_field(self) -> &'static str {
        match self {
            IdentityObject::Entity => "entity_id",
            IdentityObject::Group => "group_id",
        }
    }

    fn name_field(self) -> &'static str {
        match self {
            IdentityObject::Entity => "entity_name",
            IdentityObject::Group => "group_name",
        }
    }

    fn path(self, id: &str) -> String {
        match self {
            IdentityObject::Entity => entity_id_path(id),
            IdentityObject::Group => group_id_path(id),
        }
    }
}

pub struct MembershipResource {
    type_name: &'static str,
    object: IdentityObject,
    list_field: &'static str,
}

impl MembershipResource {
    pub fn entity_policies() -> Self {
        Self {
            type_name: "vault_identity_entity_policies",
            object: IdentityObject::Entity,
            list_field: "policies",
        }
    }

    pub fn group_policies() -> Self {
        Self {
            type_name: "vault_identity_group_policies",
            object: IdentityObject::Group,
            list_field: "policies",
        }
    }

    pub fn group_member_entity_ids() -> Self {
        Self {
            type_name: "vault_identity_group_member_entity_ids",
            object: IdentityObject::Group,
            list_field: "member_entity_ids",
        }
    }

    pub fn group_member_group_ids() -> Self {
        Self {
            type_name: "vault_identity_group_member_group_ids",
            object: IdentityObject::Group,
            list_field: "member_group_ids",
        }
    }

    fn exclusive(&self, d: &ResourceData) -> bool {
        d.get_bool("exclusive").unwrap_or(true)
    }

    async fn fetch(
        &self,
        client: &dyn Logical,
        path: &str,
    ) -> Result<Option<Map<String, Value>>, ProviderError> {
        let secret = client.read(path).await.map_err(on(path))?;
        Ok(secret.map(|s| s.data()))
    }

    async fn store(
        &self,
        client: &dyn Logical,
        path: &str,
        members: Vec<String>,
    ) -> Result<(), ProviderError> {
        debug!("Writing {} {:?} to {}", self.list_field, members, path);
        let mut body = Map::new();
        body.insert(self.list_field.to_string(), json!(members));
        client
            .write(path, Value::Object(body))
            .await
            .map_err(on(path))?;
        Ok(())
    }

    /// Applies this resource's list to the object. `old` is what the resource
    /// previously contributed.
    async fn apply(&self, meta: &ProviderMeta, d: &mut ResourceData, old: Vec<String>) -> Result<(), ProviderError> {
        let id = d.require_str(self.object.id_field())?.to_string();
        let path = self.object.path(&id);
        let client = meta.client_for(d);
        let _guard = lock(&path).await;

        let Some(data) = self.fetch(client.as_ref(), &path).await? else {
            return Err(ProviderError::unexpected(&path, "identity object not found"));
        };
        let wanted = d.get_string_list(self.list_field);
        let members = if self.exclusive(d) {
            wanted
        } else {
            let existing = crate::provider::data::string_list(data.get(self.list_field));
            reconcile_non_exclusive(&existing, &old, &wanted)
        };
        self.store(client.as_ref(), &path, members).await?;
        d.set_id(id);
        Ok(())
    }
}

#[async_trait]
impl Resource for MembershipResource {
    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .field(
                self.object.id_field(),
                Field::string().required().force_new(),
            )
            .field(self.object.name_field(), Field::string().computed())
            .field(
                self.list_field,
                Field::set(FieldType::String).required(),
            )
            .field(
                "exclusive",
                Field::bool()
                    .optional()
                    .default(true)
                    .description("Own the whole list instead of adding to it."),
            )
            .namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        self.apply(meta, d, Vec::new()).await?;
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let id = d.id().to_string();
        let path = self.object.path(&id);
        let client = meta.client_for(d);
        let Some(data) = self.fetch(client.as_ref(), &path).await? else {
            mark_gone(d, &path);
            return Ok(());
        };

        let existing = crate::provider::data::string_list(data.get(self.list_field));
        let members = if self.exclusive(d) {
            existing
        } else {
            intersect(&d.get_string_list(self.list_field), &existing)
        };
        d.set(self.object.id_field(), id);
        d.set(self.list_field, members);
        if let Some(name) = data.get("name").and_then(Value::as_str) {
            d.set(self.object.name_field(), name);
        }
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let old = d.prior_string_list(self.list_field);
        self.apply(meta, d, old).await?;
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = self.object.path(d.id());
        let client = meta.client_for(d);
        let _guard = lock(&path).await;

        let Some(data) = self.fetch(client.as_ref(), &path).await? else {
            return Ok(());
        };
        let members = if self.exclusive(d) {
            Vec::new()
        } else {
            let existing = crate::provider::data::string_list(data.get(self.list_field));
            remove_all(&existing, &d.get_string_list(self.list_field))
        };
        self.store(client.as_ref(), &path, members).await
    }
}
