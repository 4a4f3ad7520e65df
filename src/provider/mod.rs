//! Provider core: schemas, resource data, the resource registry and the
//! lifecycle calls the engine drives.
//!
//! ## Architectural role:
//! - `schema` / `data` describe and carry resource attributes
//! - `lock` and `reconcile` are the shared helpers for resources that
//!   read-modify-write a Vault object other resources also touch
//! - `Provider` dispatches a resource type name to its CRUD handlers and
//!   applies validation, defaults and normalisation around them

pub mod data;
pub mod error;
pub mod lock;
pub mod meta;
pub mod reconcile;
pub mod resource;
pub mod schema;

pub use data::ResourceData;
pub use error::ProviderError;
pub use meta::ProviderMeta;
pub use resource::{DataSource, Resource};
pub use schema::{Field, FieldType, Schema, Validator};

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Resource ID plus attributes, as kept in state.
pub type Instance = (String, Map<String, Value>);

#[derive(Default, Clone)]
pub struct Provider {
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
}

impl Provider {
    /// A provider with every built-in resource and data source registered.
    pub fn new() -> Self {
        let mut provider = Self::default();
        crate::resources::register_all(&mut provider);
        provider
    }

    pub fn register_resource(&mut self, resource: Arc<dyn Resource>) {
        self.resources.insert(resource.type_name(), resource);
    }

    pub fn register_data_source(&mut self, data_source: Arc<dyn DataSource>) {
        self.data_sources.insert(data_source.type_name(), data_source);
    }

    pub fn resource(&self, type_name: &str) -> Result<Arc<dyn Resource>, ProviderError> {
        self.resources
            .get(type_name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownResourceType(type_name.to_string()))
    }

    pub fn data_source(&self, type_name: &str) -> Result<Arc<dyn DataSource>, ProviderError> {
        self.data_sources
            .get(type_name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownResourceType(type_name.to_string()))
    }

    pub fn resource_types(&self) -> Vec<&'static str> {
        self.resources.keys().copied().collect()
    }

    pub fn data_source_types(&self) -> Vec<&'static str> {
        self.data_sources.keys().copied().collect()
    }

    /// All schemas, keyed by kind and type name.
    pub fn schemas(&self) -> Value {
        let resources: Map<String, Value> = self
            .resources
            .iter()
            .map(|(name, r)| (name.to_string(), json!(r.schema())))
            .collect();
        let data_sources: Map<String, Value> = self
            .data_sources
            .iter()
            .map(|(name, d)| (name.to_string(), json!(d.schema())))
            .collect();
        json!({ "resources": resources, "data_sources": data_sources })
    }

    /// Validates and normalises `config` for creation.
    pub fn prepare_config(
        &self,
        meta: &ProviderMeta,
        schema: &Schema,
        config: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ProviderError> {
        let mut config = config.clone();
        schema.apply_defaults(&mut config);
        schema.validate(&config, meta.version())?;
        schema.normalize(&mut config);
        Ok(config)
    }

    pub async fn create(
        &self,
        meta: &ProviderMeta,
        type_name: &str,
        config: &Map<String, Value>,
    ) -> Result<Instance, ProviderError> {
        let resource = self.resource(type_name)?;
        let schema = resource.schema();
        let config = self.prepare_config(meta, &schema, config)?;

        let mut d = ResourceData::new(config);
        resource.create(meta, &mut d).await?;
        if d.id().is_empty() {
            return Err(ProviderError::unexpected(
                type_name,
                "object disappeared right after creation",
            ));
        }
        let (id, mut attrs) = d.into_parts();
        schema.normalize(&mut attrs);
        info!("Created {} {}", type_name, id);
        Ok((id, attrs))
    }

    /// Refreshes an instance from Vault. `None` means it is gone.
    pub async fn read(
        &self,
        meta: &ProviderMeta,
        type_name: &str,
        id: &str,
        attrs: &Map<String, Value>,
    ) -> Result<Option<Instance>, ProviderError> {
        let resource = self.resource(type_name)?;
        let mut d = ResourceData::from_state(id, attrs.clone());
        resource.read(meta, &mut d).await?;
        if d.id().is_empty() {
            warn!("{} {} not found in Vault, removing from state", type_name, id);
            return Ok(None);
        }
        let (id, mut attrs) = d.into_parts();
        resource.schema().normalize(&mut attrs);
        Ok(Some((id, attrs)))
    }

    pub async fn update(
        &self,
        meta: &ProviderMeta,
        type_name: &str,
        id: &str,
        prior: &Map<String, Value>,
        config: &Map<String, Value>,
    ) -> Result<Instance, ProviderError> {
        let resource = self.resource(type_name)?;
        let schema = resource.schema();
        let config = self.prepare_config(meta, &schema, config)?;
        let planned = schema.planned(prior, &config);

        let mut d = ResourceData::for_update(id, prior.clone(), planned);
        resource.update(meta, &mut d).await?;
        if d.id().is_empty() {
            return Err(ProviderError::unexpected(
                type_name,
                format!("{} disappeared during update", id),
            ));
        }
        let (id, mut attrs) = d.into_parts();
        schema.normalize(&mut attrs);
        info!("Updated {} {}", type_name, id);
        Ok((id, attrs))
    }

    pub async fn delete(
        &self,
        meta: &ProviderMeta,
        type_name: &str,
        id: &str,
        attrs: &Map<String, Value>,
    ) -> Result<(), ProviderError> {
        let resource = self.resource(type_name)?;
        let mut d = ResourceData::from_state(id, attrs.clone());
        resource.delete(meta, &mut d).await?;
        info!("Deleted {} {}", type_name, id);
        Ok(())
    }

    pub async fn exists(
        &self,
        meta: &ProviderMeta,
        type_name: &str,
        id: &str,
        attrs: &Map<String, Value>,
    ) -> Result<bool, ProviderError> {
        let resource = self.resource(type_name)?;
        resource
            .exists(meta, &ResourceData::from_state(id, attrs.clone()))
            .await
    }

    /// Reads an existing Vault object into a fresh instance.
    pub async fn import(
        &self,
        meta: &ProviderMeta,
        type_name: &str,
        id: &str,
    ) -> Result<Instance, ProviderError> {
        let resource = self.resource(type_name)?;
        let mut d = ResourceData::from_state("", Map::new());
        resource.import(id, &mut d)?;
        resource.read(meta, &mut d).await?;
        if d.id().is_empty() {
            return Err(ProviderError::InvalidId {
                id: id.to_string(),
                reason: format!("no {} with this ID exists", type_name),
            });
        }
        let (id, mut attrs) = d.into_parts();
        resource.schema().normalize(&mut attrs);
        info!("Imported {} {}", type_name, id);
        Ok((id, attrs))
    }

    pub async fn read_data_source(
        &self,
        meta: &ProviderMeta,
        type_name: &str,
        config: &Map<String, Value>,
    ) -> Result<Instance, ProviderError> {
        let data_source = self.data_source(type_name)?;
        let schema = data_source.schema();
        let config = self.prepare_config(meta, &schema, config)?;
        let mut d = ResourceData::new(config);
        data_source.read(meta, &mut d).await?;
        let (id, mut attrs) = d.into_parts();
        schema.normalize(&mut attrs);
        Ok((id, attrs))
    }
}
