//! The seams every resource and data source implements.

use crate::provider::{ProviderError, ProviderMeta, ResourceData, Schema};
use async_trait::async_trait;

/// A managed Vault object.
///
/// `read` clears the ID (`d.set_id("")`) when the object no longer exists in
/// Vault; that removes it from state instead of failing.
#[async_trait]
pub trait Resource: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError>;

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError>;

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError>;

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError>;

    async fn exists(&self, meta: &ProviderMeta, d: &ResourceData) -> Result<bool, ProviderError> {
        let mut probe = d.clone();
        self.read(meta, &mut probe).await?;
        Ok(!probe.id().is_empty())
    }

    /// Seeds `d` from an import ID before the first `read`.
    fn import(&self, id: &str, d: &mut ResourceData) -> Result<(), ProviderError> {
        d.set_id(id);
        Ok(())
    }
}

/// A read-only lookup.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError>;
}
