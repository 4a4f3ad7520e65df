//! The configured provider handed to every CRUD call.

use crate::provider::{ProviderError, ResourceData};
use crate::vault::common::detect_vault_version;
use crate::vault::{Logical, VaultClient, VaultConfig, VaultVersion};
use std::sync::Arc;

#[derive(Clone)]
pub struct ProviderMeta {
    client: Arc<dyn Logical>,
    version: Option<VaultVersion>,
}

impl ProviderMeta {
    pub fn new(client: Arc<dyn Logical>, version: Option<VaultVersion>) -> Self {
        Self { client, version }
    }

    /// Builds the HTTP client and settles the server version.
    pub async fn connect(
        config: &VaultConfig,
        version_override: Option<&str>,
        skip_version_discovery: bool,
    ) -> Result<Self, ProviderError> {
        let client = VaultClient::new(config)?;
        let version =
            detect_vault_version(config, version_override, skip_version_discovery).await?;
        Ok(Self::new(Arc::new(client), version))
    }

    pub fn client(&self) -> Arc<dyn Logical> {
        Arc::clone(&self.client)
    }

    /// The client for `d`, scoped to its `namespace` attribute when set.
    pub fn client_for(&self, d: &ResourceData) -> Arc<dyn Logical> {
        match d.get_non_empty("namespace") {
            Some(ns) => self.client.with_namespace(ns),
            None => self.client(),
        }
    }

    pub fn version(&self) -> Option<&VaultVersion> {
        self.version.as_ref()
    }

    /// True when the server is at least `version`. An unknown server version
    /// counts as new enough.
    pub fn is_at_least(&self, version: &VaultVersion) -> bool {
        self.version.as_ref().map_or(true, |v| v.is_at_least(version))
    }

    pub fn require_version(
        &self,
        feature: &str,
        version: &VaultVersion,
    ) -> Result<(), ProviderError> {
        match &self.version {
            Some(actual) if !actual.is_at_least(version) => {
                Err(ProviderError::UnsupportedVersion {
                    feature: feature.to_string(),
                    required: version.to_string(),
                    actual: actual.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::version::{VAULT_VERSION_110, VAULT_VERSION_116};
    use crate::vault::MemoryBackend;
    use serde_json::json;

    #[test]
    fn test_version_checks() {
        let meta = ProviderMeta::new(
            Arc::new(MemoryBackend::new()),
            Some(VaultVersion::new(1, 12, 0)),
        );
        assert!(meta.is_at_least(&VAULT_VERSION_110));
        assert!(!meta.is_at_least(&VAULT_VERSION_116));
        let err = meta
            .require_version("secrets sync", &VAULT_VERSION_116)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "secrets sync requires Vault 1.16.0 or newer, server is 1.12.0"
        );

        let unknown = ProviderMeta::new(Arc::new(MemoryBackend::new()), None);
        assert!(unknown.is_at_least(&VAULT_VERSION_116));
    }

    #[tokio::test]
    async fn test_client_for_namespace() {
        let backend = MemoryBackend::new();
        let meta = ProviderMeta::new(Arc::new(backend.clone()), None);
        let d = ResourceData::new(
            json!({"namespace": "team"}).as_object().cloned().unwrap(),
        );
        meta.client_for(&d)
            .write("sys/policies/acl/a", json!({"policy": ""}))
            .await
            .unwrap();
        assert_eq!(backend.requests()[0].namespace.as_deref(), Some("team"));
    }
}
