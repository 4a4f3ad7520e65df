//! Common helper functions for Vault operations.

use crate::vault::version::VaultVersion;
use crate::vault::{VaultConfig, VaultError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Subset of `sys/seal-status` used to discover the server version.
#[derive(Debug, Serialize, Deserialize)]
pub struct VaultStatus {
    #[serde(default)]
    pub initialized: bool,
    #[serde(default)]
    pub sealed: bool,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub cluster_name: Option<String>,
}

/// Extracts the `errors` array from a Vault error body. Falls back to the raw
/// body when it is not the usual JSON shape.
pub fn error_messages(body: &str) -> Vec<String> {
    if let Ok(val) = serde_json::from_str::<Value>(body) {
        if let Some(errors) = val.get("errors").and_then(|v| v.as_array()) {
            return errors
                .iter()
                .filter_map(|e| e.as_str())
                .map(str::to_string)
                .collect();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_string()]
    }
}

/// Checks Vault's seal status by calling its sys/seal-status endpoint.
pub async fn check_vault_status(config: &VaultConfig) -> Result<VaultStatus, VaultError> {
    let client = Client::builder()
        .timeout(config.timeout)
        .danger_accept_invalid_certs(config.skip_tls_verify)
        .build()
        .map_err(|e| VaultError::Network(format!("Failed to create HTTP client: {}", e)))?;
    let url = format!("{}/v1/sys/seal-status", config.url.trim_end_matches('/'));

    debug!("Requesting Vault status from {}", url);
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| VaultError::Network(format!("Failed to connect to Vault at {}: {}", config.url, e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(VaultError::Response {
            method: "GET".to_string(),
            path: "sys/seal-status".to_string(),
            status: status.as_u16(),
            errors: error_messages(&body),
        });
    }

    response
        .json::<VaultStatus>()
        .await
        .map_err(|e| VaultError::Parse(format!("Failed to parse seal status: {}", e)))
}

/// Determines the server version the provider should gate features on.
///
/// An explicit override wins; otherwise the version is read from
/// `sys/seal-status` unless discovery is skipped, in which case `None` is
/// returned and every gated feature is assumed available.
pub async fn detect_vault_version(
    config: &VaultConfig,
    override_version: Option<&str>,
    skip_discovery: bool,
) -> Result<Option<VaultVersion>, VaultError> {
    if let Some(raw) = override_version {
        let version = VaultVersion::parse(raw)?;
        info!("Using Vault version override {}", version);
        return Ok(Some(version));
    }
    if skip_discovery {
        info!("Skipping Vault version discovery");
        return Ok(None);
    }

    let status = check_vault_status(config).await?;
    let version = VaultVersion::parse(&status.version)?;
    info!(
        "Vault at {} reports version {} (sealed: {})",
        config.url, version, status.sealed
    );
    Ok(Some(version))
}
