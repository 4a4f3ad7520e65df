//! Provider configuration.
//!
//! Settings come from three places, highest priority first: command line
//! flags (which clap already backs with `VAULT_*` environment variables), the
//! manifest's `provider` block, and built-in defaults. The token additionally
//! falls back to the CLI helper file `~/.vault-token`.

use crate::vault::VaultConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:8200";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_PARALLELISM: usize = 10;

/// The manifest's `provider` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderBlock {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub skip_tls_verify: Option<bool>,
    #[serde(default)]
    pub ca_cert_file: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub skip_get_vault_version: Option<bool>,
    #[serde(default)]
    pub vault_version_override: Option<String>,
}

/// Connection settings given on the command line or through the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionArgs {
    pub address: Option<String>,
    pub token: Option<String>,
    pub namespace: Option<String>,
    pub skip_tls_verify: Option<bool>,
    pub ca_cert_file: Option<String>,
    pub skip_get_vault_version: bool,
    pub vault_version_override: Option<String>,
}

/// Everything needed to build a [`crate::provider::ProviderMeta`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub vault: VaultConfig,
    pub version_override: Option<String>,
    pub skip_version_discovery: bool,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Reads the token the `vault login` helper leaves in `<home>/.vault-token`.
pub fn token_from_helper_file(home: &Path) -> Option<String> {
    let path = home.join(".vault-token");
    match std::fs::read_to_string(&path) {
        Ok(contents) => Some(contents.trim().to_string()).filter(|t| !t.is_empty()),
        Err(e) => {
            debug!("No token helper file at {}: {}", path.display(), e);
            None
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

/// Merges flags, the manifest block and defaults. `home` is where the token
/// helper file is looked up; `None` disables the lookup.
pub fn resolve(
    args: &ConnectionArgs,
    block: &ProviderBlock,
    home: Option<&Path>,
) -> Result<ProviderSettings> {
    let url = non_empty(args.address.as_ref())
        .or_else(|| non_empty(block.address.as_ref()))
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        bail!("Vault address {:?} must start with http:// or https://", url);
    }

    let token = non_empty(args.token.as_ref()).or_else(|| home.and_then(token_from_helper_file));
    if token.is_none() {
        bail!("no Vault token: set VAULT_TOKEN, pass --token or log in with the vault CLI");
    }

    let timeout_seconds = block.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
    if timeout_seconds == 0 {
        bail!("provider.timeout_seconds must be greater than zero");
    }

    let vault = VaultConfig {
        url,
        token,
        ca_cert_path: non_empty(args.ca_cert_file.as_ref())
            .or_else(|| non_empty(block.ca_cert_file.as_ref())),
        skip_tls_verify: args
            .skip_tls_verify
            .or(block.skip_tls_verify)
            .unwrap_or(false),
        namespace: non_empty(args.namespace.as_ref())
            .or_else(|| non_empty(block.namespace.as_ref()))
            .map(|ns| ns.trim_matches('/').to_string()),
        timeout: Duration::from_secs(timeout_seconds),
    };

    Ok(ProviderSettings {
        vault,
        version_override: non_empty(args.vault_version_override.as_ref())
            .or_else(|| non_empty(block.vault_version_override.as_ref())),
        skip_version_discovery: args.skip_get_vault_version
            || block.skip_get_vault_version.unwrap_or(false),
    })
}

/// [`resolve`] with the token helper file looked up in `$HOME`.
pub fn resolve_from_env(args: &ConnectionArgs, block: &ProviderBlock) -> Result<ProviderSettings> {
    let home = home_dir();
    resolve(args, block, home.as_deref()).context("invalid provider configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_with_token() -> ConnectionArgs {
        ConnectionArgs {
            token: Some("root".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let settings = resolve(&args_with_token(), &ProviderBlock::default(), None).unwrap();
        assert_eq!(settings.vault.url, DEFAULT_ADDRESS);
        assert_eq!(settings.vault.timeout, Duration::from_secs(60));
        assert!(!settings.vault.skip_tls_verify);
        assert!(!settings.skip_version_discovery);
    }

    #[test]
    fn test_flags_win_over_manifest() {
        let args = ConnectionArgs {
            address: Some("https://vault.cli:8200".to_string()),
            namespace: Some("cli".to_string()),
            ..args_with_token()
        };
        let block = ProviderBlock {
            address: Some("https://vault.manifest:8200".to_string()),
            namespace: Some("/manifest/".to_string()),
            skip_tls_verify: Some(true),
            timeout_seconds: Some(5),
            skip_get_vault_version: Some(true),
            vault_version_override: Some("1.15.2".to_string()),
            ..Default::default()
        };
        let settings = resolve(&args, &block, None).unwrap();
        assert_eq!(settings.vault.url, "https://vault.cli:8200");
        assert_eq!(settings.vault.namespace.as_deref(), Some("cli"));
        assert!(settings.vault.skip_tls_verify);
        assert_eq!(settings.vault.timeout, Duration::from_secs(5));
        assert!(settings.skip_version_discovery);
        assert_eq!(settings.version_override.as_deref(), Some("1.15.2"));

        let settings = resolve(&args_with_token(), &block, None).unwrap();
        assert_eq!(settings.vault.namespace.as_deref(), Some("manifest"));
    }

    #[test]
    fn test_token_helper_file() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(home.path().join(".vault-token"), "hvs.fromfile\n").unwrap();
        let settings = resolve(
            &ConnectionArgs::default(),
            &ProviderBlock::default(),
            Some(home.path()),
        )
        .unwrap();
        assert_eq!(settings.vault.token.as_deref(), Some("hvs.fromfile"));

        let empty = tempfile::tempdir().unwrap();
        assert!(resolve(
            &ConnectionArgs::default(),
            &ProviderBlock::default(),
            Some(empty.path())
        )
        .is_err());
    }

    #[test]
    fn test_rejects_bad_address_and_timeout() {
        let args = ConnectionArgs {
            address: Some("vault:8200".to_string()),
            ..args_with_token()
        };
        assert!(resolve(&args, &ProviderBlock::default(), None).is_err());

        let block = ProviderBlock {
            timeout_seconds: Some(0),
            ..Default::default()
        };
        assert!(resolve(&args_with_token(), &block, None).is_err());
    }

    #[test]
    fn test_provider_block_rejects_unknown_keys() {
        let parsed: Result<ProviderBlock, _> =
            serde_json::from_str(r#"{"address": "http://x", "tokn": "oops"}"#);
        assert!(parsed.is_err());
    }
}
