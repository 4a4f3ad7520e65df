//! Vault module for the terravault library
//!
//! This module implements the transport side of the provider: the
//! [`Logical`] seam every resource talks through, its reqwest-backed
//! implementation, an in-memory implementation, and server version discovery.
//!
//! ## Testing strategy:
//! - Each module contains its own unit tests within a `#[cfg(test)] mod tests` block
//! - HTTP behaviour is tested against `mockito` servers
//! - Resource tests run against [`MemoryBackend`]
//! - Tests against a real Vault live under `tests/` and use Docker containers

pub mod client;
pub mod common;
pub mod error;
pub mod logical;
pub mod memory;
pub mod version;

// Re-export key types and traits for convenience
pub use client::VaultClient;
pub use error::VaultError;
pub use logical::{Logical, Secret};
pub use memory::MemoryBackend;
pub use version::VaultVersion;

use std::time::Duration;

/// Vault connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultConfig {
    /// Vault API URL, e.g., "http://127.0.0.1:8200".
    pub url: String,
    /// API token. `sys/seal-status` works without one, nothing else does.
    pub token: Option<String>,
    /// Optional CA certificate for verifying the server
    pub ca_cert_path: Option<String>,
    /// Disable TLS verification
    pub skip_tls_verify: bool,
    /// Optional namespace for supporting namespaced Vault instances (enterprise)
    pub namespace: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl VaultConfig {
    /// Create a new Vault config
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Set token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Set namespace
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }
}

// Default configuration
impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8200".to_string(),
            token: None,
            ca_cert_path: None,
            skip_tls_verify: false,
            namespace: None,
            timeout: Duration::from_secs(60),
        }
    }
}
