//! terravault - declarative resources for HashiCorp Vault's administrative API
//!
//! Policies, mounts, auth backends, identity objects, database connections
//! and the rest are described in a JSON manifest, diffed against a state file
//! and reconciled through Vault's REST API.
//!
//! ## Architecture
//!
//! - `vault` module - logical client (`Logical` trait, HTTP and in-memory backends)
//! - `provider` module - schemas, resource data, the resource registry
//! - `resources` module - one module per Vault object family
//! - `engine` module - manifest, state, plan and bounded-parallel apply
//! - `config` module - provider settings from flags, environment and manifest
//! - `cli` module - command-line front end

pub mod cli;
pub mod config;
pub mod engine;
pub mod provider;
pub mod resources;
pub mod vault;

pub use engine::{Engine, Manifest, Plan, StateFile};
pub use provider::{Provider, ProviderError, ProviderMeta};
pub use vault::{Logical, MemoryBackend, VaultClient, VaultConfig, VaultError};

use tracing_subscriber::EnvFilter;

/// Initialize logging for the application. `RUST_LOG` wins over `default_level`.
pub fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Logging for tests; output is captured per test.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}
