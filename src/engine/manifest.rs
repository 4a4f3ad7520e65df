//! The manifest: the desired resources and data sources, in JSON.

use crate::config::ProviderBlock;
use crate::engine::graph;
use crate::provider::Provider;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Addresses of resources that must be created before this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl ResourceConfig {
    pub fn address(&self) -> String {
        format!("{}.{}", self.type_name, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub provider: ProviderBlock,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    #[serde(default)]
    pub data: Vec<ResourceConfig>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid manifest {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Checks names, addresses and type names against `provider`.
    pub fn check(&self, provider: &Provider) -> Result<()> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for (kind, entries) in [("resource", &self.resources), ("data", &self.data)] {
            for entry in entries {
                let address = entry.address();
                if entry.name.is_empty() || entry.name.contains('.') {
                    errors.push(format!("{} {}: invalid name {:?}", kind, address, entry.name));
                }
                if !seen.insert((kind, address.clone())) {
                    errors.push(format!("{} {} is declared more than once", kind, address));
                }
                let known = match kind {
                    "resource" => provider.resource(&entry.type_name).is_ok(),
                    _ => provider.data_source(&entry.type_name).is_ok(),
                };
                if !known {
                    errors.push(format!("{} {}: unknown type {:?}", kind, address, entry.type_name));
                }
            }
        }

        let declared: HashSet<String> = self.resources.iter().map(|r| r.address()).collect();
        for entry in &self.resources {
            for dep in &entry.depends_on {
                if !declared.contains(dep) || *dep == entry.address() {
                    errors.push(format!(
                        "resource {}: depends_on {:?} is not another declared resource",
                        entry.address(),
                        dep
                    ));
                }
            }
        }
        if let Err(e) = graph::waves(&self.dependency_graph()) {
            errors.push(e.to_string());
        }

        if !errors.is_empty() {
            bail!("{}", errors.join("; "));
        }
        Ok(())
    }

    pub fn dependency_graph(&self) -> Vec<graph::Node> {
        self.resources
            .iter()
            .map(|r| (r.address(), r.depends_on.clone()))
            .collect()
    }

    pub fn resource(&self, address: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.address() == address)
    }
}

/// Splits `<type>.<name>`.
pub fn parse_address(address: &str) -> Result<(&str, &str)> {
    match address.split_once('.') {
        Some((type_name, name)) if !type_name.is_empty() && !name.is_empty() => {
            Ok((type_name, name))
        }
        _ => bail!("invalid resource address {:?}, expected <type>.<name>", address),
    }
}
