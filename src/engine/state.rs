//! The state file: what terravault believes exists in Vault.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Recorded so destroys run in reverse dependency order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl ResourceState {
    /// `<type>.<name>`, unique within a state file.
    pub fn address(&self) -> String {
        format!("{}.{}", self.type_name, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    pub serial: u64,
    #[serde(default)]
    pub resources: Vec<ResourceState>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            serial: 0,
            resources: Vec::new(),
        }
    }
}

impl StateFile {
    /// Loads `path`; a missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No state at {}, starting empty", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read state file {}", path.display()))?;
        let state: StateFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse state file {}", path.display()))?;
        if state.version != STATE_VERSION {
            bail!(
                "state file {} has version {}, expected {}",
                path.display(),
                state.version,
                STATE_VERSION
            );
        }
        Ok(state)
    }

    /// Bumps `serial` and replaces `path` with a temp file written next to it.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.serial += 1;
        self.resources.sort_by_key(ResourceState::address);

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, self).context("failed to serialize state")?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("failed to write state file {}", path.display()))?;
        debug!("Wrote state serial {} to {}", self.serial, path.display());
        Ok(())
    }

    pub fn get(&self, address: &str) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.address() == address)
    }

    /// Inserts `resource`, replacing any entry with the same address.
    pub fn upsert(&mut self, resource: ResourceState) {
        let address = resource.address();
        match self.resources.iter_mut().find(|r| r.address() == address) {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove(&mut self, address: &str) -> Option<ResourceState> {
        let index = self.resources.iter().position(|r| r.address() == address)?;
        Some(self.resources.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy(name: &str) -> ResourceState {
        ResourceState {
            type_name: "vault_policy".to_string(),
            name: name.to_string(),
            id: name.to_string(),
            attributes: json!({"name": name}).as_object().cloned().unwrap(),
            depends_on: Vec::new(),
        }
    }

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateFile::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(state, StateFile::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = StateFile::default();
        state.upsert(policy("ops"));
        state.upsert(policy("dev"));
        state.save(&path).unwrap();
        state.save(&path).unwrap();

        let loaded = StateFile::load(&path).unwrap();
        assert_eq!(loaded.serial, 2);
        assert_eq!(loaded.resources[0].address(), "vault_policy.dev");
        assert_eq!(loaded, state);

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["resources"][0]["type"], "vault_policy");
    }

    #[test]
    fn test_upsert_and_remove() {
        let mut state = StateFile::default();
        state.upsert(policy("dev"));
        let mut changed = policy("dev");
        changed.id = "other".to_string();
        state.upsert(changed);
        assert_eq!(state.resources.len(), 1);
        assert_eq!(state.get("vault_policy.dev").unwrap().id, "other");
        assert!(state.remove("vault_policy.dev").is_some());
        assert!(state.remove("vault_policy.dev").is_none());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"version": 9, "serial": 1, "resources": []}"#).unwrap();
        assert!(StateFile::load(&path).is_err());
    }
}
