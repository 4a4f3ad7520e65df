//! Vault server versions used for feature gating.

use crate::vault::VaultError;
use once_cell::sync::Lazy;
use semver::Version;
use serde::{Serialize, Serializer};
use std::fmt;

/// A Vault release, compared on major/minor/patch only. Build metadata such
/// as `+ent` and pre-release tags are ignored.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VaultVersion(Version);

impl VaultVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(Version::new(major, minor, patch))
    }

    pub fn parse(raw: &str) -> Result<Self, VaultError> {
        let trimmed = raw.trim().trim_start_matches('v');
        let parsed = Version::parse(trimmed)
            .map_err(|e| VaultError::Parse(format!("invalid Vault version {:?}: {}", raw, e)))?;
        Ok(Self(Version::new(parsed.major, parsed.minor, parsed.patch)))
    }

    pub fn is_at_least(&self, other: &VaultVersion) -> bool {
        self >= other
    }
}

impl fmt::Display for VaultVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for VaultVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub static VAULT_VERSION_110: Lazy<VaultVersion> = Lazy::new(|| VaultVersion::new(1, 10, 0));
pub static VAULT_VERSION_111: Lazy<VaultVersion> = Lazy::new(|| VaultVersion::new(1, 11, 0));
pub static VAULT_VERSION_112: Lazy<VaultVersion> = Lazy::new(|| VaultVersion::new(1, 12, 0));
pub static VAULT_VERSION_113: Lazy<VaultVersion> = Lazy::new(|| VaultVersion::new(1, 13, 0));
pub static VAULT_VERSION_114: Lazy<VaultVersion> = Lazy::new(|| VaultVersion::new(1, 14, 0));
pub static VAULT_VERSION_115: Lazy<VaultVersion> = Lazy::new(|| VaultVersion::new(1, 15, 0));
pub static VAULT_VERSION_116: Lazy<VaultVersion> = Lazy::new(|| VaultVersion::new(1, 16, 0));
pub static VAULT_VERSION_117: Lazy<VaultVersion> = Lazy::new(|| VaultVersion::new(1, 17, 0));
pub static VAULT_VERSION_119: Lazy<VaultVersion> = Lazy::new(|| VaultVersion::new(1, 19, 0));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ignores_metadata() {
        let v = VaultVersion::parse("1.16.2+ent.hsm").unwrap();
        assert_eq!(v, VaultVersion::new(1, 16, 2));
        let v = VaultVersion::parse("v1.13.0-rc1").unwrap();
        assert_eq!(v, VaultVersion::new(1, 13, 0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(VaultVersion::parse("").is_err());
        assert!(VaultVersion::parse("latest").is_err());
    }

    #[test]
    fn test_ordering() {
        let v = VaultVersion::new(1, 12, 3);
        assert!(v.is_at_least(&VAULT_VERSION_112));
        assert!(v.is_at_least(&VAULT_VERSION_111));
        assert!(!v.is_at_least(&VAULT_VERSION_113));
    }
}
