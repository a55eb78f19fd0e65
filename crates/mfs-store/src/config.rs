use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Name of the configuration file inside a Merkle file directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Settings for the on-disk block store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Flush each block to stable storage before linking it into place.
    pub fsync: bool,
    /// Re-hash every block on read and reject mismatches.
    pub verify_on_read: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            fsync: false,
            verify_on_read: true,
        }
    }
}

impl StoreConfig {
    /// Parse settings from TOML text.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Serialize settings as TOML text.
    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load from `path` if it exists, otherwise the defaults.
    pub fn load_or_default(path: &Path) -> StoreResult<Self> {
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert!(!c.fsync);
        assert!(c.verify_on_read);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = StoreConfig::from_toml_str("fsync = true\n").unwrap();
        assert!(c.fsync);
        assert!(c.verify_on_read);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(StoreConfig::from_toml_str("").unwrap(), StoreConfig::default());
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = StoreConfig::from_toml_str("fsync = \"yes\"").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn toml_roundtrip() {
        let c = StoreConfig {
            fsync: true,
            verify_on_read: false,
        };
        let text = c.to_toml_string().unwrap();
        assert_eq!(StoreConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        assert_eq!(StoreConfig::load_or_default(&path).unwrap(), StoreConfig::default());

        std::fs::write(&path, "verify_on_read = false\n").unwrap();
        let c = StoreConfig::load(&path).unwrap();
        assert!(!c.verify_on_read);
        assert!(!c.fsync);
    }
}
