//! # Runtime configuration
//!
//! Configuration is loaded from the environment when the vault is opened.
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `OBJECTVAULT_DATA_DIR` | Directory holding the redb database | `./data` |
//! | `OBJECTVAULT_MAX_OBJECT_BYTES` | Largest plaintext accepted by `store` | 64 MiB |
//! | `OBJECTVAULT_AUDIT_LOG` | JSON-lines audit file | unset (in-memory only) |
//! | `RUST_LOG` | Log filter for binaries embedding the vault | unset |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::VaultError;

pub const DATA_DIR_ENV: &str = "OBJECTVAULT_DATA_DIR";
pub const MAX_OBJECT_BYTES_ENV: &str = "OBJECTVAULT_MAX_OBJECT_BYTES";
pub const AUDIT_LOG_ENV: &str = "OBJECTVAULT_AUDIT_LOG";

/// Objects are buffered whole in memory, so the limit bounds peak memory per
/// call at roughly twice this value.
pub const DEFAULT_MAX_OBJECT_BYTES: usize = 64 * 1024 * 1024;

const DATABASE_FILE: &str = "objectvault.redb";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub data_dir: PathBuf,
    pub max_object_bytes: usize,
    pub audit_log: Option<PathBuf>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            max_object_bytes: DEFAULT_MAX_OBJECT_BYTES,
            audit_log: None,
        }
    }
}

impl VaultConfig {
    /// Load from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, VaultError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, VaultError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = get(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get(MAX_OBJECT_BYTES_ENV) {
            config.max_object_bytes = raw.trim().parse().map_err(|_| {
                VaultError::InvalidInput(format!("{MAX_OBJECT_BYTES_ENV} is not a byte count: {raw}"))
            })?;
        }
        config.audit_log = get(AUDIT_LOG_ENV).map(PathBuf::from);

        Ok(config)
    }

    /// Path of the redb database file inside `data_dir`.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = VaultConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, VaultConfig::default());
        assert_eq!(config.database_path(), PathBuf::from("data").join("objectvault.redb"));
    }

    #[test]
    fn test_reads_all_variables() {
        let config = VaultConfig::from_lookup(lookup(&[
            (DATA_DIR_ENV, "/var/lib/vault"),
            (MAX_OBJECT_BYTES_ENV, " 1024 "),
            (AUDIT_LOG_ENV, "/var/log/vault.jsonl"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/vault"));
        assert_eq!(config.max_object_bytes, 1024);
        assert_eq!(config.audit_log, Some(PathBuf::from("/var/log/vault.jsonl")));
    }

    #[test]
    fn test_rejects_malformed_limit() {
        let err = VaultConfig::from_lookup(lookup(&[(MAX_OBJECT_BYTES_ENV, "lots")])).unwrap_err();
        assert!(matches!(err, VaultError::InvalidInput(_)));
    }

    #[test]
    fn test_deserializes_partial_json() {
        let config: VaultConfig = serde_json::from_str(r#"{"max_object_bytes": 10}"#).unwrap();
        assert_eq!(config.max_object_bytes, 10);
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }
}
