use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::core::details::VerificationLevel;
use crate::core::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_path: PathBuf,

    // Partitioning
    pub partition_capacity: usize,      // Live rows per partition before a split
    pub default_item_limit: usize,      // Item limit for tables created without one
    pub max_partition_bits: u8,         // 2^bits partitions at most
    pub parallel_partition_threshold: usize,

    // Security
    pub enable_authentication: bool,
    pub group_cache_ttl_secs: u64,

    pub verification_level: VerificationLevel,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),
            partition_capacity: u16::MAX as usize,
            default_item_limit: 100_000_000,
            max_partition_bits: 16,
            parallel_partition_threshold: 2,
            enable_authentication: true,
            group_cache_ttl_secs: 15 * 60,
            verification_level: VerificationLevel::Normal,
        }
    }
}

impl Config {
    pub fn with_storage_path(path: impl Into<PathBuf>) -> Self {
        Config {
            storage_path: path.into(),
            ..Config::default()
        }
    }

    /// Load from a JSON file; fields not present keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn group_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.group_cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("arriba.json");
        fs::write(&path, r#"{ "partition_capacity": 16, "enable_authentication": false }"#).expect("write");

        let config = Config::from_json_file(&path).expect("load");
        assert_eq!(config.partition_capacity, 16);
        assert!(!config.enable_authentication);
        assert_eq!(config.group_cache_ttl(), Duration::from_secs(900));
        assert_eq!(config.max_partition_bits, 16);
    }
}
