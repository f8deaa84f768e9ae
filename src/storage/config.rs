//! Storage configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// One JSON file per entry under a base directory (default)
    #[default]
    File,
    /// In-process map (for testing)
    Memory,
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend {other:?}")),
        }
    }
}

/// Where and how cached aggregations are persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage backend type
    #[serde(default)]
    pub backend: BackendType,

    /// Base directory of the file backend; views colocate under it by prefix
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// fsync entry files before they replace the previous version
    #[serde(default = "default_true")]
    pub fsync: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            base_dir: default_base_dir(),
            fsync: true,
        }
    }
}

impl StoreConfig {
    pub fn file(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendType::File,
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    pub fn memory() -> Self {
        Self {
            backend: BackendType::Memory,
            ..Default::default()
        }
    }
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("histoview"))
        .unwrap_or_else(|| std::env::temp_dir().join("histoview"))
}

fn default_true() -> bool {
    true
}
