//! Configuration
//!
//! [`MirrorConfig`] is assembled by [`loader::ConfigLoader`] from built-in
//! defaults, an optional TOML file and `NSMIRROR__SECTION__KEY` environment
//! variables, in that order of precedence.

pub mod loader;

pub use loader::ConfigLoader;

use crate::error::{MirrorError, Result};
use crate::logging::LoggingConfig;
use crate::path::InodePath;
use crate::processor::{DEFAULT_TEMPORARY_SUFFIX, MAX_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub namespace: NamespaceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Namespace path to mirror.
    #[serde(default = "default_root")]
    pub root: String,

    /// Local directory exposed as the namespace.
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
}

fn default_root() -> String {
    "/".to_string()
}

fn default_local_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            local_root: default_local_root(),
        }
    }
}

impl NamespaceConfig {
    pub fn root_path(&self) -> Result<InodePath> {
        InodePath::parse(&self.root)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sled database directory; `None` uses the platform data directory.
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    #[serde(default = "default_collection")]
    pub collection: String,

    /// Tree holding the audit log of raw events.
    #[serde(default = "default_event_pool")]
    pub event_pool: String,
}

fn default_collection() -> String {
    "file_system".to_string()
}

fn default_event_pool() -> String {
    "event_pool".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            collection: default_collection(),
            event_pool: default_event_pool(),
        }
    }
}

impl StorageConfig {
    pub fn resolve_store_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store_path {
            return Ok(path.clone());
        }
        let dirs = directories::ProjectDirs::from("", "", "nsmirror").ok_or_else(|| {
            MirrorError::Config("Could not determine platform data directory".to_string())
        })?;
        Ok(dirs.data_dir().join("store"))
    }

    pub fn open_db(&self) -> Result<sled::Db> {
        let path = self.resolve_store_path()?;
        std::fs::create_dir_all(&path).map_err(|e| {
            MirrorError::Config(format!("Failed to create store directory {:?}: {}", path, e))
        })?;
        Ok(sled::open(path)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_true")]
    pub audit_events: bool,

    #[serde(default = "default_temporary_suffix")]
    pub temporary_suffix: String,
}

fn default_poll_interval_ms() -> u64 {
    MIN_POLL_INTERVAL_MS
}

fn default_true() -> bool {
    true
}

fn default_temporary_suffix() -> String {
    DEFAULT_TEMPORARY_SUFFIX.to_string()
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            audit_events: true,
            temporary_suffix: default_temporary_suffix(),
        }
    }
}

impl ProcessorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
        )
    }
}

impl MirrorConfig {
    pub fn validate(&self) -> Result<()> {
        self.namespace.root_path()?;
        if self.storage.collection.is_empty() || self.storage.event_pool.is_empty() {
            return Err(MirrorError::Config(
                "storage.collection and storage.event_pool must not be empty".to_string(),
            ));
        }
        if self.storage.collection == self.storage.event_pool {
            return Err(MirrorError::Config(
                "storage.collection and storage.event_pool must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MirrorError::Config(e.to_string()))
    }
}
