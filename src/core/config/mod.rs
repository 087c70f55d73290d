use crate::core::workflow::service::DEFAULT_MAX_STALE_RETRIES;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration loaded from stageflow.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StageflowConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Static role tables: workflow id -> view name -> role
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub assignment: IndexMap<String, IndexMap<String, String>>,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Stale transitions retried by the service before giving up
    #[serde(default = "default_max_stale_retries")]
    pub max_stale_retries: u32,
}

/// Storage configuration, paths relative to the workspace root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: PathBuf,
}

fn default_max_stale_retries() -> u32 {
    DEFAULT_MAX_STALE_RETRIES
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".stageflow/state")
}

fn default_workflows_dir() -> PathBuf {
    PathBuf::from(".stageflow/workflows")
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_stale_retries: default_max_stale_retries(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            state_dir: default_state_dir(),
            workflows_dir: default_workflows_dir(),
        }
    }
}

impl StorageConfig {
    /// Resolve relative directories against `workspace`.
    pub fn resolve(&self, workspace: &Path) -> (PathBuf, PathBuf) {
        let absolute = |dir: &PathBuf| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                workspace.join(dir)
            }
        };
        (absolute(&self.state_dir), absolute(&self.workflows_dir))
    }
}


pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;
