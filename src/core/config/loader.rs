#![allow(clippy::result_large_err)]

use super::{ConfigValidator, StageflowConfig};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "stageflow.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from workspace root (workspace/stageflow.toml).
    /// Environment variables override config file values; a missing file
    /// means defaults plus env.
    pub fn load_from_workspace(workspace_path: &Path) -> Result<StageflowConfig, AppError> {
        let config_path = workspace_path.join(CONFIG_FILE_NAME);
        let mut config = Self::load_from_file(&config_path)?.unwrap_or_default();

        Self::apply_env_overrides(&mut config)?;
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Returns Ok(None) if the file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<StageflowConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: StageflowConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("SF-CONFIG-001")
        })?;

        Ok(Some(config))
    }

    /// Environment variables take precedence over config file values
    fn apply_env_overrides(config: &mut StageflowConfig) -> Result<(), AppError> {
        if let Ok(retries) = env::var("STAGEFLOW_MAX_STALE_RETRIES") {
            config.engine.max_stale_retries = retries.trim().parse::<u32>().map_err(|_| {
                AppError::new(
                    ErrorCategory::ValidationError,
                    format!(
                        "STAGEFLOW_MAX_STALE_RETRIES must be a non-negative integer, got '{}'",
                        retries
                    ),
                )
                .with_code("SF-CONFIG-002")
            })?;
        }

        if let Ok(state_dir) = env::var("STAGEFLOW_STATE_DIR") {
            config.storage.state_dir = PathBuf::from(state_dir);
        }

        if let Ok(workflows_dir) = env::var("STAGEFLOW_WORKFLOWS_DIR") {
            config.storage.workflows_dir = PathBuf::from(workflows_dir);
        }

        Ok(())
    }

    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "STAGEFLOW_MAX_STALE_RETRIES - Override engine.max_stale_retries (default: 3)",
            "STAGEFLOW_STATE_DIR - Override storage.state_dir (default: .stageflow/state)",
            "STAGEFLOW_WORKFLOWS_DIR - Override storage.workflows_dir (default: .stageflow/workflows)",
            "STAGEFLOW_LOG_LEVEL - Override the logging default level",
        ]
    }
}
