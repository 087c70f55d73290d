use crate::core::config::{ConfigLoader, ConfigValidator, StageflowConfig};
use crate::core::error::AppError;
use crate::core::store::{DefinitionStore, FileStore, FileStorePaths, StoreError};
use crate::core::types::ErrorCategory;
use crate::core::workflow::assignment::{ChainedPolicy, RouteRoleHintPolicy};
use crate::core::workflow::schema::{load_definition, WorkflowDefinition, WorkflowId};
use crate::core::workflow::{TransitionCoordinator, WorkflowService};
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a command needs to talk to one workspace.
pub struct WorkspaceContext {
    pub root: PathBuf,
    pub config: StageflowConfig,
    pub store: Arc<FileStore>,
    pub service: WorkflowService,
}

impl WorkspaceContext {
    /// Load `stageflow.toml` (defaults when absent) and wire the file store,
    /// assignment policy and service together.
    pub fn load(root: &Path) -> Result<Self> {
        let config = ConfigLoader::load_from_workspace(root)?;
        let (state_dir, workflows_dir) = config.storage.resolve(root);
        let store = Arc::new(FileStore::new(FileStorePaths::new(workflows_dir, state_dir)));

        // Configured tables win over the hints carried by routes.
        let policy = ChainedPolicy::default()
            .then(Arc::new(ConfigValidator::assignment_policy(&config)?))
            .then(Arc::new(RouteRoleHintPolicy));
        let coordinator = Arc::new(TransitionCoordinator::new(
            store.clone(),
            store.clone(),
            Arc::new(policy),
        ));
        let service = WorkflowService::new(coordinator)
            .with_max_stale_retries(config.engine.max_stale_retries);

        Ok(Self {
            root: root.to_path_buf(),
            config,
            store,
            service,
        })
    }

    /// Resolve a `WORKFLOW_ID|FILE` argument. Existing files win over ids.
    pub async fn load_target(&self, target: &str) -> Result<WorkflowDefinition> {
        let path = self.root.join(target);
        if path.is_file() {
            return Ok(load_definition(&path)?);
        }

        let workflow_id = target.trim().parse::<i64>().map(WorkflowId).map_err(|_| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("'{}' is neither a definition file nor a workflow id", target),
            )
            .with_code("SF-CLI-001")
        })?;
        self.store
            .load_workflow_definition(workflow_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound { .. } => AppError::new(
                    ErrorCategory::NotFoundError,
                    format!("workflow {} is not published", workflow_id),
                )
                .with_code("SF-FOUND-001")
                .with_suggestion("publish it with `stageflow publish <FILE>`")
                .into(),
                other => anyhow::Error::new(other),
            })
    }
}
