#![allow(clippy::result_large_err)]

use super::StageflowConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::assignment::StaticAssignmentPolicy;
use crate::core::workflow::schema::{Role, WorkflowId};

/// Upper bound on retries; anything larger hides a contention problem.
pub const MAX_STALE_RETRIES_LIMIT: u32 = 100;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &StageflowConfig) -> Result<(), AppError> {
        if config.engine.max_stale_retries > MAX_STALE_RETRIES_LIMIT {
            return Err(invalid(format!(
                "engine.max_stale_retries must be at most {}",
                MAX_STALE_RETRIES_LIMIT
            )));
        }

        if config.storage.state_dir.as_os_str().is_empty() {
            return Err(invalid("storage.state_dir cannot be empty"));
        }

        if config.storage.workflows_dir.as_os_str().is_empty() {
            return Err(invalid("storage.workflows_dir cannot be empty"));
        }

        Self::assignment_policy(config).map(|_| ())
    }

    /// Build the static role table from `[assignment."<workflow_id>"]`.
    pub fn assignment_policy(config: &StageflowConfig) -> Result<StaticAssignmentPolicy, AppError> {
        let mut policy = StaticAssignmentPolicy::default();
        for (workflow, views) in &config.assignment {
            let workflow_id = workflow.trim().parse::<i64>().map(WorkflowId).map_err(|_| {
                invalid(format!(
                    "assignment table key '{}' is not a workflow id",
                    workflow
                ))
            })?;
            for (view, role) in views {
                if role.trim().is_empty() {
                    return Err(invalid(format!(
                        "assignment.\"{}\".{} names an empty role",
                        workflow, view
                    )));
                }
                policy.assign(workflow_id, view.clone(), Role::new(role.trim()));
            }
        }
        Ok(policy)
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::ValidationError, message).with_code("SF-CONFIG-003")
}
