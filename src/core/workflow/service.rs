//! Typed entry points for callers outside the engine.

use crate::core::store::{InstanceRecord, InstanceStatus, StoreError, TrailEntry};
use crate::core::workflow::coordinator::{AdvanceError, TransitionCoordinator};
use crate::core::workflow::schema::{
    Actor, InstanceId, Role, ViewId, WorkflowDefinition, WorkflowId,
};
use crate::core::workflow::snapshot::WorkflowSnapshot;
use crate::core::workflow::validator::{self, DefinitionError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_MAX_STALE_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceRequest {
    pub instance_id: InstanceId,
    pub state_name: String,
    pub actor: Actor,
    /// View the caller saw when choosing the state. When absent, the view
    /// read on the first attempt stands in for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_view: Option<ViewId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceResponse {
    pub instance_id: InstanceId,
    pub current_view: ViewId,
    pub current_view_name: String,
    pub is_terminal: bool,
    pub assigned_role: Option<Role>,
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionResponse {
    pub instance_id: InstanceId,
    pub workflow_id: WorkflowId,
    pub current_view: ViewId,
    pub current_view_name: String,
    pub status: InstanceStatus,
    pub sequence: u64,
    pub definition_version: String,
    pub available_states: Vec<String>,
}

pub struct WorkflowService {
    coordinator: Arc<TransitionCoordinator>,
    max_stale_retries: u32,
}

impl WorkflowService {
    pub fn new(coordinator: Arc<TransitionCoordinator>) -> Self {
        Self {
            coordinator,
            max_stale_retries: DEFAULT_MAX_STALE_RETRIES,
        }
    }

    pub fn with_max_stale_retries(mut self, retries: u32) -> Self {
        self.max_stale_retries = retries;
        self
    }

    pub fn coordinator(&self) -> &Arc<TransitionCoordinator> {
        &self.coordinator
    }

    /// Apply a named state to the view the caller acted on.
    ///
    /// A stale conflict is retried, at most `max_stale_retries` times, only
    /// while a fresh read still shows that view. Once another transition has
    /// moved the instance elsewhere the conflict is returned with the
    /// observed view, so one submission never lands on a later view.
    pub async fn advance_workflow(
        &self,
        request: AdvanceRequest,
    ) -> Result<AdvanceResponse, AdvanceError> {
        let mut pinned = request.expected_view;
        let mut attempt = 0;
        loop {
            let result = self
                .coordinator
                .advance_by_name_at(
                    &request.instance_id,
                    pinned,
                    &request.state_name,
                    request.actor.clone(),
                )
                .await;
            match result {
                Ok(advance) => {
                    return Ok(AdvanceResponse {
                        instance_id: request.instance_id,
                        current_view: advance.to_view,
                        current_view_name: advance.to_view_name,
                        is_terminal: advance.is_terminal,
                        assigned_role: advance.assigned_role,
                        sequence: advance.entry.sequence,
                    })
                }
                Err(AdvanceError::StaleTransition {
                    instance, expected, ..
                }) if attempt < self.max_stale_retries => {
                    pinned = Some(expected);
                    let fresh = self
                        .coordinator
                        .ledger()
                        .current(&instance)
                        .await
                        .map_err(|err| AdvanceError::from_ledger(err, &instance))?;
                    if fresh.view != expected {
                        tracing::debug!(
                            instance = %instance,
                            expected = %expected,
                            actual = %fresh.view,
                            "instance moved on, not resubmitting"
                        );
                        return Err(AdvanceError::StaleTransition {
                            instance,
                            expected,
                            actual: fresh.view,
                        });
                    }
                    attempt += 1;
                    tracing::debug!(
                        instance = %instance,
                        attempt,
                        "retrying stale transition"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn start_instance(
        &self,
        workflow_id: WorkflowId,
        instance_id: Option<InstanceId>,
    ) -> Result<InstanceRecord, AdvanceError> {
        self.coordinator
            .start_instance(workflow_id, instance_id)
            .await
    }

    /// Full trail ordered by sequence; empty for a fresh instance.
    pub async fn get_workflow_history(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Vec<TrailEntry>, AdvanceError> {
        let history = self
            .coordinator
            .ledger()
            .history(instance_id)
            .await
            .map_err(|err| AdvanceError::from_ledger(err, instance_id))?;
        Ok(history.into_vec())
    }

    pub async fn current_position(
        &self,
        instance_id: &InstanceId,
    ) -> Result<PositionResponse, AdvanceError> {
        let record = self.record(instance_id).await?;
        let snapshot = self.coordinator.snapshot_for(&record).await?;
        let current_view_name = snapshot
            .view(record.current_view)
            .map(|view| view.name.clone())
            .unwrap_or_else(|| record.current_view.to_string());
        let available_states = match record.status {
            InstanceStatus::Terminal => Vec::new(),
            InstanceStatus::Active => snapshot
                .available_states(record.current_view)
                .into_iter()
                .map(|state| state.name.clone())
                .collect(),
        };
        Ok(PositionResponse {
            instance_id: record.id,
            workflow_id: record.workflow_id,
            current_view: record.current_view,
            current_view_name,
            status: record.status,
            sequence: record.last_sequence,
            definition_version: snapshot.version().to_string(),
            available_states,
        })
    }

    /// The definition snapshot the instance routes against.
    pub async fn instance_snapshot(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Arc<WorkflowSnapshot>, AdvanceError> {
        let record = self.record(instance_id).await?;
        self.coordinator.snapshot_for(&record).await
    }

    async fn record(&self, instance_id: &InstanceId) -> Result<InstanceRecord, AdvanceError> {
        self.coordinator
            .ledger()
            .record(instance_id)
            .await
            .map_err(|err| AdvanceError::from_ledger(err, instance_id))
    }

    /// Names of the states that have a route out of the instance's view.
    pub async fn available_states(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Vec<String>, AdvanceError> {
        Ok(self.current_position(instance_id).await?.available_states)
    }

    /// Validate the published definition. Empty means valid.
    pub async fn validate_workflow_definition(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<DefinitionError>, AdvanceError> {
        let definition = self
            .coordinator
            .definitions()
            .load_workflow_definition(workflow_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound { .. } => AdvanceError::UnknownWorkflow(workflow_id),
                other => AdvanceError::Store(other),
            })?;
        Ok(validator::validate(&definition).errors)
    }

    /// Validate, store and swap in a new definition for instances started
    /// from now on. Running instances keep their version.
    pub async fn publish_definition(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<(), AdvanceError> {
        let report = validator::validate(&definition);
        if !report.is_valid() {
            return Err(AdvanceError::InvalidDefinition(Box::new(report)));
        }
        let workflow_id = definition.id();
        self.coordinator
            .definitions()
            .publish_workflow_definition(definition)
            .await
            .map_err(AdvanceError::Store)?;
        self.coordinator.invalidate(workflow_id);
        tracing::info!(workflow_id = %workflow_id, "workflow definition published");
        Ok(())
    }
}
