//! Advances live instances: resolve, append, detect terminal, hand off.

use crate::core::error::AppError;
use crate::core::store::{
    DefinitionStore, InstanceRecord, InstanceStatus, InstanceStore, StoreError, TrailEntry,
};
use crate::core::types::ErrorCategory;
use crate::core::workflow::assignment::{AssignmentPolicy, AssignmentQuery};
use crate::core::workflow::ledger::{InstanceLedger, LedgerError};
use crate::core::workflow::schema::{Actor, InstanceId, Role, StateId, ViewId, WorkflowId};
use crate::core::workflow::snapshot::WorkflowSnapshot;
use crate::core::workflow::validator::ValidationReport;
use dashmap::DashMap;
use std::sync::Arc;

/// Result of one committed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    pub entry: TrailEntry,
    pub to_view: ViewId,
    pub to_view_name: String,
    pub is_terminal: bool,
    pub assigned_role: Option<Role>,
}

#[derive(Debug, thiserror::Error)]
pub enum AdvanceError {
    /// The state is not a valid action from the instance's current view.
    #[error("no route from view {view_name} for state '{state}' in workflow {workflow}")]
    NoMatchingRoute {
        workflow: WorkflowId,
        view: ViewId,
        view_name: String,
        state: String,
        valid_states: Vec<String>,
    },

    #[error("instance {0} has already concluded")]
    InstanceTerminal(InstanceId),

    /// The stored position names a view the instance's definition lacks.
    #[error("instance {instance} sits at view {view}, which workflow {workflow} does not define")]
    UnknownPosition {
        instance: InstanceId,
        workflow: WorkflowId,
        view: ViewId,
    },

    #[error("instance {instance} moved from view {expected} to {actual} before this transition")]
    StaleTransition {
        instance: InstanceId,
        expected: ViewId,
        actual: ViewId,
    },

    #[error("instance {0} not found")]
    UnknownInstance(InstanceId),

    #[error("workflow {0} not found")]
    UnknownWorkflow(WorkflowId),

    #[error("{0}")]
    InvalidDefinition(Box<ValidationReport>),

    #[error(transparent)]
    Store(StoreError),
}

impl AdvanceError {
    /// Only conflicts are worth retrying after re-reading the position.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdvanceError::StaleTransition { .. })
    }

    pub(crate) fn from_ledger(err: LedgerError, instance_id: &InstanceId) -> Self {
        match err {
            LedgerError::StaleTransition {
                instance,
                expected,
                actual,
            } => AdvanceError::StaleTransition {
                instance,
                expected,
                actual,
            },
            LedgerError::Store(err) => AdvanceError::from_store(err, instance_id),
        }
    }

    fn from_store(err: StoreError, instance_id: &InstanceId) -> Self {
        match err {
            StoreError::NotFound { kind: "instance", .. } => {
                AdvanceError::UnknownInstance(instance_id.clone())
            }
            other => AdvanceError::Store(other),
        }
    }
}

impl From<AdvanceError> for AppError {
    fn from(err: AdvanceError) -> Self {
        let message = err.to_string();
        match err {
            AdvanceError::NoMatchingRoute {
                workflow,
                view_name,
                valid_states,
                ..
            } => {
                let hint = if valid_states.is_empty() {
                    "no states are valid from this view".to_string()
                } else {
                    format!("valid states here: {}", valid_states.join(", "))
                };
                AppError::new(ErrorCategory::RoutingError, message)
                    .with_code("SF-ROUTE-001")
                    .with_context("workflow", workflow.to_string())
                    .with_context("view", view_name)
                    .with_suggestion(hint)
            }
            AdvanceError::InstanceTerminal(instance) => {
                AppError::new(ErrorCategory::TerminalError, message)
                    .with_code("SF-TERM-001")
                    .with_context("instance", instance.to_string())
            }
            AdvanceError::UnknownPosition {
                instance, workflow, ..
            } => AppError::new(ErrorCategory::DefinitionError, message)
                .with_code("SF-DEF-002")
                .with_context("instance", instance.to_string())
                .with_context("workflow", workflow.to_string())
                .with_suggestion("republish a definition that contains the instance's view"),
            AdvanceError::StaleTransition {
                instance, actual, ..
            } => AppError::new(ErrorCategory::ConflictError, message)
                .with_code("SF-STALE-001")
                .with_context("instance", instance.to_string())
                .with_context("current_view", actual.to_string())
                .with_suggestion("refresh the instance position and resubmit"),
            AdvanceError::UnknownInstance(_) | AdvanceError::UnknownWorkflow(_) => {
                AppError::new(ErrorCategory::NotFoundError, message).with_code("SF-FOUND-001")
            }
            AdvanceError::InvalidDefinition(_) => {
                AppError::new(ErrorCategory::DefinitionError, message).with_code("SF-DEF-001")
            }
            AdvanceError::Store(source) => AppError::with_source(
                ErrorCategory::StorageError,
                message,
                Box::new(source),
            )
            .with_code("SF-STORE-001"),
        }
    }
}

/// Orchestrates transitions for every instance of every workflow.
///
/// Holds no lock across instances: safety for a single instance comes from
/// the ledger's compare-and-write. The current snapshot is cached per
/// workflow until [`invalidate`](Self::invalidate) is called. Instances route
/// against the definition version they were started on, so superseded
/// snapshots stay cached under `(workflow, version)`.
pub struct TransitionCoordinator {
    definitions: Arc<dyn DefinitionStore>,
    ledger: InstanceLedger,
    policy: Arc<dyn AssignmentPolicy>,
    snapshots: DashMap<WorkflowId, Arc<WorkflowSnapshot>>,
    pinned: DashMap<(WorkflowId, String), Arc<WorkflowSnapshot>>,
}

impl TransitionCoordinator {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        instances: Arc<dyn InstanceStore>,
        policy: Arc<dyn AssignmentPolicy>,
    ) -> Self {
        Self {
            definitions,
            ledger: InstanceLedger::new(instances),
            policy,
            snapshots: DashMap::new(),
            pinned: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &InstanceLedger {
        &self.ledger
    }

    pub fn definitions(&self) -> &Arc<dyn DefinitionStore> {
        &self.definitions
    }

    /// Validated snapshot for `workflow_id`, loading it on first use.
    pub async fn snapshot(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Arc<WorkflowSnapshot>, AdvanceError> {
        let cached = self
            .snapshots
            .get(&workflow_id)
            .map(|entry| Arc::clone(entry.value()));
        if let Some(snapshot) = cached {
            return Ok(snapshot);
        }

        let definition = self
            .definitions
            .load_workflow_definition(workflow_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound { .. } => AdvanceError::UnknownWorkflow(workflow_id),
                other => AdvanceError::Store(other),
            })?;
        let snapshot = WorkflowSnapshot::activate(&definition)
            .map_err(|report| AdvanceError::InvalidDefinition(Box::new(report)))?;
        tracing::debug!(
            workflow_id = %workflow_id,
            version = snapshot.version(),
            "loaded workflow snapshot"
        );
        let snapshot = Arc::new(snapshot);
        Ok(Arc::clone(
            self.snapshots
                .entry(workflow_id)
                .or_insert(snapshot)
                .value(),
        ))
    }

    /// Snapshot of the definition version `record` was started on.
    ///
    /// Records without a stamped version follow the current definition.
    pub async fn snapshot_for(
        &self,
        record: &InstanceRecord,
    ) -> Result<Arc<WorkflowSnapshot>, AdvanceError> {
        let version = record.definition_version.as_str();
        if version.is_empty() {
            return self.snapshot(record.workflow_id).await;
        }
        let key = (record.workflow_id, version.to_string());
        let cached = self.pinned.get(&key).map(|entry| Arc::clone(entry.value()));
        if let Some(snapshot) = cached {
            return Ok(snapshot);
        }
        // A broken or missing current definition must not block older versions.
        if let Ok(current) = self.snapshot(record.workflow_id).await {
            if current.version() == version {
                return Ok(current);
            }
        }

        let definition = self
            .definitions
            .load_workflow_definition_version(record.workflow_id, version)
            .await
            .map_err(AdvanceError::Store)?;
        let snapshot = WorkflowSnapshot::activate(&definition)
            .map_err(|report| AdvanceError::InvalidDefinition(Box::new(report)))?;
        if snapshot.version() != version {
            return Err(AdvanceError::Store(StoreError::Serialization(format!(
                "archived definition of workflow {} hashes to {}, not {}",
                record.workflow_id,
                snapshot.version(),
                version
            ))));
        }
        tracing::debug!(
            workflow_id = %record.workflow_id,
            version,
            "loaded superseded workflow snapshot"
        );
        Ok(Arc::clone(
            self.pinned.entry(key).or_insert(Arc::new(snapshot)).value(),
        ))
    }

    /// Stop serving the cached snapshot to new instances; the next use
    /// reloads the published definition. Instances already running on the
    /// old version keep it.
    pub fn invalidate(&self, workflow_id: WorkflowId) {
        if let Some((_, previous)) = self.snapshots.remove(&workflow_id) {
            self.pinned
                .insert((workflow_id, previous.version().to_string()), previous);
            tracing::info!(workflow_id = %workflow_id, "workflow snapshot invalidated");
        }
    }

    /// Create an instance positioned at the workflow's entry view, stamped
    /// with the current definition version.
    pub async fn start_instance(
        &self,
        workflow_id: WorkflowId,
        instance_id: Option<InstanceId>,
    ) -> Result<InstanceRecord, AdvanceError> {
        let snapshot = self.snapshot(workflow_id).await?;
        let instance_id = instance_id.unwrap_or_else(InstanceId::generate);
        let record = InstanceRecord::new(
            instance_id.clone(),
            workflow_id,
            snapshot.entry_view().id,
        )
        .with_definition_version(snapshot.version());
        self.ledger
            .open(record.clone())
            .await
            .map_err(|err| AdvanceError::from_ledger(err, &instance_id))?;
        tracing::info!(
            instance = %instance_id,
            workflow_id = %workflow_id,
            entry = %snapshot.entry_view().name,
            version = snapshot.version(),
            "instance started"
        );
        Ok(record)
    }

    /// Apply a state addressed by name, as external callers do.
    pub async fn advance_by_name(
        &self,
        instance_id: &InstanceId,
        state_name: &str,
        actor: Actor,
    ) -> Result<Advance, AdvanceError> {
        self.advance_by_name_at(instance_id, None, state_name, actor)
            .await
    }

    /// Like [`advance_by_name`](Self::advance_by_name), but only when the
    /// instance still sits at `expected_view`. A moved instance yields
    /// [`AdvanceError::StaleTransition`] and nothing is written.
    pub async fn advance_by_name_at(
        &self,
        instance_id: &InstanceId,
        expected_view: Option<ViewId>,
        state_name: &str,
        actor: Actor,
    ) -> Result<Advance, AdvanceError> {
        let record = self.load(instance_id).await?;
        if let Some(expected) = expected_view {
            if record.current_view != expected {
                return Err(AdvanceError::StaleTransition {
                    instance: record.id,
                    expected,
                    actual: record.current_view,
                });
            }
        }
        let snapshot = self.snapshot_for(&record).await?;
        self.ensure_active(&snapshot, &record).await?;
        let state = snapshot.state_by_name(state_name).ok_or_else(|| {
            no_matching_route(&snapshot, record.current_view, state_name.to_string())
        })?;
        let state = state.id;
        self.advance_from(&snapshot, record, state, actor).await
    }

    /// Apply `state` to the instance's current view. One attempt only; a
    /// [`AdvanceError::StaleTransition`] is left to the caller to retry.
    pub async fn advance(
        &self,
        instance_id: &InstanceId,
        state: StateId,
        actor: Actor,
    ) -> Result<Advance, AdvanceError> {
        let record = self.load(instance_id).await?;
        let snapshot = self.snapshot_for(&record).await?;
        self.ensure_active(&snapshot, &record).await?;
        self.advance_from(&snapshot, record, state, actor).await
    }

    async fn load(&self, instance_id: &InstanceId) -> Result<InstanceRecord, AdvanceError> {
        self.ledger
            .record(instance_id)
            .await
            .map_err(|err| AdvanceError::from_ledger(err, instance_id))
    }

    /// Reject instances that cannot move, before any state is looked up.
    async fn ensure_active(
        &self,
        snapshot: &WorkflowSnapshot,
        record: &InstanceRecord,
    ) -> Result<(), AdvanceError> {
        let instance_id = &record.id;
        if record.status == InstanceStatus::Terminal {
            return Err(AdvanceError::InstanceTerminal(instance_id.clone()));
        }
        if snapshot.view(record.current_view).is_none() {
            tracing::error!(
                instance = %instance_id,
                workflow_id = %snapshot.id(),
                view = %record.current_view,
                version = snapshot.version(),
                "instance position missing from its definition"
            );
            return Err(AdvanceError::UnknownPosition {
                instance: instance_id.clone(),
                workflow: snapshot.id(),
                view: record.current_view,
            });
        }
        if snapshot.is_terminal(record.current_view) {
            // Position is terminal but the flag was never written; repair it.
            self.ledger
                .close(instance_id)
                .await
                .map_err(|err| AdvanceError::from_ledger(err, instance_id))?;
            return Err(AdvanceError::InstanceTerminal(instance_id.clone()));
        }
        Ok(())
    }

    /// Resolve and commit. Callers have run [`ensure_active`](Self::ensure_active).
    async fn advance_from(
        &self,
        snapshot: &WorkflowSnapshot,
        record: InstanceRecord,
        state: StateId,
        actor: Actor,
    ) -> Result<Advance, AdvanceError> {
        let instance_id = &record.id;
        let observed = record.current_view;

        let to_view = snapshot.resolver().resolve(observed, state).map_err(|_| {
            let name = snapshot
                .state(state)
                .map(|state| state.name.clone())
                .unwrap_or_else(|| state.to_string());
            no_matching_route(snapshot, observed, name)
        })?;

        let entry = self
            .ledger
            .append(instance_id, observed, state, to_view, actor)
            .await
            .map_err(|err| {
                if let LedgerError::StaleTransition { actual, .. } = &err {
                    tracing::warn!(
                        instance = %instance_id,
                        expected = %observed,
                        actual = %actual,
                        "stale transition rejected"
                    );
                }
                AdvanceError::from_ledger(err, instance_id)
            })?;

        let is_terminal = snapshot.is_terminal(to_view);
        if is_terminal {
            if let Err(err) = self.ledger.close(instance_id).await {
                tracing::error!(
                    instance = %instance_id,
                    "failed to mark instance terminal, next advance will repair it: {}",
                    err
                );
            }
        }

        let to_view_name = snapshot
            .view(to_view)
            .map(|view| view.name.clone())
            .unwrap_or_default();
        let assigned_role = self.assign(snapshot, observed, state, to_view).await;

        tracing::info!(
            instance = %instance_id,
            workflow_id = %snapshot.id(),
            sequence = entry.sequence,
            from = %observed,
            to = %to_view_name,
            terminal = is_terminal,
            "transition committed"
        );

        Ok(Advance {
            entry,
            to_view,
            to_view_name,
            is_terminal,
            assigned_role,
        })
    }

    /// Best effort: a failing policy never undoes the committed entry.
    async fn assign(
        &self,
        snapshot: &WorkflowSnapshot,
        from: ViewId,
        state: StateId,
        to: ViewId,
    ) -> Option<Role> {
        let (Some(view), Some(route)) = (snapshot.view(to), snapshot.route_for(from, state)) else {
            return None;
        };
        let query = AssignmentQuery {
            workflow_id: snapshot.id(),
            view,
            route,
        };
        match self.policy.responsible_role_for(query).await {
            Ok(role) => role,
            Err(err) => {
                tracing::warn!(
                    policy = self.policy.name(),
                    view = %view.name,
                    "assignment lookup failed: {}",
                    err
                );
                None
            }
        }
    }
}

fn no_matching_route(snapshot: &WorkflowSnapshot, view: ViewId, state: String) -> AdvanceError {
    AdvanceError::NoMatchingRoute {
        workflow: snapshot.id(),
        view,
        view_name: snapshot
            .view(view)
            .map(|view| view.name.clone())
            .unwrap_or_else(|| view.to_string()),
        state,
        valid_states: snapshot
            .available_states(view)
            .into_iter()
            .map(|state| state.name.clone())
            .collect(),
    }
}
