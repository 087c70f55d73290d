//! Lookup of who acts next once an instance lands on a view.
//!
//! The source data only knows "stage X is worked by role Y" as convention, so
//! the engine never hardcodes the mapping; it asks an injected policy.

use crate::core::workflow::schema::{Role, WorkflowId};
use crate::core::workflow::snapshot::{Route, View};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("assignment lookup failed: {0}")]
    Lookup(String),
}

/// Everything a policy may consult for one handoff.
#[derive(Debug, Clone, Copy)]
pub struct AssignmentQuery<'a> {
    pub workflow_id: WorkflowId,
    /// Destination view of the committed transition.
    pub view: &'a View,
    /// Route the instance arrived by.
    pub route: &'a Route,
}

#[async_trait]
pub trait AssignmentPolicy: Send + Sync + 'static {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    async fn responsible_role_for(
        &self,
        query: AssignmentQuery<'_>,
    ) -> Result<Option<Role>, AssignmentError>;
}

/// Never assigns anyone.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAssignment;

#[async_trait]
impl AssignmentPolicy for NoAssignment {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn responsible_role_for(
        &self,
        _query: AssignmentQuery<'_>,
    ) -> Result<Option<Role>, AssignmentError> {
        Ok(None)
    }
}

/// Uses the role hint carried by the route into the destination view.
#[derive(Debug, Default, Clone, Copy)]
pub struct RouteRoleHintPolicy;

#[async_trait]
impl AssignmentPolicy for RouteRoleHintPolicy {
    fn name(&self) -> &'static str {
        "route-hint"
    }

    async fn responsible_role_for(
        &self,
        query: AssignmentQuery<'_>,
    ) -> Result<Option<Role>, AssignmentError> {
        Ok(query.route.role.clone())
    }
}

/// Fixed `workflow -> view name -> role` table, usually from `stageflow.toml`.
#[derive(Debug, Default, Clone)]
pub struct StaticAssignmentPolicy {
    table: IndexMap<WorkflowId, IndexMap<String, Role>>,
}

impl StaticAssignmentPolicy {
    pub fn new(table: IndexMap<WorkflowId, IndexMap<String, Role>>) -> Self {
        Self { table }
    }

    pub fn assign(&mut self, workflow_id: WorkflowId, view_name: impl Into<String>, role: Role) {
        self.table
            .entry(workflow_id)
            .or_default()
            .insert(view_name.into(), role);
    }

    pub fn is_empty(&self) -> bool {
        self.table.values().all(|views| views.is_empty())
    }
}

#[async_trait]
impl AssignmentPolicy for StaticAssignmentPolicy {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn responsible_role_for(
        &self,
        query: AssignmentQuery<'_>,
    ) -> Result<Option<Role>, AssignmentError> {
        Ok(self
            .table
            .get(&query.workflow_id)
            .and_then(|views| views.get(&query.view.name))
            .cloned())
    }
}

/// Asks each policy in turn; the first role found wins. A failing policy is
/// logged and skipped.
#[derive(Clone, Default)]
pub struct ChainedPolicy {
    policies: Vec<Arc<dyn AssignmentPolicy>>,
}

impl ChainedPolicy {
    pub fn new(policies: Vec<Arc<dyn AssignmentPolicy>>) -> Self {
        Self { policies }
    }

    pub fn then(mut self, policy: Arc<dyn AssignmentPolicy>) -> Self {
        self.policies.push(policy);
        self
    }
}

#[async_trait]
impl AssignmentPolicy for ChainedPolicy {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn responsible_role_for(
        &self,
        query: AssignmentQuery<'_>,
    ) -> Result<Option<Role>, AssignmentError> {
        for policy in &self.policies {
            match policy.responsible_role_for(query).await {
                Ok(Some(role)) => return Ok(Some(role)),
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(
                        policy = policy.name(),
                        view = %query.view.name,
                        "assignment policy failed, trying next: {}",
                        err
                    );
                }
            }
        }
        Ok(None)
    }
}
