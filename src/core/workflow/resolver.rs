use crate::core::workflow::schema::{StateId, ViewId, WorkflowId};
use crate::core::workflow::snapshot::Route;
use std::collections::HashMap;

/// No route leaves `view` for `state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("workflow {workflow} has no route from view {view} for state {state}")]
pub struct NoMatchingRoute {
    pub workflow: WorkflowId,
    pub view: ViewId,
    pub state: StateId,
}

/// Precomputed `(from view, state) -> destination view` table.
///
/// Read-only after construction; share it freely across tasks.
#[derive(Debug, Clone)]
pub struct RouteResolver {
    workflow: WorkflowId,
    table: HashMap<(ViewId, StateId), ViewId>,
}

impl RouteResolver {
    /// Build the table from validated routes. Validation rules out duplicate
    /// keys; should one slip through, the lowest route id keeps the key.
    pub fn new(workflow: WorkflowId, routes: &[Route]) -> Self {
        let mut table = HashMap::with_capacity(routes.len());
        for route in routes {
            table.entry((route.from, route.state)).or_insert(route.to);
        }
        Self { workflow, table }
    }

    pub fn resolve(&self, current: ViewId, state: StateId) -> Result<ViewId, NoMatchingRoute> {
        self.table
            .get(&(current, state))
            .copied()
            .ok_or(NoMatchingRoute {
                workflow: self.workflow,
                view: current,
                state,
            })
    }
}
