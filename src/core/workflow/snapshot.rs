//! Immutable, validated form of a workflow definition.
//!
//! Views, states and routes live in flat vectors and refer to each other by
//! slot index, so the snapshot owns no cross references and can be shared
//! behind an `Arc` by any number of readers.

use crate::core::workflow::resolver::RouteResolver;
use crate::core::workflow::schema::{
    Role, RouteId, StateId, ViewId, WorkflowDefinition, WorkflowId, WorkflowRecord,
};
use crate::core::workflow::validator::{GraphValidator, ValidationReport};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub id: ViewId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub id: StateId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub id: RouteId,
    pub from: ViewId,
    pub state: StateId,
    pub to: ViewId,
    pub role: Option<Role>,
}

#[derive(Debug)]
pub struct WorkflowSnapshot {
    workflow: WorkflowRecord,
    version: String,
    views: Vec<View>,
    states: Vec<State>,
    routes: Vec<Route>,
    view_slots: HashMap<ViewId, usize>,
    state_slots: HashMap<StateId, usize>,
    state_names: HashMap<String, usize>,
    outgoing: Vec<Vec<usize>>,
    entry: usize,
    resolver: RouteResolver,
}

impl WorkflowSnapshot {
    /// Validate `definition` and freeze it into a snapshot.
    pub fn activate(definition: &WorkflowDefinition) -> Result<Self, ValidationReport> {
        let report = GraphValidator::new().validate(definition);
        let entry_view = match report.entry_view {
            Some(entry) if report.is_valid() => entry,
            _ => return Err(report),
        };
        Ok(Self::build(definition, entry_view))
    }

    fn build(definition: &WorkflowDefinition, entry_view: ViewId) -> Self {
        let views: Vec<View> = definition
            .views
            .iter()
            .map(|row| View {
                id: row.id,
                name: row.name.clone(),
            })
            .collect();
        let states: Vec<State> = definition
            .states
            .iter()
            .map(|row| State {
                id: row.id,
                name: row.name.clone(),
            })
            .collect();
        let mut routes: Vec<Route> = definition
            .routes
            .iter()
            .map(|row| Route {
                id: row.id,
                from: row.view_id,
                state: row.state_id,
                to: row.next_view_id,
                role: row.role.clone(),
            })
            .collect();
        routes.sort_by_key(|route| route.id);

        let view_slots: HashMap<ViewId, usize> = views
            .iter()
            .enumerate()
            .map(|(slot, view)| (view.id, slot))
            .collect();
        let state_slots: HashMap<StateId, usize> = states
            .iter()
            .enumerate()
            .map(|(slot, state)| (state.id, slot))
            .collect();
        let state_names = states
            .iter()
            .enumerate()
            .map(|(slot, state)| (state.name.clone(), slot))
            .collect();

        let mut outgoing = vec![Vec::new(); views.len()];
        for (index, route) in routes.iter().enumerate() {
            outgoing[view_slots[&route.from]].push(index);
        }

        let resolver = RouteResolver::new(definition.id(), &routes);
        Self {
            version: definition_version(definition),
            workflow: definition.workflow.clone(),
            entry: view_slots[&entry_view],
            views,
            states,
            routes,
            view_slots,
            state_slots,
            state_names,
            outgoing,
            resolver,
        }
    }

    pub fn id(&self) -> WorkflowId {
        self.workflow.id
    }

    pub fn name(&self) -> &str {
        &self.workflow.name
    }

    /// Content hash of the definition this snapshot was built from.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn resolver(&self) -> &RouteResolver {
        &self.resolver
    }

    pub fn entry_view(&self) -> &View {
        &self.views[self.entry]
    }

    pub fn view(&self, id: ViewId) -> Option<&View> {
        self.view_slots.get(&id).map(|slot| &self.views[*slot])
    }

    pub fn view_by_name(&self, name: &str) -> Option<&View> {
        self.views.iter().find(|view| view.name == name)
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.state_slots.get(&id).map(|slot| &self.states[*slot])
    }

    pub fn state_by_name(&self, name: &str) -> Option<&State> {
        self.state_names.get(name).map(|slot| &self.states[*slot])
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Routes leaving `view`, ordered by route id.
    pub fn outgoing(&self, view: ViewId) -> impl Iterator<Item = &Route> {
        self.view_slots
            .get(&view)
            .map(|slot| self.outgoing[*slot].as_slice())
            .unwrap_or_default()
            .iter()
            .map(|index| &self.routes[*index])
    }

    /// The route taken from `from` when `state` is applied.
    pub fn route_for(&self, from: ViewId, state: StateId) -> Option<&Route> {
        self.outgoing(from).find(|route| route.state == state)
    }

    /// A view with no outgoing routes ends the instance's lifecycle. Views
    /// this definition does not contain are never terminal.
    pub fn is_terminal(&self, view: ViewId) -> bool {
        self.view_slots
            .get(&view)
            .is_some_and(|slot| self.outgoing[*slot].is_empty())
    }

    pub fn terminal_views(&self) -> impl Iterator<Item = &View> {
        self.views
            .iter()
            .enumerate()
            .filter(|(slot, _)| self.outgoing[*slot].is_empty())
            .map(|(_, view)| view)
    }

    /// States that have a route out of `view`, sorted by name.
    pub fn available_states(&self, view: ViewId) -> Vec<&State> {
        let mut states: Vec<&State> = self
            .outgoing(view)
            .filter_map(|route| self.state(route.state))
            .collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }
}

/// SHA-256 over a canonical line rendering of every row, sorted by id, so
/// row order in the source document does not change the version.
pub fn definition_version(definition: &WorkflowDefinition) -> String {
    let mut lines = vec![format!(
        "workflow|{}|{}",
        definition.workflow.id, definition.workflow.name
    )];
    let mut views: Vec<_> = definition.views.iter().collect();
    views.sort_by_key(|view| view.id);
    lines.extend(
        views
            .into_iter()
            .map(|view| format!("view|{}|{}|{}", view.id, view.workflow_id, view.name)),
    );
    let mut states: Vec<_> = definition.states.iter().collect();
    states.sort_by_key(|state| state.id);
    lines.extend(
        states
            .into_iter()
            .map(|state| format!("state|{}|{}|{}", state.id, state.workflow_id, state.name)),
    );
    let mut routes: Vec<_> = definition.routes.iter().collect();
    routes.sort_by_key(|route| route.id);
    lines.extend(routes.into_iter().map(|route| {
        format!(
            "route|{}|{}|{}|{}|{}|{}|{}",
            route.id,
            route.workflow_id,
            route.view_id,
            route.state_id,
            route.next_view_id,
            route.start_sign,
            route.role.as_ref().map(|role| role.as_str()).unwrap_or("")
        )
    }));

    let mut hasher = Sha256::new();
    hasher.update(lines.join("\n").as_bytes());
    hex::encode(hasher.finalize())
}
