use super::{DefinitionError, DefinitionErrorKind, DefinitionRule, ValidationState};
use crate::core::workflow::schema::{ViewId, WorkflowDefinition};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use std::collections::{BTreeMap, HashMap, HashSet};

pub fn built_in_rules() -> Vec<Box<dyn DefinitionRule>> {
    vec![
        Box::new(EntryPointRule),
        Box::new(WorkflowMembershipRule),
        Box::new(RowIdentityRule),
        Box::new(AmbiguousRouteRule),
        Box::new(ReachabilityRule),
    ]
}

fn view_label(definition: &WorkflowDefinition, id: ViewId) -> String {
    definition
        .views
        .iter()
        .find(|view| view.id == id)
        .map(|view| format!("view {} ({})", id, view.name))
        .unwrap_or_else(|| format!("view {}", id))
}

/// Views of this workflow, keyed by id.
fn owned_views(definition: &WorkflowDefinition) -> HashSet<ViewId> {
    definition
        .views
        .iter()
        .filter(|view| view.workflow_id == definition.id())
        .map(|view| view.id)
        .collect()
}

struct EntryPointRule;

impl DefinitionRule for EntryPointRule {
    fn check(
        &self,
        definition: &WorkflowDefinition,
        state: &mut ValidationState,
    ) -> Vec<DefinitionError> {
        let marked: Vec<_> = definition
            .routes
            .iter()
            .filter(|route| route.start_sign)
            .collect();

        match marked.as_slice() {
            [route] => {
                if owned_views(definition).contains(&route.view_id) {
                    state.entry_view = Some(route.view_id);
                }
                Vec::new()
            }
            [] => self.detect_source_view(definition, state),
            many => {
                let ids: Vec<String> = many.iter().map(|route| route.id.to_string()).collect();
                vec![DefinitionError::new(
                    DefinitionErrorKind::DuplicateEntryPoint,
                    format!(
                        "{} routes are marked as the entry point (routes {})",
                        many.len(),
                        ids.join(", ")
                    ),
                    Some(format!("routes {}", ids.join(", "))),
                )]
            }
        }
    }
}

impl EntryPointRule {
    /// Without a marked route the entry is the unique view with no incoming
    /// routes and at least one outgoing route.
    fn detect_source_view(
        &self,
        definition: &WorkflowDefinition,
        state: &mut ValidationState,
    ) -> Vec<DefinitionError> {
        let mut incoming: HashMap<ViewId, usize> = HashMap::new();
        let mut outgoing: HashMap<ViewId, usize> = HashMap::new();
        for route in &definition.routes {
            *outgoing.entry(route.view_id).or_default() += 1;
            *incoming.entry(route.next_view_id).or_default() += 1;
        }

        let mut sources: Vec<ViewId> = owned_views(definition)
            .into_iter()
            .filter(|id| incoming.get(id).copied().unwrap_or(0) == 0)
            .filter(|id| outgoing.get(id).copied().unwrap_or(0) > 0)
            .collect();
        sources.sort();

        match sources.as_slice() {
            [entry] => {
                state.entry_view = Some(*entry);
                Vec::new()
            }
            [] => vec![DefinitionError::new(
                DefinitionErrorKind::MissingEntryPoint,
                "no route is marked as the entry point and no view qualifies as a start view",
                None,
            )],
            many => {
                let labels: Vec<String> =
                    many.iter().map(|id| view_label(definition, *id)).collect();
                vec![DefinitionError::new(
                    DefinitionErrorKind::DuplicateEntryPoint,
                    format!(
                        "no route is marked as the entry point and several views could start the workflow: {}",
                        labels.join(", ")
                    ),
                    None,
                )]
            }
        }
    }
}

struct WorkflowMembershipRule;

impl DefinitionRule for WorkflowMembershipRule {
    fn check(
        &self,
        definition: &WorkflowDefinition,
        _state: &mut ValidationState,
    ) -> Vec<DefinitionError> {
        let owner = definition.id();
        let views: HashMap<_, _> = definition
            .views
            .iter()
            .map(|view| (view.id, view.workflow_id))
            .collect();
        let states: HashMap<_, _> = definition
            .states
            .iter()
            .map(|state| (state.id, state.workflow_id))
            .collect();

        let mut out = Vec::new();
        for view in &definition.views {
            if view.workflow_id != owner {
                out.push(DefinitionError::new(
                    DefinitionErrorKind::ForeignReference,
                    format!(
                        "view {} ({}) belongs to workflow {}, not {}",
                        view.id, view.name, view.workflow_id, owner
                    ),
                    Some(format!("view {}", view.id)),
                ));
            }
        }
        for state in &definition.states {
            if state.workflow_id != owner {
                out.push(DefinitionError::new(
                    DefinitionErrorKind::ForeignReference,
                    format!(
                        "state {} ({}) belongs to workflow {}, not {}",
                        state.id, state.name, state.workflow_id, owner
                    ),
                    Some(format!("state {}", state.id)),
                ));
            }
        }

        for route in &definition.routes {
            let location = Some(format!("route {}", route.id));
            if route.workflow_id != owner {
                out.push(DefinitionError::new(
                    DefinitionErrorKind::ForeignReference,
                    format!(
                        "route {} belongs to workflow {}, not {}",
                        route.id, route.workflow_id, owner
                    ),
                    location.clone(),
                ));
            }
            for (field, id) in [("from", route.view_id), ("to", route.next_view_id)] {
                match views.get(&id) {
                    None => out.push(DefinitionError::new(
                        DefinitionErrorKind::UnknownReference,
                        format!("route {} {} view {} does not exist", route.id, field, id),
                        location.clone(),
                    )),
                    Some(workflow) if *workflow != owner => out.push(DefinitionError::new(
                        DefinitionErrorKind::ForeignReference,
                        format!(
                            "route {} {} view {} belongs to workflow {}",
                            route.id, field, id, workflow
                        ),
                        location.clone(),
                    )),
                    Some(_) => {}
                }
            }
            match states.get(&route.state_id) {
                None => out.push(DefinitionError::new(
                    DefinitionErrorKind::UnknownReference,
                    format!(
                        "route {} state {} does not exist",
                        route.id, route.state_id
                    ),
                    location.clone(),
                )),
                Some(workflow) if *workflow != owner => out.push(DefinitionError::new(
                    DefinitionErrorKind::ForeignReference,
                    format!(
                        "route {} state {} belongs to workflow {}",
                        route.id, route.state_id, workflow
                    ),
                    location,
                )),
                Some(_) => {}
            }
        }
        out
    }
}

struct RowIdentityRule;

impl DefinitionRule for RowIdentityRule {
    fn check(
        &self,
        definition: &WorkflowDefinition,
        _state: &mut ValidationState,
    ) -> Vec<DefinitionError> {
        let mut out = Vec::new();
        duplicates(definition.views.iter().map(|view| view.id.0), "view", &mut out);
        duplicates(
            definition.states.iter().map(|state| state.id.0),
            "state",
            &mut out,
        );
        duplicates(
            definition.routes.iter().map(|route| route.id.0),
            "route",
            &mut out,
        );

        let mut names: BTreeMap<&str, usize> = BTreeMap::new();
        for state in &definition.states {
            *names.entry(state.name.as_str()).or_default() += 1;
        }
        for (name, count) in names {
            if count > 1 {
                out.push(DefinitionError::new(
                    DefinitionErrorKind::DuplicateStateName,
                    format!("state name '{}' is used {} times", name, count),
                    Some(format!("state {}", name)),
                ));
            }
        }
        out
    }
}

fn duplicates(ids: impl Iterator<Item = i64>, kind: &str, out: &mut Vec<DefinitionError>) {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for id in ids {
        *counts.entry(id).or_default() += 1;
    }
    for (id, count) in counts {
        if count > 1 {
            out.push(DefinitionError::new(
                DefinitionErrorKind::DuplicateId,
                format!("{} id {} appears {} times", kind, id, count),
                Some(format!("{} {}", kind, id)),
            ));
        }
    }
}

struct AmbiguousRouteRule;

impl DefinitionRule for AmbiguousRouteRule {
    fn check(
        &self,
        definition: &WorkflowDefinition,
        _state: &mut ValidationState,
    ) -> Vec<DefinitionError> {
        let mut keyed: BTreeMap<(ViewId, _), Vec<String>> = BTreeMap::new();
        for route in &definition.routes {
            keyed
                .entry((route.view_id, route.state_id))
                .or_default()
                .push(route.id.to_string());
        }

        let mut out = Vec::new();
        for ((view, state), route_ids) in keyed {
            if route_ids.len() > 1 {
                out.push(DefinitionError::new(
                    DefinitionErrorKind::AmbiguousRoute,
                    format!(
                        "{} has {} routes for state {} (routes {})",
                        view_label(definition, view),
                        route_ids.len(),
                        state,
                        route_ids.join(", ")
                    ),
                    Some(format!("view {}", view)),
                ));
            }
        }
        out
    }
}

struct ReachabilityRule;

impl DefinitionRule for ReachabilityRule {
    fn check(
        &self,
        definition: &WorkflowDefinition,
        state: &mut ValidationState,
    ) -> Vec<DefinitionError> {
        let Some(entry) = state.entry_view else {
            return Vec::new();
        };

        let mut graph: DiGraph<ViewId, ()> = DiGraph::new();
        let mut nodes: HashMap<ViewId, NodeIndex> = HashMap::new();
        let mut ids: Vec<ViewId> = owned_views(definition).into_iter().collect();
        ids.sort();
        for id in &ids {
            nodes.insert(*id, graph.add_node(*id));
        }
        let mut connected: HashSet<ViewId> = HashSet::new();
        for route in &definition.routes {
            if let (Some(&from), Some(&to)) =
                (nodes.get(&route.view_id), nodes.get(&route.next_view_id))
            {
                graph.add_edge(from, to, ());
                connected.insert(route.view_id);
                connected.insert(route.next_view_id);
            }
        }

        let mut reachable = HashSet::new();
        let mut bfs = Bfs::new(&graph, nodes[&entry]);
        while let Some(nx) = bfs.next(&graph) {
            reachable.insert(graph[nx]);
        }

        ids.into_iter()
            .filter(|id| connected.contains(id) && !reachable.contains(id))
            .map(|id| {
                DefinitionError::new(
                    DefinitionErrorKind::UnreachableView,
                    format!(
                        "{} is not reachable from the entry view",
                        view_label(definition, id)
                    ),
                    Some(format!("view {}", id)),
                )
            })
            .collect()
    }
}
