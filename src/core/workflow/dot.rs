use crate::core::workflow::schema::{StateId, ViewId, WorkflowDefinition};
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::fmt;

/// Node weight carrying the view's display label.
struct ViewNode {
    id: ViewId,
    name: String,
}

impl fmt::Display for ViewNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.name, self.id)
    }
}

/// Edge weight: the state that triggers the route.
struct StateEdge {
    label: String,
}

impl fmt::Display for StateEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Render the definition as Graphviz DOT; petgraph escapes the labels.
/// Routes naming unknown views are left out so broken drafts still draw.
pub fn definition_to_dot(definition: &WorkflowDefinition) -> String {
    let mut graph: DiGraph<ViewNode, StateEdge> = DiGraph::new();
    let mut nodes: HashMap<ViewId, NodeIndex> = HashMap::new();
    for view in &definition.views {
        nodes.entry(view.id).or_insert_with(|| {
            graph.add_node(ViewNode {
                id: view.id,
                name: view.name.clone(),
            })
        });
    }

    let state_names: HashMap<StateId, &str> = definition
        .states
        .iter()
        .map(|state| (state.id, state.name.as_str()))
        .collect();

    let mut routes: Vec<_> = definition.routes.iter().collect();
    routes.sort_by_key(|route| route.id);
    for route in routes {
        let (Some(&from), Some(&to)) = (nodes.get(&route.view_id), nodes.get(&route.next_view_id))
        else {
            continue;
        };
        let mut label = state_names
            .get(&route.state_id)
            .map(|name| name.to_string())
            .unwrap_or_else(|| format!("state #{}", route.state_id));
        if let Some(role) = &route.role {
            label.push_str(&format!(" [{}]", role));
        }
        graph.add_edge(from, to, StateEdge { label });
    }

    format!("{}", Dot::new(&graph))
}
