//! Read-only graph analysis shown by `stageflow inspect`.

use crate::core::workflow::snapshot::WorkflowSnapshot;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewSummary {
    pub name: String,
    pub states: Vec<String>,
    pub terminal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphInspection {
    pub workflow: String,
    pub version: String,
    pub entry_view: String,
    pub terminal_views: Vec<String>,
    /// Each cycle is a set of view names, sorted.
    pub cycles: Vec<Vec<String>>,
    pub views: Vec<ViewSummary>,
}

pub fn inspect(snapshot: &WorkflowSnapshot) -> GraphInspection {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut nodes: HashMap<_, NodeIndex> = HashMap::new();
    for view in snapshot.views() {
        nodes.insert(view.id, graph.add_node(view.name.as_str()));
    }
    for route in snapshot.routes() {
        graph.add_edge(nodes[&route.from], nodes[&route.to], ());
    }

    // Views that can revisit themselves: components larger than one, or a
    // single view with a self-loop.
    let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || graph.find_edge(component[0], component[0]).is_some()
        })
        .map(|component| {
            let mut names: Vec<String> = component
                .into_iter()
                .map(|idx| graph[idx].to_string())
                .collect();
            names.sort();
            names
        })
        .collect();
    cycles.sort();

    let views = snapshot
        .views()
        .iter()
        .map(|view| ViewSummary {
            name: view.name.clone(),
            states: snapshot
                .available_states(view.id)
                .into_iter()
                .map(|state| state.name.clone())
                .collect(),
            terminal: snapshot.is_terminal(view.id),
        })
        .collect();

    GraphInspection {
        workflow: format!("{} ({})", snapshot.name(), snapshot.id()),
        version: snapshot.version().to_string(),
        entry_view: snapshot.entry_view().name.clone(),
        terminal_views: snapshot
            .terminal_views()
            .map(|view| view.name.clone())
            .collect(),
        cycles,
        views,
    }
}

impl fmt::Display for GraphInspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "workflow: {}", self.workflow)?;
        writeln!(f, "version:  {}", self.version)?;
        writeln!(f, "entry:    {}", self.entry_view)?;
        writeln!(f, "terminal: {}", self.terminal_views.join(", "))?;
        if self.cycles.is_empty() {
            writeln!(f, "cycles:   none")?;
        } else {
            for cycle in &self.cycles {
                writeln!(f, "cycle:    {}", cycle.join(" <-> "))?;
            }
        }
        writeln!(f, "views:")?;
        for view in &self.views {
            if view.terminal {
                writeln!(f, "  {} (terminal)", view.name)?;
            } else {
                writeln!(f, "  {}: {}", view.name, view.states.join(", "))?;
            }
        }
        Ok(())
    }
}
