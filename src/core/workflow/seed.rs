//! Bundled sample definitions used by `stageflow init` and the test suite.

use crate::core::workflow::schema::{
    Role, RouteId, RouteRecord, StateId, StateRecord, ViewId, ViewRecord, WorkflowDefinition,
    WorkflowId, WorkflowRecord,
};

fn build(
    id: i64,
    name: &str,
    views: &[&str],
    states: &[&str],
    routes: &[(i64, i64, i64, Option<&str>)],
) -> WorkflowDefinition {
    let workflow_id = WorkflowId(id);
    WorkflowDefinition {
        workflow: WorkflowRecord {
            id: workflow_id,
            name: name.to_string(),
        },
        views: views
            .iter()
            .zip(1..)
            .map(|(name, id)| ViewRecord {
                id: ViewId(id),
                workflow_id,
                name: name.to_string(),
            })
            .collect(),
        states: states
            .iter()
            .zip(1..)
            .map(|(name, id)| StateRecord {
                id: StateId(id),
                workflow_id,
                name: name.to_string(),
            })
            .collect(),
        routes: routes
            .iter()
            .zip(1..)
            .map(|((view, state, next, role), id)| RouteRecord {
                id: RouteId(id),
                workflow_id,
                view_id: ViewId(*view),
                state_id: StateId(*state),
                next_view_id: ViewId(*next),
                start_sign: id == 1,
                role: role.map(Role::from),
            })
            .collect(),
    }
}

/// Multi-step application form: personal details, citizenship branch,
/// payment with a retry loop, then review.
pub fn application_workflow() -> WorkflowDefinition {
    build(
        1,
        "A Good Workflow",
        &[
            "START",
            "DETAILS",
            "PURPOSE",
            "TYPE",
            "MARITAL",
            "EMPLOYMENT",
            "CITIZEN_TCUK_OR_OTHERS",
            "CITIZEN_TCUK",
            "CITIZEN_OTHERS",
            "CITIZEN_TC",
            "CITIZEN_UK",
            "PAYMENT",
            "COMPLETED",
            "END",
        ],
        &[
            "CONTINUE",
            "SUBMIT",
            "YES",
            "NO",
            "PAYMENT_SUCCEEDED",
            "PAYMENT_FAILED",
            "PASS",
            "FAIL",
        ],
        &[
            (1, 1, 2, None),
            (2, 2, 3, None),
            (3, 2, 4, None),
            (4, 2, 5, None),
            (5, 2, 6, None),
            (6, 2, 7, None),
            (7, 3, 8, None),
            (7, 4, 9, None),
            (8, 3, 10, None),
            (8, 4, 11, None),
            (10, 2, 12, None),
            (11, 2, 12, None),
            (9, 2, 12, None),
            (12, 5, 13, None),
            (12, 6, 12, None),
            (13, 7, 14, None),
            (13, 8, 14, None),
        ],
    )
}

/// Recruitment pipeline: dispatch a candidate, run a test, then review.
/// `HOLD` sends a candidate under test back to dispatch.
pub fn recruitment_workflow() -> WorkflowDefinition {
    build(
        2,
        "Recruitment",
        &["START", "DISPATCH", "TEST", "END"],
        &["CONTINUE", "SUBMIT", "PASS", "FAIL", "HOLD"],
        &[
            (1, 1, 2, Some("dispatcher")),
            (2, 2, 3, Some("candidate")),
            (3, 3, 4, Some("reviewer")),
            (3, 4, 4, Some("reviewer")),
            (3, 5, 2, Some("dispatcher")),
        ],
    )
}
