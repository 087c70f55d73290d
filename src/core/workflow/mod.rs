//! The workflow graph engine: definitions, validation, routing and the
//! transition pipeline that moves instances between views.

pub mod assignment;
pub mod coordinator;
pub mod dot;
pub mod inspect;
pub mod ledger;
pub mod resolver;
pub mod schema;
pub mod seed;
pub mod service;
pub mod snapshot;
pub mod validator;

pub use assignment::{
    AssignmentError, AssignmentPolicy, AssignmentQuery, ChainedPolicy, NoAssignment,
    RouteRoleHintPolicy, StaticAssignmentPolicy,
};
pub use coordinator::{Advance, AdvanceError, TransitionCoordinator};
pub use ledger::{History, InstanceLedger, LedgerError, Position};
pub use resolver::{NoMatchingRoute, RouteResolver};
pub use schema::{
    Actor, InstanceId, Role, RouteId, StateId, ViewId, WorkflowDefinition, WorkflowDocument,
    WorkflowId,
};
pub use service::{AdvanceRequest, AdvanceResponse, PositionResponse, WorkflowService};
pub use snapshot::WorkflowSnapshot;
pub use validator::{DefinitionError, DefinitionErrorKind, GraphValidator, ValidationReport};
