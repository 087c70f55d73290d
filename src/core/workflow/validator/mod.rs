//! Well-formedness checks a workflow definition must pass before instances
//! may be created against it.

use crate::core::workflow::schema::{ViewId, WorkflowDefinition, WorkflowId};
use serde::Serialize;
use std::fmt;

pub mod rules;
pub use rules::built_in_rules;

/// Classification of a definition defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DefinitionErrorKind {
    MissingEntryPoint,
    DuplicateEntryPoint,
    ForeignReference,
    UnknownReference,
    DuplicateId,
    DuplicateStateName,
    AmbiguousRoute,
    UnreachableView,
}

impl DefinitionErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            DefinitionErrorKind::MissingEntryPoint => "MISSING_ENTRY_POINT",
            DefinitionErrorKind::DuplicateEntryPoint => "DUPLICATE_ENTRY_POINT",
            DefinitionErrorKind::ForeignReference => "FOREIGN_REFERENCE",
            DefinitionErrorKind::UnknownReference => "UNKNOWN_REFERENCE",
            DefinitionErrorKind::DuplicateId => "DUPLICATE_ID",
            DefinitionErrorKind::DuplicateStateName => "DUPLICATE_STATE_NAME",
            DefinitionErrorKind::AmbiguousRoute => "AMBIGUOUS_ROUTE",
            DefinitionErrorKind::UnreachableView => "UNREACHABLE_VIEW",
        }
    }
}

impl fmt::Display for DefinitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One validation failure. Fatal: a definition carrying any of these cannot
/// be activated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct DefinitionError {
    #[serde(rename = "code")]
    pub kind: DefinitionErrorKind,
    pub message: String,
    pub location: Option<String>,
}

impl DefinitionError {
    pub fn new(
        kind: DefinitionErrorKind,
        message: impl Into<String>,
        location: Option<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            location,
        }
    }
}

/// Facts established by earlier rules and consumed by later ones.
#[derive(Debug, Default)]
pub struct ValidationState {
    /// Entry view resolved by the entry-point rule, if exactly one exists.
    pub entry_view: Option<ViewId>,
}

/// A single check run by [`GraphValidator`].
pub trait DefinitionRule: Send + Sync {
    fn check(
        &self,
        definition: &WorkflowDefinition,
        state: &mut ValidationState,
    ) -> Vec<DefinitionError>;
}

/// Outcome of validating one definition.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub workflow_id: WorkflowId,
    pub entry_view: Option<ViewId>,
    pub errors: Vec<DefinitionError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors of the given kind, in report order.
    pub fn errors_of(&self, kind: DefinitionErrorKind) -> impl Iterator<Item = &DefinitionError> {
        self.errors.iter().filter(move |err| err.kind == kind)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "workflow {} has {} definition error(s)",
            self.workflow_id,
            self.errors.len()
        )?;
        for err in &self.errors {
            write!(f, "\n  - {}", err)?;
        }
        Ok(())
    }
}

/// Runs the built-in rules in a fixed order: entry point, workflow
/// membership, row identity, route ambiguity, reachability.
pub struct GraphValidator {
    rules: Vec<Box<dyn DefinitionRule>>,
}

impl GraphValidator {
    pub fn new() -> Self {
        Self {
            rules: built_in_rules(),
        }
    }

    /// Validate a definition, collecting every error rather than stopping at
    /// the first.
    pub fn validate(&self, definition: &WorkflowDefinition) -> ValidationReport {
        let mut state = ValidationState::default();
        let mut errors = Vec::new();
        for rule in &self.rules {
            errors.extend(rule.check(definition, &mut state));
        }
        tracing::debug!(
            workflow_id = %definition.id(),
            errors = errors.len(),
            "validated workflow definition"
        );
        ValidationReport {
            workflow_id: definition.id(),
            entry_view: state.entry_view,
            errors,
        }
    }
}

impl Default for GraphValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for `GraphValidator::new().validate(definition)`.
pub fn validate(definition: &WorkflowDefinition) -> ValidationReport {
    GraphValidator::new().validate(definition)
}
