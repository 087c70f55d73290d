#![allow(clippy::result_large_err)] // Schema APIs return AppError to preserve structured validation context without boxing.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

const SUPPORTED_VERSION: &str = "1";

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                $name(value)
            }
        }
    };
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name(value)
            }
        }
    };
}

integer_id!(
    /// Identifier of a published workflow definition.
    WorkflowId
);
integer_id!(
    /// Identifier of a view (stage) row.
    ViewId
);
integer_id!(
    /// Identifier of a state (trigger) row.
    StateId
);
integer_id!(RouteId);

string_id!(
    /// Opaque identifier of a running instance.
    InstanceId
);
string_id!(
    /// Identifier of whoever applied a state to an instance.
    Actor
);
string_id!(
    /// Role responsible for acting on a view.
    Role
);

impl InstanceId {
    /// Generate a fresh random instance id.
    pub fn generate() -> Self {
        InstanceId(uuid::Uuid::new_v4().to_string())
    }
}

/// Workflow header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: WorkflowId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRecord {
    pub id: ViewId,
    pub workflow_id: WorkflowId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub id: StateId,
    pub workflow_id: WorkflowId,
    pub name: String,
}

/// Directed edge `(view_id, state_id) -> next_view_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub id: RouteId,
    pub workflow_id: WorkflowId,
    pub view_id: ViewId,
    pub state_id: StateId,
    pub next_view_id: ViewId,
    #[serde(default)]
    pub start_sign: bool,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Raw workflow definition as handed over by the persistence layer.
///
/// Nothing here is checked yet; run it through
/// [`GraphValidator`](crate::core::workflow::validator::GraphValidator) or
/// [`WorkflowSnapshot::activate`](crate::core::workflow::snapshot::WorkflowSnapshot::activate)
/// before routing against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub workflow: WorkflowRecord,
    #[serde(default)]
    pub views: Vec<ViewRecord>,
    #[serde(default)]
    pub states: Vec<StateRecord>,
    #[serde(default)]
    pub routes: Vec<RouteRecord>,
}

impl WorkflowDefinition {
    pub fn id(&self) -> WorkflowId {
        self.workflow.id
    }
}

/// Root YAML document for an authored workflow definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowDocument {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<WorkflowMetadata>,
    pub workflow: WorkflowRecord,
    #[serde(default)]
    pub views: Vec<ViewRow>,
    #[serde(default)]
    pub states: Vec<StateRow>,
    #[serde(default)]
    pub routes: Vec<RouteRow>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowMetadata {
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewRow {
    pub id: ViewId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateRow {
    pub id: StateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteRow {
    pub id: RouteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    pub view: ViewId,
    pub state: StateId,
    pub next: ViewId,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub start: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl WorkflowDocument {
    /// Load a workflow document from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self, AppError> {
        let text = fs::read_to_string(path).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to read {}: {}", path.display(), err),
            )
        })?;
        Self::parse_str(&text).map_err(|err| err.with_context("file", path.display().to_string()))
    }

    /// Parse a workflow document from YAML text.
    pub fn parse_str(text: &str) -> Result<Self, AppError> {
        let doc: WorkflowDocument = serde_yaml::from_str(text).map_err(|err| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("failed to parse workflow document: {}", err),
            )
            .with_code("SF-DOC-001")
        })?;
        if doc.version != SUPPORTED_VERSION {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "unsupported workflow document version {}, expected {}",
                    doc.version, SUPPORTED_VERSION
                ),
            )
            .with_code("SF-DOC-002"));
        }
        Ok(doc)
    }

    /// Flatten the document into definition rows, stamping the document's
    /// workflow id onto rows that omit one.
    pub fn into_definition(self) -> WorkflowDefinition {
        let owner = self.workflow.id;
        WorkflowDefinition {
            views: self
                .views
                .into_iter()
                .map(|row| ViewRecord {
                    id: row.id,
                    workflow_id: row.workflow_id.unwrap_or(owner),
                    name: row.name,
                })
                .collect(),
            states: self
                .states
                .into_iter()
                .map(|row| StateRecord {
                    id: row.id,
                    workflow_id: row.workflow_id.unwrap_or(owner),
                    name: row.name,
                })
                .collect(),
            routes: self
                .routes
                .into_iter()
                .map(|row| RouteRecord {
                    id: row.id,
                    workflow_id: row.workflow_id.unwrap_or(owner),
                    view_id: row.view,
                    state_id: row.state,
                    next_view_id: row.next,
                    start_sign: row.start,
                    role: row.role,
                })
                .collect(),
            workflow: self.workflow,
        }
    }

    /// Build a document carrying every row's workflow id explicitly.
    pub fn from_definition(definition: &WorkflowDefinition) -> Self {
        WorkflowDocument {
            version: SUPPORTED_VERSION.to_string(),
            metadata: None,
            workflow: definition.workflow.clone(),
            views: definition
                .views
                .iter()
                .map(|view| ViewRow {
                    id: view.id,
                    workflow_id: Some(view.workflow_id),
                    name: view.name.clone(),
                })
                .collect(),
            states: definition
                .states
                .iter()
                .map(|state| StateRow {
                    id: state.id,
                    workflow_id: Some(state.workflow_id),
                    name: state.name.clone(),
                })
                .collect(),
            routes: definition
                .routes
                .iter()
                .map(|route| RouteRow {
                    id: route.id,
                    workflow_id: Some(route.workflow_id),
                    view: route.view_id,
                    state: route.state_id,
                    next: route.next_view_id,
                    start: route.start_sign,
                    role: route.role.clone(),
                })
                .collect(),
        }
    }

    pub fn to_yaml(&self) -> Result<String, AppError> {
        serde_yaml::to_string(self).map_err(|err| {
            AppError::new(
                ErrorCategory::SerializationError,
                format!("failed to serialize workflow document: {}", err),
            )
        })
    }
}

/// Load a workflow definition straight from a YAML file.
pub fn load_definition(path: &Path) -> Result<WorkflowDefinition, AppError> {
    WorkflowDocument::load_from_file(path).map(WorkflowDocument::into_definition)
}
