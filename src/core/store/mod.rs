//! Persistence collaborators consumed by the engine.
//!
//! The engine never talks to a database handle directly: definitions and
//! instance state arrive through these traits, injected as `Arc<dyn ...>`.

mod file;
mod memory;

pub use file::{FileStore, FileStorePaths};
pub use memory::MemoryStore;

use crate::core::workflow::schema::{
    Actor, InstanceId, StateId, ViewId, WorkflowDefinition, WorkflowId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    #[default]
    Active,
    Terminal,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Active => "ACTIVE",
            InstanceStatus::Terminal => "TERMINAL",
        }
    }
}

/// Stored header of a running instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub workflow_id: WorkflowId,
    pub entry_view: ViewId,
    pub current_view: ViewId,
    pub status: InstanceStatus,
    pub last_sequence: u64,
    /// Version of the definition the instance was started on. Empty for
    /// records written before versions were stamped; those follow whatever
    /// definition is currently published.
    #[serde(default)]
    pub definition_version: String,
    pub created_at: DateTime<Utc>,
}

impl InstanceRecord {
    /// Fresh record positioned at the workflow's entry view.
    pub fn new(id: InstanceId, workflow_id: WorkflowId, entry_view: ViewId) -> Self {
        Self {
            id,
            workflow_id,
            entry_view,
            current_view: entry_view,
            status: InstanceStatus::Active,
            last_sequence: 0,
            definition_version: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_definition_version(mut self, version: impl Into<String>) -> Self {
        self.definition_version = version.into();
        self
    }
}

/// Immutable record of one executed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailEntry {
    pub instance_id: InstanceId,
    pub sequence: u64,
    pub from_view: ViewId,
    pub state: StateId,
    pub to_view: ViewId,
    pub actor: Actor,
    pub recorded_at: DateTime<Utc>,
}

/// Trail entry before the store has assigned its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailDraft {
    pub from_view: ViewId,
    pub state: StateId,
    pub to_view: ViewId,
    pub actor: Actor,
}

impl TrailDraft {
    pub fn seal(self, instance_id: InstanceId, sequence: u64) -> TrailEntry {
        TrailEntry {
            instance_id,
            sequence,
            from_view: self.from_view,
            state: self.state,
            to_view: self.to_view,
            actor: self.actor,
            recorded_at: Utc::now(),
        }
    }
}

/// Result of a conditional trail write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Committed(TrailEntry),
    /// The instance was no longer at the expected view; nothing was written.
    Conflict {
        actual: ViewId,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn instance_not_found(id: &InstanceId) -> Self {
        StoreError::NotFound {
            kind: "instance",
            id: id.to_string(),
        }
    }

    pub fn workflow_not_found(id: WorkflowId) -> Self {
        StoreError::NotFound {
            kind: "workflow",
            id: id.to_string(),
        }
    }

    pub fn workflow_version_not_found(id: WorkflowId, version: &str) -> Self {
        StoreError::NotFound {
            kind: "workflow version",
            id: format!("{}@{}", id, version),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for StoreError {
    fn from(err: serde_yaml::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Source of published workflow definitions.
#[async_trait]
pub trait DefinitionStore: Send + Sync + 'static {
    async fn load_workflow_definition(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<WorkflowDefinition, StoreError>;

    /// A definition exactly as it was published under `version`, including
    /// ones that have since been replaced.
    async fn load_workflow_definition_version(
        &self,
        workflow_id: WorkflowId,
        version: &str,
    ) -> Result<WorkflowDefinition, StoreError>;

    /// Store (or replace) a definition and keep it retrievable by version.
    /// Callers validate first.
    async fn publish_workflow_definition(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<(), StoreError>;
}

/// Instance headers and their append-only trails.
#[async_trait]
pub trait InstanceStore: Send + Sync + 'static {
    async fn create_instance(&self, record: InstanceRecord) -> Result<(), StoreError>;

    async fn load_instance(&self, instance_id: &InstanceId) -> Result<InstanceRecord, StoreError>;

    /// Append `draft` only if the instance currently sits at `expected_view`.
    ///
    /// Check and write form one atomic step: the next sequence number is
    /// assigned, the entry becomes visible and the instance's current view
    /// moves to `draft.to_view`, or nothing changes at all.
    async fn write_trail_entry_if_current_view_matches(
        &self,
        instance_id: &InstanceId,
        expected_view: ViewId,
        draft: TrailDraft,
    ) -> Result<WriteOutcome, StoreError>;

    /// Flag the instance TERMINAL. Idempotent.
    async fn mark_terminal(&self, instance_id: &InstanceId) -> Result<(), StoreError>;

    /// Entries ordered by ascending sequence number.
    async fn load_trail(&self, instance_id: &InstanceId) -> Result<Vec<TrailEntry>, StoreError>;
}
