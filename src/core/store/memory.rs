use super::{
    DefinitionStore, InstanceRecord, InstanceStatus, InstanceStore, StoreError, TrailDraft,
    TrailEntry, WriteOutcome,
};
use crate::core::workflow::schema::{InstanceId, ViewId, WorkflowDefinition, WorkflowId};
use crate::core::workflow::snapshot::definition_version;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Debug)]
struct InstanceSlot {
    record: InstanceRecord,
    trail: Vec<TrailEntry>,
}

/// In-process store backed by sharded concurrent maps.
///
/// The conditional trail write runs while holding the shard's write guard for
/// that instance, so check and write cannot interleave with another writer.
/// Every published definition stays in `archive` under its version.
#[derive(Debug, Default)]
pub struct MemoryStore {
    definitions: DashMap<WorkflowId, WorkflowDefinition>,
    archive: DashMap<(WorkflowId, String), WorkflowDefinition>,
    instances: DashMap<InstanceId, InstanceSlot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor preloaded with definitions.
    pub fn with_definitions(definitions: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
        let store = Self::new();
        for definition in definitions {
            store.store_definition(definition);
        }
        store
    }

    fn store_definition(&self, definition: WorkflowDefinition) {
        self.archive.insert(
            (definition.id(), definition_version(&definition)),
            definition.clone(),
        );
        self.definitions.insert(definition.id(), definition);
    }
}

#[async_trait]
impl DefinitionStore for MemoryStore {
    async fn load_workflow_definition(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<WorkflowDefinition, StoreError> {
        self.definitions
            .get(&workflow_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::workflow_not_found(workflow_id))
    }

    async fn load_workflow_definition_version(
        &self,
        workflow_id: WorkflowId,
        version: &str,
    ) -> Result<WorkflowDefinition, StoreError> {
        self.archive
            .get(&(workflow_id, version.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::workflow_version_not_found(workflow_id, version))
    }

    async fn publish_workflow_definition(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<(), StoreError> {
        self.store_definition(definition);
        Ok(())
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn create_instance(&self, record: InstanceRecord) -> Result<(), StoreError> {
        match self.instances.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                kind: "instance",
                id: record.id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(InstanceSlot {
                    record,
                    trail: Vec::new(),
                });
                Ok(())
            }
        }
    }

    async fn load_instance(&self, instance_id: &InstanceId) -> Result<InstanceRecord, StoreError> {
        self.instances
            .get(instance_id)
            .map(|slot| slot.record.clone())
            .ok_or_else(|| StoreError::instance_not_found(instance_id))
    }

    async fn write_trail_entry_if_current_view_matches(
        &self,
        instance_id: &InstanceId,
        expected_view: ViewId,
        draft: TrailDraft,
    ) -> Result<WriteOutcome, StoreError> {
        let mut slot = self
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| StoreError::instance_not_found(instance_id))?;

        if slot.record.current_view != expected_view {
            return Ok(WriteOutcome::Conflict {
                actual: slot.record.current_view,
            });
        }

        let sequence = slot.record.last_sequence + 1;
        let entry = draft.seal(instance_id.clone(), sequence);
        slot.record.current_view = entry.to_view;
        slot.record.last_sequence = sequence;
        slot.trail.push(entry.clone());
        Ok(WriteOutcome::Committed(entry))
    }

    async fn mark_terminal(&self, instance_id: &InstanceId) -> Result<(), StoreError> {
        let mut slot = self
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| StoreError::instance_not_found(instance_id))?;
        slot.record.status = InstanceStatus::Terminal;
        Ok(())
    }

    async fn load_trail(&self, instance_id: &InstanceId) -> Result<Vec<TrailEntry>, StoreError> {
        self.instances
            .get(instance_id)
            .map(|slot| slot.trail.clone())
            .ok_or_else(|| StoreError::instance_not_found(instance_id))
    }
}
