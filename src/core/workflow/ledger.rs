use crate::core::store::{
    InstanceRecord, InstanceStatus, InstanceStore, StoreError, TrailDraft, TrailEntry,
    WriteOutcome,
};
use crate::core::workflow::schema::{Actor, InstanceId, StateId, ViewId};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Another transition moved the instance first.
    #[error("stale transition on instance {instance}: expected view {expected}, found {actual}")]
    StaleTransition {
        instance: InstanceId,
        expected: ViewId,
        actual: ViewId,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where an instance stands right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub view: ViewId,
    pub status: InstanceStatus,
    pub sequence: u64,
}

/// Ordered, finite trail of one instance. Iterate it as often as needed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    entries: Vec<TrailEntry>,
}

impl History {
    pub fn iter(&self) -> std::slice::Iter<'_, TrailEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TrailEntry> {
        self.entries.last()
    }

    pub fn into_vec(self) -> Vec<TrailEntry> {
        self.entries
    }
}

impl IntoIterator for History {
    type Item = TrailEntry;
    type IntoIter = std::vec::IntoIter<TrailEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a TrailEntry;
    type IntoIter = std::slice::Iter<'a, TrailEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Append-only transition history, guarded by optimistic concurrency.
///
/// The view a caller last observed acts as the version token: an append only
/// lands when it still matches the instance's stored view.
#[derive(Clone)]
pub struct InstanceLedger {
    store: Arc<dyn InstanceStore>,
}

impl InstanceLedger {
    pub fn new(store: Arc<dyn InstanceStore>) -> Self {
        Self { store }
    }

    pub async fn open(&self, record: InstanceRecord) -> Result<(), LedgerError> {
        self.store.create_instance(record).await?;
        Ok(())
    }

    pub async fn record(&self, instance_id: &InstanceId) -> Result<InstanceRecord, LedgerError> {
        Ok(self.store.load_instance(instance_id).await?)
    }

    pub async fn append(
        &self,
        instance_id: &InstanceId,
        expected_current_view: ViewId,
        state: StateId,
        to_view: ViewId,
        actor: Actor,
    ) -> Result<TrailEntry, LedgerError> {
        let draft = TrailDraft {
            from_view: expected_current_view,
            state,
            to_view,
            actor,
        };
        match self
            .store
            .write_trail_entry_if_current_view_matches(instance_id, expected_current_view, draft)
            .await?
        {
            WriteOutcome::Committed(entry) => Ok(entry),
            WriteOutcome::Conflict { actual } => Err(LedgerError::StaleTransition {
                instance: instance_id.clone(),
                expected: expected_current_view,
                actual,
            }),
        }
    }

    /// Mark the instance TERMINAL. Safe to repeat.
    pub async fn close(&self, instance_id: &InstanceId) -> Result<(), LedgerError> {
        self.store.mark_terminal(instance_id).await?;
        Ok(())
    }

    pub async fn current(&self, instance_id: &InstanceId) -> Result<Position, LedgerError> {
        let record = self.store.load_instance(instance_id).await?;
        Ok(Position {
            view: record.current_view,
            status: record.status,
            sequence: record.last_sequence,
        })
    }

    pub async fn history(&self, instance_id: &InstanceId) -> Result<History, LedgerError> {
        let mut entries = self.store.load_trail(instance_id).await?;
        entries.sort_by_key(|entry| entry.sequence);
        Ok(History { entries })
    }
}
