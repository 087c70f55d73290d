use super::{
    DefinitionStore, InstanceRecord, InstanceStatus, InstanceStore, StoreError, TrailDraft,
    TrailEntry, WriteOutcome,
};
use crate::core::workflow::schema::{
    InstanceId, ViewId, WorkflowDefinition, WorkflowDocument, WorkflowId,
};
use crate::core::workflow::snapshot::definition_version;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

/// Version embedded in persisted instance documents.
pub const INSTANCE_FORMAT_VERSION: &str = "1";

/// Directory layout used by [`FileStore`].
#[derive(Debug, Clone)]
pub struct FileStorePaths {
    pub workflows_dir: PathBuf,
    pub instances_dir: PathBuf,
}

impl FileStorePaths {
    pub fn new(workflows_dir: impl Into<PathBuf>, state_dir: impl AsRef<Path>) -> Self {
        Self {
            workflows_dir: workflows_dir.into(),
            instances_dir: state_dir.as_ref().join("instances"),
        }
    }

    pub fn workflow_file(&self, workflow_id: WorkflowId) -> PathBuf {
        self.workflows_dir.join(format!("{}.yaml", workflow_id))
    }

    /// `versions/<workflow>/<version>.yaml` under the workflows directory.
    pub fn workflow_version_file(&self, workflow_id: WorkflowId, version: &str) -> PathBuf {
        self.workflows_dir
            .join("versions")
            .join(workflow_id.to_string())
            .join(format!("{}.yaml", version))
    }

    pub fn instance_file(&self, instance_id: &InstanceId) -> PathBuf {
        self.instances_dir.join(format!("{}.json", instance_id))
    }
}

/// Header and trail persisted together so one rename commits both.
#[derive(Debug, Serialize, Deserialize)]
struct InstanceDocument {
    format_version: String,
    record: InstanceRecord,
    trail: Vec<TrailEntry>,
}

/// Workspace-local store keeping definitions as YAML and instances as JSON.
///
/// Within one process, writers to the same instance file queue on that
/// instance's async mutex while other instances proceed; definition writes
/// share a separate mutex. Every file write goes through a temp file and a
/// rename, so a crash never leaves a half-written instance behind.
/// Concurrent processes sharing one state directory are not coordinated.
#[derive(Debug)]
pub struct FileStore {
    paths: FileStorePaths,
    definition_lock: Mutex<()>,
    instance_locks: DashMap<InstanceId, Arc<Mutex<()>>>,
}

impl FileStore {
    pub fn new(paths: FileStorePaths) -> Self {
        Self {
            paths,
            definition_lock: Mutex::new(()),
            instance_locks: DashMap::new(),
        }
    }

    pub fn paths(&self) -> &FileStorePaths {
        &self.paths
    }

    /// The map guard is released before the caller awaits the mutex.
    fn instance_lock(&self, instance_id: &InstanceId) -> Arc<Mutex<()>> {
        Arc::clone(self.instance_locks.entry(instance_id.clone()).or_default().value())
    }

    async fn read_definition(
        &self,
        path: &Path,
        not_found: impl FnOnce() -> StoreError,
    ) -> Result<WorkflowDefinition, StoreError> {
        let text = match fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(err) => return Err(err.into()),
        };
        let document = WorkflowDocument::parse_str(&text)
            .map_err(|err| StoreError::Serialization(err.message))?;
        Ok(document.into_definition())
    }

    async fn read_instance(&self, instance_id: &InstanceId) -> Result<InstanceDocument, StoreError> {
        validate_instance_id(instance_id)?;
        let path = self.paths.instance_file(instance_id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::instance_not_found(instance_id))
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_instance(&self, document: &InstanceDocument) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(document)?;
        atomic_write(&self.paths.instance_file(&document.record.id), &content).await
    }
}

async fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Reject ids that would escape the instances directory.
fn validate_instance_id(instance_id: &InstanceId) -> Result<(), StoreError> {
    let id = instance_id.as_str();
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !id.contains("..");
    if valid {
        Ok(())
    } else {
        Err(StoreError::Backend(format!(
            "instance id '{}' contains characters not allowed in file names",
            id
        )))
    }
}

#[async_trait]
impl DefinitionStore for FileStore {
    async fn load_workflow_definition(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<WorkflowDefinition, StoreError> {
        self.read_definition(&self.paths.workflow_file(workflow_id), || {
            StoreError::workflow_not_found(workflow_id)
        })
        .await
    }

    async fn load_workflow_definition_version(
        &self,
        workflow_id: WorkflowId,
        version: &str,
    ) -> Result<WorkflowDefinition, StoreError> {
        if version.is_empty() || !version.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StoreError::workflow_version_not_found(workflow_id, version));
        }
        self.read_definition(
            &self.paths.workflow_version_file(workflow_id, version),
            || StoreError::workflow_version_not_found(workflow_id, version),
        )
        .await
    }

    async fn publish_workflow_definition(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<(), StoreError> {
        let yaml = WorkflowDocument::from_definition(&definition)
            .to_yaml()
            .map_err(|err| StoreError::Serialization(err.message))?;
        let version = definition_version(&definition);
        let _guard = self.definition_lock.lock().await;
        // Archive first: a current file must always have its version on disk.
        atomic_write(
            &self.paths.workflow_version_file(definition.id(), &version),
            yaml.as_bytes(),
        )
        .await?;
        atomic_write(&self.paths.workflow_file(definition.id()), yaml.as_bytes()).await
    }
}

#[async_trait]
impl InstanceStore for FileStore {
    async fn create_instance(&self, record: InstanceRecord) -> Result<(), StoreError> {
        validate_instance_id(&record.id)?;
        let lock = self.instance_lock(&record.id);
        let _guard = lock.lock().await;
        if fs::try_exists(self.paths.instance_file(&record.id)).await? {
            return Err(StoreError::AlreadyExists {
                kind: "instance",
                id: record.id.to_string(),
            });
        }
        self.write_instance(&InstanceDocument {
            format_version: INSTANCE_FORMAT_VERSION.to_string(),
            record,
            trail: Vec::new(),
        })
        .await
    }

    async fn load_instance(&self, instance_id: &InstanceId) -> Result<InstanceRecord, StoreError> {
        Ok(self.read_instance(instance_id).await?.record)
    }

    async fn write_trail_entry_if_current_view_matches(
        &self,
        instance_id: &InstanceId,
        expected_view: ViewId,
        draft: TrailDraft,
    ) -> Result<WriteOutcome, StoreError> {
        validate_instance_id(instance_id)?;
        let lock = self.instance_lock(instance_id);
        let _guard = lock.lock().await;
        let mut document = self.read_instance(instance_id).await?;
        if document.record.current_view != expected_view {
            return Ok(WriteOutcome::Conflict {
                actual: document.record.current_view,
            });
        }

        let sequence = document.record.last_sequence + 1;
        let entry = draft.seal(instance_id.clone(), sequence);
        document.record.current_view = entry.to_view;
        document.record.last_sequence = sequence;
        document.trail.push(entry.clone());
        self.write_instance(&document).await?;
        Ok(WriteOutcome::Committed(entry))
    }

    async fn mark_terminal(&self, instance_id: &InstanceId) -> Result<(), StoreError> {
        validate_instance_id(instance_id)?;
        let lock = self.instance_lock(instance_id);
        let _guard = lock.lock().await;
        let mut document = self.read_instance(instance_id).await?;
        if document.record.status == InstanceStatus::Terminal {
            return Ok(());
        }
        document.record.status = InstanceStatus::Terminal;
        self.write_instance(&document).await
    }

    async fn load_trail(&self, instance_id: &InstanceId) -> Result<Vec<TrailEntry>, StoreError> {
        Ok(self.read_instance(instance_id).await?.trail)
    }
}
