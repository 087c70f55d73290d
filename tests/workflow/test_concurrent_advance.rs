use async_trait::async_trait;
use stageflow::core::store::{
    FileStore, FileStorePaths, InstanceRecord, InstanceStore, MemoryStore, StoreError,
    TrailDraft, TrailEntry, WriteOutcome,
};
use stageflow::core::workflow::schema::RouteRecord;
use stageflow::core::workflow::{
    seed, Actor, AdvanceError, AdvanceRequest, InstanceId, InstanceLedger, LedgerError,
    RouteId, RouteRoleHintPolicy, StateId, TransitionCoordinator, ViewId, WorkflowDefinition,
    WorkflowId, WorkflowService,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Barrier;

const RECRUITMENT: WorkflowId = WorkflowId(2);

/// Holds the next `armed` conditional writes until they have all arrived,
/// so competing transitions read the same position before either commits.
struct RendezvousStore {
    inner: MemoryStore,
    armed: AtomicUsize,
    barrier: Barrier,
}

impl RendezvousStore {
    fn new(inner: MemoryStore, writers: usize) -> Self {
        Self {
            inner,
            armed: AtomicUsize::new(0),
            barrier: Barrier::new(writers),
        }
    }

    fn arm(&self, writers: usize) {
        self.armed.store(writers, Ordering::SeqCst);
    }
}

#[async_trait]
impl InstanceStore for RendezvousStore {
    async fn create_instance(&self, record: InstanceRecord) -> Result<(), StoreError> {
        self.inner.create_instance(record).await
    }

    async fn load_instance(&self, instance_id: &InstanceId) -> Result<InstanceRecord, StoreError> {
        self.inner.load_instance(instance_id).await
    }

    async fn write_trail_entry_if_current_view_matches(
        &self,
        instance_id: &InstanceId,
        expected_view: ViewId,
        draft: TrailDraft,
    ) -> Result<WriteOutcome, StoreError> {
        let gated = self
            .armed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if gated {
            self.barrier.wait().await;
        }
        self.inner
            .write_trail_entry_if_current_view_matches(instance_id, expected_view, draft)
            .await
    }

    async fn mark_terminal(&self, instance_id: &InstanceId) -> Result<(), StoreError> {
        self.inner.mark_terminal(instance_id).await
    }

    async fn load_trail(&self, instance_id: &InstanceId) -> Result<Vec<TrailEntry>, StoreError> {
        self.inner.load_trail(instance_id).await
    }
}

/// Recruitment plus a second way out of DISPATCH, so two actors can pick
/// different states from the same view.
fn recruitment_with_withdrawal() -> WorkflowDefinition {
    let mut definition = seed::recruitment_workflow();
    definition.routes.push(RouteRecord {
        id: RouteId(6),
        workflow_id: RECRUITMENT,
        view_id: ViewId(2),
        state_id: StateId(4),
        next_view_id: ViewId(4),
        start_sign: false,
        role: None,
    });
    definition
}

fn rendezvous_coordinator(
    definition: WorkflowDefinition,
) -> (Arc<RendezvousStore>, Arc<TransitionCoordinator>) {
    let definitions = Arc::new(MemoryStore::with_definitions([definition]));
    let instances = Arc::new(RendezvousStore::new(MemoryStore::new(), 2));
    let coordinator = Arc::new(TransitionCoordinator::new(
        definitions,
        instances.clone(),
        Arc::new(RouteRoleHintPolicy),
    ));
    (instances, coordinator)
}

async fn race_setup() -> (Arc<RendezvousStore>, Arc<TransitionCoordinator>, InstanceId) {
    let (instances, coordinator) = rendezvous_coordinator(recruitment_with_withdrawal());
    let id = coordinator
        .start_instance(RECRUITMENT, Some(InstanceId::from("cand-race")))
        .await
        .unwrap()
        .id;
    coordinator
        .advance_by_name(&id, "CONTINUE", Actor::from("dispatcher"))
        .await
        .unwrap();
    instances.arm(2);
    (instances, coordinator, id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn competing_states_commit_exactly_once() {
    let (store, coordinator, id) = race_setup().await;

    let submit = {
        let coordinator = coordinator.clone();
        let id = id.clone();
        tokio::spawn(async move {
            coordinator
                .advance(&id, StateId(2), Actor::from("candidate"))
                .await
        })
    };
    let withdraw = {
        let coordinator = coordinator.clone();
        let id = id.clone();
        tokio::spawn(async move {
            coordinator
                .advance(&id, StateId(4), Actor::from("dispatcher"))
                .await
        })
    };
    let results = [submit.await.unwrap(), withdraw.await.unwrap()];

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    match loser {
        AdvanceError::StaleTransition {
            expected, actual, ..
        } => {
            assert_eq!(*expected, ViewId(2));
            assert_eq!(*actual, winners[0].to_view);
        }
        other => panic!("unexpected error: {other}"),
    }

    let trail = store.load_trail(&id).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[1].sequence, 2);
    assert_eq!(trail[1].from_view, ViewId(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_submission_is_not_applied_twice() {
    let (store, coordinator, id) = race_setup().await;
    let service = Arc::new(WorkflowService::new(coordinator));

    let mut handles = Vec::new();
    for actor in ["alice", "bob"] {
        let service = service.clone();
        let request = AdvanceRequest {
            instance_id: id.clone(),
            state_name: "SUBMIT".to_string(),
            actor: Actor::from(actor),
            expected_view: None,
        };
        handles.push(tokio::spawn(
            async move { service.advance_workflow(request).await },
        ));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(
        err,
        AdvanceError::StaleTransition { expected, actual, .. }
            if expected == ViewId(2) && actual == ViewId(3)
    ));

    let trail = store.load_trail(&id).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[1].to_view, ViewId(3));
}

/// DETAILS, PURPOSE and TYPE all accept SUBMIT, so a resubmitted loser
/// would find a valid route one view further on.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submits_along_a_submit_chain_move_one_view() {
    let (store, coordinator) = rendezvous_coordinator(seed::application_workflow());
    let id = coordinator
        .start_instance(WorkflowId(1), Some(InstanceId::from("app-race")))
        .await
        .unwrap()
        .id;
    coordinator
        .advance_by_name(&id, "CONTINUE", Actor::from("applicant"))
        .await
        .unwrap();
    store.arm(2);

    let service = Arc::new(WorkflowService::new(coordinator));
    let mut handles = Vec::new();
    for actor in ["first-tab", "second-tab"] {
        let service = service.clone();
        let request = AdvanceRequest {
            instance_id: id.clone(),
            state_name: "SUBMIT".to_string(),
            actor: Actor::from(actor),
            expected_view: None,
        };
        handles.push(tokio::spawn(
            async move { service.advance_workflow(request).await },
        ));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let successes: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].current_view_name, "PURPOSE");
    let err = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(
        err,
        AdvanceError::StaleTransition { expected, actual, .. }
            if *expected == ViewId(2) && *actual == ViewId(3)
    ));

    let trail = store.load_trail(&id).await.unwrap();
    assert_eq!(
        trail.iter().map(|entry| entry.to_view).collect::<Vec<_>>(),
        vec![ViewId(2), ViewId(3)]
    );
    let position = service.current_position(&id).await.unwrap();
    assert_eq!(position.current_view_name, "PURPOSE");
    assert_eq!(position.sequence, 2);
}

/// Reports the next `conflicts` writes as conflicts at the view the writer
/// expected, as if another writer had left and returned to it.
struct SpuriousConflictStore {
    inner: MemoryStore,
    conflicts: AtomicUsize,
}

#[async_trait]
impl InstanceStore for SpuriousConflictStore {
    async fn create_instance(&self, record: InstanceRecord) -> Result<(), StoreError> {
        self.inner.create_instance(record).await
    }

    async fn load_instance(&self, instance_id: &InstanceId) -> Result<InstanceRecord, StoreError> {
        self.inner.load_instance(instance_id).await
    }

    async fn write_trail_entry_if_current_view_matches(
        &self,
        instance_id: &InstanceId,
        expected_view: ViewId,
        draft: TrailDraft,
    ) -> Result<WriteOutcome, StoreError> {
        let conflicted = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflicted {
            return Ok(WriteOutcome::Conflict {
                actual: expected_view,
            });
        }
        self.inner
            .write_trail_entry_if_current_view_matches(instance_id, expected_view, draft)
            .await
    }

    async fn mark_terminal(&self, instance_id: &InstanceId) -> Result<(), StoreError> {
        self.inner.mark_terminal(instance_id).await
    }

    async fn load_trail(&self, instance_id: &InstanceId) -> Result<Vec<TrailEntry>, StoreError> {
        self.inner.load_trail(instance_id).await
    }
}

#[tokio::test]
async fn conflict_at_an_unchanged_view_is_retried_within_budget() {
    let instances = Arc::new(SpuriousConflictStore {
        inner: MemoryStore::new(),
        conflicts: AtomicUsize::new(2),
    });
    let coordinator = Arc::new(TransitionCoordinator::new(
        Arc::new(MemoryStore::with_definitions([seed::recruitment_workflow()])),
        instances.clone(),
        Arc::new(RouteRoleHintPolicy),
    ));
    let id = coordinator
        .start_instance(RECRUITMENT, Some(InstanceId::from("cand-aba")))
        .await
        .unwrap()
        .id;
    let request = AdvanceRequest {
        instance_id: id.clone(),
        state_name: "CONTINUE".to_string(),
        actor: Actor::from("dina"),
        expected_view: None,
    };

    let service = WorkflowService::new(coordinator.clone()).with_max_stale_retries(1);
    let err = service.advance_workflow(request.clone()).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(instances.load_trail(&id).await.unwrap().is_empty());

    instances.conflicts.store(2, Ordering::SeqCst);
    let service = WorkflowService::new(coordinator).with_max_stale_retries(2);
    let response = service.advance_workflow(request).await.unwrap();
    assert_eq!(response.current_view, ViewId(2));
    assert_eq!(response.sequence, 1);
    assert_eq!(instances.load_trail(&id).await.unwrap().len(), 1);
}

async fn hammer(
    ledger: InstanceLedger,
    id: InstanceId,
    writers: usize,
) -> Vec<Result<TrailEntry, LedgerError>> {
    let mut handles = Vec::new();
    for n in 0..writers {
        let ledger = ledger.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .append(&id, ViewId(1), StateId(1), ViewId(2), Actor::from(format!("w{n}")))
                .await
        }));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

fn assert_single_winner(results: &[Result<TrailEntry, LedgerError>]) {
    let committed: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].sequence, 1);
    for result in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(
            result,
            LedgerError::StaleTransition { actual, .. } if *actual == ViewId(2)
        ));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn memory_ledger_admits_one_writer_per_position() {
    let store = Arc::new(MemoryStore::new());
    let ledger = InstanceLedger::new(store);
    let id = InstanceId::from("stress");
    ledger
        .open(InstanceRecord::new(id.clone(), RECRUITMENT, ViewId(1)))
        .await
        .unwrap();

    let results = hammer(ledger.clone(), id.clone(), 32).await;
    assert_single_winner(&results);
    assert_eq!(ledger.history(&id).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn file_ledger_admits_one_writer_per_position() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FileStore::new(FileStorePaths::new(
        temp.path().join("workflows"),
        temp.path().join("state"),
    )));
    let ledger = InstanceLedger::new(store);
    let id = InstanceId::from("stress-file");
    ledger
        .open(InstanceRecord::new(id.clone(), RECRUITMENT, ViewId(1)))
        .await
        .unwrap();

    let results = hammer(ledger.clone(), id.clone(), 16).await;
    assert_single_winner(&results);
    assert_eq!(ledger.current(&id).await.unwrap().sequence, 1);
}
