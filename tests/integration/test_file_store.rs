use stageflow::core::store::{
    DefinitionStore, FileStore, FileStorePaths, InstanceRecord, InstanceStatus, InstanceStore,
    StoreError, TrailDraft, WriteOutcome,
};
use stageflow::core::workflow::snapshot::definition_version;
use stageflow::core::workflow::{
    seed, Actor, AdvanceRequest, InstanceId, RouteRoleHintPolicy, StateId,
    TransitionCoordinator, ViewId, WorkflowId, WorkflowService,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn store_in(temp: &TempDir) -> FileStore {
    FileStore::new(FileStorePaths::new(
        temp.path().join("workflows"),
        temp.path().join("state"),
    ))
}

fn draft(from: i64, state: i64, to: i64, actor: &str) -> TrailDraft {
    TrailDraft {
        from_view: ViewId(from),
        state: StateId(state),
        to_view: ViewId(to),
        actor: Actor::from(actor),
    }
}

#[tokio::test]
async fn definitions_survive_a_round_trip_through_yaml() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let original = seed::recruitment_workflow();
    store
        .publish_workflow_definition(original.clone())
        .await
        .unwrap();

    assert!(temp.path().join("workflows/2.yaml").is_file());
    let loaded = store.load_workflow_definition(WorkflowId(2)).await.unwrap();
    assert_eq!(loaded, original);

    let err = store
        .load_workflow_definition(WorkflowId(3))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

fn service_in(temp: &TempDir) -> WorkflowService {
    let store = Arc::new(store_in(temp));
    WorkflowService::new(Arc::new(TransitionCoordinator::new(
        store.clone(),
        store,
        Arc::new(RouteRoleHintPolicy),
    )))
}

fn submit(id: &InstanceId, state: &str) -> AdvanceRequest {
    AdvanceRequest {
        instance_id: id.clone(),
        state_name: state.to_string(),
        actor: Actor::from("staff"),
        expected_view: None,
    }
}

#[tokio::test]
async fn superseded_versions_stay_on_disk() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let original = seed::recruitment_workflow();
    let mut revised = original.clone();
    revised.workflow.name = "Recruitment v2".to_string();
    for definition in [&original, &revised] {
        store
            .publish_workflow_definition(definition.clone())
            .await
            .unwrap();
    }

    let version = definition_version(&original);
    assert!(temp
        .path()
        .join(format!("workflows/versions/2/{version}.yaml"))
        .is_file());
    assert_eq!(
        store.load_workflow_definition(WorkflowId(2)).await.unwrap(),
        revised
    );
    assert_eq!(
        store
            .load_workflow_definition_version(WorkflowId(2), &version)
            .await
            .unwrap(),
        original
    );
    for bogus in ["../2", "", "abc123"] {
        let err = store
            .load_workflow_definition_version(WorkflowId(2), bogus)
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{bogus}");
    }
}

#[tokio::test]
async fn running_instance_keeps_its_version_across_processes() {
    let temp = TempDir::new().unwrap();
    let id = InstanceId::from("cand-pinned");
    {
        let service = service_in(&temp);
        service
            .publish_definition(seed::recruitment_workflow())
            .await
            .unwrap();
        service
            .start_instance(WorkflowId(2), Some(id.clone()))
            .await
            .unwrap();
        service.advance_workflow(submit(&id, "CONTINUE")).await.unwrap();
    }
    {
        // DISPATCH renumbered from 2 to 5.
        let mut revised = seed::recruitment_workflow();
        for view in revised.views.iter_mut().filter(|view| view.id == ViewId(2)) {
            view.id = ViewId(5);
        }
        for route in revised.routes.iter_mut() {
            if route.view_id == ViewId(2) {
                route.view_id = ViewId(5);
            }
            if route.next_view_id == ViewId(2) {
                route.next_view_id = ViewId(5);
            }
        }
        service_in(&temp).publish_definition(revised).await.unwrap();
    }

    let service = service_in(&temp);
    let response = service.advance_workflow(submit(&id, "SUBMIT")).await.unwrap();
    assert_eq!(response.current_view_name, "TEST");
    assert!(!response.is_terminal);
    let record = store_in(&temp).load_instance(&id).await.unwrap();
    assert_eq!(record.status, InstanceStatus::Active);
    assert_eq!(
        record.definition_version,
        definition_version(&seed::recruitment_workflow())
    );
}

#[tokio::test]
async fn conditional_write_commits_or_conflicts() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let id = InstanceId::from("cand-1");
    store
        .create_instance(InstanceRecord::new(id.clone(), WorkflowId(2), ViewId(1)))
        .await
        .unwrap();

    let outcome = store
        .write_trail_entry_if_current_view_matches(&id, ViewId(1), draft(1, 1, 2, "dina"))
        .await
        .unwrap();
    let WriteOutcome::Committed(entry) = outcome else {
        panic!("expected a commit");
    };
    assert_eq!(entry.sequence, 1);
    assert_eq!(entry.instance_id, id);

    let outcome = store
        .write_trail_entry_if_current_view_matches(&id, ViewId(1), draft(1, 1, 2, "late"))
        .await
        .unwrap();
    assert_eq!(outcome, WriteOutcome::Conflict { actual: ViewId(2) });

    let record = store.load_instance(&id).await.unwrap();
    assert_eq!(record.current_view, ViewId(2));
    assert_eq!(record.last_sequence, 1);
    assert_eq!(store.load_trail(&id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn instances_persist_across_store_handles() {
    let temp = TempDir::new().unwrap();
    let id = InstanceId::from("cand-2");
    {
        let store = store_in(&temp);
        store
            .create_instance(InstanceRecord::new(id.clone(), WorkflowId(2), ViewId(1)))
            .await
            .unwrap();
        for (from, state, to) in [(1, 1, 2), (2, 2, 3), (3, 4, 4)] {
            store
                .write_trail_entry_if_current_view_matches(
                    &id,
                    ViewId(from),
                    draft(from, state, to, "staff"),
                )
                .await
                .unwrap();
        }
        store.mark_terminal(&id).await.unwrap();
    }

    let reopened = store_in(&temp);
    let record = reopened.load_instance(&id).await.unwrap();
    assert_eq!(record.status, InstanceStatus::Terminal);
    assert_eq!(record.current_view, ViewId(4));
    let trail = reopened.load_trail(&id).await.unwrap();
    assert_eq!(
        trail.iter().map(|entry| entry.sequence).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    // No temp files are left behind by the atomic writes.
    let leftovers: Vec<_> = fs::read_dir(temp.path().join("state/instances"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn marking_terminal_twice_is_harmless() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let id = InstanceId::from("cand-3");
    store
        .create_instance(InstanceRecord::new(id.clone(), WorkflowId(2), ViewId(4)))
        .await
        .unwrap();
    store.mark_terminal(&id).await.unwrap();
    store.mark_terminal(&id).await.unwrap();
    assert_eq!(
        store.load_instance(&id).await.unwrap().status,
        InstanceStatus::Terminal
    );
}

#[tokio::test]
async fn duplicate_and_missing_instances_are_errors() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let id = InstanceId::from("cand-4");
    let record = InstanceRecord::new(id.clone(), WorkflowId(2), ViewId(1));
    store.create_instance(record.clone()).await.unwrap();
    assert!(matches!(
        store.create_instance(record).await.unwrap_err(),
        StoreError::AlreadyExists { .. }
    ));

    let ghost = InstanceId::from("ghost");
    assert!(store.load_instance(&ghost).await.unwrap_err().is_not_found());
    assert!(store
        .write_trail_entry_if_current_view_matches(&ghost, ViewId(1), draft(1, 1, 2, "x"))
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn path_like_instance_ids_never_touch_the_filesystem() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let err = store
        .create_instance(InstanceRecord::new(
            InstanceId::from("../escape"),
            WorkflowId(2),
            ViewId(1),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)));
    assert!(!temp.path().join("state").exists());
}
