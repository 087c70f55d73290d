use serial_test::serial;
use stageflow::cli::WorkspaceContext;
use stageflow::core::config::ConfigLoader;
use stageflow::core::types::ErrorCategory;
use stageflow::core::workflow::{seed, Actor, AdvanceRequest, InstanceId, WorkflowId};
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_stageflow_env() {
    for v in &[
        "STAGEFLOW_MAX_STALE_RETRIES",
        "STAGEFLOW_STATE_DIR",
        "STAGEFLOW_WORKFLOWS_DIR",
    ] {
        env::remove_var(v);
    }
}

const FULL_CONFIG: &str = r#"
[engine]
max_stale_retries = 7

[storage]
state_dir = "var/state"
workflows_dir = "definitions"

[assignment."2"]
TEST = "panel"
END = "hr"
"#;

/// Test integration of config loading with environment variables
#[test]
#[serial]
fn test_config_loading_integration() {
    clear_stageflow_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("stageflow.toml"), FULL_CONFIG).unwrap();

    let config = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap();
    assert_eq!(config.engine.max_stale_retries, 7);
    assert_eq!(config.storage.state_dir, PathBuf::from("var/state"));
    assert_eq!(config.assignment["2"]["TEST"], "panel");

    env::set_var("STAGEFLOW_MAX_STALE_RETRIES", "1");
    env::set_var("STAGEFLOW_STATE_DIR", "/tmp/stageflow-override");
    let config = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap();
    clear_stageflow_env();

    assert_eq!(config.engine.max_stale_retries, 1);
    assert_eq!(
        config.storage.state_dir,
        PathBuf::from("/tmp/stageflow-override")
    );
    // Untouched by env.
    assert_eq!(config.storage.workflows_dir, PathBuf::from("definitions"));

    let (state_dir, workflows_dir) = config.storage.resolve(temp_dir.path());
    assert_eq!(state_dir, PathBuf::from("/tmp/stageflow-override"));
    assert_eq!(workflows_dir, temp_dir.path().join("definitions"));
}

#[test]
#[serial]
fn test_partial_config_keeps_defaults() {
    clear_stageflow_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("stageflow.toml"),
        "[engine]\nmax_stale_retries = 0\n",
    )
    .unwrap();

    let config = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap();
    assert_eq!(config.engine.max_stale_retries, 0);
    assert_eq!(config.storage.state_dir, PathBuf::from(".stageflow/state"));
    assert!(config.assignment.is_empty());
}

#[test]
#[serial]
fn test_invalid_env_override_is_reported() {
    clear_stageflow_env();
    let temp_dir = TempDir::new().unwrap();
    env::set_var("STAGEFLOW_MAX_STALE_RETRIES", "many");
    let err = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap_err();
    clear_stageflow_env();

    assert_eq!(err.code, "SF-CONFIG-002");
    assert!(err.message.contains("many"));
}

#[test]
#[serial]
fn test_out_of_range_values_fail_validation() {
    clear_stageflow_env();
    let cases = [
        "[engine]\nmax_stale_retries = 1000\n",
        "[storage]\nstate_dir = \"\"\n",
        "[assignment.recruitment]\nTEST = \"panel\"\n",
        "[assignment.\"2\"]\nTEST = \"  \"\n",
    ];
    for content in cases {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("stageflow.toml"), content).unwrap();
        let err = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap_err();
        assert_eq!(err.category, ErrorCategory::ValidationError, "{content}");
        assert_eq!(err.code, "SF-CONFIG-003", "{content}");
    }
}

#[tokio::test]
#[serial]
async fn test_configured_roles_override_route_hints() {
    clear_stageflow_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("stageflow.toml"), FULL_CONFIG).unwrap();

    let context = WorkspaceContext::load(temp_dir.path()).unwrap();
    assert_eq!(context.config.engine.max_stale_retries, 7);
    context
        .service
        .publish_definition(seed::recruitment_workflow())
        .await
        .unwrap();
    assert!(temp_dir.path().join("definitions/2.yaml").is_file());

    let id = InstanceId::from("cand-cfg");
    context
        .service
        .start_instance(WorkflowId(2), Some(id.clone()))
        .await
        .unwrap();
    assert!(temp_dir
        .path()
        .join("var/state/instances/cand-cfg.json")
        .is_file());

    let mut roles = Vec::new();
    for state in ["CONTINUE", "SUBMIT", "PASS"] {
        let response = context
            .service
            .advance_workflow(AdvanceRequest {
                instance_id: id.clone(),
                state_name: state.to_string(),
                actor: Actor::from("staff"),
                expected_view: None,
            })
            .await
            .unwrap();
        roles.push(response.assigned_role.map(|role| role.to_string()));
    }
    // DISPATCH falls through to the route hint; TEST and END come from the table.
    assert_eq!(
        roles,
        vec![
            Some("dispatcher".to_string()),
            Some("panel".to_string()),
            Some("hr".to_string()),
        ]
    );
}
