use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn stageflow(workspace: &Path) -> Command {
    let mut cmd = Command::cargo_bin("stageflow").unwrap();
    cmd.arg("--path").arg(workspace);
    for var in [
        "STAGEFLOW_MAX_STALE_RETRIES",
        "STAGEFLOW_STATE_DIR",
        "STAGEFLOW_WORKFLOWS_DIR",
        "STAGEFLOW_LOG_LEVEL",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn initialized_workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    stageflow(temp.path()).arg("init").assert().success();
    temp
}

const ORPHANED: &str = r#"
version: "1"
workflow: { id: 7, name: Orphaned }
views:
  - { id: 1, name: START }
  - { id: 2, name: DISPATCH }
  - { id: 3, name: TEST }
  - { id: 4, name: END }
  - { id: 5, name: ORPHAN }
states:
  - { id: 1, name: CONTINUE }
  - { id: 2, name: SUBMIT }
  - { id: 3, name: PASS }
  - { id: 4, name: FAIL }
routes:
  - { id: 1, view: 1, state: 1, next: 2, start: true }
  - { id: 2, view: 2, state: 2, next: 3 }
  - { id: 3, view: 3, state: 3, next: 4 }
  - { id: 4, view: 3, state: 4, next: 4 }
  - { id: 5, view: 5, state: 1, next: 3 }
"#;

#[test]
fn test_help_lists_workflow_commands() {
    let mut cmd = Command::cargo_bin("stageflow").unwrap();
    cmd.arg("--help");
    cmd.assert().success().stdout(
        predicate::str::contains("WORKFLOW COMMANDS")
            .and(predicate::str::contains("advance"))
            .and(predicate::str::contains("validate")),
    );
}

#[test]
fn test_version_command() {
    let mut cmd = Command::cargo_bin("stageflow").unwrap();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_init_publishes_bundled_workflows() {
    let temp = TempDir::new().unwrap();
    stageflow(temp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Published workflow 1 (A Good Workflow)")
                .and(predicate::str::contains("Published workflow 2 (Recruitment)")),
        );

    assert!(temp.path().join("stageflow.toml").is_file());
    assert!(temp.path().join(".stageflow/workflows/1.yaml").is_file());
    assert!(temp.path().join(".stageflow/workflows/2.yaml").is_file());

    stageflow(temp.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_recruitment_session() {
    let temp = initialized_workspace();
    let ws = temp.path();

    stageflow(ws)
        .args(["start", "2", "--instance", "cand-1"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Started instance cand-1 of workflow 2 at START")
                .and(predicate::str::contains("Valid states: CONTINUE")),
        );

    stageflow(ws)
        .args(["advance", "cand-1", "CONTINUE", "--actor", "dina"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("cand-1 moved to DISPATCH (sequence 1)")
                .and(predicate::str::contains("Next: dispatcher")),
        );

    stageflow(ws)
        .args(["advance", "cand-1", "PASS", "--actor", "dina"])
        .assert()
        .failure()
        .stderr(
            predicate::str::contains("SF-ROUTE-001")
                .and(predicate::str::contains("valid states here: SUBMIT")),
        );

    stageflow(ws)
        .args(["status", "cand-1"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("View:     DISPATCH")
                .and(predicate::str::contains("Status:   ACTIVE"))
                .and(predicate::str::contains("Sequence: 1"))
                .and(predicate::str::contains("Version:  ")),
        );

    for (state, actor) in [("SUBMIT", "cand-1"), ("PASS", "rita")] {
        stageflow(ws)
            .args(["advance", "cand-1", state, "--actor", actor])
            .assert()
            .success();
    }

    let output = stageflow(ws)
        .args(["history", "cand-1", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let lines: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let lines = lines.as_array().unwrap();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["from_view"], "START");
    assert_eq!(lines[0]["state"], "CONTINUE");
    assert_eq!(lines[2]["to_view"], "END");
    assert_eq!(lines[2]["actor"], "rita");

    stageflow(ws)
        .args(["advance", "cand-1", "HOLD", "--actor", "rita"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SF-TERM-001"));

    let output = stageflow(ws)
        .args(["status", "cand-1", "--format", "json"])
        .output()
        .unwrap();
    let position: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(position["status"], "TERMINAL");
    assert_eq!(position["available_states"], serde_json::json!([]));
}

#[test]
fn test_history_of_fresh_instance() {
    let temp = initialized_workspace();
    stageflow(temp.path())
        .args(["start", "1", "--instance", "app-1"])
        .assert()
        .success();
    stageflow(temp.path())
        .args(["history", "app-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No transitions recorded for app-1."));
}

#[test]
fn test_unknown_instance_is_not_found() {
    let temp = initialized_workspace();
    stageflow(temp.path())
        .args(["status", "nobody"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SF-FOUND-001"));
}

#[test]
fn test_validate_reports_definition_errors() {
    let temp = initialized_workspace();
    stageflow(temp.path())
        .args(["validate", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "workflow 1 (A Good Workflow) is valid; entry view START",
        ));

    fs::write(temp.path().join("orphaned.yaml"), ORPHANED).unwrap();
    stageflow(temp.path())
        .args(["validate", "orphaned.yaml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "[UNREACHABLE_VIEW] view 5 (ORPHAN) is not reachable from the entry view (view 5)",
        ))
        .stderr(predicate::str::contains("SF-DEF-001"));

    let output = stageflow(temp.path())
        .args(["validate", "orphaned.yaml", "--format", "json"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["errors"][0]["code"], "UNREACHABLE_VIEW");

    stageflow(temp.path())
        .args(["publish", "orphaned.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SF-DEF-001"));
    assert!(!temp.path().join(".stageflow/workflows/7.yaml").exists());
}

#[test]
fn test_publish_then_start_custom_workflow() {
    let temp = initialized_workspace();
    let fixed = ORPHANED.replace(
        "  - { id: 5, view: 5, state: 1, next: 3 }\n",
        "  - { id: 5, view: 3, state: 1, next: 5 }\n",
    );
    fs::write(temp.path().join("fixed.yaml"), fixed).unwrap();

    stageflow(temp.path())
        .args(["publish", "fixed.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Published workflow 7 (Orphaned)"));
    stageflow(temp.path())
        .args(["start", "7", "--instance", "custom-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("at START"));
}

#[test]
fn test_graph_and_inspect() {
    let temp = initialized_workspace();
    stageflow(temp.path())
        .args(["graph", "2"])
        .assert()
        .success()
        .stdout(
            predicate::str::starts_with("digraph")
                .and(predicate::str::contains("SUBMIT [candidate]")),
        );

    let output = stageflow(temp.path())
        .args(["inspect", "2", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let inspection: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(inspection["entry_view"], "START");
    assert_eq!(inspection["terminal_views"], serde_json::json!(["END"]));
    assert_eq!(
        inspection["cycles"],
        serde_json::json!([["DISPATCH", "TEST"]])
    );
}

#[test]
fn test_bad_target_is_rejected() {
    let temp = initialized_workspace();
    stageflow(temp.path())
        .args(["graph", "not-a-file"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SF-CLI-001"));
    stageflow(temp.path())
        .args(["inspect", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SF-FOUND-001"));
}
