//! Orchestrator-level pipeline tests: bootstrap, governance, workflow
//! execution end-to-end, recommendation, and checkbox syncing, all inside
//! isolated temporary repositories.

use std::time::Duration;

use camino::Utf8PathBuf;
use smartspec::Orchestrator;
use smartspec_config::Config;
use smartspec_registry::{UniversalFlag, parse_flags};
use smartspec_store::ExecutionStatus;
use tempfile::TempDir;
use uuid::Uuid;

const SPEC_ID: &str = "spec-core-001-auth";

fn write(dir: &TempDir, rel: &str, content: &str) {
    let path = dir.path().join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn bundle_file(rel: &str) -> String {
    format!("specs/core/{SPEC_ID}/{rel}")
}

async fn bootstrap(dir: &TempDir) -> Orchestrator {
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    Orchestrator::bootstrap(Config::default(), root)
        .await
        .unwrap()
}

async fn wait_terminal(orchestrator: &Orchestrator, id: Uuid) -> ExecutionStatus {
    for _ in 0..250 {
        let snapshot = orchestrator.status(id).await.unwrap();
        if snapshot.status.is_terminal() {
            return snapshot.status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("execution {id} did not reach a terminal state");
}

fn seeded_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(&dir, &bundle_file("spec.md"), "# Auth spec\n");
    write(&dir, &bundle_file("plan.md"), "# Auth plan\n");
    write(
        &dir,
        &bundle_file("tasks.md"),
        "- [ ] TASK-001 Hashing\n  evidence: code path=src/auth.py symbol=hash_password\n",
    );
    write(&dir, "src/auth.py", "def hash_password(pw):\n    return pw\n");
    dir
}

#[tokio::test]
async fn verify_tasks_workflow_writes_the_report_tree() {
    let dir = seeded_repo();
    let orchestrator = bootstrap(&dir).await;

    let id = orchestrator
        .execute(
            "verify_tasks",
            serde_json::json!({"spec_id": SPEC_ID}),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(wait_terminal(&orchestrator, id).await, ExecutionStatus::Completed);

    let summary_path = dir
        .path()
        .join(".spec/reports/verify_tasks")
        .join(SPEC_ID)
        .join("summary.json");
    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
    assert_eq!(summary["totals"]["verified"], 1);
    assert!(
        dir.path()
            .join(".spec/reports/verify_tasks")
            .join(SPEC_ID)
            .join("report.md")
            .exists()
    );
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn governed_writes_require_the_apply_flag() {
    let dir = seeded_repo();
    let orchestrator = bootstrap(&dir).await;

    let err = orchestrator
        .execute(
            "sync_tasks_checkboxes",
            serde_json::json!({"spec_id": SPEC_ID}),
            &[],
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "governance_error");
    assert!(err.remediation().unwrap().contains("--apply"));
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn sync_checkboxes_aligns_claims_and_is_idempotent() {
    let dir = seeded_repo();
    let orchestrator = bootstrap(&dir).await;
    let flags = parse_flags(&["apply".to_string()]).unwrap();

    let id = orchestrator
        .execute(
            "sync_tasks_checkboxes",
            serde_json::json!({"spec_id": SPEC_ID}),
            &flags,
        )
        .await
        .unwrap();
    assert_eq!(wait_terminal(&orchestrator, id).await, ExecutionStatus::Completed);

    let tasks_path = dir.path().join(bundle_file("tasks.md"));
    let synced = std::fs::read_to_string(&tasks_path).unwrap();
    assert!(
        synced.starts_with("- [x] TASK-001"),
        "verified task should be checked: {synced}"
    );

    // Second run changes nothing.
    let id = orchestrator
        .execute(
            "sync_tasks_checkboxes",
            serde_json::json!({"spec_id": SPEC_ID}),
            &flags,
        )
        .await
        .unwrap();
    assert_eq!(wait_terminal(&orchestrator, id).await, ExecutionStatus::Completed);
    assert_eq!(std::fs::read_to_string(&tasks_path).unwrap(), synced);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn validate_only_generation_writes_a_preview_not_the_artifact() {
    let dir = TempDir::new().unwrap();
    let orchestrator = bootstrap(&dir).await;
    let flags = vec![UniversalFlag::ValidateOnly];

    let id = orchestrator
        .execute(
            "generate_spec",
            serde_json::json!({"spec_id": SPEC_ID, "prompt": "JWT auth for the API"}),
            &flags,
        )
        .await
        .unwrap();
    assert_eq!(wait_terminal(&orchestrator, id).await, ExecutionStatus::Completed);

    assert!(
        !dir.path().join(bundle_file("spec.md")).exists(),
        "validate-only must not write governed artifacts"
    );
    let preview = dir
        .path()
        .join(".spec/reports/generate_spec")
        .join(SPEC_ID)
        .join("preview.md");
    let content = std::fs::read_to_string(preview).unwrap();
    assert!(content.contains("JWT auth for the API"));
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn recommendation_walks_the_pipeline_decision_table() {
    let dir = TempDir::new().unwrap();
    let orchestrator = bootstrap(&dir).await;

    assert_eq!(
        orchestrator.recommend(SPEC_ID, false).unwrap().workflow,
        "generate_spec"
    );

    write(&dir, &bundle_file("spec.md"), "# spec\n");
    assert_eq!(
        orchestrator.recommend(SPEC_ID, false).unwrap().workflow,
        "generate_plan"
    );

    write(&dir, &bundle_file("plan.md"), "# plan\n");
    assert_eq!(
        orchestrator.recommend(SPEC_ID, false).unwrap().workflow,
        "generate_tasks"
    );

    write(&dir, &bundle_file("tasks.md"), "- [ ] TASK-001 x\n");
    assert_eq!(
        orchestrator.recommend(SPEC_ID, false).unwrap().workflow,
        "verify_tasks"
    );
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn ask_routes_recommendation_questions() {
    let dir = TempDir::new().unwrap();
    let orchestrator = bootstrap(&dir).await;

    let answer = orchestrator
        .ask(&format!("what should I do next on {SPEC_ID}"))
        .await
        .unwrap();
    match answer.outcome {
        smartspec::AskOutcome::Recommendation {
            spec_id,
            recommendation,
        } => {
            assert_eq!(spec_id, SPEC_ID);
            assert_eq!(recommendation.workflow, "generate_spec");
        }
        other => panic!("expected recommendation, got {other:?}"),
    }
    assert!(!answer.routed.fell_back);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn unknown_workflow_and_bad_spec_id_are_validation_errors() {
    let dir = TempDir::new().unwrap();
    let orchestrator = bootstrap(&dir).await;

    let err = orchestrator
        .execute("make_coffee", serde_json::json!({"spec_id": SPEC_ID}), &[])
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "validation_error");

    let err = orchestrator
        .execute(
            "verify_tasks",
            serde_json::json!({"spec_id": "not-a-spec-id"}),
            &[],
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "validation_error");
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn engine_writes_stay_inside_the_runtime_and_governed_trees() {
    let dir = seeded_repo();
    let orchestrator = bootstrap(&dir).await;

    let id = orchestrator
        .execute(
            "generate_docs",
            serde_json::json!({"spec_id": SPEC_ID}),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(wait_terminal(&orchestrator, id).await, ExecutionStatus::Completed);

    // Everything new is under specs/ or .spec/ (plus the seeded src/).
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let name = entry.unwrap().file_name().to_string_lossy().into_owned();
        assert!(
            ["specs", ".spec", "src"].contains(&name.as_str()),
            "unexpected top-level entry {name}"
        );
    }
    orchestrator.shutdown().await;
}
