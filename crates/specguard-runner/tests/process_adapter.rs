//! Subprocess adapter round trips through `sh`.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use specguard_core::{load_spec, CatalogPaths, ConstraintEvaluator, Protocol, Task, TaskInput, TaskScoring};
use specguard_runner::adapter::process::ProcessAdapter;
use specguard_runner::{
    Adapter, AdapterError, AgentAction, AgentRequest, EpisodeRunner, RunnerConfig, TerminalOutcome,
};

fn sh(script: &str) -> ProcessAdapter {
    ProcessAdapter::new(vec![
        "sh".to_string(),
        "-c".to_string(),
        script.to_string(),
    ])
    .expect("command")
}

fn task() -> Task {
    Task {
        task_id: "proc-001".to_string(),
        suite: "process".to_string(),
        protocol: Protocol::L1,
        prompt: "Return a passing molecule".to_string(),
        input: TaskInput {
            smiles: Some("CCO".to_string()),
        },
        spec_id: "spec_v1_basic".to_string(),
        scoring: TaskScoring::default(),
        interrupt_at_step: None,
    }
}

fn request() -> AgentRequest {
    AgentRequest {
        task: task(),
        round: 1,
        tools: Vec::new(),
        failure_vector: None,
        interrupt: None,
    }
}

fn evaluator() -> ConstraintEvaluator {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .map(PathBuf::from)
        .expect("workspace root");
    let spec = load_spec(&CatalogPaths::from_root(root.join("data")), "spec_v1_basic")
        .expect("shipped spec");
    ConstraintEvaluator::new(Arc::new(spec))
}

#[tokio::test]
async fn test_reads_response_and_defaults_confidence() {
    let mut adapter = sh(r#"cat >/dev/null; echo '{"action":"propose","smiles":"CC(=O)NC1=CC=CC=C1O"}'"#);
    let response = adapter.step(&request()).await.expect("step");
    assert_eq!(
        response.action,
        AgentAction::Propose {
            smiles: "CC(=O)NC1=CC=CC=C1O".to_string()
        }
    );
    assert_eq!(response.confidence, Some(0.5));
}

#[tokio::test]
async fn test_request_is_one_json_line_on_stdin() {
    let dir = tempfile::tempdir().expect("tempdir");
    let capture = dir.path().join("request.json");
    let script = format!(
        r#"IFS= read -r line; printf '%s' "$line" > '{}'; echo '{{"action":"abstain","reason":"inspecting"}}'"#,
        capture.display()
    );
    let mut adapter = sh(&script);
    adapter.step(&request()).await.expect("step");

    let written = std::fs::read_to_string(&capture).expect("captured request");
    let echoed: AgentRequest = serde_json::from_str(&written).expect("request JSON");
    assert_eq!(echoed, request());
}

#[tokio::test]
async fn test_nonzero_exit_is_a_process_error() {
    let mut adapter = sh("cat >/dev/null; echo boom >&2; exit 3");
    let err = adapter.step(&request()).await.expect_err("exit 3");
    match err {
        AdapterError::Process(detail) => {
            assert!(detail.contains('3'));
            assert!(detail.contains("boom"));
        }
        other => panic!("expected process error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_or_non_object_output_is_malformed() {
    let mut empty = sh("cat >/dev/null");
    assert!(matches!(
        empty.step(&request()).await,
        Err(AdapterError::Malformed(_))
    ));

    let mut array = sh("cat >/dev/null; echo '[1, 2]'");
    assert!(matches!(
        array.step(&request()).await,
        Err(AdapterError::Malformed(_))
    ));

    let mut unknown = sh(r#"cat >/dev/null; echo '{"action":"dance"}'"#);
    assert!(matches!(
        unknown.step(&request()).await,
        Err(AdapterError::Malformed(_))
    ));
}

#[tokio::test]
async fn test_full_episode_through_process() {
    let runner = EpisodeRunner::new(RunnerConfig::default());
    let mut adapter = sh(r#"cat >/dev/null; echo '{"action":"propose","smiles":"CC(=O)NC1=CC=CC=C1O","confidence":0.9}'"#);

    let record = runner.run(&task(), &evaluator(), &mut adapter).await;

    assert_eq!(record.outcome(), &TerminalOutcome::FinalizedPass);
    assert_eq!(record.adapter(), "process");
    assert_eq!(record.summary().final_confidence, Some(0.9));
}

#[tokio::test]
async fn test_slow_process_times_out() {
    let runner = EpisodeRunner::new(RunnerConfig::default().with_timeout(Duration::from_millis(200)));
    let mut adapter = sh("sleep 30");

    let record = runner.run(&task(), &evaluator(), &mut adapter).await;

    assert!(matches!(record.outcome(), TerminalOutcome::AdapterError { .. }));
}
