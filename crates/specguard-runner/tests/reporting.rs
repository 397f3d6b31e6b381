//! Suite runs against the shipped data and the run-directory artifacts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use specguard_core::{CatalogPaths, Protocol};
use specguard_runner::reporting::{LEADERBOARD_FILE, REPORT_FILE, SUMMARY_FILE, TRACE_FILE};
use specguard_runner::{
    cancel_pair, load_trace, write_report, write_run, Adapter, AdapterRegistry, AdapterResult,
    AdapterSettings, AgentRequest, AgentResponse, RunSummary, RunnerConfig, SuiteRunner,
    TerminalOutcome,
};

fn data_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .map(|root| root.join("data"))
        .expect("workspace root")
}

fn suite_runner(adapter: &str, settings: AdapterSettings, catalog: CatalogPaths) -> SuiteRunner {
    SuiteRunner::new(
        Arc::new(AdapterRegistry::with_builtins()),
        adapter,
        settings,
        RunnerConfig::default(),
        catalog,
    )
}

#[tokio::test]
async fn test_heuristic_passes_basic_suite_and_reports() {
    let runner = suite_runner(
        "heuristic",
        AdapterSettings::default(),
        CatalogPaths::from_root(data_root()),
    );
    let run = runner.run_suite("basic", None, None).await.expect("run basic");

    let ids: Vec<&str> = run.records.iter().map(|r| r.task_id()).collect();
    assert_eq!(
        ids,
        vec![
            "basic-l1-001",
            "basic-l1-002",
            "basic-l2-001",
            "basic-l2-002",
            "basic-l3-001",
            "basic-l3-002"
        ]
    );
    for record in &run.records {
        assert_eq!(
            record.outcome(),
            &TerminalOutcome::FinalizedPass,
            "{} did not pass",
            record.task_id()
        );
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let run_dir = dir.path().join("run");
    let summary = write_run(&run_dir, &run.suite, run.protocol, &run.records).expect("write run");
    assert_eq!(summary.num_tasks, 6);
    assert_eq!(summary.protocol, "mixed");
    assert_eq!(summary.hard_pass_rate, 1.0);
    assert_eq!(summary.outcomes.get("finalized_pass"), Some(&6));

    for file in [TRACE_FILE, LEADERBOARD_FILE, SUMMARY_FILE] {
        assert!(run_dir.join(file).is_file(), "{file} missing");
    }
    let leaderboard = std::fs::read_to_string(run_dir.join(LEADERBOARD_FILE)).expect("leaderboard");
    assert_eq!(leaderboard.lines().count(), 7);
    assert!(leaderboard.starts_with("task_id\thard_pass\tspec_score"));

    let on_disk: RunSummary = serde_json::from_str(
        &std::fs::read_to_string(run_dir.join(SUMMARY_FILE)).expect("summary"),
    )
    .expect("summary json");
    assert_eq!(on_disk, summary);

    let trace = load_trace(&run_dir).expect("trace");
    let reloaded: Vec<(&str, &TerminalOutcome)> =
        trace.iter().map(|r| (r.task_id(), r.outcome())).collect();
    let original: Vec<(&str, &TerminalOutcome)> =
        run.records.iter().map(|r| (r.task_id(), r.outcome())).collect();
    assert_eq!(reloaded, original);

    let report_path = write_report(&run_dir, None).expect("report");
    assert_eq!(report_path, run_dir.join(REPORT_FILE));
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).expect("read report"))
            .expect("report json");
    assert_eq!(report["summary"]["num_tasks"], 6);
    assert_eq!(report["summary"]["accept_rate"], 1.0);
    assert_eq!(report["summary"]["hard_violation_rate"], 0.0);
    assert_eq!(report["summary"]["abstention_utility"], 0.0);
    assert_eq!(report["records"].as_array().map(Vec::len), Some(6));
}

#[tokio::test]
async fn test_protocol_filter_and_limit() {
    let runner = suite_runner(
        "heuristic",
        AdapterSettings::default(),
        CatalogPaths::from_root(data_root()),
    );
    let run = runner
        .run_suite("basic", Some(Protocol::L2), Some(1))
        .await
        .expect("run");
    assert_eq!(run.records.len(), 1);
    assert_eq!(run.records[0].task_id(), "basic-l2-001");
    assert_eq!(run.records[0].protocol(), Some(Protocol::L2));
}

#[tokio::test]
async fn test_invalid_entries_become_records_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let specs = dir.path().join("specs");
    let suites = dir.path().join("suites");
    std::fs::create_dir_all(&specs).expect("specs dir");
    std::fs::create_dir_all(&suites).expect("suites dir");
    std::fs::copy(
        data_root().join("specs").join("spec_v1_basic.yaml"),
        specs.join("spec_v1_basic.yaml"),
    )
    .expect("copy spec");

    let suite = [
        r#"{"task_id":"ok-1","suite":"mixed","protocol":"L1","prompt":"p","input":{"smiles":"COc1ccccc1O"},"spec_id":"spec_v1_basic"}"#,
        r#"{"task_id":"broken","protocol":"L1""#,
        r#"{"task_id":"nospec-1","suite":"mixed","protocol":"L1","prompt":"p","input":{},"spec_id":"spec_missing"}"#,
    ]
    .join("\n");
    std::fs::write(suites.join("mixed.jsonl"), suite).expect("write suite");

    let runner = suite_runner(
        "heuristic",
        AdapterSettings::default(),
        CatalogPaths::from_root(dir.path()),
    );
    let run = runner.run_suite("mixed", None, None).await.expect("run");

    assert_eq!(run.records.len(), 3);
    assert_eq!(run.records[0].outcome(), &TerminalOutcome::FinalizedPass);
    assert_eq!(run.records[1].outcome().as_str(), "invalid_input");
    assert_eq!(run.records[1].task_id(), "mixed:2");
    assert_eq!(run.records[2].outcome().as_str(), "invalid_input");
    assert_eq!(run.records[2].spec_id(), Some("spec_missing"));
}

#[tokio::test]
async fn test_adapter_factory_failure_is_recorded_per_task() {
    let runner = suite_runner(
        "process",
        AdapterSettings::default().with_process_command(Vec::new()),
        CatalogPaths::from_root(data_root()),
    );
    let run = runner
        .run_suite("basic", Some(Protocol::L1), None)
        .await
        .expect("run");
    assert_eq!(run.records.len(), 2);
    assert!(run
        .records
        .iter()
        .all(|r| r.outcome().as_str() == "adapter_error"));
}

#[tokio::test]
async fn test_unknown_adapter_is_rejected_up_front() {
    let runner = suite_runner(
        "oracle",
        AdapterSettings::default(),
        CatalogPaths::from_root(data_root()),
    );
    let err = runner.run_suite("basic", None, None).await.expect_err("unknown adapter");
    assert!(err.to_string().contains("unknown adapter 'oracle'"));
}

/// Hangs on one task id, passes every other task.
struct StallOnTask(&'static str);

#[async_trait]
impl Adapter for StallOnTask {
    fn name(&self) -> &str {
        "stall_on_task"
    }

    async fn step(&mut self, request: &AgentRequest) -> AdapterResult<AgentResponse> {
        if request.task.task_id == self.0 {
            std::future::pending::<()>().await;
        }
        Ok(AgentResponse::propose("CC(=O)NC1=CC=CC=C1O"))
    }
}

fn stalling_runner(config: RunnerConfig) -> SuiteRunner {
    let mut registry = AdapterRegistry::new();
    registry
        .register("stall_on_task", |_: &AdapterSettings| {
            Ok(Box::new(StallOnTask("basic-l1-001")) as Box<dyn Adapter>)
        })
        .expect("register");
    SuiteRunner::new(
        Arc::new(registry),
        "stall_on_task",
        AdapterSettings::default(),
        config,
        CatalogPaths::from_root(data_root()),
    )
}

#[tokio::test]
async fn test_episode_handle_cancels_one_task_only() {
    let runner = stalling_runner(RunnerConfig::default().with_timeout(Duration::from_secs(600)));
    let handle = runner.episode_handle("basic-l1-001");

    let (run, ()) = tokio::join!(
        runner.run_suite("basic", Some(Protocol::L1), None),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        }
    );
    let run = run.expect("run");

    assert_eq!(run.records.len(), 2);
    assert_eq!(run.records[0].task_id(), "basic-l1-001");
    assert_eq!(run.records[0].outcome(), &TerminalOutcome::Cancelled);
    assert_eq!(run.records[1].outcome(), &TerminalOutcome::FinalizedPass);
}

#[tokio::test]
async fn test_episode_handle_fired_before_run() {
    let runner = suite_runner(
        "heuristic",
        AdapterSettings::default(),
        CatalogPaths::from_root(data_root()),
    );
    runner.episode_handle("basic-l2-002").cancel();

    let run = runner
        .run_suite("basic", Some(Protocol::L2), None)
        .await
        .expect("run");
    assert_eq!(run.records[0].outcome(), &TerminalOutcome::FinalizedPass);
    assert_eq!(run.records[1].task_id(), "basic-l2-002");
    assert_eq!(run.records[1].outcome(), &TerminalOutcome::Cancelled);
    assert!(run.records[1].entries().is_empty());
}

#[tokio::test]
async fn test_suite_cancel_reaches_every_episode() {
    let (cancel, signal) = cancel_pair();
    let runner = stalling_runner(RunnerConfig::default().with_timeout(Duration::from_secs(600)))
        .with_cancel(signal);

    let (run, ()) = tokio::join!(
        runner.run_suite("basic", Some(Protocol::L1), None),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        }
    );
    let run = run.expect("run");

    assert_eq!(run.records[0].outcome(), &TerminalOutcome::Cancelled);
    assert_eq!(run.records[1].outcome(), &TerminalOutcome::FinalizedPass);
}
