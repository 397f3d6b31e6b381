//! SpecGuard - spec-driven evaluation harness CLI
//!
//! ## Commands
//!
//! - `run`: run a task suite against an adapter and write a run directory
//! - `report`: summarise a run directory into `report.json`
//! - `evaluate`: check a single SMILES against a spec
//! - `list`: show available specs, suites and adapters

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};

use specguard_core::metrics::METRICS;
use specguard_core::obs::RunSpan;
use specguard_core::{
    evaluate, list_specs, list_suites, load_spec, CatalogPaths, Protocol, DATA_DIR_ENV,
};
use specguard_runner::{
    cancel_pair, write_report, write_run, AdapterRegistry, AdapterSettings, RunSummary,
    RunnerConfig, SuiteRun, SuiteRunner, TerminalOutcome,
};

#[derive(Parser)]
#[command(name = "specguard")]
#[command(author = "SpecGuard Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Spec-driven evaluation harness for molecular design agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding `specs/` and `suites/`
    #[arg(long, global = true, env = DATA_DIR_ENV, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task suite and write trace, leaderboard and summary
    Run {
        /// Suite name (file stem under suites/)
        suite: String,

        /// Only run tasks of this protocol (L1, L2 or L3)
        #[arg(short, long)]
        protocol: Option<Protocol>,

        /// Adapter name
        #[arg(short, long, visible_alias = "model", default_value = "heuristic")]
        adapter: String,

        /// Maximum number of tasks to run
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output directory (default: runs/<timestamp>_<suite>_<protocol>)
        #[arg(long)]
        run_path: Option<PathBuf>,

        /// Seed handed to seeded adapters
        #[arg(long, default_value = "7")]
        seed: u64,

        /// Episodes run concurrently
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Per-call adapter timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Command line for the `process` adapter
        #[arg(long)]
        process_cmd: Option<String>,

        /// Model name for the `openai_chat` adapter
        #[arg(long)]
        chat_model: Option<String>,
    },

    /// Summarise a run directory into report.json
    Report {
        /// Run directory containing trace.jsonl
        run_path: PathBuf,

        /// Write the report here instead of <run_path>/report.json
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Evaluate one SMILES string against a spec
    Evaluate {
        /// Spec id (file stem under specs/)
        spec: String,

        /// Candidate SMILES
        smiles: String,
    },

    /// List specs, suites and adapters
    List,
}

struct RunArgs {
    suite: String,
    protocol: Option<Protocol>,
    adapter: String,
    limit: Option<usize>,
    run_path: Option<PathBuf>,
    seed: u64,
    concurrency: usize,
    timeout: u64,
    process_cmd: Option<String>,
    chat_model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    specguard_core::init_tracing(cli.json, level);

    let catalog = CatalogPaths::from_root(&cli.data_dir);

    match cli.command {
        Commands::Run {
            suite,
            protocol,
            adapter,
            limit,
            run_path,
            seed,
            concurrency,
            timeout,
            process_cmd,
            chat_model,
        } => {
            let args = RunArgs {
                suite,
                protocol,
                adapter,
                limit,
                run_path,
                seed,
                concurrency,
                timeout,
                process_cmd,
                chat_model,
            };
            cmd_run(&catalog, args).await.map(|_| ())
        }
        Commands::Report { run_path, output } => cmd_report(&run_path, output.as_deref()),
        Commands::Evaluate { spec, smiles } => cmd_evaluate(&catalog, &spec, &smiles, cli.json),
        Commands::List => cmd_list(&catalog),
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

fn default_run_path(suite: &str, protocol: Option<Protocol>, now: DateTime<Utc>) -> PathBuf {
    let protocol = protocol.map_or("mixed", |p| p.as_str());
    PathBuf::from("runs").join(format!("{}_{}_{}", now.format("%Y%m%dT%H%M%SZ"), suite, protocol))
}

fn adapter_settings(args: &RunArgs) -> AdapterSettings {
    let mut settings = AdapterSettings::default().with_seed(args.seed);
    if let Some(cmd) = &args.process_cmd {
        settings = settings.with_process_command(cmd.split_whitespace().map(String::from).collect());
    }
    if let Some(model) = &args.chat_model {
        settings.chat.model = model.clone();
    }
    settings
}

async fn cmd_run(catalog: &CatalogPaths, args: RunArgs) -> Result<(SuiteRun, PathBuf)> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let _run_span = RunSpan::enter(&run_id);

    let config = RunnerConfig::default()
        .with_concurrency(args.concurrency)
        .with_timeout(Duration::from_secs(args.timeout));
    config.validate().context("invalid run options")?;

    let run_path = args
        .run_path
        .clone()
        .unwrap_or_else(|| default_run_path(&args.suite, args.protocol, Utc::now()));

    let (cancel, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling outstanding episodes");
            cancel.cancel();
        }
    });

    let runner = SuiteRunner::new(
        Arc::new(AdapterRegistry::with_builtins()),
        args.adapter.clone(),
        adapter_settings(&args),
        config,
        catalog.clone(),
    )
    .with_cancel(signal);

    info!(suite = %args.suite, adapter = %args.adapter, run_id = %run_id, "starting run");
    let run = runner
        .run_suite(&args.suite, args.protocol, args.limit)
        .await
        .with_context(|| format!("run suite {}", args.suite))?;

    let summary = write_run(&run_path, &run.suite, run.protocol, &run.records)
        .with_context(|| format!("write run to {:?}", run_path))?;

    print_run(&run, &summary, &run_path);
    METRICS.flush();
    Ok((run, run_path))
}

fn print_run(run: &SuiteRun, summary: &RunSummary, run_path: &Path) {
    println!("Suite: {} ({})", run.suite, summary.protocol);
    println!();
    for record in &run.records {
        let status = if record.summary().hard_pass { "✓" } else { "✗" };
        let detail = match record.outcome() {
            TerminalOutcome::Abstained { reason } | TerminalOutcome::Exhausted { reason } => {
                format!(" ({reason})")
            }
            TerminalOutcome::AdapterError { detail } | TerminalOutcome::InvalidInput { detail } => {
                format!(" ({detail})")
            }
            _ => String::new(),
        };
        println!(
            "  {} {} {} rounds={} score={:.3}{}",
            status,
            record.task_id(),
            record.outcome().as_str(),
            record.summary().rounds_consumed,
            record.summary().spec_score,
            detail
        );
    }
    println!();
    println!(
        "Summary: {} tasks, hard pass rate {:.2}, avg spec score {:.3}, avg rounds {:.2}",
        summary.num_tasks, summary.hard_pass_rate, summary.avg_spec_score, summary.avg_rounds
    );
    println!("Run written to {:?}", run_path);
}

// ---------------------------------------------------------------------------
// report / evaluate / list
// ---------------------------------------------------------------------------

fn cmd_report(run_path: &Path, output: Option<&Path>) -> Result<()> {
    let target = write_report(run_path, output)
        .with_context(|| format!("build report for {:?}", run_path))?;
    println!("Report written to {:?}", target);
    Ok(())
}

fn cmd_evaluate(catalog: &CatalogPaths, spec_id: &str, smiles: &str, json: bool) -> Result<()> {
    let spec = load_spec(catalog, spec_id).with_context(|| format!("load spec {spec_id}"))?;
    let verdict = evaluate(&spec, smiles, 1);

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        return Ok(());
    }

    println!(
        "{} {} against {}",
        if verdict.overall_pass { "✓ PASSED" } else { "✗ FAILED" },
        smiles,
        spec.id
    );
    for outcome in &verdict.outcomes {
        let status = if outcome.passed { "✓" } else { "✗" };
        let detail = outcome.detail.as_deref().unwrap_or("");
        println!("  {} {} {}", status, outcome.id, detail);
    }
    if !verdict.valid {
        for fail in &verdict.failure_vector.hard_fails {
            println!("  ✗ {} {}", fail.id, fail.detail.as_deref().unwrap_or(""));
        }
    }
    if !verdict.properties.is_empty() {
        println!("Properties:");
        for (name, value) in &verdict.properties {
            println!("  {name:<5} {value:.2}");
        }
    }
    Ok(())
}

fn cmd_list(catalog: &CatalogPaths) -> Result<()> {
    let specs = list_specs(catalog).context("list specs")?;
    let suites = list_suites(catalog).context("list suites")?;
    let registry = AdapterRegistry::with_builtins();

    println!("Specs:");
    for spec in &specs {
        println!("  - {spec}");
    }
    println!("Suites:");
    for suite in &suites {
        println!("  - {suite}");
    }
    println!("Adapters:");
    for name in registry.names() {
        println!("  - {name}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shipped_catalog() -> CatalogPaths {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .and_then(Path::parent)
            .map(PathBuf::from)
            .expect("workspace root");
        CatalogPaths::from_root(root.join("data"))
    }

    fn run_args(suite: &str, run_path: PathBuf) -> RunArgs {
        RunArgs {
            suite: suite.to_string(),
            protocol: None,
            adapter: "heuristic".to_string(),
            limit: None,
            run_path: Some(run_path),
            seed: 7,
            concurrency: 2,
            timeout: 30,
            process_cmd: None,
            chat_model: None,
        }
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "specguard", "--json", "run", "basic", "--protocol", "l2", "--model", "abstention_guard",
            "--limit", "2",
        ])
        .expect("parse");
        assert!(cli.json);
        match cli.command {
            Commands::Run {
                suite,
                protocol,
                adapter,
                limit,
                ..
            } => {
                assert_eq!(suite, "basic");
                assert_eq!(protocol, Some(Protocol::L2));
                assert_eq!(adapter, "abstention_guard");
                assert_eq!(limit, Some(2));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_default_run_path_layout() {
        let now = DateTime::parse_from_rfc3339("2026-03-01T12:30:05Z")
            .expect("parse RFC3339")
            .with_timezone(&Utc);
        assert_eq!(
            default_run_path("basic", Some(Protocol::L3), now),
            PathBuf::from("runs/20260301T123005Z_basic_L3")
        );
        assert_eq!(
            default_run_path("basic", None, now),
            PathBuf::from("runs/20260301T123005Z_basic_mixed")
        );
    }

    #[test]
    fn test_adapter_settings_from_flags() {
        let mut args = run_args("basic", PathBuf::from("unused"));
        args.process_cmd = Some("python3  agent.py --fast".to_string());
        args.chat_model = Some("gpt-4o".to_string());
        let settings = adapter_settings(&args);
        assert_eq!(
            settings.process_command,
            Some(vec!["python3".to_string(), "agent.py".to_string(), "--fast".to_string()])
        );
        assert_eq!(settings.chat.model, "gpt-4o");
        assert_eq!(settings.seed, 7);
    }

    #[tokio::test]
    async fn test_cmd_run_then_report() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let run_path = temp_dir.path().join("run");

        let (run, written) = cmd_run(&shipped_catalog(), run_args("interrupts", run_path.clone()))
            .await
            .expect("run interrupts suite");
        assert_eq!(written, run_path);
        assert_eq!(run.records.len(), 4);
        assert!(run_path.join("trace.jsonl").is_file());

        cmd_report(&run_path, None).expect("report");
        assert!(run_path.join("report.json").is_file());
    }

    #[test]
    fn test_cmd_evaluate_and_list() {
        let catalog = shipped_catalog();
        cmd_evaluate(&catalog, "spec_v1_basic", "CC(=O)NC1=CC=CC=C1O", false).expect("evaluate");
        cmd_evaluate(&catalog, "spec_v1_basic", "not a molecule", true).expect("evaluate invalid");
        assert!(cmd_evaluate(&catalog, "spec_missing", "CCO", false).is_err());
        cmd_list(&catalog).expect("list");
    }

    #[test]
    fn test_report_on_missing_trace_fails() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let err = cmd_report(temp_dir.path(), None).expect_err("no trace");
        assert!(format!("{err:#}").contains("trace not found"));
    }
}
