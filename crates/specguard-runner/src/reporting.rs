//! Run directory artifacts: trace, leaderboard, summary and report.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use specguard_core::scoring::{
    abstention_utility, brier_score, expected_calibration_error, hard_violation_rate, DEFAULT_BINS,
};
use specguard_core::{CostModel, Decision, Protocol};

use crate::episode::EpisodeRecord;

pub const TRACE_FILE: &str = "trace.jsonl";
pub const LEADERBOARD_FILE: &str = "leaderboard.tsv";
pub const SUMMARY_FILE: &str = "summary.json";
pub const REPORT_FILE: &str = "report.json";

const LEADERBOARD_HEADER: &str =
    "task_id\thard_pass\tspec_score\tdecision\tconfidence\trounds\tedit_distance\toutcome";

/// `summary.json` written next to the trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub suite: String,
    /// Protocol filter of the run, or `mixed`.
    pub protocol: String,
    pub num_tasks: usize,
    pub hard_pass_rate: f64,
    pub avg_spec_score: f64,
    pub avg_rounds: f64,
    pub avg_edit_distance: f64,
    pub outcomes: BTreeMap<String, usize>,
}

impl RunSummary {
    pub fn from_records(suite: &str, protocol: Option<Protocol>, records: &[EpisodeRecord]) -> Self {
        let mut outcomes = BTreeMap::new();
        for record in records {
            *outcomes.entry(record.outcome().as_str().to_string()).or_insert(0) += 1;
        }
        let edit_distances: Vec<f64> = records
            .iter()
            .filter_map(|r| r.summary().edit_distance)
            .map(|d| d as f64)
            .collect();

        Self {
            generated_at: Utc::now(),
            suite: suite.to_string(),
            protocol: protocol.map_or_else(|| "mixed".to_string(), |p| p.to_string()),
            num_tasks: records.len(),
            hard_pass_rate: mean(records.iter().map(|r| f64::from(u8::from(r.summary().hard_pass)))),
            avg_spec_score: mean(records.iter().map(|r| r.summary().spec_score)),
            avg_rounds: mean(records.iter().map(|r| f64::from(r.summary().rounds_consumed))),
            avg_edit_distance: mean(edit_distances.into_iter()),
            outcomes,
        }
    }
}

/// Aggregate metrics written to `report.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportMetrics {
    pub num_tasks: usize,
    pub avg_spec_score: f64,
    pub hard_violation_rate: f64,
    pub abstain_rate: f64,
    pub accept_rate: f64,
    pub avg_rounds: f64,
    pub avg_edit_distance: f64,
    pub avg_confidence: Option<f64>,
    pub brier_score: Option<f64>,
    pub ece: Option<f64>,
    pub abstention_utility: f64,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    summary: &'a ReportMetrics,
    records: &'a [EpisodeRecord],
}

/// Write trace, leaderboard and summary into `run_dir`, creating it.
pub fn write_run(
    run_dir: &Path,
    suite: &str,
    protocol: Option<Protocol>,
    records: &[EpisodeRecord],
) -> Result<RunSummary> {
    std::fs::create_dir_all(run_dir).with_context(|| format!("create {:?}", run_dir))?;

    let mut trace = String::new();
    for record in records {
        let line = serde_json::to_string(record).context("serialize episode record")?;
        trace.push_str(&line);
        trace.push('\n');
    }
    let trace_path = run_dir.join(TRACE_FILE);
    std::fs::write(&trace_path, trace).with_context(|| format!("write {:?}", trace_path))?;

    let leaderboard_path = run_dir.join(LEADERBOARD_FILE);
    std::fs::write(&leaderboard_path, render_leaderboard(records))
        .with_context(|| format!("write {:?}", leaderboard_path))?;

    let summary = RunSummary::from_records(suite, protocol, records);
    let content = serde_json::to_string_pretty(&summary).context("serialize run summary")?;
    let summary_path = run_dir.join(SUMMARY_FILE);
    std::fs::write(&summary_path, content).with_context(|| format!("write {:?}", summary_path))?;

    Ok(summary)
}

/// Tab-separated leaderboard, one row per record.
pub fn render_leaderboard(records: &[EpisodeRecord]) -> String {
    let mut out = String::from(LEADERBOARD_HEADER);
    out.push('\n');
    for record in records {
        let s = record.summary();
        let confidence = s
            .final_confidence
            .map(|c| format!("{c:.3}"))
            .unwrap_or_default();
        let edit_distance = s.edit_distance.map(|d| d.to_string()).unwrap_or_default();
        let _ = writeln!(
            out,
            "{}\t{}\t{:.3}\t{}\t{}\t{}\t{}\t{}",
            record.task_id(),
            u8::from(s.hard_pass),
            s.spec_score,
            s.decision,
            confidence,
            s.rounds_consumed,
            edit_distance,
            record.outcome().as_str(),
        );
    }
    out
}

/// Read `trace.jsonl` from a run directory.
pub fn load_trace(run_dir: &Path) -> Result<Vec<EpisodeRecord>> {
    let path = run_dir.join(TRACE_FILE);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("trace not found at {:?}", path))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse {:?} line {}", path, idx + 1))
        })
        .collect()
}

pub fn summarise(records: &[EpisodeRecord]) -> ReportMetrics {
    let n = records.len();
    let hard_passes: Vec<bool> = records.iter().map(|r| r.summary().hard_pass).collect();
    let decisions: Vec<Decision> = records.iter().map(|r| r.summary().decision).collect();
    let rate = |d: Decision| {
        if n == 0 {
            0.0
        } else {
            decisions.iter().filter(|x| **x == d).count() as f64 / n as f64
        }
    };

    let calibration: Vec<(bool, f64)> = records
        .iter()
        .filter_map(|r| r.summary().final_confidence.map(|c| (r.summary().hard_pass, c)))
        .collect();
    let (brier, ece) = if calibration.is_empty() {
        (None, None)
    } else {
        (
            Some(brier_score(&calibration)),
            Some(expected_calibration_error(&calibration, DEFAULT_BINS)),
        )
    };
    let edit_distances: Vec<f64> = records
        .iter()
        .filter_map(|r| r.summary().edit_distance)
        .map(|d| d as f64)
        .collect();

    ReportMetrics {
        num_tasks: n,
        avg_spec_score: mean(records.iter().map(|r| r.summary().spec_score)),
        hard_violation_rate: hard_violation_rate(&hard_passes),
        abstain_rate: rate(Decision::Abstain),
        accept_rate: rate(Decision::Accept),
        avg_rounds: mean(records.iter().map(|r| f64::from(r.summary().rounds_consumed))),
        avg_edit_distance: mean(edit_distances.into_iter()),
        avg_confidence: (!calibration.is_empty())
            .then(|| mean(calibration.iter().map(|(_, c)| *c))),
        brier_score: brier,
        ece,
        abstention_utility: abstention_utility(&hard_passes, &decisions, &CostModel::report()),
    }
}

/// Summarise `run_dir/trace.jsonl` into `report.json` (or `destination`).
pub fn write_report(run_dir: &Path, destination: Option<&Path>) -> Result<PathBuf> {
    let records = load_trace(run_dir)?;
    let summary = summarise(&records);
    let target = destination.map_or_else(|| run_dir.join(REPORT_FILE), Path::to_path_buf);
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
    }
    let content = serde_json::to_string_pretty(&Report {
        summary: &summary,
        records: &records,
    })
    .context("serialize report")?;
    std::fs::write(&target, content).with_context(|| format!("write {:?}", target))?;
    Ok(target)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
