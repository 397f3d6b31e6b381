//! Episode records: the append-only log of one task run and its summary.
//!
//! An [`EpisodeRecorder`] collects round entries while the runner drives the
//! agent. Sealing consumes the recorder and yields a read-only
//! [`EpisodeRecord`]; the terminal outcome is fixed at that point and the
//! record is handed on by value.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use specguard_core::scoring::spec_compliance;
use specguard_core::{
    levenshtein, spec_digest, Decision, FailureVector, PassedVerdict, Protocol, SoftTerm, Spec,
    Task, Verdict, VerdictSummary,
};

use crate::adapter::{ActionKind, AgentAction, AgentResponse};
use crate::protocol::EpisodeState;

// ---------------------------------------------------------------------------
// Entries and outcomes
// ---------------------------------------------------------------------------

/// One logged agent action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEntry {
    pub round: u32,
    pub action: ActionKind,
    /// Proposed SMILES, or `args.smiles` of a `verify` call.
    pub artifact: Option<String>,
    pub verdict: Option<VerdictSummary>,
    pub failure_vector: Option<FailureVector>,
    pub confidence: Option<f64>,
    /// Whether the request carried the interrupt payload.
    pub interrupt: bool,
    pub interrupt_acknowledged: bool,
    pub tool_name: Option<String>,
    /// Abstention reason.
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cited_specs: Vec<String>,
}

impl RoundEntry {
    fn from_response(round: u32, response: &AgentResponse, interrupt: bool) -> Self {
        Self {
            round,
            action: response.kind(),
            artifact: None,
            verdict: None,
            failure_vector: None,
            confidence: response.confidence,
            interrupt,
            interrupt_acknowledged: interrupt && response.interrupt_ack,
            tool_name: None,
            reason: None,
            cited_specs: response.cited_specs.clone(),
        }
    }

    /// Tool calls are logged but do not use up a round.
    pub fn consumes_round(&self) -> bool {
        self.action != ActionKind::ToolCall
    }
}

/// How an episode ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminalOutcome {
    FinalizedPass,
    FinalizedFail,
    Abstained { reason: String },
    Exhausted { reason: String },
    AdapterError { detail: String },
    Cancelled,
    /// The task or its spec failed validation; no episode was run.
    InvalidInput { detail: String },
}

impl TerminalOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FinalizedPass => "finalized_pass",
            Self::FinalizedFail => "finalized_fail",
            Self::Abstained { .. } => "abstained",
            Self::Exhausted { .. } => "exhausted",
            Self::AdapterError { .. } => "adapter_error",
            Self::Cancelled => "cancelled",
            Self::InvalidInput { .. } => "invalid_input",
        }
    }

    pub fn decision(&self) -> Decision {
        match self {
            Self::FinalizedPass => Decision::Accept,
            Self::Abstained { .. } => Decision::Abstain,
            _ => Decision::Reject,
        }
    }

    /// Matching terminal state; `None` when no episode ran.
    pub fn state(&self) -> Option<EpisodeState> {
        match self {
            Self::FinalizedPass => Some(EpisodeState::FinalizedPass),
            Self::FinalizedFail => Some(EpisodeState::FinalizedFail),
            Self::Abstained { .. } => Some(EpisodeState::Abstained),
            Self::Exhausted { .. } => Some(EpisodeState::Exhausted),
            Self::AdapterError { .. } => Some(EpisodeState::AdapterError),
            Self::Cancelled => Some(EpisodeState::Cancelled),
            Self::InvalidInput { .. } => None,
        }
    }
}

/// Scores and flags derived when a record is sealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub hard_pass: bool,
    pub spec_score: f64,
    pub soft_terms: Vec<SoftTerm>,
    pub decision: Decision,
    pub interrupt_delivered: bool,
    pub interrupt_acknowledged: bool,
    /// No interrupt was delivered, or it was acknowledged and the episode
    /// still passed.
    pub interrupt_handled: bool,
    pub edit_distance: Option<usize>,
    pub final_confidence: Option<f64>,
    pub rounds_consumed: u32,
    pub tool_calls: u32,
    pub spec_digest: Option<String>,
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Sealed log of one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    episode_id: Uuid,
    task_id: String,
    suite: String,
    protocol: Option<Protocol>,
    adapter: String,
    spec_id: Option<String>,
    started_at: DateTime<Utc>,
    duration_ms: u64,
    entries: Vec<RoundEntry>,
    outcome: TerminalOutcome,
    final_artifact: Option<String>,
    summary: EpisodeSummary,
}

impl EpisodeRecord {
    /// Record for a task that never started: bad suite line, invalid task or
    /// missing spec.
    pub fn invalid_input(
        task_id: impl Into<String>,
        suite: impl Into<String>,
        protocol: Option<Protocol>,
        spec_id: Option<String>,
        adapter: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            episode_id: Uuid::new_v4(),
            task_id: task_id.into(),
            suite: suite.into(),
            protocol,
            adapter: adapter.into(),
            spec_id,
            started_at: Utc::now(),
            duration_ms: 0,
            entries: Vec::new(),
            outcome: TerminalOutcome::InvalidInput {
                detail: detail.into(),
            },
            final_artifact: None,
            summary: EpisodeSummary {
                hard_pass: false,
                spec_score: 0.0,
                soft_terms: Vec::new(),
                decision: Decision::Reject,
                interrupt_delivered: false,
                interrupt_acknowledged: false,
                interrupt_handled: true,
                edit_distance: None,
                final_confidence: None,
                rounds_consumed: 0,
                tool_calls: 0,
                spec_digest: None,
            },
        }
    }

    /// Adapter failure before the first step (e.g. the factory refused).
    pub fn adapter_unavailable(task: &Task, adapter: impl Into<String>, detail: impl Into<String>) -> Self {
        let mut record = Self::invalid_input(
            task.task_id.clone(),
            task.suite.clone(),
            Some(task.protocol),
            Some(task.spec_id.clone()),
            adapter,
            "",
        );
        record.outcome = TerminalOutcome::AdapterError {
            detail: detail.into(),
        };
        record
    }

    pub fn episode_id(&self) -> Uuid {
        self.episode_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn suite(&self) -> &str {
        &self.suite
    }

    pub fn protocol(&self) -> Option<Protocol> {
        self.protocol
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    pub fn spec_id(&self) -> Option<&str> {
        self.spec_id.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn entries(&self) -> &[RoundEntry] {
        &self.entries
    }

    pub fn outcome(&self) -> &TerminalOutcome {
        &self.outcome
    }

    pub fn final_artifact(&self) -> Option<&str> {
        self.final_artifact.as_deref()
    }

    pub fn summary(&self) -> &EpisodeSummary {
        &self.summary
    }

    /// Entries that consumed a round, in order.
    pub fn proposals(&self) -> impl Iterator<Item = &RoundEntry> {
        self.entries.iter().filter(|e| e.consumes_round())
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &RoundEntry> {
        self.entries.iter().filter(|e| !e.consumes_round())
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Mutable builder for an [`EpisodeRecord`].
#[derive(Debug)]
pub struct EpisodeRecorder {
    episode_id: Uuid,
    task: Task,
    adapter: String,
    spec_digest: Option<String>,
    started_at: DateTime<Utc>,
    clock: Instant,
    entries: Vec<RoundEntry>,
    interrupt_delivered: bool,
    last_soft_terms: Vec<SoftTerm>,
    last_confidence: Option<f64>,
}

impl EpisodeRecorder {
    pub fn new(task: &Task, adapter: impl Into<String>, spec: &Spec) -> Self {
        let digest = match spec_digest(spec) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(spec_id = %spec.id, error = %e, "could not digest spec");
                None
            }
        };
        Self {
            episode_id: Uuid::new_v4(),
            task: task.clone(),
            adapter: adapter.into(),
            spec_digest: digest,
            started_at: Utc::now(),
            clock: Instant::now(),
            entries: Vec::new(),
            interrupt_delivered: false,
            last_soft_terms: Vec::new(),
            last_confidence: None,
        }
    }

    pub fn entries(&self) -> &[RoundEntry] {
        &self.entries
    }

    pub fn note_interrupt_delivered(&mut self) {
        self.interrupt_delivered = true;
    }

    pub fn record_proposal(
        &mut self,
        round: u32,
        response: &AgentResponse,
        verdict: &Verdict,
        interrupt: bool,
    ) {
        let mut entry = RoundEntry::from_response(round, response, interrupt);
        entry.artifact = Some(verdict.artifact.clone());
        entry.verdict = Some(verdict.summary());
        entry.failure_vector = Some(verdict.failure_vector.clone());
        self.last_soft_terms = verdict.soft_terms();
        self.last_confidence = response.confidence;
        self.entries.push(entry);
    }

    /// `verdict` is the dry-run result; `None` when no evaluation ran.
    pub fn record_tool_call(
        &mut self,
        round: u32,
        response: &AgentResponse,
        verdict: Option<&Verdict>,
        interrupt: bool,
    ) {
        let mut entry = RoundEntry::from_response(round, response, interrupt);
        if let AgentAction::ToolCall { name, args } = &response.action {
            entry.tool_name = Some(name.clone());
            entry.artifact = args.get("smiles").and_then(|v| v.as_str()).map(String::from);
        }
        if let Some(verdict) = verdict {
            entry.verdict = Some(verdict.summary());
            entry.failure_vector = Some(verdict.failure_vector.clone());
        }
        self.entries.push(entry);
    }

    pub fn record_abstain(&mut self, round: u32, response: &AgentResponse, interrupt: bool) {
        let mut entry = RoundEntry::from_response(round, response, interrupt);
        if let AgentAction::Abstain { reason } = &response.action {
            entry.reason = Some(reason.clone());
        }
        self.last_confidence = response.confidence;
        self.entries.push(entry);
    }

    /// Finalize with a passing artifact. Only a [`PassedVerdict`] can
    /// produce `finalized_pass`.
    pub fn seal_pass(self, passed: PassedVerdict) -> EpisodeRecord {
        let soft_terms = passed.verdict().soft_terms();
        let artifact = passed.artifact().to_string();
        self.seal(TerminalOutcome::FinalizedPass, Some(artifact), soft_terms)
    }

    pub fn seal_fail(self, verdict: Verdict) -> EpisodeRecord {
        let soft_terms = verdict.soft_terms();
        self.seal(TerminalOutcome::FinalizedFail, Some(verdict.artifact), soft_terms)
    }

    pub fn seal_abstained(self, reason: impl Into<String>) -> EpisodeRecord {
        let soft_terms = self.last_soft_terms.clone();
        self.seal(
            TerminalOutcome::Abstained {
                reason: reason.into(),
            },
            None,
            soft_terms,
        )
    }

    pub fn seal_exhausted(self, reason: impl Into<String>) -> EpisodeRecord {
        let soft_terms = self.last_soft_terms.clone();
        self.seal(
            TerminalOutcome::Exhausted {
                reason: reason.into(),
            },
            None,
            soft_terms,
        )
    }

    pub fn seal_adapter_error(self, detail: impl Into<String>) -> EpisodeRecord {
        let soft_terms = self.last_soft_terms.clone();
        self.seal(
            TerminalOutcome::AdapterError {
                detail: detail.into(),
            },
            None,
            soft_terms,
        )
    }

    pub fn seal_cancelled(self) -> EpisodeRecord {
        let soft_terms = self.last_soft_terms.clone();
        self.seal(TerminalOutcome::Cancelled, None, soft_terms)
    }

    fn seal(
        self,
        outcome: TerminalOutcome,
        final_artifact: Option<String>,
        soft_terms: Vec<SoftTerm>,
    ) -> EpisodeRecord {
        let hard_pass = outcome == TerminalOutcome::FinalizedPass;
        let interrupt_acknowledged = self
            .entries
            .iter()
            .any(|e| e.interrupt && e.interrupt_acknowledged);
        let interrupt_handled =
            !self.interrupt_delivered || (interrupt_acknowledged && hard_pass);
        let edit_distance = match (self.task.input_smiles(), final_artifact.as_deref()) {
            (Some(input), Some(artifact)) => Some(levenshtein(input, artifact)),
            _ => None,
        };
        let rounds_consumed = self.entries.iter().filter(|e| e.consumes_round()).count() as u32;
        let tool_calls = self.entries.len() as u32 - rounds_consumed;

        let summary = EpisodeSummary {
            hard_pass,
            spec_score: spec_compliance(hard_pass, &soft_terms),
            soft_terms,
            decision: outcome.decision(),
            interrupt_delivered: self.interrupt_delivered,
            interrupt_acknowledged,
            interrupt_handled,
            edit_distance,
            final_confidence: self.last_confidence,
            rounds_consumed,
            tool_calls,
            spec_digest: self.spec_digest,
        };

        EpisodeRecord {
            episode_id: self.episode_id,
            task_id: self.task.task_id,
            suite: self.task.suite,
            protocol: Some(self.task.protocol),
            adapter: self.adapter,
            spec_id: Some(self.task.spec_id),
            started_at: self.started_at,
            duration_ms: self.clock.elapsed().as_millis() as u64,
            entries: self.entries,
            outcome,
            final_artifact,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specguard_core::{evaluate, Bound, Check, Constraint, TaskInput, TaskScoring};
    use std::collections::BTreeMap;

    fn spec() -> Spec {
        let mut bounds = BTreeMap::new();
        bounds.insert("MW".to_string(), Bound::new(100.0, 500.0).expect("bound"));
        let mut soft = BTreeMap::new();
        soft.insert("logP".to_string(), Bound::new(1.0, 3.0).expect("bound"));
        Spec {
            id: "spec_test".to_string(),
            version: 1,
            constraints: vec![
                Constraint::hard("size", Check::PropertyBoundsAll { bounds }),
                Constraint::soft("lipo", Check::PropertyBoundsAll { bounds: soft }, 1.0),
            ],
            behaviour: Default::default(),
        }
    }

    fn task(input: Option<&str>) -> Task {
        Task {
            task_id: "t-1".to_string(),
            suite: "unit".to_string(),
            protocol: Protocol::L2,
            prompt: "p".to_string(),
            input: TaskInput {
                smiles: input.map(String::from),
            },
            spec_id: "spec_test".to_string(),
            scoring: TaskScoring::default(),
            interrupt_at_step: None,
        }
    }

    #[test]
    fn test_seal_pass_sets_final_artifact_and_score() {
        let spec = spec();
        let mut recorder = EpisodeRecorder::new(&task(Some("CC")), "unit", &spec);
        let response = AgentResponse::propose("CC(=O)NC1=CC=CC=C1O").with_confidence(0.8);
        let verdict = evaluate(&spec, "CC(=O)NC1=CC=CC=C1O", 1);
        recorder.record_proposal(1, &response, &verdict, false);
        let passed = verdict.into_passed().expect("amide passes the size bound");

        let record = recorder.seal_pass(passed);
        assert_eq!(record.outcome(), &TerminalOutcome::FinalizedPass);
        assert_eq!(record.final_artifact(), Some("CC(=O)NC1=CC=CC=C1O"));
        let summary = record.summary();
        assert!(summary.hard_pass);
        assert!(summary.spec_score >= 1.0);
        assert_eq!(summary.decision, Decision::Accept);
        assert_eq!(summary.final_confidence, Some(0.8));
        assert_eq!(summary.rounds_consumed, 1);
        assert!(summary.edit_distance.is_some());
        assert!(summary.spec_digest.as_deref().is_some_and(|d| d.len() == 64));
    }

    #[test]
    fn test_abstain_clears_final_artifact() {
        let spec = spec();
        let mut recorder = EpisodeRecorder::new(&task(None), "unit", &spec);
        let response = AgentResponse::abstain("not sure").with_confidence(0.3);
        recorder.record_abstain(1, &response, false);

        let record = recorder.seal_abstained("not sure");
        assert_eq!(record.final_artifact(), None);
        assert_eq!(record.summary().decision, Decision::Abstain);
        assert_eq!(record.summary().spec_score, 0.0);
        assert_eq!(record.entries()[0].reason.as_deref(), Some("not sure"));
    }

    #[test]
    fn test_tool_calls_do_not_count_as_rounds() {
        let spec = spec();
        let mut recorder = EpisodeRecorder::new(&task(None), "unit", &spec);
        let call = AgentResponse::verify("CC");
        let dry_run = evaluate(&spec, "CC", 1);
        recorder.record_tool_call(1, &call, Some(&dry_run), false);

        let record = recorder.seal_exhausted("tool budget");
        assert_eq!(record.summary().rounds_consumed, 0);
        assert_eq!(record.summary().tool_calls, 1);
        let entry = &record.entries()[0];
        assert_eq!(entry.tool_name.as_deref(), Some("verify"));
        assert_eq!(entry.artifact.as_deref(), Some("CC"));
        assert!(entry.failure_vector.as_ref().is_some_and(|fv| fv.has_hard_failures()));
    }

    #[test]
    fn test_interrupt_handled_requires_ack_and_pass() {
        let spec = spec();
        let mut recorder = EpisodeRecorder::new(&task(None), "unit", &spec);
        recorder.note_interrupt_delivered();
        let response = AgentResponse::propose("CC").with_interrupt_ack(true);
        let verdict = evaluate(&spec, "CC", 1);
        recorder.record_proposal(1, &response, &verdict, true);

        let record = recorder.seal_fail(verdict);
        assert!(record.summary().interrupt_delivered);
        assert!(record.summary().interrupt_acknowledged);
        assert!(!record.summary().interrupt_handled);
        assert_eq!(record.final_artifact(), Some("CC"));
    }

    #[test]
    fn test_record_serializes_outcome_tag() {
        let record = EpisodeRecord::invalid_input("t-9", "unit", None, None, "heuristic", "bad line");
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["outcome"]["status"], "invalid_input");
        assert_eq!(json["outcome"]["detail"], "bad line");
        assert_eq!(json["summary"]["decision"], "reject");

        let back: EpisodeRecord = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, record);
    }
}
