//! Structured observability hooks for run and episode lifecycle events.
//!
//! - `RunSpan` RAII guard for a whole suite run
//! - `episode_span` for instrumenting an episode future
//! - emission functions for episode start, round evaluation, finish and
//!   adapter failures

use tracing::{info, warn};

/// RAII guard that enters a run-scoped span for the duration of a run.
///
/// Holds an entered span, so keep it out of spawned futures; use
/// [`episode_span`] with `Instrument` there.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("specguard.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Span tagged with the task id and protocol of one episode.
pub fn episode_span(task_id: &str, protocol: &str) -> tracing::Span {
    tracing::info_span!("specguard.episode", task_id = %task_id, protocol = %protocol)
}

pub fn emit_episode_started(task_id: &str, protocol: &str, adapter: &str) {
    info!(
        event = "episode.started",
        task_id = %task_id,
        protocol = %protocol,
        adapter = %adapter,
    );
}

/// Emit event: one response handled.
pub fn emit_round_evaluated(task_id: &str, round: u32, action: &str, passed: Option<bool>) {
    info!(
        event = "episode.round",
        task_id = %task_id,
        round = round,
        action = %action,
        passed = ?passed,
    );
}

pub fn emit_interrupt_delivered(task_id: &str, round: u32, policy: &str) {
    info!(
        event = "episode.interrupt",
        task_id = %task_id,
        round = round,
        policy = %policy,
    );
}

pub fn emit_episode_finished(task_id: &str, outcome: &str, rounds: u32, duration_ms: u64) {
    info!(
        event = "episode.finished",
        task_id = %task_id,
        outcome = %outcome,
        rounds = rounds,
        duration_ms = duration_ms,
    );
}

/// Emit event: the adapter failed and the episode ends (warning level).
pub fn emit_adapter_error(task_id: &str, round: u32, error: &dyn std::fmt::Display) {
    warn!(event = "episode.adapter_error", task_id = %task_id, round = round, error = %error);
}
