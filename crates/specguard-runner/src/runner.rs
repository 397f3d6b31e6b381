//! Protocol runner: drives one agent through one task.
//!
//! The runner owns the round loop. Each adapter call is bounded by the
//! configured timeout and races the episode's cancellation signal; every
//! failure ends the episode with a terminal outcome rather than an error, so
//! [`EpisodeRunner::run`] always yields a sealed record.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::Instrument;

use specguard_core::metrics::METRICS;
use specguard_core::{obs, ConstraintEvaluator, FailureVector, Task};

use crate::adapter::{
    tools_for, ActionKind, Adapter, AdapterError, AgentAction, AgentRequest, AgentResponse,
    InterruptPayload, VERIFY_TOOL,
};
use crate::config::RunnerConfig;
use crate::episode::{EpisodeRecord, EpisodeRecorder};
use crate::protocol::EpisodeState;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Trigger side of a cancellation pair. Clones trigger the same signal.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Observer side; cheap to clone, one per episode.
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                // Handle dropped without cancelling.
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(Arc::new(tx)), CancelSignal(rx))
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

enum StepFailure {
    Cancelled,
    Adapter(AdapterError),
}

impl From<AdapterError> for StepFailure {
    fn from(err: AdapterError) -> Self {
        StepFailure::Adapter(err)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EpisodeRunner {
    config: RunnerConfig,
}

impl EpisodeRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub async fn run(
        &self,
        task: &Task,
        evaluator: &ConstraintEvaluator,
        adapter: &mut dyn Adapter,
    ) -> EpisodeRecord {
        self.run_with_cancel(task, evaluator, adapter, CancelSignal::never())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        task: &Task,
        evaluator: &ConstraintEvaluator,
        adapter: &mut dyn Adapter,
        mut cancel: CancelSignal,
    ) -> EpisodeRecord {
        let span = obs::episode_span(&task.task_id, task.protocol.as_str());
        let record = self
            .drive(task, evaluator, adapter, &mut cancel)
            .instrument(span)
            .await;

        METRICS.inc_episodes();
        obs::emit_episode_finished(
            &task.task_id,
            record.outcome().as_str(),
            record.summary().rounds_consumed,
            record.duration_ms(),
        );
        record
    }

    async fn drive(
        &self,
        task: &Task,
        evaluator: &ConstraintEvaluator,
        adapter: &mut dyn Adapter,
        cancel: &mut CancelSignal,
    ) -> EpisodeRecord {
        let protocol = task.protocol;
        let spec = evaluator.spec();
        let max_rounds = self.config.max_rounds(protocol);
        let tool_budget = self.config.max_tool_calls_per_round;
        let tools = tools_for(protocol);
        let adapter_name = adapter.name().to_string();

        obs::emit_episode_started(&task.task_id, protocol.as_str(), &adapter_name);

        let mut recorder = EpisodeRecorder::new(task, adapter_name, spec);
        let mut state = EpisodeState::AwaitingRound;
        let mut feedback: Option<FailureVector> = None;

        'episode: {
            for round in 1..=max_rounds {
                let interrupt = (task.interrupt_at_step == Some(round)).then(|| InterruptPayload {
                    policy: spec.behaviour.interrupt_policy.clone(),
                    round,
                });
                if let Some(payload) = &interrupt {
                    recorder.note_interrupt_delivered();
                    METRICS.inc_interrupts();
                    obs::emit_interrupt_delivered(&task.task_id, round, &payload.policy);
                }
                let interrupted = interrupt.is_some();
                let waiting = if interrupted {
                    EpisodeState::Interrupted
                } else {
                    EpisodeState::AwaitingRound
                };
                let mut tool_calls = 0u32;

                loop {
                    if state != waiting {
                        state.advance(waiting);
                    }
                    let request = AgentRequest {
                        task: task.clone(),
                        round,
                        tools: tools.clone(),
                        failure_vector: feedback.clone(),
                        interrupt: interrupt.clone(),
                    };

                    let response = match self.call(adapter, &request, cancel).await {
                        Ok(response) => response,
                        Err(StepFailure::Cancelled) => {
                            state.advance(EpisodeState::Cancelled);
                            break 'episode recorder.seal_cancelled();
                        }
                        Err(StepFailure::Adapter(err)) => {
                            state.advance(EpisodeState::AdapterError);
                            break 'episode self.fail(recorder, &task.task_id, round, err);
                        }
                    };

                    match &response.action {
                        AgentAction::Abstain { reason } => {
                            recorder.record_abstain(round, &response, interrupted);
                            METRICS.inc_rounds();
                            obs::emit_round_evaluated(&task.task_id, round, "abstain", None);
                            state.advance(EpisodeState::Abstained);
                            break 'episode recorder.seal_abstained(reason.clone());
                        }

                        AgentAction::ToolCall { name, args } => {
                            if !protocol.allows_tools() {
                                recorder.record_tool_call(round, &response, None, interrupted);
                                state.advance(EpisodeState::AdapterError);
                                let err = AdapterError::IllegalAction {
                                    protocol,
                                    action: ActionKind::ToolCall.to_string(),
                                };
                                break 'episode self.fail(recorder, &task.task_id, round, err);
                            }
                            if name != VERIFY_TOOL {
                                recorder.record_tool_call(round, &response, None, interrupted);
                                state.advance(EpisodeState::AdapterError);
                                let err = AdapterError::UnknownTool(name.clone());
                                break 'episode self.fail(recorder, &task.task_id, round, err);
                            }

                            tool_calls += 1;
                            if tool_calls > tool_budget {
                                state.advance(EpisodeState::Exhausted);
                                break 'episode recorder.seal_exhausted(format!(
                                    "tool budget of {tool_budget} calls exceeded in round {round}"
                                ));
                            }

                            let smiles = args.get("smiles").and_then(Value::as_str).unwrap_or_default();
                            let dry_run = evaluator.evaluate(smiles, round);
                            recorder.record_tool_call(round, &response, Some(&dry_run), interrupted);
                            METRICS.inc_tool_calls();
                            obs::emit_round_evaluated(
                                &task.task_id,
                                round,
                                "tool_call",
                                Some(dry_run.overall_pass),
                            );
                            feedback = Some(dry_run.failure_vector);
                        }

                        AgentAction::Propose { smiles } => {
                            state.advance(EpisodeState::Evaluating);
                            let verdict = evaluator.evaluate(smiles, round);
                            recorder.record_proposal(round, &response, &verdict, interrupted);
                            METRICS.inc_rounds();
                            obs::emit_round_evaluated(
                                &task.task_id,
                                round,
                                "propose",
                                Some(verdict.overall_pass),
                            );

                            match verdict.into_passed() {
                                Ok(passed) => {
                                    state.advance(EpisodeState::FinalizedPass);
                                    break 'episode recorder.seal_pass(passed);
                                }
                                Err(verdict) if round < max_rounds && protocol.allows_repair() => {
                                    feedback = Some(verdict.failure_vector);
                                    state.advance(EpisodeState::AwaitingRound);
                                    break;
                                }
                                Err(verdict) => {
                                    state.advance(EpisodeState::FinalizedFail);
                                    break 'episode recorder.seal_fail(verdict);
                                }
                            }
                        }
                    }
                }
            }

            state.advance(EpisodeState::Exhausted);
            recorder.seal_exhausted(format!("no decision within {max_rounds} rounds"))
        }
    }

    /// One adapter call: cancellation first, then the timeout-bound step.
    async fn call(
        &self,
        adapter: &mut dyn Adapter,
        request: &AgentRequest,
        cancel: &mut CancelSignal,
    ) -> Result<AgentResponse, StepFailure> {
        if cancel.is_cancelled() {
            return Err(StepFailure::Cancelled);
        }
        let timeout = self.config.adapter_timeout();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StepFailure::Cancelled),
            result = tokio::time::timeout(timeout, adapter.step(request)) => {
                let response = result.map_err(|_| AdapterError::Timeout(timeout))??;
                response.validate()?;
                Ok(response)
            }
        }
    }

    fn fail(
        &self,
        recorder: EpisodeRecorder,
        task_id: &str,
        round: u32,
        err: AdapterError,
    ) -> EpisodeRecord {
        METRICS.inc_adapter_errors();
        obs::emit_adapter_error(task_id, round, &err);
        recorder.seal_adapter_error(err.to_string())
    }
}
