//! Deterministic repair heuristic driven by the failure vector.

use async_trait::async_trait;

use super::{failed_ids, has_alert_failure, Adapter, AdapterResult, AgentRequest, AgentResponse};

pub const DEFAULT_SCAFFOLD: &str = "CC(=O)NC1=CC=CC=C1O";
pub const RING_SAFE_SCAFFOLD: &str = "COc1ccccc1O";
pub const POLAR_SCAFFOLD: &str = "CCOC(=O)N(CC)CCO";

/// Proposes the task input first, then swaps in a known-safe scaffold:
/// ring-safe on a structural alert, polar when any property margin is
/// negative, otherwise the input again.
#[derive(Debug, Default)]
pub struct HeuristicAdapter;

impl HeuristicAdapter {
    pub const NAME: &'static str = "heuristic";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Adapter for HeuristicAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn step(&mut self, request: &AgentRequest) -> AdapterResult<AgentResponse> {
        let ack = request.interrupt.is_some();
        let starting = request.input_smiles();

        let Some(fv) = request.failure_vector.as_ref() else {
            return Ok(AgentResponse::propose(starting.unwrap_or(DEFAULT_SCAFFOLD))
                .with_confidence(0.5)
                .with_citations(["initial_guess"])
                .with_interrupt_ack(ack));
        };

        let mut cited = failed_ids(fv);
        let proposal = if has_alert_failure(fv) {
            RING_SAFE_SCAFFOLD
        } else if fv.margins.iter().any(|m| m.distance_to_bound.is_some_and(|d| d < 0.0)) {
            POLAR_SCAFFOLD
        } else if let Some(input) = starting {
            if cited.is_empty() {
                cited.push("original".to_string());
            }
            input
        } else {
            if cited.is_empty() {
                cited.push("default".to_string());
            }
            DEFAULT_SCAFFOLD
        };

        Ok(AgentResponse::propose(proposal)
            .with_confidence(0.7)
            .with_citations(cited)
            .with_interrupt_ack(ack))
    }
}
