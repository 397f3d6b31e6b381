//! Adapter that prefers abstaining when feedback sits close to a bound.

use async_trait::async_trait;

use super::{Adapter, AdapterResult, AgentRequest, AgentResponse};

const CANDIDATES: [&str; 3] = [
    "CC(=O)NC1=CC=CC=C1O",
    "COc1ccc(N)cc1O",
    "CCOC(=O)N(CC)CCO",
];

fn candidate(seed: u64) -> &'static str {
    CANDIDATES[(seed % CANDIDATES.len() as u64) as usize]
}

#[derive(Debug)]
pub struct AbstentionGuardAdapter {
    seed: u64,
    margin_threshold: f64,
}

impl AbstentionGuardAdapter {
    pub const NAME: &'static str = "abstention_guard";

    pub fn new(seed: u64, margin_threshold: f64) -> Self {
        Self {
            seed,
            margin_threshold,
        }
    }

    fn near_bound(&self, values: impl IntoIterator<Item = f64>) -> bool {
        values.into_iter().any(|v| v.abs() <= self.margin_threshold)
    }
}

#[async_trait]
impl Adapter for AbstentionGuardAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn step(&mut self, request: &AgentRequest) -> AdapterResult<AgentResponse> {
        let ack = request.interrupt.is_some();

        let Some(fv) = request.failure_vector.as_ref() else {
            let proposal = request
                .input_smiles()
                .unwrap_or_else(|| candidate(self.seed));
            return Ok(AgentResponse::propose(proposal)
                .with_confidence(0.55)
                .with_citations(["initial"])
                .with_interrupt_ack(ack));
        };

        if fv.has_hard_failures() {
            // Still hard-gated: rotate to another scaffold.
            let proposal = candidate(self.seed + fv.hard_fails.len() as u64);
            return Ok(AgentResponse::propose(proposal)
                .with_confidence(0.45)
                .with_citations(fv.hard_fail_ids())
                .with_interrupt_ack(ack));
        }

        let near_margin = self.near_bound(fv.margins.iter().filter_map(|m| m.distance_to_bound));
        let near_soft = self.near_bound(fv.soft_misses.iter().filter_map(|m| m.delta));
        if near_margin || near_soft {
            return Ok(AgentResponse::abstain("uncertain compliance; margins too tight")
                .with_confidence(0.35)
                .with_interrupt_ack(ack));
        }

        let proposal = request
            .input_smiles()
            .unwrap_or_else(|| candidate(self.seed + u64::from(request.round)));
        Ok(AgentResponse::propose(proposal)
            .with_confidence(0.6)
            .with_interrupt_ack(ack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AgentAction;
    use specguard_core::{FailureItem, FailureVector, Protocol, Task, TaskInput, TaskScoring};

    fn request(fv: Option<FailureVector>) -> AgentRequest {
        AgentRequest {
            task: Task {
                task_id: "t".to_string(),
                suite: "s".to_string(),
                protocol: Protocol::L3,
                prompt: "p".to_string(),
                input: TaskInput::default(),
                spec_id: "spec".to_string(),
                scoring: TaskScoring::default(),
                interrupt_at_step: None,
            },
            round: 1,
            tools: Vec::new(),
            failure_vector: fv,
            interrupt: None,
        }
    }

    #[test]
    fn test_candidate_rotation() {
        assert_eq!(candidate(0), CANDIDATES[0]);
        assert_eq!(candidate(4), CANDIDATES[1]);
        assert_eq!(candidate(8), CANDIDATES[2]);
    }

    #[tokio::test]
    async fn test_first_step_proposes_seeded_candidate() {
        let mut adapter = AbstentionGuardAdapter::new(7, 0.25);
        let r = adapter.step(&request(None)).await.expect("step");
        assert_eq!(r.action, AgentAction::Propose { smiles: candidate(7).to_string() });
    }

    #[tokio::test]
    async fn test_abstains_near_margin() {
        let mut adapter = AbstentionGuardAdapter::new(0, 0.25);
        let mut fv = FailureVector::new(1);
        fv.margins.push(FailureItem::margin("logP", 0.1));
        let r = adapter.step(&request(Some(fv))).await.expect("step");
        assert!(matches!(r.action, AgentAction::Abstain { .. }));
    }

    #[tokio::test]
    async fn test_proposes_when_margins_are_wide() {
        let mut adapter = AbstentionGuardAdapter::new(0, 0.25);
        let mut fv = FailureVector::new(1);
        fv.margins.push(FailureItem::margin("MW", 40.0));
        let r = adapter.step(&request(Some(fv))).await.expect("step");
        assert_eq!(r.action, AgentAction::Propose { smiles: candidate(1).to_string() });
    }

    #[tokio::test]
    async fn test_rotates_on_hard_failure() {
        let mut adapter = AbstentionGuardAdapter::new(0, 0.25);
        let mut fv = FailureVector::new(1);
        fv.hard_fails.push(FailureItem::hard("ro5_core", "MW=30.07 outside [100,500]"));
        let r = adapter.step(&request(Some(fv))).await.expect("step");
        assert_eq!(r.action, AgentAction::Propose { smiles: candidate(1).to_string() });
        assert_eq!(r.confidence, Some(0.45));
    }
}
