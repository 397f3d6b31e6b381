//! Example adapter that exercises the `verify` tool before proposing.

use async_trait::async_trait;

use super::heuristic::DEFAULT_SCAFFOLD;
use super::{has_alert_failure, Adapter, AdapterResult, AgentRequest, AgentResponse, VERIFY_TOOL};

#[derive(Debug, Default)]
pub struct OpenSourceExampleAdapter;

impl OpenSourceExampleAdapter {
    pub const NAME: &'static str = "open_source_example";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Adapter for OpenSourceExampleAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn step(&mut self, request: &AgentRequest) -> AdapterResult<AgentResponse> {
        let ack = request.interrupt.is_some();
        let starting = request.input_smiles().unwrap_or(DEFAULT_SCAFFOLD);

        let response = match &request.failure_vector {
            None if request.round == 1 && request.has_tool(VERIFY_TOOL) => {
                AgentResponse::verify(starting)
            }
            None => AgentResponse::propose(starting).with_confidence(0.5),
            Some(fv) => {
                let proposal = if has_alert_failure(fv) {
                    DEFAULT_SCAFFOLD
                } else {
                    starting
                };
                AgentResponse::propose(proposal)
                    .with_confidence(0.6)
                    .with_citations(fv.hard_fail_ids())
            }
        };
        Ok(response.with_interrupt_ack(ack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{tools_for, AgentAction};
    use specguard_core::{FailureItem, FailureVector, Protocol, Task, TaskInput, TaskScoring};

    fn request(protocol: Protocol, fv: Option<FailureVector>) -> AgentRequest {
        AgentRequest {
            task: Task {
                task_id: "t".to_string(),
                suite: "s".to_string(),
                protocol,
                prompt: "p".to_string(),
                input: TaskInput {
                    smiles: Some("Oc1ccc(O)cc1".to_string()),
                },
                spec_id: "spec".to_string(),
                scoring: TaskScoring::default(),
                interrupt_at_step: None,
            },
            round: 1,
            tools: tools_for(protocol),
            failure_vector: fv,
            interrupt: None,
        }
    }

    #[tokio::test]
    async fn test_verifies_first_under_l3() {
        let mut adapter = OpenSourceExampleAdapter::new();
        let r = adapter.step(&request(Protocol::L3, None)).await.expect("step");
        match r.action {
            AgentAction::ToolCall { name, args } => {
                assert_eq!(name, VERIFY_TOOL);
                assert_eq!(args["smiles"], "Oc1ccc(O)cc1");
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_proposes_directly_without_tools() {
        let mut adapter = OpenSourceExampleAdapter::new();
        let r = adapter.step(&request(Protocol::L2, None)).await.expect("step");
        assert_eq!(r.action, AgentAction::Propose { smiles: "Oc1ccc(O)cc1".to_string() });
    }

    #[tokio::test]
    async fn test_replaces_alert_hits_after_feedback() {
        let mut adapter = OpenSourceExampleAdapter::new();
        let mut fv = FailureVector::new(1);
        fv.hard_fails.push(FailureItem::hard("pains_block", "catechol_A alert"));
        let r = adapter.step(&request(Protocol::L3, Some(fv))).await.expect("step");
        assert_eq!(r.action, AgentAction::Propose { smiles: DEFAULT_SCAFFOLD.to_string() });
        assert_eq!(r.cited_specs, vec!["pains_block"]);
    }
}
