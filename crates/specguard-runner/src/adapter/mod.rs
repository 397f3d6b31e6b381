//! Adapter contract between the protocol runner and an agent.
//!
//! Every agent, in-process or external, is driven through [`Adapter::step`]:
//! one [`AgentRequest`] in, one [`AgentResponse`] out. Responses are a closed
//! sum type tagged by `action` on the wire:
//!
//! ```json
//! {"action": "propose", "smiles": "CCO", "confidence": 0.7}
//! {"action": "tool_call", "name": "verify", "args": {"smiles": "CCO"}}
//! {"action": "abstain", "reason": "margins too tight"}
//! ```

pub mod abstention;
pub mod chat;
pub mod error;
pub mod heuristic;
pub mod open_source;
pub mod process;
pub mod registry;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use specguard_core::{FailureVector, Protocol, Task};

pub use error::{AdapterError, AdapterResult};
pub use registry::{AdapterFactory, AdapterRegistry, AdapterSettings};

/// The only tool offered to agents: a dry-run evaluation of `args.smiles`.
pub const VERIFY_TOOL: &str = "verify";

/// Tool advertised in a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub schema: Value,
}

impl ToolSpec {
    pub fn verify() -> Self {
        Self {
            name: VERIFY_TOOL.to_string(),
            schema: serde_json::json!({ "smiles": "string" }),
        }
    }
}

/// Tools available under `protocol`.
pub fn tools_for(protocol: Protocol) -> Vec<ToolSpec> {
    if protocol.allows_tools() {
        vec![ToolSpec::verify()]
    } else {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptPayload {
    pub policy: String,
    pub round: u32,
}

/// Context handed to the agent for one step. Rebuilt by the runner on every
/// call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub task: Task,
    pub round: u32,
    pub tools: Vec<ToolSpec>,
    pub failure_vector: Option<FailureVector>,
    pub interrupt: Option<InterruptPayload>,
}

impl AgentRequest {
    pub fn protocol(&self) -> Protocol {
        self.task.protocol
    }

    pub fn input_smiles(&self) -> Option<&str> {
        self.task.input_smiles()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Propose,
    ToolCall,
    Abstain,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Propose => "propose",
            ActionKind::ToolCall => "tool_call",
            ActionKind::Abstain => "abstain",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
    Propose { smiles: String },
    ToolCall { name: String, args: Map<String, Value> },
    Abstain { reason: String },
}

impl AgentAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            AgentAction::Propose { .. } => ActionKind::Propose,
            AgentAction::ToolCall { .. } => ActionKind::ToolCall,
            AgentAction::Abstain { .. } => ActionKind::Abstain,
        }
    }
}

/// One agent step: an action plus shared metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResponse", into = "RawResponse")]
pub struct AgentResponse {
    pub action: AgentAction,
    pub confidence: Option<f64>,
    pub cited_specs: Vec<String>,
    pub interrupt_ack: bool,
}

impl AgentResponse {
    fn with_action(action: AgentAction) -> Self {
        Self {
            action,
            confidence: None,
            cited_specs: Vec::new(),
            interrupt_ack: false,
        }
    }

    pub fn propose(smiles: impl Into<String>) -> Self {
        Self::with_action(AgentAction::Propose {
            smiles: smiles.into(),
        })
    }

    pub fn tool_call(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self::with_action(AgentAction::ToolCall {
            name: name.into(),
            args,
        })
    }

    /// `verify` call on `smiles`.
    pub fn verify(smiles: impl Into<String>) -> Self {
        let mut args = Map::new();
        args.insert("smiles".to_string(), Value::String(smiles.into()));
        Self::tool_call(VERIFY_TOOL, args)
    }

    pub fn abstain(reason: impl Into<String>) -> Self {
        Self::with_action(AgentAction::Abstain {
            reason: reason.into(),
        })
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_citations<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cited_specs = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_interrupt_ack(mut self, ack: bool) -> Self {
        self.interrupt_ack = ack;
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn from_json(text: &str) -> AdapterResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_value(value: Value) -> AdapterResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Reject blank abstain reasons and out-of-range metadata.
    pub fn validate(&self) -> AdapterResult<()> {
        if let AgentAction::Abstain { reason } = &self.action {
            if reason.trim().is_empty() {
                return Err(AdapterError::Malformed(
                    "abstain requires a non-empty reason".to_string(),
                ));
            }
        }
        if let Some(c) = self.confidence {
            if !c.is_finite() || !(0.0..=1.0).contains(&c) {
                return Err(AdapterError::Malformed(format!(
                    "confidence {c} is outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

/// Wire shape of a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawResponse {
    action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    smiles: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    cited_specs: Vec<String>,
    #[serde(default)]
    interrupt_ack: bool,
}

impl TryFrom<RawResponse> for AgentResponse {
    type Error = String;

    fn try_from(raw: RawResponse) -> Result<Self, Self::Error> {
        let action = match raw.action.as_str() {
            "propose" => AgentAction::Propose {
                smiles: raw.smiles.ok_or("propose requires 'smiles'")?,
            },
            "tool_call" => {
                let name = raw.name.ok_or("tool_call requires 'name'")?;
                let args = match raw.args {
                    None | Some(Value::Null) => Map::new(),
                    Some(Value::Object(map)) => map,
                    Some(other) => return Err(format!("tool_call args must be an object, got {other}")),
                };
                AgentAction::ToolCall { name, args }
            }
            "abstain" => {
                let reason = raw
                    .reason
                    .filter(|r| !r.trim().is_empty())
                    .ok_or("abstain requires a non-empty 'reason'")?;
                AgentAction::Abstain { reason }
            }
            other => return Err(format!("unknown action '{other}'")),
        };
        Ok(Self {
            action,
            confidence: raw.confidence,
            cited_specs: raw.cited_specs,
            interrupt_ack: raw.interrupt_ack,
        })
    }
}

impl From<AgentResponse> for RawResponse {
    fn from(response: AgentResponse) -> Self {
        let mut raw = RawResponse {
            action: response.kind().as_str().to_string(),
            smiles: None,
            name: None,
            args: None,
            reason: None,
            confidence: response.confidence,
            cited_specs: response.cited_specs,
            interrupt_ack: response.interrupt_ack,
        };
        match response.action {
            AgentAction::Propose { smiles } => raw.smiles = Some(smiles),
            AgentAction::ToolCall { name, args } => {
                raw.name = Some(name);
                raw.args = Some(Value::Object(args));
            }
            AgentAction::Abstain { reason } => raw.reason = Some(reason),
        }
        raw
    }
}

// ---------------------------------------------------------------------------
// Adapter trait
// ---------------------------------------------------------------------------

/// An agent driven step by step. One instance serves exactly one episode.
#[async_trait]
pub trait Adapter: Send {
    fn name(&self) -> &str;

    async fn step(&mut self, request: &AgentRequest) -> AdapterResult<AgentResponse>;
}

/// True when a hard failure came from a structural alert.
pub(crate) fn has_alert_failure(fv: &FailureVector) -> bool {
    fv.hard_fails
        .iter()
        .any(|f| f.detail.as_deref().is_some_and(|d| d.ends_with(" alert")))
}

/// Ids of every failed constraint, hard first.
pub(crate) fn failed_ids(fv: &FailureVector) -> Vec<String> {
    fv.hard_fail_ids()
        .into_iter()
        .chain(fv.soft_miss_ids())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use specguard_core::FailureItem;

    #[test]
    fn test_response_wire_shapes() {
        let r = AgentResponse::from_json(r#"{"action":"propose","smiles":"CCO","confidence":0.7}"#)
            .expect("propose");
        assert_eq!(r.action, AgentAction::Propose { smiles: "CCO".to_string() });
        assert_eq!(r.confidence, Some(0.7));
        assert!(!r.interrupt_ack);

        let r = AgentResponse::from_json(
            r#"{"action":"tool_call","name":"verify","args":{"smiles":"CC"},"interrupt_ack":true}"#,
        )
        .expect("tool call");
        assert_eq!(r.kind(), ActionKind::ToolCall);
        assert!(r.interrupt_ack);

        let r = AgentResponse::from_json(r#"{"action":"abstain","reason":"unsure"}"#).expect("abstain");
        assert_eq!(r.action, AgentAction::Abstain { reason: "unsure".to_string() });
    }

    #[test]
    fn test_malformed_responses_rejected() {
        for text in [
            r#"{"action":"propose"}"#,
            r#"{"action":"tool_call"}"#,
            r#"{"action":"tool_call","name":"verify","args":[1]}"#,
            r#"{"action":"abstain","reason":"  "}"#,
            r#"{"action":"dance"}"#,
            r#"{"smiles":"CCO"}"#,
            "not json",
        ] {
            let err = AgentResponse::from_json(text).expect_err(text);
            assert!(matches!(err, AdapterError::Malformed(_)), "{text}: {err}");
        }
    }

    #[test]
    fn test_serialize_flattens_action() {
        let r = AgentResponse::verify("CCO").with_confidence(0.4);
        let json = serde_json::to_value(&r).expect("serialize");
        assert_eq!(json["action"], "tool_call");
        assert_eq!(json["name"], "verify");
        assert_eq!(json["args"]["smiles"], "CCO");
        assert!(json.get("smiles").is_none());
    }

    #[test]
    fn test_confidence_range() {
        assert!(AgentResponse::propose("C").with_confidence(0.5).validate().is_ok());
        assert!(AgentResponse::propose("C").with_confidence(1.5).validate().is_err());
        assert!(AgentResponse::propose("C").with_confidence(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_blank_abstain_reason_rejected() {
        assert!(AgentResponse::abstain("unsure").validate().is_ok());
        assert!(matches!(
            AgentResponse::abstain("").validate(),
            Err(AdapterError::Malformed(_))
        ));
        assert!(AgentResponse::abstain("  \n").validate().is_err());
    }

    #[test]
    fn test_tools_only_under_l3() {
        assert!(tools_for(Protocol::L1).is_empty());
        assert!(tools_for(Protocol::L2).is_empty());
        assert_eq!(tools_for(Protocol::L3), vec![ToolSpec::verify()]);
    }

    #[test]
    fn test_alert_failure_detection() {
        let mut fv = FailureVector::new(1);
        fv.hard_fails.push(FailureItem::hard("ro5_core", "MW=30.07 outside [100,500]"));
        assert!(!has_alert_failure(&fv));
        fv.hard_fails.push(FailureItem::hard("pains_block", "catechol_A alert"));
        assert!(has_alert_failure(&fv));
        assert_eq!(failed_ids(&fv), vec!["ro5_core", "pains_block"]);
    }
}
