//! Adapter for OpenAI-compatible chat completion endpoints.
//!
//! One HTTP round trip per step. The model is instructed to reply with a
//! single JSON object; anything it returns that does not fit the response
//! contract is turned into an `abstain` with a fixed reason rather than an
//! adapter error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{Adapter, AdapterError, AdapterResult, AgentRequest, AgentResponse};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const DEFAULT_SYSTEM_PROMPT: &str = "You are an autonomous medicinal chemistry assistant operating \
inside an automated test harness. Every reply MUST be a single JSON object with double-quoted \
keys and no trailing text.";

const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Overrides `OPENAI_BASE_URL` and the public endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            max_tokens: 512,
            base_url: None,
            system_prompt: None,
        }
    }
}

pub struct ChatAdapter {
    settings: ChatSettings,
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for ChatAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatAdapter")
            .field("model", &self.settings.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ChatAdapter {
    pub const NAME: &'static str = "openai_chat";

    pub fn new(settings: ChatSettings, api_key: impl Into<String>) -> AdapterResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("specguard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AdapterError::Config(format!("http client: {e}")))?;

        let base_url = settings
            .base_url
            .clone()
            .or_else(|| std::env::var(BASE_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            settings,
            base_url,
            api_key: api_key.into(),
            http_client,
        })
    }

    /// Build from `OPENAI_API_KEY`; fails when the key is unset.
    pub fn from_env(settings: &ChatSettings) -> AdapterResult<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AdapterError::Config(format!("{API_KEY_ENV} is not set")))?;
        Self::new(settings.clone(), api_key)
    }

    fn build_messages(&self, request: &AgentRequest) -> Value {
        let tool_names: Vec<&str> = request.tools.iter().map(|t| t.name.as_str()).collect();
        let instructions = json!({
            "task": request.task,
            "round": request.round,
            "failure_vector": request.failure_vector,
            "interrupt": request.interrupt,
            "available_tools": tool_names,
            "output_schema": {
                "action": "propose | tool_call | abstain (lowercase)",
                "smiles": "required if action == 'propose'",
                "name": "required if action == 'tool_call'",
                "args": "object, required if action == 'tool_call'",
                "reason": "required if action == 'abstain'",
                "confidence": "float between 0 and 1 (optional)",
                "interrupt_ack": "true to acknowledge an interrupt (optional)"
            },
            "rules": [
                "Always return a single JSON object. Never include markdown or prose.",
                "Only use action 'tool_call' with a tool listed in available_tools.",
                "If unsure or missing data, respond with action 'abstain' and a concise reason.",
                "Respect the failure vector: fix hard fails before finalising."
            ]
        });
        let system = self
            .settings
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        json!([
            { "role": "system", "content": system },
            { "role": "user", "content": instructions.to_string() }
        ])
    }
}

#[async_trait]
impl Adapter for ChatAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn step(&mut self, request: &AgentRequest) -> AdapterResult<AgentResponse> {
        let body = json!({
            "model": self.settings.model,
            "messages": self.build_messages(request),
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
        });

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AdapterError::Transport(format!("HTTP {status}: {}", text.trim())));
        }

        let payload: Value = response.json().await?;
        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        debug!(model = %self.settings.model, bytes = content.len(), "chat completion received");

        Ok(parse_content(content, request))
    }
}

/// Parse the model's message text into a response.
pub fn parse_content(content: &str, request: &AgentRequest) -> AgentResponse {
    let text = strip_code_fence(content);
    if text.is_empty() {
        return fallback("Model returned empty content", DEFAULT_CONFIDENCE);
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(data)) => normalize_response(&data, request),
        Ok(_) => fallback("Model returned a non-object JSON value", DEFAULT_CONFIDENCE),
        Err(_) => fallback("Model returned invalid JSON", DEFAULT_CONFIDENCE),
    }
}

/// Coerce a decoded model reply into the response contract.
pub fn normalize_response(data: &Map<String, Value>, request: &AgentRequest) -> AgentResponse {
    let confidence = extract_confidence(data.get("confidence"));
    let ack = request.interrupt.is_some()
        && data
            .get("interrupt_ack")
            .and_then(Value::as_bool)
            .unwrap_or(false);
    let action = data
        .get("action")
        .and_then(Value::as_str)
        .map(|a| a.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let response = match action.as_str() {
        "propose" => match data.get("smiles").and_then(Value::as_str).map(str::trim) {
            Some(smiles) if !smiles.is_empty() => AgentResponse::propose(smiles),
            _ => AgentResponse::abstain("Missing SMILES for proposal"),
        },
        "tool_call" => {
            let name = data
                .get("name")
                .and_then(Value::as_str)
                .filter(|n| request.has_tool(n));
            match (name, data.get("args")) {
                (None, _) => AgentResponse::abstain("Requested unavailable tool"),
                (Some(name), Some(Value::Object(args))) => {
                    AgentResponse::tool_call(name, args.clone())
                }
                (Some(_), _) => AgentResponse::abstain("Tool call missing arguments object"),
            }
        }
        "abstain" => {
            let reason = data
                .get("reason")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or("Model chose to abstain.");
            AgentResponse::abstain(reason)
        }
        _ => AgentResponse::abstain("Model returned invalid action"),
    };

    let cited: Vec<String> = data
        .get("cited_specs")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default();

    response
        .with_confidence(confidence)
        .with_citations(cited)
        .with_interrupt_ack(ack)
}

fn fallback(reason: &str, confidence: f64) -> AgentResponse {
    AgentResponse::abstain(reason).with_confidence(confidence)
}

fn extract_confidence(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|c| c.is_finite())
        .map_or(DEFAULT_CONFIDENCE, |c| c.clamp(0.0, 1.0))
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. ```json) on the opening line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{tools_for, AgentAction, InterruptPayload};
    use specguard_core::{Protocol, Task, TaskInput, TaskScoring};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request(protocol: Protocol) -> AgentRequest {
        AgentRequest {
            task: Task {
                task_id: "t".to_string(),
                suite: "s".to_string(),
                protocol,
                prompt: "p".to_string(),
                input: TaskInput::default(),
                spec_id: "spec".to_string(),
                scoring: TaskScoring::default(),
                interrupt_at_step: None,
            },
            round: 1,
            tools: tools_for(protocol),
            failure_vector: None,
            interrupt: None,
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn reason(response: &AgentResponse) -> &str {
        match &response.action {
            AgentAction::Abstain { reason } => reason,
            other => panic!("expected abstain, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_valid_actions() {
        let req = request(Protocol::L3);

        let r = normalize_response(&object(json!({"action": "PROPOSE", "smiles": " CCO ", "confidence": 0.8})), &req);
        assert_eq!(r.action, AgentAction::Propose { smiles: "CCO".to_string() });
        assert_eq!(r.confidence, Some(0.8));

        let r = normalize_response(
            &object(json!({"action": "tool_call", "name": "verify", "args": {"smiles": "CCO"}})),
            &req,
        );
        assert_eq!(r.kind(), crate::adapter::ActionKind::ToolCall);
        assert_eq!(r.confidence, Some(DEFAULT_CONFIDENCE));
    }

    #[test]
    fn test_normalize_falls_back_to_abstain() {
        let l2 = request(Protocol::L2);
        let l3 = request(Protocol::L3);

        let r = normalize_response(&object(json!({"action": "dance"})), &l3);
        assert_eq!(reason(&r), "Model returned invalid action");

        let r = normalize_response(&object(json!({"action": "propose", "smiles": ""})), &l3);
        assert_eq!(reason(&r), "Missing SMILES for proposal");

        let r = normalize_response(&object(json!({"action": "tool_call", "name": "verify", "args": {}})), &l2);
        assert_eq!(reason(&r), "Requested unavailable tool");

        let r = normalize_response(&object(json!({"action": "tool_call", "name": "verify", "args": "CCO"})), &l3);
        assert_eq!(reason(&r), "Tool call missing arguments object");

        let r = normalize_response(&object(json!({"action": "abstain", "reason": "  "})), &l3);
        assert_eq!(reason(&r), "Model chose to abstain.");
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(extract_confidence(Some(&json!(3.0))), 1.0);
        assert_eq!(extract_confidence(Some(&json!(-1))), 0.0);
        assert_eq!(extract_confidence(Some(&json!("0.25"))), 0.25);
        assert_eq!(extract_confidence(Some(&json!("high"))), DEFAULT_CONFIDENCE);
        assert_eq!(extract_confidence(None), DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_parse_content_handles_fences_and_garbage() {
        let req = request(Protocol::L1);
        let r = parse_content("```json\n{\"action\":\"propose\",\"smiles\":\"CCO\"}\n```", &req);
        assert_eq!(r.action, AgentAction::Propose { smiles: "CCO".to_string() });

        assert_eq!(reason(&parse_content("", &req)), "Model returned empty content");
        assert_eq!(reason(&parse_content("sure! CCO", &req)), "Model returned invalid JSON");
        assert_eq!(reason(&parse_content("[1,2]", &req)), "Model returned a non-object JSON value");
    }

    #[test]
    fn test_interrupt_ack_requires_interrupt() {
        let mut req = request(Protocol::L2);
        let data = object(json!({"action": "propose", "smiles": "CCO", "interrupt_ack": true}));
        assert!(!normalize_response(&data, &req).interrupt_ack);

        req.interrupt = Some(InterruptPayload {
            policy: "confirm_then_continue".to_string(),
            round: 1,
        });
        assert!(normalize_response(&data, &req).interrupt_ack);
    }

    /// Serve one canned chat completion and return the raw request text.
    async fn serve_once(listener: TcpListener, content: &'static str) -> String {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.expect("read");
            assert!(n > 0, "client closed before headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let content_length = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.expect("read body");
            assert!(n > 0, "client closed before body");
            buf.extend_from_slice(&chunk[..n]);
        }

        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
        .to_string();
        let reply = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(reply.as_bytes()).await.expect("write");
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&buf).to_string()
    }

    #[tokio::test]
    async fn test_step_against_local_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(serve_once(
            listener,
            r#"{"action":"propose","smiles":"COc1ccccc1O","confidence":0.9}"#,
        ));

        let settings = ChatSettings {
            base_url: Some(format!("http://{addr}/v1")),
            ..ChatSettings::default()
        };
        let mut adapter = ChatAdapter::new(settings, "test-key").expect("adapter");
        let response = adapter.step(&request(Protocol::L2)).await.expect("step");
        assert_eq!(response.action, AgentAction::Propose { smiles: "COc1ccccc1O".to_string() });
        assert_eq!(response.confidence, Some(0.9));

        let raw = server.await.expect("server task");
        assert!(raw.starts_with("POST /v1/chat/completions"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer test-key"));
        assert!(raw.contains(DEFAULT_MODEL));
    }
}
