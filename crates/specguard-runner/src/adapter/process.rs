//! Adapter backed by an external executable.
//!
//! Each step spawns the configured command, writes the request as one line
//! of JSON to its stdin and reads a single JSON response object from its
//! stdout. The process is killed if the step future is dropped, so the
//! runner's timeout also bounds the child.

use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::registry::AdapterSettings;
use super::{Adapter, AdapterError, AdapterResult, AgentRequest, AgentResponse};

/// Environment variable holding the adapter command line.
pub const PROCESS_COMMAND_ENV: &str = "SPECGUARD_PROCESS_ADAPTER_CMD";

const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct ProcessAdapter {
    command: Vec<String>,
}

impl ProcessAdapter {
    pub const NAME: &'static str = "process";

    pub fn new(command: Vec<String>) -> AdapterResult<Self> {
        if command.first().map_or(true, |exe| exe.trim().is_empty()) {
            return Err(AdapterError::Config("process adapter command is empty".to_string()));
        }
        Ok(Self { command })
    }

    /// Command from `settings`, else from [`PROCESS_COMMAND_ENV`] split on
    /// whitespace.
    pub fn from_settings(settings: &AdapterSettings) -> AdapterResult<Self> {
        if let Some(command) = &settings.process_command {
            return Self::new(command.clone());
        }
        let line = std::env::var(PROCESS_COMMAND_ENV).map_err(|_| {
            AdapterError::Config(format!("{PROCESS_COMMAND_ENV} is not set"))
        })?;
        Self::new(line.split_whitespace().map(String::from).collect())
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

#[async_trait]
impl Adapter for ProcessAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn step(&mut self, request: &AgentRequest) -> AdapterResult<AgentResponse> {
        let mut payload = serde_json::to_vec(request)?;
        payload.push(b'\n');

        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AdapterError::Process(format!("spawn {}: {e}", self.command[0])))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that answers without reading its input closes the pipe early.
            match stdin.write_all(&payload).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e.into()),
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::Process(format!(
                "exited with {code}: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.trim();
        if line.is_empty() {
            return Err(AdapterError::Malformed("empty stdout".to_string()));
        }

        let mut value: Value = serde_json::from_str(line)?;
        let Some(object) = value.as_object_mut() else {
            return Err(AdapterError::Malformed(format!(
                "expected a JSON object, got {line}"
            )));
        };
        object
            .entry("confidence")
            .or_insert_with(|| Value::from(DEFAULT_CONFIDENCE));

        AgentResponse::from_value(value)
    }
}
