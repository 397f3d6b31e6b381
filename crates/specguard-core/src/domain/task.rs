//! Task model: one episode's worth of work against a named spec.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, SpecGuardError};

/// Interaction protocol governing an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    /// Single shot: one round, no feedback.
    L1,
    /// Assisted repair: failure vectors between rounds.
    L2,
    /// Tool-in-loop: repair plus the `verify` tool.
    L3,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::L1, Protocol::L2, Protocol::L3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::L1 => "L1",
            Protocol::L2 => "L2",
            Protocol::L3 => "L3",
        }
    }

    /// Whether a failing proposal may be followed by another round.
    pub fn allows_repair(&self) -> bool {
        !matches!(self, Protocol::L1)
    }

    pub fn allows_tools(&self) -> bool {
        matches!(self, Protocol::L3)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L1" => Ok(Protocol::L1),
            "L2" => Ok(Protocol::L2),
            "L3" => Ok(Protocol::L3),
            other => Err(format!("unknown protocol '{other}', expected L1, L2 or L3")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInput {
    #[serde(default)]
    pub smiles: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskScoring {
    pub primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
}

impl Default for TaskScoring {
    fn default() -> Self {
        Self {
            primary: "spec_compliance".to_string(),
            secondary: None,
        }
    }
}

/// A single benchmark task, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub suite: String,
    pub protocol: Protocol,
    pub prompt: String,
    #[serde(default)]
    pub input: TaskInput,
    pub spec_id: String,
    #[serde(default)]
    pub scoring: TaskScoring,
    /// 1-based round at which the safety interrupt is delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt_at_step: Option<u32>,
}

impl Task {
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| SpecGuardError::InvalidTask {
            task_id: self.task_id.clone(),
            reason: reason.to_string(),
        };

        if self.task_id.trim().is_empty() {
            return Err(invalid("task_id must not be empty"));
        }
        if self.spec_id.trim().is_empty() {
            return Err(invalid("spec_id must not be empty"));
        }
        if self.interrupt_at_step == Some(0) {
            return Err(invalid("interrupt_at_step is 1-based and must be >= 1"));
        }
        Ok(())
    }

    pub fn input_smiles(&self) -> Option<&str> {
        self.input.smiles.as_deref().filter(|s| !s.is_empty())
    }
}
