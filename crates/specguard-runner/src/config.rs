//! Runner configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use specguard_core::Protocol;

#[derive(Debug, thiserror::Error)]
#[error("invalid runner config: {0}")]
pub struct ConfigError(pub String);

/// Round limits, budgets and pool size for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub l2_max_rounds: u32,
    pub l3_max_rounds: u32,
    /// `verify` calls allowed per round before the episode is exhausted.
    pub max_tool_calls_per_round: u32,
    pub adapter_timeout_ms: u64,
    /// Episodes run concurrently.
    pub concurrency: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            l2_max_rounds: 3,
            l3_max_rounds: 3,
            max_tool_calls_per_round: 3,
            adapter_timeout_ms: 30_000,
            concurrency: 4,
        }
    }
}

impl RunnerConfig {
    /// L1 is always a single round.
    pub fn max_rounds(&self, protocol: Protocol) -> u32 {
        match protocol {
            Protocol::L1 => 1,
            Protocol::L2 => self.l2_max_rounds,
            Protocol::L3 => self.l3_max_rounds,
        }
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.adapter_timeout_ms)
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.l2_max_rounds = rounds;
        self.l3_max_rounds = rounds;
        self
    }

    pub fn with_tool_budget(mut self, calls: u32) -> Self {
        self.max_tool_calls_per_round = calls;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.l2_max_rounds == 0 || self.l3_max_rounds == 0 {
            return Err(ConfigError("round limits must be at least 1".to_string()));
        }
        if self.max_tool_calls_per_round == 0 {
            return Err(ConfigError(
                "max_tool_calls_per_round must be at least 1".to_string(),
            ));
        }
        if self.adapter_timeout_ms == 0 {
            return Err(ConfigError("adapter_timeout_ms must be positive".to_string()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError("concurrency must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.max_rounds(Protocol::L1), 1);
        assert_eq!(config.max_rounds(Protocol::L2), 3);
        assert_eq!(config.max_rounds(Protocol::L3), 3);
        assert_eq!(config.adapter_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_l1_ignores_round_override() {
        let config = RunnerConfig::default().with_max_rounds(5);
        assert_eq!(config.max_rounds(Protocol::L1), 1);
        assert_eq!(config.max_rounds(Protocol::L3), 5);
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let err = RunnerConfig::default()
            .with_tool_budget(0)
            .validate()
            .expect_err("zero budget");
        assert!(err.to_string().contains("max_tool_calls_per_round"));
        assert!(RunnerConfig::default().with_concurrency(0).validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RunnerConfig =
            serde_json::from_str(r#"{"concurrency": 8}"#).expect("deserialize");
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.l2_max_rounds, 3);
    }
}
