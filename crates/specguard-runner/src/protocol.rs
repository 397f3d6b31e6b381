//! Episode state machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lifecycle state of one episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EpisodeState {
    AwaitingRound,
    /// Awaiting a response while the interrupt payload is attached.
    Interrupted,
    Evaluating,
    FinalizedPass,
    FinalizedFail,
    Abstained,
    Exhausted,
    AdapterError,
    Cancelled,
}

impl EpisodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::FinalizedPass
                | Self::FinalizedFail
                | Self::Abstained
                | Self::Exhausted
                | Self::AdapterError
                | Self::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingRound => "AWAITING_ROUND",
            Self::Interrupted => "INTERRUPTED",
            Self::Evaluating => "EVALUATING",
            Self::FinalizedPass => "FINALIZED_PASS",
            Self::FinalizedFail => "FINALIZED_FAIL",
            Self::Abstained => "ABSTAINED",
            Self::Exhausted => "EXHAUSTED",
            Self::AdapterError => "ADAPTER_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn can_transition_to(&self, next: EpisodeState) -> bool {
        use EpisodeState::*;
        match self {
            AwaitingRound => matches!(
                next,
                Interrupted
                    | Evaluating
                    | AwaitingRound
                    | Abstained
                    | Exhausted
                    | AdapterError
                    | Cancelled
            ),
            Interrupted => matches!(
                next,
                Interrupted | Evaluating | Abstained | Exhausted | AdapterError | Cancelled
            ),
            Evaluating => matches!(
                next,
                FinalizedPass | FinalizedFail | AwaitingRound | Interrupted
            ),
            _ => false,
        }
    }

    /// Move to `next`, logging the edge.
    pub fn advance(&mut self, next: EpisodeState) {
        debug_assert!(
            self.can_transition_to(next),
            "illegal episode transition {self} -> {next}"
        );
        debug!(from = self.as_str(), to = next.as_str(), "episode transition");
        *self = next;
    }
}

impl fmt::Display for EpisodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
