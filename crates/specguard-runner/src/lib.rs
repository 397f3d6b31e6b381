//! SpecGuard Runner
//!
//! Drives agents through benchmark tasks under the L1/L2/L3 protocols:
//! - `adapter`: the agent contract, built-in adapters and their registry
//! - `runner`: the per-episode round loop with timeouts and cancellation
//! - `suite`: bounded parallel execution of a whole suite
//! - `episode`: sealed episode records and their summaries
//! - `reporting`: run directory artifacts and aggregate reports

pub mod adapter;
pub mod config;
pub mod episode;
pub mod protocol;
pub mod reporting;
pub mod runner;
pub mod suite;

pub use adapter::{
    Adapter, AdapterError, AdapterRegistry, AdapterResult, AdapterSettings, AgentAction,
    AgentRequest, AgentResponse, InterruptPayload, ToolSpec, VERIFY_TOOL,
};
pub use config::{ConfigError, RunnerConfig};
pub use episode::{EpisodeRecord, EpisodeRecorder, EpisodeSummary, RoundEntry, TerminalOutcome};
pub use protocol::EpisodeState;
pub use reporting::{load_trace, summarise, write_report, write_run, ReportMetrics, RunSummary};
pub use runner::{cancel_pair, CancelHandle, CancelSignal, EpisodeRunner};
pub use suite::{SuiteRun, SuiteRunner};
