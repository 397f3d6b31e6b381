//! Domain-level error taxonomy for SpecGuard.

/// Errors produced while parsing a candidate artifact.
///
/// These never escape the evaluator: an unparsable artifact becomes the
/// `artifact_invalid` hard failure of its verdict.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SmilesError {
    #[error("empty SMILES")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unknown element '{symbol}' at position {pos}")]
    UnknownElement { symbol: String, pos: usize },

    #[error("unterminated bracket atom starting at position {pos}")]
    UnterminatedBracket { pos: usize },

    #[error("bond or branch without a preceding atom at position {pos}")]
    DanglingBond { pos: usize },

    #[error("unbalanced parentheses")]
    UnbalancedBranch,

    #[error("unclosed ring bond {0}")]
    UnclosedRing(u32),

    #[error("ring bond {0} closes onto the same atom")]
    SelfLoop(u32),

    #[error("ring bond {0} duplicates an existing bond")]
    DuplicateBond(u32),

    #[error("atom {index} ({symbol}) exceeds its allowed valence")]
    Valence { index: usize, symbol: String },

    #[error("atom {index} ({symbol}) is marked aromatic outside a ring")]
    NonRingAromatic { index: usize, symbol: String },

    #[error("formal charge out of range at position {pos}")]
    ChargeOutOfRange { pos: usize },
}

/// SpecGuard domain errors.
#[derive(Debug, thiserror::Error)]
pub enum SpecGuardError {
    #[error("invalid spec {spec_id}: {reason}")]
    InvalidSpec { spec_id: String, reason: String },

    #[error("invalid task {task_id}: {reason}")]
    InvalidTask { task_id: String, reason: String },

    #[error("spec not found: {0}")]
    SpecNotFound(String),

    #[error("task suite not found: {0}")]
    SuiteNotFound(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for SpecGuard domain operations.
pub type Result<T> = std::result::Result<T, SpecGuardError>;
