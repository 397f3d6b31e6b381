//! Domain model: specs, tasks, failure vectors and the error taxonomy.

pub mod digest;
pub mod error;
pub mod failure;
pub mod spec;
pub mod task;

pub use digest::{canonical_json, compute_digest, spec_digest};
pub use error::{Result, SmilesError, SpecGuardError};
pub use failure::{FailureItem, FailureVector};
pub use spec::{
    Behaviour, Bound, Check, CheckKind, Constraint, ConstraintKind, Spec, ARTIFACT_INVALID_ID,
    DEFAULT_ALERT_SET,
};
pub use task::{Protocol, Task, TaskInput, TaskScoring};
