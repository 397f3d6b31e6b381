//! SpecGuard Core Library
//!
//! Domain model, built-in molecular descriptors, the constraint evaluator,
//! data catalog loading, scoring and telemetry shared by the runner and CLI.

pub mod catalog;
pub mod chem;
pub mod domain;
pub mod edit_distance;
pub mod evaluator;
pub mod metrics;
pub mod obs;
pub mod scoring;
pub mod telemetry;

pub use catalog::{
    list_specs, list_suites, load_spec, load_suite, parse_spec, parse_suite, select_tasks,
    CatalogPaths, SuiteEntry, DATA_DIR_ENV,
};

pub use chem::{BuiltinDescriptors, DescriptorProvider, Molecule, PropertyMap};

pub use domain::{
    spec_digest, Behaviour, Bound, Check, CheckKind, Constraint, ConstraintKind, FailureItem,
    FailureVector, Protocol, Result, SmilesError, Spec, SpecGuardError, Task, TaskInput,
    TaskScoring, ARTIFACT_INVALID_ID,
};

pub use edit_distance::levenshtein;

pub use evaluator::{
    evaluate, ConstraintEvaluator, ConstraintOutcome, PassedVerdict, Verdict, VerdictSummary,
};

pub use scoring::{CostModel, Decision, SoftTerm};

pub use telemetry::init_tracing;

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
