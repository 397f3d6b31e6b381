//! Constraint evaluator.
//!
//! Maps a candidate artifact and a [`Spec`] to a [`Verdict`]: the pass/fail
//! decision plus the failure vector fed back to agents. Evaluation never
//! fails; an unparsable artifact becomes the reserved `artifact_invalid`
//! hard failure.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chem::{BuiltinDescriptors, DescriptorProvider, PropertyMap};
use crate::chem::properties::{check_bounds_all, check_bounds_any, margins_to_bounds};
use crate::domain::failure::{FailureItem, FailureVector};
use crate::domain::spec::{Bound, Check, ConstraintKind, Spec, ARTIFACT_INVALID_ID};
use crate::scoring::SoftTerm;

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Result of running one constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintOutcome {
    pub id: String,
    pub kind: ConstraintKind,
    pub passed: bool,
    pub detail: Option<String>,
    pub delta: Option<f64>,
    pub weight: f64,
}

/// Full evaluation of one artifact against one spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub artifact: String,
    /// Whether the artifact parsed.
    pub valid: bool,
    /// True iff `failure_vector.hard_fails` is empty.
    pub overall_pass: bool,
    pub failure_vector: FailureVector,
    pub outcomes: Vec<ConstraintOutcome>,
    pub properties: PropertyMap,
    pub alerts: Vec<String>,
    pub sa_score: Option<f64>,
}

/// Compact view of a verdict kept on episode records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictSummary {
    pub overall_pass: bool,
    pub valid: bool,
    pub hard_fails: Vec<String>,
    pub soft_misses: Vec<String>,
    pub properties: PropertyMap,
    pub alerts: Vec<String>,
    pub sa_score: Option<f64>,
}

impl Verdict {
    fn invalid(artifact: &str, round: u32, reason: String) -> Self {
        let mut failure_vector = FailureVector::new(round);
        failure_vector
            .hard_fails
            .push(FailureItem::hard(ARTIFACT_INVALID_ID, format!("invalid SMILES: {reason}")));
        Self {
            artifact: artifact.to_string(),
            valid: false,
            overall_pass: false,
            failure_vector,
            outcomes: Vec::new(),
            properties: PropertyMap::new(),
            alerts: Vec::new(),
            sa_score: None,
        }
    }

    /// `(satisfied, weight)` per soft constraint, in spec order.
    pub fn soft_terms(&self) -> Vec<SoftTerm> {
        self.outcomes
            .iter()
            .filter(|o| o.kind == ConstraintKind::Soft)
            .map(|o| SoftTerm {
                score: if o.passed { 1.0 } else { 0.0 },
                weight: o.weight,
            })
            .collect()
    }

    pub fn summary(&self) -> VerdictSummary {
        VerdictSummary {
            overall_pass: self.overall_pass,
            valid: self.valid,
            hard_fails: self.failure_vector.hard_fail_ids().into_iter().map(String::from).collect(),
            soft_misses: self.failure_vector.soft_miss_ids().into_iter().map(String::from).collect(),
            properties: self.properties.clone(),
            alerts: self.alerts.clone(),
            sa_score: self.sa_score,
        }
    }

    /// Convert into a [`PassedVerdict`] if no hard constraint failed.
    pub fn into_passed(self) -> Result<PassedVerdict, Verdict> {
        if self.overall_pass && self.failure_vector.hard_fails.is_empty() {
            Ok(PassedVerdict(self))
        } else {
            Err(self)
        }
    }
}

/// Proof that an artifact passed every hard constraint.
///
/// Only [`Verdict::into_passed`] constructs one, so anything that demands a
/// `PassedVerdict` cannot be reached with a failing artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassedVerdict(Verdict);

impl PassedVerdict {
    pub fn verdict(&self) -> &Verdict {
        &self.0
    }

    pub fn artifact(&self) -> &str {
        &self.0.artifact
    }

    pub fn into_inner(self) -> Verdict {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluator bound to one spec and one descriptor provider.
#[derive(Clone)]
pub struct ConstraintEvaluator {
    spec: Arc<Spec>,
    descriptors: Arc<dyn DescriptorProvider>,
}

impl fmt::Debug for ConstraintEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintEvaluator")
            .field("spec", &self.spec.id)
            .field("version", &self.spec.version)
            .finish()
    }
}

impl ConstraintEvaluator {
    pub fn new(spec: Arc<Spec>) -> Self {
        Self::with_descriptors(spec, Arc::new(BuiltinDescriptors))
    }

    pub fn with_descriptors(spec: Arc<Spec>, descriptors: Arc<dyn DescriptorProvider>) -> Self {
        Self { spec, descriptors }
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    /// Evaluate `artifact`, stamping the failure vector with `round`.
    pub fn evaluate(&self, artifact: &str, round: u32) -> Verdict {
        evaluate_with(&self.spec, self.descriptors.as_ref(), artifact, round)
    }
}

/// Evaluate with the built-in descriptors.
pub fn evaluate(spec: &Spec, artifact: &str, round: u32) -> Verdict {
    evaluate_with(spec, &BuiltinDescriptors, artifact, round)
}

fn evaluate_with(
    spec: &Spec,
    descriptors: &dyn DescriptorProvider,
    artifact: &str,
    round: u32,
) -> Verdict {
    let mol = match descriptors.parse(artifact) {
        Ok(mol) => mol,
        Err(e) => return Verdict::invalid(artifact, round, e.to_string()),
    };

    let properties = descriptors.properties(&mol);
    let sa_score = descriptors.sa_score(&mol);

    let mut failure_vector = FailureVector::new(round);
    let mut margins: BTreeMap<String, f64> = BTreeMap::new();
    let mut alerts: Vec<String> = Vec::new();
    let mut outcomes = Vec::with_capacity(spec.constraints.len());

    for constraint in &spec.constraints {
        let result = match &constraint.check {
            Check::SubstructureAbsent { alert_set } => {
                match descriptors.alerts(&mol, alert_set) {
                    Some(hits) => {
                        let detail = (!hits.is_empty()).then(|| {
                            hits.iter()
                                .map(|h| format!("{h} alert"))
                                .collect::<Vec<_>>()
                                .join(", ")
                        });
                        for hit in &hits {
                            if !alerts.contains(hit) {
                                alerts.push(hit.clone());
                            }
                        }
                        CheckResult {
                            passed: hits.is_empty(),
                            detail,
                            delta: None,
                        }
                    }
                    None => CheckResult {
                        passed: false,
                        detail: Some(format!("unknown alert set '{alert_set}'")),
                        delta: None,
                    },
                }
            }
            Check::PropertyBoundsAll { bounds } => {
                let m = margins_to_bounds(&properties, bounds);
                merge_margins(&mut margins, &m);
                let passed = check_bounds_all(&properties, bounds);
                CheckResult {
                    passed,
                    detail: (!passed).then(|| describe_violations(&properties, bounds)),
                    delta: m.values().copied().reduce(f64::min),
                }
            }
            Check::PropertyBoundsAny { bounds } => {
                let m = margins_to_bounds(&properties, bounds);
                merge_margins(&mut margins, &m);
                let passed = check_bounds_any(&properties, bounds);
                CheckResult {
                    passed,
                    detail: (!passed).then(|| {
                        format!("no property within its window: {}", describe_violations(&properties, bounds))
                    }),
                    delta: m.values().copied().reduce(f64::max),
                }
            }
        };

        if !result.passed {
            match constraint.kind {
                ConstraintKind::Hard => failure_vector.hard_fails.push(FailureItem::hard(
                    &constraint.id,
                    result.detail.clone().unwrap_or_else(|| "constraint failed".to_string()),
                )),
                ConstraintKind::Soft => failure_vector.soft_misses.push(FailureItem::soft(
                    &constraint.id,
                    result.detail.clone(),
                    result.delta,
                )),
            }
        }

        outcomes.push(ConstraintOutcome {
            id: constraint.id.clone(),
            kind: constraint.kind,
            passed: result.passed,
            detail: result.detail,
            delta: result.delta,
            weight: constraint.weight,
        });
    }

    failure_vector.margins = margins
        .into_iter()
        .map(|(property, distance)| FailureItem::margin(property, distance))
        .collect();

    Verdict {
        artifact: artifact.to_string(),
        valid: true,
        overall_pass: failure_vector.hard_fails.is_empty(),
        failure_vector,
        outcomes,
        properties,
        alerts,
        sa_score: Some(sa_score),
    }
}

struct CheckResult {
    passed: bool,
    detail: Option<String>,
    delta: Option<f64>,
}

/// Keep the tightest (smallest absolute) margin per property.
fn merge_margins(acc: &mut BTreeMap<String, f64>, new: &BTreeMap<String, f64>) {
    for (name, &value) in new {
        acc.entry(name.clone())
            .and_modify(|existing| {
                if value.abs() < existing.abs() {
                    *existing = value;
                }
            })
            .or_insert(value);
    }
}

fn describe_violations(props: &PropertyMap, bounds: &BTreeMap<String, Bound>) -> String {
    bounds
        .iter()
        .filter_map(|(name, b)| match props.get(name) {
            None => Some(format!("{name} unavailable")),
            Some(v) if !b.contains(*v) => {
                Some(format!("{name}={v:.2} outside [{},{}]", b.lower, b.upper))
            }
            Some(_) => None,
        })
        .collect::<Vec<_>>()
        .join("; ")
}
