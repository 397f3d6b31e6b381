//! Spec model: a versioned, immutable set of named constraints.
//!
//! Constraint parameters are resolved into a typed [`Check`] while the spec
//! is deserialized, so a loaded [`Spec`] never carries malformed bounds or
//! an unknown check kind.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, SpecGuardError};

/// Constraint id reserved for the failure reported on unparsable artifacts.
pub const ARTIFACT_INVALID_ID: &str = "artifact_invalid";

/// Alert set used by `substructure_absent` when params name none.
pub const DEFAULT_ALERT_SET: &str = "PAINS_A";

/// Whether a constraint gates the verdict or only affects the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Hard,
    Soft,
}

/// Registered check kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    SubstructureAbsent,
    PropertyBoundsAll,
    PropertyBoundsAny,
}

/// Inclusive numeric window `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

impl Bound {
    pub fn new(lower: f64, upper: f64) -> std::result::Result<Self, String> {
        if !lower.is_finite() || !upper.is_finite() {
            return Err(format!("bound [{lower}, {upper}] is not finite"));
        }
        if lower > upper {
            return Err(format!("lower bound {lower} exceeds upper bound {upper}"));
        }
        Ok(Self { lower, upper })
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    /// Signed distance to the nearest bound: positive inside, negative outside.
    pub fn margin(&self, value: f64) -> f64 {
        if value < self.lower {
            value - self.lower
        } else if value > self.upper {
            self.upper - value
        } else {
            (value - self.lower).min(self.upper - value)
        }
    }
}

impl TryFrom<[f64; 2]> for Bound {
    type Error = String;

    fn try_from(pair: [f64; 2]) -> std::result::Result<Self, Self::Error> {
        Bound::new(pair[0], pair[1])
    }
}

impl From<Bound> for [f64; 2] {
    fn from(bound: Bound) -> Self {
        [bound.lower, bound.upper]
    }
}

/// A resolved check with its typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    SubstructureAbsent { alert_set: String },
    PropertyBoundsAll { bounds: BTreeMap<String, Bound> },
    PropertyBoundsAny { bounds: BTreeMap<String, Bound> },
}

impl Check {
    pub fn kind(&self) -> CheckKind {
        match self {
            Check::SubstructureAbsent { .. } => CheckKind::SubstructureAbsent,
            Check::PropertyBoundsAll { .. } => CheckKind::PropertyBoundsAll,
            Check::PropertyBoundsAny { .. } => CheckKind::PropertyBoundsAny,
        }
    }

    /// Property windows this check declares, if any.
    pub fn bounds(&self) -> Option<&BTreeMap<String, Bound>> {
        match self {
            Check::SubstructureAbsent { .. } => None,
            Check::PropertyBoundsAll { bounds } | Check::PropertyBoundsAny { bounds } => {
                Some(bounds)
            }
        }
    }

    fn from_params(kind: CheckKind, params: &serde_json::Value) -> std::result::Result<Self, String> {
        match kind {
            CheckKind::SubstructureAbsent => {
                let alert_set = match params.get("alert_set") {
                    None | Some(serde_json::Value::Null) => DEFAULT_ALERT_SET.to_string(),
                    Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
                    Some(other) => return Err(format!("alert_set must be a non-empty string, got {other}")),
                };
                Ok(Check::SubstructureAbsent { alert_set })
            }
            CheckKind::PropertyBoundsAll => {
                let bounds = params
                    .get("bounds")
                    .ok_or_else(|| "property_bounds_all requires params.bounds".to_string())?;
                Ok(Check::PropertyBoundsAll {
                    bounds: parse_bounds(bounds)?,
                })
            }
            CheckKind::PropertyBoundsAny => Ok(Check::PropertyBoundsAny {
                bounds: parse_bounds(params)?,
            }),
        }
    }

    fn to_params(&self) -> serde_json::Value {
        match self {
            Check::SubstructureAbsent { alert_set } => serde_json::json!({ "alert_set": alert_set }),
            Check::PropertyBoundsAll { bounds } => serde_json::json!({ "bounds": bounds_to_json(bounds) }),
            Check::PropertyBoundsAny { bounds } => bounds_to_json(bounds),
        }
    }
}

fn parse_bounds(value: &serde_json::Value) -> std::result::Result<BTreeMap<String, Bound>, String> {
    let map = value
        .as_object()
        .ok_or_else(|| format!("bounds must be a mapping of property to [lo, hi], got {value}"))?;
    if map.is_empty() {
        return Err("bounds must name at least one property".to_string());
    }

    let mut bounds = BTreeMap::new();
    for (name, pair) in map {
        let window = pair
            .as_array()
            .filter(|items| items.len() == 2)
            .and_then(|items| Some([items[0].as_f64()?, items[1].as_f64()?]))
            .ok_or_else(|| format!("bound for {name} must be [lo, hi], got {pair}"))?;
        let bound = Bound::try_from(window).map_err(|e| format!("{name}: {e}"))?;
        bounds.insert(name.clone(), bound);
    }
    Ok(bounds)
}

fn bounds_to_json(bounds: &BTreeMap<String, Bound>) -> serde_json::Value {
    let map = bounds
        .iter()
        .map(|(name, b)| (name.clone(), serde_json::json!([b.lower, b.upper])))
        .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(map)
}

fn default_weight() -> f64 {
    1.0
}

/// On-disk shape of a constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawConstraint {
    id: String,
    #[serde(rename = "type")]
    kind: ConstraintKind,
    check: CheckKind,
    #[serde(default)]
    params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    severity: Option<String>,
    #[serde(default = "default_weight")]
    weight: f64,
}

/// A named hard or soft rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConstraint", into = "RawConstraint")]
pub struct Constraint {
    pub id: String,
    pub kind: ConstraintKind,
    pub check: Check,
    /// Informational tag carried by hard constraints.
    pub severity: Option<String>,
    /// Scoring weight; only meaningful for soft constraints.
    pub weight: f64,
}

impl Constraint {
    pub fn hard(id: impl Into<String>, check: Check) -> Self {
        Self {
            id: id.into(),
            kind: ConstraintKind::Hard,
            check,
            severity: None,
            weight: default_weight(),
        }
    }

    pub fn soft(id: impl Into<String>, check: Check, weight: f64) -> Self {
        Self {
            id: id.into(),
            kind: ConstraintKind::Soft,
            check,
            severity: None,
            weight,
        }
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    pub fn is_hard(&self) -> bool {
        self.kind == ConstraintKind::Hard
    }
}

impl TryFrom<RawConstraint> for Constraint {
    type Error = String;

    fn try_from(raw: RawConstraint) -> std::result::Result<Self, Self::Error> {
        let check = Check::from_params(raw.check, &raw.params)
            .map_err(|e| format!("constraint {}: {e}", raw.id))?;
        Ok(Self {
            id: raw.id,
            kind: raw.kind,
            check,
            severity: raw.severity,
            weight: raw.weight,
        })
    }
}

impl From<Constraint> for RawConstraint {
    fn from(c: Constraint) -> Self {
        Self {
            params: c.check.to_params(),
            check: c.check.kind(),
            id: c.id,
            kind: c.kind,
            severity: c.severity,
            weight: c.weight,
        }
    }
}

/// Agent-facing behaviour expectations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Behaviour {
    /// Tag delivered with every interrupt, e.g. `confirm_then_continue`.
    pub interrupt_policy: String,
    /// Margin thresholds per property below which abstaining is acceptable.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub abstain_policy: BTreeMap<String, f64>,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            interrupt_policy: "confirm_then_continue".to_string(),
            abstain_policy: BTreeMap::new(),
        }
    }
}

/// A versioned constraint specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    pub id: String,
    pub version: u32,
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub behaviour: Behaviour,
}

impl Spec {
    /// Parse and validate a spec from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let spec: Spec = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check structural invariants that deserialization alone cannot.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| SpecGuardError::InvalidSpec {
            spec_id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("spec id must not be empty".to_string()));
        }
        if self.behaviour.interrupt_policy.trim().is_empty() {
            return Err(invalid("behaviour.interrupt_policy must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for c in &self.constraints {
            if c.id.trim().is_empty() {
                return Err(invalid("constraint id must not be empty".to_string()));
            }
            if c.id == ARTIFACT_INVALID_ID {
                return Err(invalid(format!("constraint id '{ARTIFACT_INVALID_ID}' is reserved")));
            }
            if !seen.insert(c.id.as_str()) {
                return Err(invalid(format!("duplicate constraint id '{}'", c.id)));
            }
            if !c.weight.is_finite() || c.weight < 0.0 {
                return Err(invalid(format!(
                    "constraint {} has invalid weight {}",
                    c.id, c.weight
                )));
            }
            if let Some(bounds) = c.check.bounds() {
                for (name, b) in bounds {
                    Bound::new(b.lower, b.upper)
                        .map_err(|e| invalid(format!("constraint {} {name}: {e}", c.id)))?;
                }
            }
        }

        for (name, threshold) in &self.behaviour.abstain_policy {
            if !threshold.is_finite() || *threshold < 0.0 {
                return Err(invalid(format!("abstain threshold for {name} must be non-negative")));
            }
        }
        Ok(())
    }

    pub fn hard_constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| c.kind == ConstraintKind::Hard)
    }

    pub fn soft_constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| c.kind == ConstraintKind::Soft)
    }

    pub fn constraint(&self, id: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.id == id)
    }
}
