//! Spec compliance, hard-violation rate and abstention utility.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Weight of the soft component in [`spec_compliance`].
pub const SOFT_WEIGHT_LAMBDA: f64 = 0.2;

/// One soft constraint's contribution: `score` in [0, 1] times `weight`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftTerm {
    pub score: f64,
    pub weight: f64,
}

/// Final decision of an episode as seen by the cost model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
    Abstain,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Reject => "reject",
            Decision::Abstain => "abstain",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Penalties charged by [`abstention_utility`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    pub false_accept: f64,
    pub false_reject: f64,
    pub abstain: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            false_accept: 5.0,
            false_reject: 1.0,
            abstain: 0.5,
        }
    }
}

impl CostModel {
    /// Costs used by run reports.
    pub fn report() -> Self {
        Self {
            false_accept: 10.0,
            false_reject: 2.0,
            abstain: 1.0,
        }
    }
}

/// `1[hard_pass] + λ · weighted mean of soft scores`; the soft mean is 0
/// when there is no soft weight.
pub fn spec_compliance(hard_pass: bool, terms: &[SoftTerm]) -> f64 {
    let total_weight: f64 = terms.iter().map(|t| t.weight).sum();
    let soft = if total_weight > 0.0 {
        terms.iter().map(|t| t.score * t.weight).sum::<f64>() / total_weight
    } else {
        0.0
    };
    let hard = if hard_pass { 1.0 } else { 0.0 };
    hard + SOFT_WEIGHT_LAMBDA * soft
}

/// Fraction of episodes that did not pass every hard constraint.
pub fn hard_violation_rate(hard_passes: &[bool]) -> f64 {
    if hard_passes.is_empty() {
        return 0.0;
    }
    let violations = hard_passes.iter().filter(|pass| !**pass).count();
    violations as f64 / hard_passes.len() as f64
}

/// Negative expected loss: false accepts, false rejects and abstentions
/// are charged per `costs`.
pub fn abstention_utility(truths: &[bool], decisions: &[Decision], costs: &CostModel) -> f64 {
    let penalty: f64 = truths
        .iter()
        .zip(decisions)
        .map(|(truth, decision)| match (decision, truth) {
            (Decision::Accept, false) => costs.false_accept,
            (Decision::Reject, true) => costs.false_reject,
            (Decision::Abstain, _) => costs.abstain,
            _ => 0.0,
        })
        .sum();
    -penalty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_compliance() {
        let terms = [
            SoftTerm { score: 1.0, weight: 1.0 },
            SoftTerm { score: 0.0, weight: 3.0 },
        ];
        assert!((spec_compliance(true, &terms) - 1.05).abs() < 1e-12);
        assert!((spec_compliance(false, &terms) - 0.05).abs() < 1e-12);
        assert!((spec_compliance(true, &[]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weight_soft_terms_ignored() {
        let terms = [SoftTerm { score: 1.0, weight: 0.0 }];
        assert!((spec_compliance(true, &terms) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hard_violation_rate() {
        assert_eq!(hard_violation_rate(&[]), 0.0);
        assert!((hard_violation_rate(&[true, false, false, true]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_abstention_utility() {
        let truths = [true, false, true, false];
        let decisions = [
            Decision::Accept,
            Decision::Accept,
            Decision::Reject,
            Decision::Abstain,
        ];
        let utility = abstention_utility(&truths, &decisions, &CostModel::report());
        assert!((utility + 13.0).abs() < 1e-12);
        let utility = abstention_utility(&truths, &decisions, &CostModel::default());
        assert!((utility + 6.5).abs() < 1e-12);
    }

    #[test]
    fn test_decision_wire_names() {
        assert_eq!(serde_json::to_string(&Decision::Abstain).expect("json"), "\"abstain\"");
        assert_eq!(Decision::Accept.to_string(), "accept");
    }
}
