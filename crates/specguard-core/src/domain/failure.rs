//! Failure vector: the structured feedback returned after each evaluation.

use serde::{Deserialize, Serialize};

/// One entry of a failure vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureItem {
    pub id: String,
    #[serde(default)]
    pub detail: Option<String>,
    /// Signed distance from satisfying a soft constraint.
    #[serde(default)]
    pub delta: Option<f64>,
    /// Signed distance to the nearest bound of a property.
    #[serde(default)]
    pub distance_to_bound: Option<f64>,
}

impl FailureItem {
    pub fn hard(id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            detail: Some(detail.into()),
            delta: None,
            distance_to_bound: None,
        }
    }

    pub fn soft(id: impl Into<String>, detail: Option<String>, delta: Option<f64>) -> Self {
        Self {
            id: id.into(),
            detail,
            delta,
            distance_to_bound: None,
        }
    }

    pub fn margin(property: impl Into<String>, distance: f64) -> Self {
        Self {
            id: property.into(),
            detail: None,
            delta: None,
            distance_to_bound: Some(distance),
        }
    }
}

/// Hard failures, soft misses and property margins for one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureVector {
    #[serde(default)]
    pub hard_fails: Vec<FailureItem>,
    #[serde(default)]
    pub soft_misses: Vec<FailureItem>,
    #[serde(default)]
    pub margins: Vec<FailureItem>,
    pub round: u32,
}

impl FailureVector {
    pub fn new(round: u32) -> Self {
        Self {
            round,
            ..Default::default()
        }
    }

    pub fn has_hard_failures(&self) -> bool {
        !self.hard_fails.is_empty()
    }

    pub fn hard_fail_ids(&self) -> Vec<&str> {
        self.hard_fails.iter().map(|f| f.id.as_str()).collect()
    }

    pub fn soft_miss_ids(&self) -> Vec<&str> {
        self.soft_misses.iter().map(|f| f.id.as_str()).collect()
    }

    /// Smallest `distance_to_bound` among the margins, if any.
    pub fn tightest_margin(&self) -> Option<f64> {
        self.margins
            .iter()
            .filter_map(|m| m.distance_to_bound)
            .fold(None, |acc, d| Some(acc.map_or(d, |a: f64| a.min(d))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let mut fv = FailureVector::new(2);
        fv.hard_fails.push(FailureItem::hard("pains_block", "catechol_A alert"));
        fv.margins.push(FailureItem::margin("MW", 12.5));

        let json = serde_json::to_value(&fv).expect("serialize");
        assert_eq!(json["round"], 2);
        assert_eq!(json["hard_fails"][0]["id"], "pains_block");
        assert_eq!(json["hard_fails"][0]["detail"], "catechol_A alert");
        assert_eq!(json["margins"][0]["distance_to_bound"], 12.5);
        assert!(json["soft_misses"].as_array().expect("array").is_empty());
    }

    #[test]
    fn test_tightest_margin() {
        let mut fv = FailureVector::new(1);
        assert_eq!(fv.tightest_margin(), None);
        fv.margins.push(FailureItem::margin("MW", 12.5));
        fv.margins.push(FailureItem::margin("TPSA", -3.0));
        assert_eq!(fv.tightest_margin(), Some(-3.0));
    }
}
