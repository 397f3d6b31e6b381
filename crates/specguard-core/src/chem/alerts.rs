//! Structural alert sets and substructure matching.
//!
//! Alert motifs are written as SMILES and matched as patterns: element and
//! aromaticity must agree, a charge is only compared when the pattern atom
//! carries one, and a pattern single bond also matches an aromatic bond.

use std::collections::{BTreeMap, VecDeque};
use std::sync::OnceLock;

use tracing::warn;

use crate::chem::molecule::{Atom, Bond, BondOrder, Molecule};

const PAINS_A: &[(&str, &str)] = &[
    ("catechol_A", "c1cc(O)ccc1O"),
    ("hydroquinone_A", "c1cc(O)cc(O)c1"),
    ("quinone_methide", "O=C1C=CC(=O)C=C1"),
];

const ALERT_SETS: &[(&str, &[(&str, &str)])] = &[("PAINS_A", PAINS_A)];

/// A named motif compiled to a pattern graph.
#[derive(Debug, Clone)]
pub struct Alert {
    pub name: &'static str,
    pub pattern: Molecule,
}

fn compiled_sets() -> &'static BTreeMap<&'static str, Vec<Alert>> {
    static SETS: OnceLock<BTreeMap<&'static str, Vec<Alert>>> = OnceLock::new();
    SETS.get_or_init(|| {
        ALERT_SETS
            .iter()
            .map(|&(set, motifs)| {
                let alerts = motifs
                    .iter()
                    .filter_map(|&(name, smiles)| match Molecule::from_smiles(smiles) {
                        Ok(pattern) => Some(Alert { name, pattern }),
                        Err(e) => {
                            warn!(alert_set = set, alert = name, error = %e, "skipping unparsable alert motif");
                            None
                        }
                    })
                    .collect();
                (set, alerts)
            })
            .collect()
    })
}

/// Names of the built-in alert sets.
pub fn available_alert_sets() -> Vec<&'static str> {
    compiled_sets().keys().copied().collect()
}

/// Names of the alerts in `alert_set` matched by `mol`, or `None` for an unknown set.
pub fn matching_alerts(mol: &Molecule, alert_set: &str) -> Option<Vec<String>> {
    let alerts = compiled_sets().get(alert_set)?;
    Some(
        alerts
            .iter()
            .filter(|alert| has_substructure(mol, &alert.pattern))
            .map(|alert| alert.name.to_string())
            .collect(),
    )
}

fn atoms_match(pattern: &Atom, target: &Atom) -> bool {
    pattern.element == target.element
        && pattern.aromatic == target.aromatic
        && (pattern.charge == 0 || pattern.charge == target.charge)
}

fn bonds_match(pattern: &Bond, target: &Bond) -> bool {
    match pattern.order {
        BondOrder::Single => matches!(target.order, BondOrder::Single | BondOrder::Aromatic),
        order => order == target.order,
    }
}

/// Breadth-first pattern order so every atom after a component's first has a
/// previously placed neighbour.
fn search_order(pattern: &Molecule) -> Vec<usize> {
    let mut order = Vec::with_capacity(pattern.atom_count());
    let mut placed = vec![false; pattern.atom_count()];
    for root in 0..pattern.atom_count() {
        if placed[root] {
            continue;
        }
        placed[root] = true;
        let mut queue = VecDeque::from([root]);
        while let Some(atom) = queue.pop_front() {
            order.push(atom);
            for (n, _) in pattern.neighbors(atom) {
                if !placed[n] {
                    placed[n] = true;
                    queue.push_back(n);
                }
            }
        }
    }
    order
}

struct Matcher<'a> {
    target: &'a Molecule,
    pattern: &'a Molecule,
    order: Vec<usize>,
    mapping: Vec<Option<usize>>,
    used: Vec<bool>,
}

impl Matcher<'_> {
    fn extend(&mut self, depth: usize) -> bool {
        let Some(&p) = self.order.get(depth) else {
            return true;
        };

        let anchor = self
            .pattern
            .neighbors(p)
            .find_map(|(n, _)| self.mapping[n]);
        let candidates: Vec<usize> = match anchor {
            Some(t) => self.target.neighbors(t).map(|(n, _)| n).collect(),
            None => (0..self.target.atom_count()).collect(),
        };

        for t in candidates {
            if self.used[t] || !atoms_match(self.pattern.atom(p), self.target.atom(t)) {
                continue;
            }
            let consistent = self.pattern.neighbors(p).all(|(pn, pbond)| match self.mapping[pn] {
                None => true,
                Some(tn) => self
                    .target
                    .bond_between(t, tn)
                    .is_some_and(|tbond| bonds_match(pbond, tbond)),
            });
            if !consistent {
                continue;
            }

            self.mapping[p] = Some(t);
            self.used[t] = true;
            if self.extend(depth + 1) {
                return true;
            }
            self.mapping[p] = None;
            self.used[t] = false;
        }
        false
    }
}

/// Whether `pattern` occurs as a subgraph of `target`.
pub fn has_substructure(target: &Molecule, pattern: &Molecule) -> bool {
    if pattern.atom_count() > target.atom_count() {
        return false;
    }
    let mut matcher = Matcher {
        target,
        pattern,
        order: search_order(pattern),
        mapping: vec![None; pattern.atom_count()],
        used: vec![false; target.atom_count()],
    };
    matcher.extend(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mol(smiles: &str) -> Molecule {
        Molecule::from_smiles(smiles).expect("parse")
    }

    #[test]
    fn test_pains_a_is_available() {
        assert_eq!(available_alert_sets(), vec!["PAINS_A"]);
    }

    #[test]
    fn test_hydroquinone_hits_para_diol_alert() {
        let hits = matching_alerts(&mol("Oc1ccc(O)cc1"), "PAINS_A").expect("known set");
        assert_eq!(hits, vec!["catechol_A".to_string()]);
    }

    #[test]
    fn test_kekule_input_matches_aromatic_motif() {
        let hits = matching_alerts(&mol("OC1=CC=C(O)C=C1"), "PAINS_A").expect("known set");
        assert!(hits.contains(&"catechol_A".to_string()));
    }

    #[test]
    fn test_meta_diol_hits_second_motif() {
        let hits = matching_alerts(&mol("Oc1cccc(O)c1"), "PAINS_A").expect("known set");
        assert_eq!(hits, vec!["hydroquinone_A".to_string()]);
    }

    #[test]
    fn test_quinone_hit() {
        let hits = matching_alerts(&mol("O=C1C=CC(=O)C=C1"), "PAINS_A").expect("known set");
        assert_eq!(hits, vec!["quinone_methide".to_string()]);
    }

    #[test]
    fn test_clean_molecules_have_no_hits() {
        for smiles in ["CC(=O)NC1=CC=CC=C1O", "COc1ccccc1O", "CCOC(=O)N(CC)CCO", "CCO"] {
            let hits = matching_alerts(&mol(smiles), "PAINS_A").expect("known set");
            assert!(hits.is_empty(), "{smiles} unexpectedly matched {hits:?}");
        }
    }

    #[test]
    fn test_unknown_alert_set() {
        assert!(matching_alerts(&mol("CCO"), "PAINS_Z").is_none());
    }

    #[test]
    fn test_substructure_respects_bond_orders() {
        assert!(has_substructure(&mol("CC(=O)O"), &mol("C=O")));
        assert!(!has_substructure(&mol("CCO"), &mol("C=O")));
        assert!(has_substructure(&mol("Cc1ccc(O)cc1"), &mol("c1ccccc1O")));
        assert!(!has_substructure(&mol("C1CCCCC1O"), &mol("c1ccccc1")));
    }
}
