//! Synthetic-accessibility proxy.
//!
//! A size/complexity heuristic squashed onto the conventional 1 (easy) to
//! 10 (hard) scale. Not a fragment-based SA score.

use std::collections::BTreeSet;

use crate::chem::molecule::Molecule;
use crate::chem::properties::rotatable_bonds;

fn ring_sets(mol: &Molecule) -> Vec<BTreeSet<usize>> {
    mol.rings()
        .iter()
        .map(|r| r.iter().copied().collect())
        .collect()
}

/// Atoms that are the only atom shared by two rings.
pub fn spiro_atom_count(mol: &Molecule) -> usize {
    let rings = ring_sets(mol);
    let mut spiro = BTreeSet::new();
    for (i, a) in rings.iter().enumerate() {
        for b in &rings[i + 1..] {
            let shared: Vec<usize> = a.intersection(b).copied().collect();
            if let [atom] = shared.as_slice() {
                spiro.insert(*atom);
            }
        }
    }
    spiro.len()
}

/// Branching atoms shared by two rings that overlap on three or more atoms.
pub fn bridgehead_atom_count(mol: &Molecule) -> usize {
    let rings = ring_sets(mol);
    let mut bridgeheads = BTreeSet::new();
    for (i, a) in rings.iter().enumerate() {
        for b in &rings[i + 1..] {
            let shared: BTreeSet<usize> = a.intersection(b).copied().collect();
            if shared.len() < 3 {
                continue;
            }
            for &atom in &shared {
                let ring_neighbors = mol
                    .neighbors(atom)
                    .filter(|(n, bond)| bond.in_ring && (a.contains(n) || b.contains(n)))
                    .count();
                if ring_neighbors >= 3 {
                    bridgeheads.insert(atom);
                }
            }
        }
    }
    bridgeheads.len()
}

pub fn sa_score(mol: &Molecule) -> f64 {
    let heavy = mol.heavy_atom_count() as f64;
    let rotatable = rotatable_bonds(mol) as f64;
    let spiro = spiro_atom_count(mol) as f64;
    let bridgehead = bridgehead_atom_count(mol) as f64;
    let extra_rings = (mol.rings().len() as f64 - 1.0).max(0.0);

    let raw = 1.0 + 0.1 * heavy + 0.3 * rotatable + 0.4 * spiro + 0.4 * bridgehead + 0.2 * extra_rings;
    let squashed = 5.0 * (((raw - 5.0) / 5.0).tanh() + 1.0);
    squashed.clamp(1.0, 10.0)
}
