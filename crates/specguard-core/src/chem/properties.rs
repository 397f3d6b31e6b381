//! Physicochemical descriptors and bound checks.
//!
//! Values are deterministic approximations: MW uses average atomic weights,
//! TPSA uses Ertl's nitrogen/oxygen fragment contributions and logP is an
//! atom-contribution estimate.

use std::collections::BTreeMap;

use crate::chem::molecule::{BondOrder, Element, Molecule};
use crate::domain::spec::Bound;

pub const MW: &str = "MW";
pub const LOGP: &str = "logP";
pub const TPSA: &str = "TPSA";
pub const HBD: &str = "HBD";
pub const HBA: &str = "HBA";
pub const ROTB: &str = "ROTB";

pub const PROPERTY_NAMES: [&str; 6] = [MW, LOGP, TPSA, HBD, HBA, ROTB];

/// Descriptor name to value, ordered by name.
pub type PropertyMap = BTreeMap<String, f64>;

pub fn compute_properties(mol: &Molecule) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert(MW.to_string(), molecular_weight(mol));
    props.insert(LOGP.to_string(), estimated_logp(mol));
    props.insert(TPSA.to_string(), topological_polar_surface_area(mol));
    props.insert(HBD.to_string(), h_bond_donors(mol) as f64);
    props.insert(HBA.to_string(), h_bond_acceptors(mol) as f64);
    props.insert(ROTB.to_string(), rotatable_bonds(mol) as f64);
    props
}

pub fn molecular_weight(mol: &Molecule) -> f64 {
    mol.atoms()
        .iter()
        .map(|a| a.element.atomic_weight() + f64::from(a.hydrogens) * Element::H.atomic_weight())
        .sum()
}

/// Nitrogen and oxygen atoms carrying at least one hydrogen.
pub fn h_bond_donors(mol: &Molecule) -> usize {
    (0..mol.atom_count())
        .filter(|&i| matches!(mol.atom(i).element, Element::N | Element::O))
        .filter(|&i| mol.total_hydrogens(i) > 0)
        .count()
}

/// Nitrogen plus oxygen count.
pub fn h_bond_acceptors(mol: &Molecule) -> usize {
    mol.atoms()
        .iter()
        .filter(|a| matches!(a.element, Element::N | Element::O))
        .count()
}

/// Non-ring single bonds between non-terminal heavy atoms, excluding bonds
/// to triple-bonded atoms.
pub fn rotatable_bonds(mol: &Molecule) -> usize {
    let has_triple = |atom: usize| {
        mol.neighbors(atom)
            .any(|(_, b)| b.order == BondOrder::Triple)
    };

    mol.bonds()
        .iter()
        .filter(|b| b.order == BondOrder::Single && !b.in_ring)
        .filter(|b| mol.atom(b.begin).element.is_heavy() && mol.atom(b.end).element.is_heavy())
        .filter(|b| mol.heavy_degree(b.begin) > 1 && mol.heavy_degree(b.end) > 1)
        .filter(|b| !has_triple(b.begin) && !has_triple(b.end))
        .count()
}

struct BondCounts {
    single: usize,
    double: usize,
    triple: usize,
    aromatic: usize,
}

fn heavy_bond_counts(mol: &Molecule, atom: usize) -> BondCounts {
    let mut counts = BondCounts {
        single: 0,
        double: 0,
        triple: 0,
        aromatic: 0,
    };
    for (n, bond) in mol.neighbors(atom) {
        if !mol.atom(n).element.is_heavy() {
            continue;
        }
        match bond.order {
            BondOrder::Single => counts.single += 1,
            BondOrder::Double => counts.double += 1,
            BondOrder::Triple => counts.triple += 1,
            BondOrder::Aromatic => counts.aromatic += 1,
        }
    }
    counts
}

fn nitrogen_psa(mol: &Molecule, atom: usize) -> f64 {
    let a = mol.atom(atom);
    let h = mol.total_hydrogens(atom);
    let c = heavy_bond_counts(mol, atom);

    if a.aromatic {
        return match (c.aromatic + c.single, h, a.charge) {
            (2, 0, 0) => 12.89,
            (2, 1, 0) => 15.79,
            (3, 0, 0) => 4.41,
            (_, _, 1) => 3.01,
            _ => 4.93,
        };
    }
    if a.charge > 0 {
        return if c.double > 0 { 3.01 } else { 0.0 };
    }
    match (c.single, c.double, c.triple, h) {
        (3, 0, 0, 0) => 3.24,
        (1, 1, 0, 0) => 12.36,
        (0, 0, 1, 0) => 23.79,
        (2, 0, 0, 1) => 12.03,
        (0, 1, 0, 1) => 23.85,
        (1, 0, 0, 2) => 26.02,
        (0, 0, 0, 3) => 26.02,
        _ => 3.24,
    }
}

fn oxygen_psa(mol: &Molecule, atom: usize) -> f64 {
    let a = mol.atom(atom);
    let h = mol.total_hydrogens(atom);
    let c = heavy_bond_counts(mol, atom);

    if a.aromatic {
        return 13.14;
    }
    if a.charge < 0 {
        return 23.06;
    }
    match (c.single, c.double, h) {
        (0, 1, 0) => 17.07,
        (2, 0, 0) => 9.23,
        (1, 0, 1) => 20.23,
        (0, 0, 2) => 20.23,
        _ => 9.23,
    }
}

pub fn topological_polar_surface_area(mol: &Molecule) -> f64 {
    (0..mol.atom_count())
        .map(|i| match mol.atom(i).element {
            Element::N => nitrogen_psa(mol, i),
            Element::O => oxygen_psa(mol, i),
            _ => 0.0,
        })
        .sum()
}

/// Atom-contribution logP estimate.
pub fn estimated_logp(mol: &Molecule) -> f64 {
    (0..mol.atom_count())
        .map(|i| {
            let a = mol.atom(i);
            let h = f64::from(mol.total_hydrogens(i));
            let heavy = mol.heavy_degree(i) as f64;
            match a.element {
                Element::C if a.aromatic => {
                    if h > 0.0 {
                        0.1581 + 0.123 * h
                    } else {
                        0.136
                    }
                }
                Element::C => {
                    let polar_neighbors = mol
                        .neighbors(i)
                        .filter(|(n, _)| matches!(mol.atom(*n).element, Element::N | Element::O))
                        .count() as f64;
                    0.1441 - 0.1 * (heavy - 1.0).max(0.0) - 0.15 * polar_neighbors + 0.123 * h
                }
                Element::N if a.aromatic => -0.4806 + 0.2142 * h,
                Element::N => -1.019 + 0.3 * (heavy - 1.0).max(0.0) + 0.2142 * h,
                Element::O if a.aromatic => 0.1552,
                Element::O => {
                    let c = heavy_bond_counts(mol, i);
                    if c.double > 0 {
                        -0.1526
                    } else if h > 0.0 {
                        -0.2893 - 0.2 * h
                    } else {
                        -0.0684
                    }
                }
                Element::F => 0.4202,
                Element::Cl => 0.6895,
                Element::Br => 0.8456,
                Element::I => 0.8857,
                Element::S if a.aromatic => 0.6237,
                Element::S => 0.6482,
                Element::P => 0.8612,
                _ => 0.0,
            }
        })
        .sum()
}

/// True when every bounded property is present and inside its window.
pub fn check_bounds_all(props: &PropertyMap, bounds: &BTreeMap<String, Bound>) -> bool {
    bounds
        .iter()
        .all(|(name, b)| props.get(name).is_some_and(|v| b.contains(*v)))
}

/// True when at least one bounded property is present and inside its window.
pub fn check_bounds_any(props: &PropertyMap, bounds: &BTreeMap<String, Bound>) -> bool {
    bounds
        .iter()
        .any(|(name, b)| props.get(name).is_some_and(|v| b.contains(*v)))
}

/// Signed margin per bounded property that has a value.
pub fn margins_to_bounds(props: &PropertyMap, bounds: &BTreeMap<String, Bound>) -> BTreeMap<String, f64> {
    bounds
        .iter()
        .filter_map(|(name, b)| props.get(name).map(|v| (name.clone(), b.margin(*v))))
        .collect()
}
