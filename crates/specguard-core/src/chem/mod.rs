//! Built-in cheminformatics: SMILES reading, descriptors, structural alerts
//! and a synthetic-accessibility proxy.
//!
//! The evaluator only talks to [`DescriptorProvider`], so a different
//! toolkit can be plugged in without touching constraint logic.

pub mod alerts;
pub mod molecule;
pub mod properties;
pub mod sa_score;

pub use molecule::{Atom, Bond, BondOrder, Element, Molecule};
pub use properties::{PropertyMap, PROPERTY_NAMES};

use crate::domain::error::SmilesError;

/// Source of molecular parsing and descriptor values for the evaluator.
pub trait DescriptorProvider: Send + Sync {
    /// Parse and validate a candidate artifact.
    fn parse(&self, smiles: &str) -> Result<Molecule, SmilesError>;

    fn properties(&self, mol: &Molecule) -> PropertyMap;

    /// Alerts of `alert_set` present in `mol`; `None` when the set is unknown.
    fn alerts(&self, mol: &Molecule, alert_set: &str) -> Option<Vec<String>>;

    fn sa_score(&self, mol: &Molecule) -> f64;
}

/// Deterministic in-crate descriptor implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinDescriptors;

impl DescriptorProvider for BuiltinDescriptors {
    fn parse(&self, smiles: &str) -> Result<Molecule, SmilesError> {
        Molecule::from_smiles(smiles)
    }

    fn properties(&self, mol: &Molecule) -> PropertyMap {
        properties::compute_properties(mol)
    }

    fn alerts(&self, mol: &Molecule, alert_set: &str) -> Option<Vec<String>> {
        alerts::matching_alerts(mol, alert_set)
    }

    fn sa_score(&self, mol: &Molecule) -> f64 {
        sa_score::sa_score(mol)
    }
}
