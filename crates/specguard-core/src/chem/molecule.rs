//! Molecular graph and SMILES reader.
//!
//! Supported: organic-subset atoms, bracket atoms (isotope, element,
//! aromatic flag, chirality marks, H count, charge, atom class), bonds
//! `- = # : / \`, branches, ring closures including `%nn`, and `.`
//! separated fragments. Stereo marks are accepted and ignored.
//!
//! After parsing, implicit hydrogens are assigned from default valences,
//! a smallest set of smallest rings is perceived, and Kekulé six-membered
//! carbon/nitrogen rings are rewritten as aromatic so that `C1=CC=CC=C1`
//! and `c1ccccc1` produce the same graph.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::str::FromStr;

use crate::domain::error::SmilesError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    H,
    Li,
    B,
    C,
    N,
    O,
    F,
    Na,
    Mg,
    Si,
    P,
    S,
    Cl,
    K,
    Ca,
    Fe,
    Zn,
    As,
    Se,
    Br,
    I,
}

impl Element {
    const ALL: [Element; 21] = [
        Element::H,
        Element::Li,
        Element::B,
        Element::C,
        Element::N,
        Element::O,
        Element::F,
        Element::Na,
        Element::Mg,
        Element::Si,
        Element::P,
        Element::S,
        Element::Cl,
        Element::K,
        Element::Ca,
        Element::Fe,
        Element::Zn,
        Element::As,
        Element::Se,
        Element::Br,
        Element::I,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Element::H => "H",
            Element::Li => "Li",
            Element::B => "B",
            Element::C => "C",
            Element::N => "N",
            Element::O => "O",
            Element::F => "F",
            Element::Na => "Na",
            Element::Mg => "Mg",
            Element::Si => "Si",
            Element::P => "P",
            Element::S => "S",
            Element::Cl => "Cl",
            Element::K => "K",
            Element::Ca => "Ca",
            Element::Fe => "Fe",
            Element::Zn => "Zn",
            Element::As => "As",
            Element::Se => "Se",
            Element::Br => "Br",
            Element::I => "I",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.symbol() == symbol)
    }

    /// Standard atomic weight in g/mol.
    pub fn atomic_weight(&self) -> f64 {
        match self {
            Element::H => 1.008,
            Element::Li => 6.94,
            Element::B => 10.81,
            Element::C => 12.011,
            Element::N => 14.007,
            Element::O => 15.999,
            Element::F => 18.998,
            Element::Na => 22.990,
            Element::Mg => 24.305,
            Element::Si => 28.085,
            Element::P => 30.974,
            Element::S => 32.06,
            Element::Cl => 35.45,
            Element::K => 39.098,
            Element::Ca => 40.078,
            Element::Fe => 55.845,
            Element::Zn => 65.38,
            Element::As => 74.922,
            Element::Se => 78.971,
            Element::Br => 79.904,
            Element::I => 126.904,
        }
    }

    /// Allowed valences for organic-subset atoms, lowest first.
    pub fn default_valences(&self) -> &'static [u8] {
        match self {
            Element::B => &[3],
            Element::C => &[4],
            Element::N | Element::P | Element::As => &[3, 5],
            Element::O => &[2],
            Element::S | Element::Se => &[2, 4, 6],
            Element::F | Element::Cl | Element::Br | Element::I => &[1],
            _ => &[],
        }
    }

    pub fn is_heavy(&self) -> bool {
        *self != Element::H
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    fn valence(&self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub element: Element,
    pub aromatic: bool,
    pub charge: i8,
    pub isotope: Option<u16>,
    /// Attached hydrogens: implicit for organic-subset atoms, explicit in brackets.
    pub hydrogens: u8,
    pub bracket: bool,
}

impl Atom {
    fn organic(element: Element, aromatic: bool) -> Self {
        Self {
            element,
            aromatic,
            charge: 0,
            isotope: None,
            hydrogens: 0,
            bracket: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bond {
    pub begin: usize,
    pub end: usize,
    pub order: BondOrder,
    pub in_ring: bool,
}

impl Bond {
    pub fn other(&self, atom: usize) -> usize {
        if self.begin == atom {
            self.end
        } else {
            self.begin
        }
    }
}

/// A parsed molecular graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Molecule {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    adjacency: Vec<Vec<usize>>,
    rings: Vec<Vec<usize>>,
}

impl Molecule {
    pub fn from_smiles(smiles: &str) -> Result<Self, SmilesError> {
        Parser::new(smiles).parse()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn atom(&self, index: usize) -> &Atom {
        &self.atoms[index]
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.atoms.iter().filter(|a| a.element.is_heavy()).count()
    }

    /// Perceived rings as ordered atom cycles.
    pub fn rings(&self) -> &[Vec<usize>] {
        &self.rings
    }

    pub fn neighbors(&self, atom: usize) -> impl Iterator<Item = (usize, &Bond)> + '_ {
        self.adjacency[atom].iter().map(move |&b| {
            let bond = &self.bonds[b];
            (bond.other(atom), bond)
        })
    }

    pub fn degree(&self, atom: usize) -> usize {
        self.adjacency[atom].len()
    }

    pub fn heavy_degree(&self, atom: usize) -> usize {
        self.neighbors(atom)
            .filter(|(n, _)| self.atoms[*n].element.is_heavy())
            .count()
    }

    /// Hydrogens on an atom, counting both attached counts and explicit H atoms.
    pub fn total_hydrogens(&self, atom: usize) -> u8 {
        let explicit = self
            .neighbors(atom)
            .filter(|(n, _)| self.atoms[*n].element == Element::H)
            .count();
        let total = usize::from(self.atoms[atom].hydrogens).saturating_add(explicit);
        u8::try_from(total).unwrap_or(u8::MAX)
    }

    pub fn bond_between(&self, a: usize, b: usize) -> Option<&Bond> {
        self.adjacency[a]
            .iter()
            .map(|&i| &self.bonds[i])
            .find(|bond| bond.other(a) == b)
    }

    pub fn is_in_ring(&self, atom: usize) -> bool {
        self.rings.iter().any(|r| r.contains(&atom))
    }

    fn bond_index(&self, a: usize, b: usize) -> Option<usize> {
        self.adjacency[a]
            .iter()
            .copied()
            .find(|&i| self.bonds[i].other(a) == b)
    }

    fn assemble(atoms: Vec<Atom>, bonds: Vec<Bond>, ring_count: usize) -> Result<Self, SmilesError> {
        let mut adjacency = vec![Vec::new(); atoms.len()];
        for (i, bond) in bonds.iter().enumerate() {
            adjacency[bond.begin].push(i);
            adjacency[bond.end].push(i);
        }

        let mut mol = Molecule {
            atoms,
            bonds,
            adjacency,
            rings: Vec::new(),
        };
        mol.assign_hydrogens()?;
        mol.perceive_rings(ring_count);

        for (index, atom) in mol.atoms.iter().enumerate() {
            if atom.aromatic && !mol.is_in_ring(index) {
                return Err(SmilesError::NonRingAromatic {
                    index,
                    symbol: atom.element.symbol().to_string(),
                });
            }
        }

        mol.perceive_aromaticity();
        Ok(mol)
    }

    fn assign_hydrogens(&mut self) -> Result<(), SmilesError> {
        for index in 0..self.atoms.len() {
            if self.atoms[index].bracket {
                continue;
            }
            let element = self.atoms[index].element;
            let total: u32 = self.adjacency[index]
                .iter()
                .map(|&b| u32::from(self.bonds[b].order.valence()))
                .sum();
            let valences = element.default_valences();
            let max_valence = valences.last().copied().unwrap_or(0);
            let bond_sum = match u8::try_from(total) {
                Ok(sum) if sum <= max_valence => sum,
                _ => {
                    return Err(SmilesError::Valence {
                        index,
                        symbol: element.symbol().to_string(),
                    })
                }
            };

            let hydrogens = if self.atoms[index].aromatic {
                valences
                    .first()
                    .map_or(0, |&v| v.saturating_sub(bond_sum + 1))
            } else {
                valences
                    .iter()
                    .find(|&&v| v >= bond_sum)
                    .map_or(0, |&v| v - bond_sum)
            };
            self.atoms[index].hydrogens = hydrogens;
        }
        Ok(())
    }

    /// Smallest set of smallest rings: shortest cycle through every ring
    /// bond, kept greedily by size while linearly independent over GF(2).
    fn perceive_rings(&mut self, ring_count: usize) {
        let mut candidates: Vec<Vec<usize>> = Vec::new();
        let mut seen: HashSet<Vec<usize>> = HashSet::new();
        for b in 0..self.bonds.len() {
            let (start, goal) = (self.bonds[b].begin, self.bonds[b].end);
            let Some(path) = self.shortest_path(start, goal, b) else {
                continue;
            };
            self.bonds[b].in_ring = true;
            let mut key = self.cycle_bonds(&path);
            key.sort_unstable();
            if seen.insert(key) {
                candidates.push(path);
            }
        }
        candidates.sort_by_key(Vec::len);

        let words = self.bonds.len().div_ceil(64);
        let mut basis: Vec<Option<Vec<u64>>> = vec![None; self.bonds.len()];
        for cycle in candidates {
            if self.rings.len() == ring_count {
                break;
            }
            let mut row = vec![0u64; words];
            for b in self.cycle_bonds(&cycle) {
                row[b / 64] |= 1 << (b % 64);
            }
            if insert_independent(&mut basis, row) {
                self.rings.push(cycle);
            }
        }
    }

    fn cycle_bonds(&self, cycle: &[usize]) -> Vec<usize> {
        (0..cycle.len())
            .filter_map(|i| self.bond_index(cycle[i], cycle[(i + 1) % cycle.len()]))
            .collect()
    }

    fn shortest_path(&self, start: usize, goal: usize, skip_bond: usize) -> Option<Vec<usize>> {
        let mut previous = vec![usize::MAX; self.atoms.len()];
        let mut queue = VecDeque::from([start]);
        previous[start] = start;

        while let Some(current) = queue.pop_front() {
            if current == goal {
                let mut path = vec![goal];
                let mut cursor = goal;
                while cursor != start {
                    cursor = previous[cursor];
                    path.push(cursor);
                }
                path.reverse();
                return Some(path);
            }
            for &b in &self.adjacency[current] {
                if b == skip_bond {
                    continue;
                }
                let next = self.bonds[b].other(current);
                if previous[next] == usize::MAX {
                    previous[next] = current;
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Rewrite alternating six-membered C/N rings as aromatic.
    fn perceive_aromaticity(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            for r in 0..self.rings.len() {
                let ring = self.rings[r].clone();
                if ring.len() != 6 || !self.is_kekule_ring(&ring) {
                    continue;
                }
                for (i, &atom) in ring.iter().enumerate() {
                    let next = ring[(i + 1) % ring.len()];
                    if let Some(b) = self.bond_index(atom, next) {
                        self.bonds[b].order = BondOrder::Aromatic;
                    }
                    self.atoms[atom].aromatic = true;
                }
                changed = true;
            }
        }
    }

    fn is_kekule_ring(&self, ring: &[usize]) -> bool {
        let ring_bonds: Vec<&Bond> = ring
            .iter()
            .enumerate()
            .filter_map(|(i, &atom)| self.bond_between(atom, ring[(i + 1) % ring.len()]))
            .collect();
        if ring_bonds.len() != ring.len() {
            return false;
        }
        // Already fully aromatic rings are left alone.
        if ring_bonds.iter().all(|b| b.order == BondOrder::Aromatic) {
            return false;
        }

        ring.iter().all(|&atom| {
            let a = &self.atoms[atom];
            if a.charge != 0 || !matches!(a.element, Element::C | Element::N) {
                return false;
            }
            let in_ring_doubles = ring_bonds
                .iter()
                .filter(|b| (b.begin == atom || b.end == atom) && b.order == BondOrder::Double)
                .count();
            let exocyclic_double = self.neighbors(atom).any(|(n, bond)| {
                bond.order == BondOrder::Double && !ring.contains(&n)
            });
            !exocyclic_double && (in_ring_doubles == 1 || (a.aromatic && in_ring_doubles == 0))
        })
    }
}

/// Reduce `row` against the basis; store it and return true if independent.
fn insert_independent(basis: &mut [Option<Vec<u64>>], mut row: Vec<u64>) -> bool {
    for bit in (0..basis.len()).rev() {
        if ((row[bit / 64] >> (bit % 64)) & 1) == 0 {
            continue;
        }
        if basis[bit].is_none() {
            basis[bit] = Some(row);
            return true;
        }
        if let Some(pivot_row) = &basis[bit] {
            for (word, pivot_word) in row.iter_mut().zip(pivot_row) {
                *word ^= pivot_word;
            }
        }
    }
    false
}

impl FromStr for Molecule {
    type Err = SmilesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Molecule::from_smiles(s)
    }
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    ring_closures: usize,
    prev: Option<usize>,
    branches: Vec<usize>,
    pending: Option<BondOrder>,
    open_rings: BTreeMap<u32, (usize, Option<BondOrder>)>,
}

impl<'a> Parser<'a> {
    fn new(smiles: &'a str) -> Self {
        Self {
            src: smiles.trim().as_bytes(),
            pos: 0,
            atoms: Vec::new(),
            bonds: Vec::new(),
            ring_closures: 0,
            prev: None,
            branches: Vec::new(),
            pending: None,
            open_rings: BTreeMap::new(),
        }
    }

    fn parse(mut self) -> Result<Molecule, SmilesError> {
        if self.src.is_empty() {
            return Err(SmilesError::Empty);
        }

        while self.pos < self.src.len() {
            let start = self.pos;
            match self.src[start] {
                b'(' => {
                    let prev = self.prev.ok_or(SmilesError::DanglingBond { pos: start })?;
                    self.branches.push(prev);
                    self.pos += 1;
                }
                b')' => {
                    if self.pending.is_some() {
                        return Err(SmilesError::DanglingBond { pos: start });
                    }
                    let restored = self.branches.pop().ok_or(SmilesError::UnbalancedBranch)?;
                    self.prev = Some(restored);
                    self.pos += 1;
                }
                b'-' | b'/' | b'\\' => self.bond_symbol(BondOrder::Single)?,
                b'=' => self.bond_symbol(BondOrder::Double)?,
                b'#' => self.bond_symbol(BondOrder::Triple)?,
                b':' => self.bond_symbol(BondOrder::Aromatic)?,
                b'.' => {
                    if self.pending.is_some() || self.prev.is_none() {
                        return Err(SmilesError::DanglingBond { pos: start });
                    }
                    self.prev = None;
                    self.pos += 1;
                }
                b'0'..=b'9' => {
                    let number = u32::from(self.src[start] - b'0');
                    self.pos += 1;
                    self.ring_bond(number, start)?;
                }
                b'%' => {
                    let digits = self
                        .src
                        .get(start + 1..start + 3)
                        .filter(|d| d.iter().all(u8::is_ascii_digit))
                        .ok_or(SmilesError::UnexpectedChar { ch: '%', pos: start })?;
                    let number = u32::from(digits[0] - b'0') * 10 + u32::from(digits[1] - b'0');
                    self.pos += 3;
                    self.ring_bond(number, start)?;
                }
                b'[' => {
                    let atom = self.bracket_atom()?;
                    self.add_atom(atom);
                }
                _ => {
                    let atom = self.organic_atom()?;
                    self.add_atom(atom);
                }
            }
        }

        if !self.branches.is_empty() {
            return Err(SmilesError::UnbalancedBranch);
        }
        if self.pending.is_some() {
            return Err(SmilesError::DanglingBond { pos: self.src.len() });
        }
        if let Some((&number, _)) = self.open_rings.iter().next() {
            return Err(SmilesError::UnclosedRing(number));
        }
        if self.atoms.is_empty() {
            return Err(SmilesError::Empty);
        }

        Molecule::assemble(self.atoms, self.bonds, self.ring_closures)
    }

    fn bond_symbol(&mut self, order: BondOrder) -> Result<(), SmilesError> {
        if self.prev.is_none() || self.pending.is_some() {
            return Err(SmilesError::DanglingBond { pos: self.pos });
        }
        self.pending = Some(order);
        self.pos += 1;
        Ok(())
    }

    fn default_order(&self, a: usize, b: usize) -> BondOrder {
        if self.atoms[a].aromatic && self.atoms[b].aromatic {
            BondOrder::Aromatic
        } else {
            BondOrder::Single
        }
    }

    fn add_atom(&mut self, atom: Atom) {
        let index = self.atoms.len();
        self.atoms.push(atom);
        if let Some(prev) = self.prev {
            let order = self
                .pending
                .take()
                .unwrap_or_else(|| self.default_order(prev, index));
            self.bonds.push(Bond {
                begin: prev,
                end: index,
                order,
                in_ring: false,
            });
        }
        self.prev = Some(index);
    }

    fn ring_bond(&mut self, number: u32, pos: usize) -> Result<(), SmilesError> {
        let current = self.prev.ok_or(SmilesError::DanglingBond { pos })?;
        let Some((other, opened_with)) = self.open_rings.remove(&number) else {
            let pending = self.pending.take();
            self.open_rings.insert(number, (current, pending));
            return Ok(());
        };

        if other == current {
            return Err(SmilesError::SelfLoop(number));
        }
        let duplicate = self
            .bonds
            .iter()
            .any(|b| (b.begin == other && b.end == current) || (b.begin == current && b.end == other));
        if duplicate {
            return Err(SmilesError::DuplicateBond(number));
        }

        let order = self
            .pending
            .take()
            .or(opened_with)
            .unwrap_or_else(|| self.default_order(other, current));
        self.ring_closures += 1;
        self.bonds.push(Bond {
            begin: other,
            end: current,
            order,
            in_ring: false,
        });
        Ok(())
    }

    fn organic_atom(&mut self) -> Result<Atom, SmilesError> {
        let rest = &self.src[self.pos..];
        let (element, aromatic, len) = match rest {
            [b'C', b'l', ..] => (Element::Cl, false, 2),
            [b'B', b'r', ..] => (Element::Br, false, 2),
            [b'B', ..] => (Element::B, false, 1),
            [b'C', ..] => (Element::C, false, 1),
            [b'N', ..] => (Element::N, false, 1),
            [b'O', ..] => (Element::O, false, 1),
            [b'P', ..] => (Element::P, false, 1),
            [b'S', ..] => (Element::S, false, 1),
            [b'F', ..] => (Element::F, false, 1),
            [b'I', ..] => (Element::I, false, 1),
            [b'b', ..] => (Element::B, true, 1),
            [b'c', ..] => (Element::C, true, 1),
            [b'n', ..] => (Element::N, true, 1),
            [b'o', ..] => (Element::O, true, 1),
            [b'p', ..] => (Element::P, true, 1),
            [b's', ..] => (Element::S, true, 1),
            [other, ..] => {
                return Err(SmilesError::UnexpectedChar {
                    ch: char::from(*other),
                    pos: self.pos,
                })
            }
            [] => return Err(SmilesError::Empty),
        };
        self.pos += len;
        Ok(Atom::organic(element, aromatic))
    }

    fn bracket_atom(&mut self) -> Result<Atom, SmilesError> {
        let start = self.pos;
        let close = self.src[start..]
            .iter()
            .position(|&b| b == b']')
            .ok_or(SmilesError::UnterminatedBracket { pos: start })?;
        let body = &self.src[start + 1..start + close];
        let at = |i: usize| start + 1 + i;
        let unexpected = |i: usize| SmilesError::UnexpectedChar {
            ch: char::from(body[i]),
            pos: at(i),
        };

        let mut i = 0;
        let mut isotope: Option<u16> = None;
        while i < body.len() && body[i].is_ascii_digit() {
            let digit = u16::from(body[i] - b'0');
            isotope = Some(isotope.unwrap_or(0).saturating_mul(10).saturating_add(digit));
            i += 1;
        }

        let Some(&first) = body.get(i) else {
            return Err(SmilesError::UnexpectedChar { ch: ']', pos: start + close });
        };
        let (element, aromatic) = if first.is_ascii_lowercase() {
            match body.get(i..i + 2) {
                Some(b"se") => {
                    i += 2;
                    (Element::Se, true)
                }
                Some(b"as") => {
                    i += 2;
                    (Element::As, true)
                }
                _ => {
                    let element = match first {
                        b'b' => Element::B,
                        b'c' => Element::C,
                        b'n' => Element::N,
                        b'o' => Element::O,
                        b'p' => Element::P,
                        b's' => Element::S,
                        other => {
                            return Err(SmilesError::UnknownElement {
                                symbol: char::from(other).to_string(),
                                pos: at(i),
                            })
                        }
                    };
                    i += 1;
                    (element, true)
                }
            }
        } else if first.is_ascii_uppercase() {
            let two_letter = body
                .get(i + 1)
                .filter(|b| b.is_ascii_lowercase())
                .and_then(|&second| {
                    Element::from_symbol(&format!("{}{}", char::from(first), char::from(second)))
                });
            match two_letter {
                Some(element) => {
                    i += 2;
                    (element, false)
                }
                None => {
                    let symbol = char::from(first).to_string();
                    let element = Element::from_symbol(&symbol)
                        .ok_or(SmilesError::UnknownElement { symbol, pos: at(i) })?;
                    i += 1;
                    (element, false)
                }
            }
        } else {
            return Err(unexpected(i));
        };

        while i < body.len() && body[i] == b'@' {
            i += 1;
        }

        let mut hydrogens = 0u8;
        if body.get(i) == Some(&b'H') {
            i += 1;
            hydrogens = 1;
            if let Some(&d) = body.get(i).filter(|d| d.is_ascii_digit()) {
                hydrogens = d - b'0';
                i += 1;
            }
        }

        let mut charge = 0i8;
        if let Some(&sign) = body.get(i).filter(|&&c| c == b'+' || c == b'-') {
            let unit: i8 = if sign == b'+' { 1 } else { -1 };
            i += 1;
            if let Some(&d) = body.get(i).filter(|d| d.is_ascii_digit()) {
                charge = unit * (d - b'0') as i8;
                i += 1;
            } else {
                charge = unit;
                while body.get(i) == Some(&sign) {
                    charge = charge
                        .checked_add(unit)
                        .ok_or(SmilesError::ChargeOutOfRange { pos: at(i) })?;
                    i += 1;
                }
            }
        }

        if body.get(i) == Some(&b':') {
            i += 1;
            while i < body.len() && body[i].is_ascii_digit() {
                i += 1;
            }
        }

        if i != body.len() {
            return Err(unexpected(i));
        }

        self.pos = start + close + 1;
        Ok(Atom {
            element,
            aromatic,
            charge,
            isotope,
            hydrogens,
            bracket: true,
        })
    }
}
