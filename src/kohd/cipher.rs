//! Cipher tables
//!
//! A [`CipherTable`] is replaced wholesale, never edited in place. It lives in
//! the store under `cipher_config` and every terminal mirrors it locally.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{GROUPS, PLAINTEXT, SYMBOLS};

/// Built-in table used when the store holds no cipher.
const DEFAULT_TABLE: [(char, &str); 36] = [
    ('A', "<>"), ('B', "<%"), ('C', "<^"), ('D', "<&"), ('E', "<*"), ('F', "<-"),
    ('G', "<+"), ('H', "<@"), ('I', "><"), ('J', ">%"), ('K', ">^"), ('L', ">&"),
    ('M', ">*"), ('N', ">-"), ('O', ">+"), ('P', ">@"), ('Q', "%<"), ('R', "%>"),
    ('S', "%^"), ('T', "%&"), ('U', "%*"), ('V', "%-"), ('W', "%+"), ('X', "%@"),
    ('Y', "^<"), ('Z', "^>"), ('0', "^%"), ('1', "^&"), ('2', "^*"), ('3', "^-"),
    ('4', "^+"), ('5', "^@"), ('6', "&<"), ('7', "&>"), ('8', "&%"), ('9', "&^"),
];

/// Mapping from plaintext symbol to its two-character code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CipherTable(BTreeMap<char, String>);

impl CipherTable {
    /// The fixed table every terminal falls back to.
    pub fn default_table() -> Self {
        Self(
            DEFAULT_TABLE
                .iter()
                .map(|(c, code)| (*c, (*code).to_string()))
                .collect(),
        )
    }

    /// Generate a fresh randomized table.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// Generate a table from the given RNG.
    ///
    /// Self-pairs (`<<`, `>>`, ...) are left out of the candidate pool, which
    /// leaves 40 codes for 36 symbols.
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut candidates: Vec<String> = GROUPS
            .iter()
            .flat_map(|g| {
                SYMBOLS
                    .iter()
                    .filter(move |s| *s != g)
                    .map(move |s| format!("{g}{s}"))
            })
            .collect();
        candidates.shuffle(rng);

        Self(PLAINTEXT.chars().zip(candidates).collect())
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (char, String)>) -> Self {
        Self(entries.into_iter().collect())
    }

    /// Code assigned to a plaintext symbol.
    pub fn code_for(&self, symbol: char) -> Option<&str> {
        self.0.get(&symbol).map(String::as_str)
    }

    /// Reverse lookup from code to plaintext symbol.
    pub fn symbol_for(&self, code: &str) -> Option<char> {
        self.0
            .iter()
            .find_map(|(symbol, c)| (c == code).then_some(*symbol))
    }

    /// Reverse index, built once per decode pass.
    pub fn reversed(&self) -> HashMap<&str, char> {
        self.0.iter().map(|(s, c)| (c.as_str(), *s)).collect()
    }

    /// Plaintext symbols in sorted order. Key switches are built from this set.
    pub fn symbols(&self) -> impl Iterator<Item = char> + '_ {
        self.0.keys().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (char, &str)> + '_ {
        self.0.iter().map(|(s, c)| (*s, c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reverse-lookup grid: one row per group symbol, one column per symbol.
    pub fn grid(&self) -> Vec<GridRow> {
        let reversed = self.reversed();
        GROUPS
            .iter()
            .map(|&group| {
                let cells = SYMBOLS
                    .iter()
                    .map(|&pos| {
                        if group == pos {
                            return GridCell::Space;
                        }
                        let pair = format!("{group}{pos}");
                        match reversed.get(pair.as_str()) {
                            Some(symbol) => GridCell::Assigned(*symbol),
                            None => GridCell::Blank,
                        }
                    })
                    .collect();
                GridRow { group, cells }
            })
            .collect()
    }
}

impl Default for CipherTable {
    fn default() -> Self {
        Self::default_table()
    }
}

/// One row of [`CipherTable::grid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRow {
    pub group: char,
    pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridCell {
    Assigned(char),
    /// Self-pair, reserved for the space marker.
    Space,
    /// Legal code with no symbol assigned.
    Blank,
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridCell::Assigned(c) => write!(f, "{c}"),
            GridCell::Space => f.write_str("[SPACE]"),
            GridCell::Blank => f.write_str("[BLANK]"),
        }
    }
}

impl fmt::Display for CipherTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>3}", "")?;
        for s in SYMBOLS {
            write!(f, " {:^7}", s)?;
        }
        writeln!(f)?;
        for row in self.grid() {
            write!(f, "{:>3}", row.group)?;
            for cell in &row.cells {
                write!(f, " {:^7}", cell.to_string())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
