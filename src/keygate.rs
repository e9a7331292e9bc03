//! Key-gate: per-symbol unlock flags
//!
//! Stored as `decryption_keys/<symbol> -> bool`. The gate only means something
//! against the cipher table it was built for, so every table replacement clears
//! it (see [`crate::session::GmSession::replace_cipher`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::kohd::{CipherTable, PLAINTEXT};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyGate(BTreeMap<char, bool>);

impl KeyGate {
    /// Gate with every symbol of `table` unlocked.
    pub fn all_unlocked(table: &CipherTable) -> Self {
        Self(table.symbols().map(|s| (s, true)).collect())
    }

    /// The store value written by "unlock all": every plaintext symbol set.
    pub fn unlock_all_value() -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = PLAINTEXT
            .chars()
            .map(|c| (c.to_string(), serde_json::Value::Bool(true)))
            .collect();
        serde_json::Value::Object(map)
    }

    pub fn set(&mut self, symbol: char, unlocked: bool) {
        self.0.insert(symbol, unlocked);
    }

    /// Missing entries are locked.
    pub fn is_unlocked(&self, symbol: char) -> bool {
        self.0.get(&symbol).copied().unwrap_or(false)
    }

    pub fn unlocked_count(&self) -> usize {
        self.0.values().filter(|v| **v).count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// One switch per symbol of `table`, sorted. Symbols the gate knows about
    /// but the table doesn't are left out.
    pub fn switches(&self, table: &CipherTable) -> Vec<KeySwitch> {
        table
            .symbols()
            .map(|symbol| KeySwitch {
                symbol,
                unlocked: self.is_unlocked(symbol),
            })
            .collect()
    }
}

/// Derived display state for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeySwitch {
    pub symbol: char,
    pub unlocked: bool,
}
