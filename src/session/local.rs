//! State that belongs to this GM only and never goes to the store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::TerminalConfig;

pub const HISTORY_FILE: &str = "message_history.json";
pub const PRESETS_FILE: &str = "config_presets.json";

/// Canned messages offered for quick transmission.
pub const MESSAGE_TEMPLATES: [&str; 6] = [
    "CONNECTION UNSTABLE",
    "SIGNAL BOOSTED",
    "SECURITY ALERT",
    "TRACE DETECTED",
    "ACKNOWLEDGED",
    "STAND BY...",
];

/// Messages this GM has sent, most recent first.
#[derive(Debug)]
pub struct LocalHistory {
    file: Option<PathBuf>,
    limit: usize,
    entries: Vec<String>,
}

impl LocalHistory {
    /// History that is never written to disk.
    pub fn in_memory(limit: usize) -> Self {
        Self {
            file: None,
            limit,
            entries: Vec::new(),
        }
    }

    /// Load from `data_dir`. A missing file is an empty history.
    pub fn load(data_dir: &Path, limit: usize) -> Result<Self> {
        let file = data_dir.join(HISTORY_FILE);
        let mut entries: Vec<String> = read_json(&file)?.unwrap_or_default();
        entries.truncate(limit);
        Ok(Self {
            file: Some(file),
            limit,
            entries,
        })
    }

    /// Add a sent message. Messages already in the history are not re-added.
    pub fn record(&mut self, message: &str) -> Result<()> {
        if self.entries.iter().any(|m| m == message) {
            return Ok(());
        }
        self.entries.insert(0, message.to_string());
        self.entries.truncate(self.limit);
        self.save()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.save()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    fn save(&self) -> Result<()> {
        match &self.file {
            Some(file) => write_json(file, &self.entries),
            None => Ok(()),
        }
    }
}

/// Named terminal configurations saved for reuse.
#[derive(Debug, Default)]
pub struct ConfigPresets {
    file: Option<PathBuf>,
    presets: BTreeMap<String, TerminalConfig>,
}

impl ConfigPresets {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn load(data_dir: &Path) -> Result<Self> {
        let file = data_dir.join(PRESETS_FILE);
        let presets = read_json(&file)?.unwrap_or_default();
        Ok(Self {
            file: Some(file),
            presets,
        })
    }

    /// Save or overwrite a preset. Names are trimmed; empty names are rejected.
    pub fn save(&mut self, name: &str, config: TerminalConfig) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(crate::error::ConsoleError::validation("preset name is required"));
        }
        self.presets.insert(name.to_string(), config);
        self.persist()
    }

    pub fn get(&self, name: &str) -> Option<&TerminalConfig> {
        self.presets.get(name.trim())
    }

    pub fn delete(&mut self, name: &str) -> Result<bool> {
        let removed = self.presets.remove(name.trim()).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn names(&self) -> Vec<&str> {
        self.presets.keys().map(String::as_str).collect()
    }

    fn persist(&self) -> Result<()> {
        match &self.file {
            Some(file) => write_json(file, &self.presets),
            None => Ok(()),
        }
    }
}

fn read_json<T: DeserializeOwned>(file: &Path) -> Result<Option<T>> {
    if !file.exists() {
        debug!(file = %file.display(), "No local state file yet");
        return Ok(None);
    }
    let content = std::fs::read_to_string(file)?;
    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(file = %file.display(), error = %e, "Ignoring unreadable local state");
            Ok(None)
        }
    }
}

fn write_json<T: Serialize>(file: &Path, value: &T) -> Result<()> {
    if let Some(parent) = file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(file, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_history_most_recent_first_without_duplicates() {
        let mut history = LocalHistory::in_memory(20);
        history.record("HELLO").unwrap();
        history.record("WORLD").unwrap();
        history.record("HELLO").unwrap();
        assert_eq!(history.entries(), ["WORLD", "HELLO"]);
    }

    #[test]
    fn test_history_limit() {
        let mut history = LocalHistory::in_memory(3);
        for m in ["A", "B", "C", "D"] {
            history.record(m).unwrap();
        }
        assert_eq!(history.entries(), ["D", "C", "B"]);
    }

    #[test]
    fn test_history_persists() {
        let dir = tempdir().unwrap();
        {
            let mut history = LocalHistory::load(dir.path(), 20).unwrap();
            history.record("STAND BY...").unwrap();
        }
        let history = LocalHistory::load(dir.path(), 20).unwrap();
        assert_eq!(history.entries(), ["STAND BY..."]);
    }

    #[test]
    fn test_corrupt_history_is_ignored() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(HISTORY_FILE), "not json").unwrap();
        let history = LocalHistory::load(dir.path(), 20).unwrap();
        assert!(history.entries().is_empty());
    }

    #[test]
    fn test_presets_round_trip() {
        let dir = tempdir().unwrap();
        let amber = TerminalConfig {
            theme: "amber".into(),
            ..TerminalConfig::default()
        };
        {
            let mut presets = ConfigPresets::load(dir.path()).unwrap();
            presets.save(" Nostromo ", amber.clone()).unwrap();
            assert!(presets.save("  ", amber.clone()).is_err());
        }

        let mut presets = ConfigPresets::load(dir.path()).unwrap();
        assert_eq!(presets.names(), ["Nostromo"]);
        assert_eq!(presets.get("Nostromo"), Some(&amber));
        assert!(presets.delete("Nostromo").unwrap());
        assert!(!presets.delete("Nostromo").unwrap());
    }
}
