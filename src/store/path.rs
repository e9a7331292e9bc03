//! Store paths
//!
//! Paths are `/`-separated segments. The store forbids `.`, `#`, `$`, `[`, `]`
//! and `/` inside a segment, which is why filenames go through
//! [`sanitize_filename`] before they become keys.

use std::fmt;

use super::StoreError;

pub const TERMINAL_CONFIG: &str = "terminal_config";
pub const KOHD_DATASTREAM: &str = "kohd_datastream";
pub const DIRECT_MESSAGES: &str = "direct_messages";
pub const PLAYER_CONNECTIONS: &str = "player_connections";
pub const PLAYER_REPLIES: &str = "player_replies";
pub const DATASTREAM_HISTORY: &str = "datastream_history";
pub const HISTORY_CLEARED: &str = "history_cleared_timestamp";
pub const DECRYPTION_KEYS: &str = "decryption_keys";
pub const FILE_SYSTEM: &str = "file_system";
pub const GLITCHES: &str = "glitches";
pub const CIPHER_CONFIG: &str = "cipher_config";
pub const ACCESS_CONTROL: &str = "access_control";
pub const CUSTOM_COMMANDS: &str = "custom_commands";
pub const PLAYER_RESOURCES: &str = "player_resources";
pub const USERS: &str = "users";

pub const OVERRIDE_STATE: &str = "override_state";
pub const GLITCHED_COMMAND: &str = "glitched_command";
pub const SCRAMBLE_NEXT: &str = "scramble_next";
pub const RESET_ACCESS_TIMESTAMP: &str = "reset_access_timestamp";

/// Stands in for `.` in file keys. Any character the store accepts works.
pub const FILENAME_SEPARATOR: char = '·';

const FORBIDDEN: [char; 6] = ['.', '#', '$', '[', ']', '/'];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath(Vec<String>);

impl StorePath {
    /// Top-level path for one of the well-known names above.
    pub fn root(name: &str) -> Self {
        Self(vec![name.to_string()])
    }

    /// Path made of well-known names only, so nothing is validated.
    pub fn nested(parent: &str, name: &str) -> Self {
        Self(vec![parent.to_string(), name.to_string()])
    }

    /// Child path. The key is validated against the store's segment rules.
    pub fn child(&self, key: &str) -> Result<Self, StoreError> {
        validate_key(key)?;
        let mut segments = self.0.clone();
        segments.push(key.to_string());
        Ok(Self(segments))
    }

    /// Parse a `/`-separated path, validating every segment.
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        for s in &segments {
            validate_key(s)?;
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment.
    pub fn key(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }

    /// True when `self` equals `other` or contains it.
    pub fn contains(&self, other: &StorePath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// True when either path contains the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.contains(&FORBIDDEN[..]) || key.chars().any(char::is_control) {
        return Err(StoreError::InvalidPath(key.to_string()));
    }
    Ok(())
}

/// Turn a filename into a store key.
pub fn sanitize_filename(name: &str) -> String {
    name.replace('.', &FILENAME_SEPARATOR.to_string())
}

/// Inverse of [`sanitize_filename`].
pub fn display_filename(key: &str) -> String {
    key.replace(FILENAME_SEPARATOR, ".")
}
