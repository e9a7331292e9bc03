//! Records stored under the shared paths
//!
//! Field names follow the store's JSON shape, which the player terminal reads
//! directly.

use serde::{Deserialize, Serialize};

use crate::store::path::display_filename;

fn is_false(v: &bool) -> bool {
    !*v
}

/// Cosmetic and narrative parameters of the player terminal.
///
/// Always written whole; there are no partial updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalConfig {
    pub system_name: String,
    pub os_name: String,
    pub scan_command: String,
    pub connect_command: String,
    pub data_noun: String,
    pub signal_noun: String,
    pub theme: String,
}

impl TerminalConfig {
    /// Command names are typed by the player, so they are stored lowercase.
    pub fn normalized(mut self) -> Self {
        self.scan_command = self.scan_command.trim().to_lowercase();
        self.connect_command = self.connect_command.trim().to_lowercase();
        self
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            system_name: "KOHD RELAY".to_string(),
            os_name: "KohdOS".to_string(),
            scan_command: "scan".to_string(),
            connect_command: "connect".to_string(),
            data_noun: "datastream".to_string(),
            signal_noun: "signal".to_string(),
            theme: "green".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[default]
    Text,
    Svg,
    Gif,
}

/// One file of the player-visible file system, keyed by sanitized filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemEntry {
    /// Text, raw SVG markup, or a GIF URL depending on the kind flags.
    pub content: String,
    /// Clearance the player needs to see the file.
    pub level: u32,
    #[serde(rename = "isSvg", default, skip_serializing_if = "is_false")]
    pub is_svg: bool,
    #[serde(rename = "isGif", default, skip_serializing_if = "is_false")]
    pub is_gif: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
}

impl FileSystemEntry {
    pub fn new(kind: FileKind, content: impl Into<String>, level: u32) -> Self {
        Self {
            content: content.into(),
            level,
            is_svg: kind == FileKind::Svg,
            is_gif: kind == FileKind::Gif,
            hidden: false,
        }
    }

    pub fn kind(&self) -> FileKind {
        if self.is_svg {
            FileKind::Svg
        } else if self.is_gif {
            FileKind::Gif
        } else {
            FileKind::Text
        }
    }

    pub fn visible_to(&self, clearance: u32) -> bool {
        !self.hidden && self.level <= clearance
    }
}

/// A file paired with its store key, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileListing {
    pub key: String,
    pub entry: FileSystemEntry,
}

impl FileListing {
    pub fn display_name(&self) -> String {
        display_filename(&self.key)
    }
}

/// Built-in behaviour the player terminal runs instead of a text reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialAction {
    BruteforceDecrypt,
    TraceSignal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCommand {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    #[serde(rename = "consumesResource", default, skip_serializing_if = "is_false")]
    pub consumes_resource: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_action: Option<SpecialAction>,
}

impl CustomCommand {
    /// Special actions always cost one unit. The player terminal does the
    /// decrement and refuses to run once the count is zero.
    pub fn costs_resource(&self) -> bool {
        self.consumes_resource || self.special_action.is_some()
    }
}

/// The single player resource counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerResource {
    pub name: String,
    pub count: u32,
}

impl Default for PlayerResource {
    fn default() -> Self {
        Self {
            name: "Exploits".to_string(),
            count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideKind {
    Lockout,
    Warning,
}

/// Full-screen takeover shown on the player terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideState {
    #[serde(rename = "type")]
    pub kind: OverrideKind,
    pub message: String,
    /// Rich payload (markup) shown instead of the plain message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Visual glitch effect tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    /// Auto-expiry in seconds. The countdown runs on the client that armed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<u64>,
}

/// Everything under `glitches`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlitchState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_state: Option<OverrideState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glitched_command: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub scramble_next: bool,
    /// One-shot signal. Whoever observes it first deletes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_access_timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerReply {
    pub user: String,
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level3: Option<String>,
}

/// Who a transmission goes to, or whose replies are shown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    #[default]
    All,
    Player(String),
}

impl Target {
    /// `"all"` (any case) selects everyone, anything else names a player.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            Target::All
        } else {
            Target::Player(s.to_string())
        }
    }
}

/// Presence records are either a bare flag or an object with `isConnected`.
/// Anything else present counts as connected.
pub fn is_connected(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Object(map) => map
            .get("isConnected")
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
        serde_json::Value::Null => false,
        _ => true,
    }
}
