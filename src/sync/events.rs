//! Subscribed entities and the typed events the synchronizer emits

use std::collections::BTreeMap;

use serde::Serialize;

use crate::keygate::KeySwitch;
use crate::kohd::CipherTable;
use crate::models::{
    AccessControl, CustomCommand, FileListing, GlitchState, PlayerReply, PlayerResource, Target,
    TerminalConfig,
};
use crate::store::path;
use crate::store::StorePath;

/// One logical entity per subscribed store path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Cipher,
    Keys,
    TerminalConfig,
    Files,
    Commands,
    Resources,
    Glitches,
    Users,
    History,
    Presence,
    Replies,
    AccessControl,
}

impl Entity {
    pub const ALL: [Entity; 12] = [
        Entity::Cipher,
        Entity::Keys,
        Entity::TerminalConfig,
        Entity::Files,
        Entity::Commands,
        Entity::Resources,
        Entity::Glitches,
        Entity::Users,
        Entity::History,
        Entity::Presence,
        Entity::Replies,
        Entity::AccessControl,
    ];

    pub fn path(self) -> StorePath {
        StorePath::root(self.path_name())
    }

    pub fn path_name(self) -> &'static str {
        match self {
            Entity::Cipher => path::CIPHER_CONFIG,
            Entity::Keys => path::DECRYPTION_KEYS,
            Entity::TerminalConfig => path::TERMINAL_CONFIG,
            Entity::Files => path::FILE_SYSTEM,
            Entity::Commands => path::CUSTOM_COMMANDS,
            Entity::Resources => path::PLAYER_RESOURCES,
            Entity::Glitches => path::GLITCHES,
            Entity::Users => path::USERS,
            Entity::History => path::DATASTREAM_HISTORY,
            Entity::Presence => path::PLAYER_CONNECTIONS,
            Entity::Replies => path::PLAYER_REPLIES,
            Entity::AccessControl => path::ACCESS_CONTROL,
        }
    }
}

/// A history entry keyed by its auto-generated (chronological) key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub key: String,
    pub burst: String,
}

/// Full replacement values, emitted after the local view has been updated.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    CipherChanged(CipherTable),
    /// Recomputed after every cipher or key-gate change, one switch per table symbol.
    KeySwitchesChanged(Vec<KeySwitch>),
    TerminalConfigChanged(TerminalConfig),
    FilesChanged(Vec<FileListing>),
    CommandsChanged(BTreeMap<String, CustomCommand>),
    ResourcesChanged(PlayerResource),
    GlitchesChanged(GlitchState),
    /// A player access reset was observed and claimed.
    AccessResetNotice { timestamp: i64 },
    UsersChanged(Vec<String>),
    HistoryChanged(Vec<HistoryEntry>),
    PlayersChanged {
        players: Vec<String>,
        message_target: Target,
        reply_filter: Target,
    },
    RepliesChanged(Vec<PlayerReply>),
    AccessControlChanged(AccessControl),
}
