//! Local mirror of the shared state
//!
//! Only ever written by the synchronizer loop. Everything here is a cache for
//! display; mutating operations go to the store.

use std::collections::BTreeMap;

use crate::keygate::{KeyGate, KeySwitch};
use crate::kohd::CipherTable;
use crate::models::{
    AccessControl, CustomCommand, FileListing, GlitchState, PlayerReply, PlayerResource, Target,
    TerminalConfig,
};

use super::events::HistoryEntry;

#[derive(Debug, Clone, Default)]
pub struct LocalView {
    pub cipher: CipherTable,
    pub keys: KeyGate,
    pub key_switches: Vec<KeySwitch>,
    pub terminal_config: TerminalConfig,
    pub files: Vec<FileListing>,
    pub commands: BTreeMap<String, CustomCommand>,
    pub resources: PlayerResource,
    pub glitches: GlitchState,
    pub users: Vec<String>,
    pub history: Vec<HistoryEntry>,
    pub players: Vec<String>,
    pub replies: Vec<PlayerReply>,
    pub access: AccessControl,
    pub message_target: Target,
    pub reply_filter: Target,
}

impl LocalView {
    /// Rebuild the key switches from the current table and gate.
    pub fn recompute_switches(&mut self) {
        self.key_switches = self.keys.switches(&self.cipher);
    }

    /// Replace the connected player list and re-validate both selectors.
    pub fn set_players(&mut self, players: Vec<String>) {
        self.players = players;
        self.message_target = retain_selection(&self.message_target, &self.players);
        self.reply_filter = retain_selection(&self.reply_filter, &self.players);
    }

    pub fn select_message_target(&mut self, target: Target) -> Target {
        self.message_target = retain_selection(&target, &self.players);
        self.message_target.clone()
    }

    pub fn select_reply_filter(&mut self, target: Target) -> Target {
        self.reply_filter = retain_selection(&target, &self.players);
        self.reply_filter.clone()
    }

    /// Replies from the player picked in the reply filter, or all of them.
    pub fn filtered_replies(&self) -> Vec<&PlayerReply> {
        self.replies
            .iter()
            .filter(|r| match &self.reply_filter {
                Target::All => true,
                Target::Player(name) => r.user.eq_ignore_ascii_case(name),
            })
            .collect()
    }

    /// Files the player can currently see at `clearance`.
    pub fn visible_files(&self, clearance: u32) -> Vec<&FileListing> {
        self.files
            .iter()
            .filter(|f| f.entry.visible_to(clearance))
            .collect()
    }
}

/// Keep a selection only while the player is still listed.
fn retain_selection(current: &Target, players: &[String]) -> Target {
    match current {
        Target::Player(name) if players.iter().any(|p| p == name) => current.clone(),
        _ => Target::All,
    }
}
