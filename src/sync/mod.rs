//! Shared-state synchronizer
//!
//! Owns one subscription per entity and is the only thing that updates the
//! local view. All subscription feeds are merged into a single stream and
//! handled one change at a time, so handlers never overlap. After each change
//! the view is replaced in full and a typed [`SyncEvent`] is broadcast.
//!
//! Cross-entity rule: a cipher change is followed by a one-shot read of the
//! key-gate, because the switch set is always the table's symbol set.

pub mod events;
pub mod view;

pub use events::{Entity, HistoryEntry, SyncEvent};
pub use view::LocalView;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::keygate::KeyGate;
use crate::kohd::CipherTable;
use crate::models::{
    is_connected, AccessControl, CustomCommand, FileListing, FileSystemEntry, GlitchState,
    PlayerReply, PlayerResource, Target, TerminalConfig, User,
};
use crate::store::path::{GLITCHES, RESET_ACCESS_TIMESTAMP};
use crate::store::{write_typed, RemoteStore, StoreError, StorePath};

const EVENT_CAPACITY: usize = 256;

pub struct Synchronizer {
    store: Arc<dyn RemoteStore>,
    view: Arc<RwLock<LocalView>>,
    events: broadcast::Sender<SyncEvent>,
}

/// Running synchronizer loop. Dropping the handle leaves it running;
/// [`SyncHandle::shutdown`] tears it down.
pub struct SyncHandle {
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn shutdown(self) {
        self.task.abort();
        info!("Synchronizer stopped");
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Synchronizer {
    pub fn new(store: Arc<dyn RemoteStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            store,
            view: Arc::new(RwLock::new(LocalView::default())),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Copy of the current local view.
    pub async fn snapshot(&self) -> LocalView {
        self.view.read().await.clone()
    }

    pub async fn select_message_target(&self, target: Target) -> Target {
        self.view.write().await.select_message_target(target)
    }

    pub async fn select_reply_filter(&self, target: Target) -> Target {
        self.view.write().await.select_reply_filter(target)
    }

    /// Subscribe every entity and spawn the processing loop.
    pub async fn start(self: &Arc<Self>) -> Result<SyncHandle, StoreError> {
        let mut feeds: Vec<BoxStream<'static, (Entity, Option<Value>)>> = Vec::new();
        for entity in Entity::ALL {
            let subscription = self.store.subscribe(&entity.path()).await?;
            let feed = stream::unfold(subscription, move |mut sub| async move {
                sub.next().await.map(|value| ((entity, value), sub))
            });
            feeds.push(feed.boxed());
        }
        info!(entities = feeds.len(), "Synchronizer subscribed");

        let mut merged = stream::select_all(feeds);
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some((entity, value)) = merged.next().await {
                this.handle_change(entity, value).await;
            }
            info!("All subscriptions closed");
        });

        Ok(SyncHandle { task })
    }

    async fn handle_change(&self, entity: Entity, value: Option<Value>) {
        debug!(entity = entity.path_name(), present = value.is_some(), "Change received");

        match entity {
            Entity::Cipher => self.apply_cipher(value).await,
            Entity::Keys => {
                let keys: KeyGate = parse_value(entity, value);
                let switches = {
                    let mut view = self.view.write().await;
                    view.keys = keys;
                    view.recompute_switches();
                    view.key_switches.clone()
                };
                self.emit(SyncEvent::KeySwitchesChanged(switches));
            }
            Entity::TerminalConfig => {
                let config: TerminalConfig = parse_value(entity, value);
                self.view.write().await.terminal_config = config.clone();
                self.emit(SyncEvent::TerminalConfigChanged(config));
            }
            Entity::Files => {
                let files: Vec<FileListing> = parse_keyed::<FileSystemEntry>(entity, value)
                    .into_iter()
                    .map(|(key, entry)| FileListing { key, entry })
                    .collect();
                self.view.write().await.files = files.clone();
                self.emit(SyncEvent::FilesChanged(files));
            }
            Entity::Commands => {
                let commands = parse_keyed::<CustomCommand>(entity, value);
                self.view.write().await.commands = commands.clone();
                self.emit(SyncEvent::CommandsChanged(commands));
            }
            Entity::Resources => {
                let resources: PlayerResource = parse_value(entity, value);
                self.view.write().await.resources = resources.clone();
                self.emit(SyncEvent::ResourcesChanged(resources));
            }
            Entity::Glitches => self.apply_glitches(value).await,
            Entity::Users => {
                let users: Vec<String> = parse_keyed::<User>(entity, value).into_keys().collect();
                self.view.write().await.users = users.clone();
                self.emit(SyncEvent::UsersChanged(users));
            }
            Entity::History => {
                let history: Vec<HistoryEntry> = parse_keyed::<String>(entity, value)
                    .into_iter()
                    .map(|(key, burst)| HistoryEntry { key, burst })
                    .collect();
                self.view.write().await.history = history.clone();
                self.emit(SyncEvent::HistoryChanged(history));
            }
            Entity::Presence => {
                let players = connected_players(value);
                let (message_target, reply_filter) = {
                    let mut view = self.view.write().await;
                    view.set_players(players.clone());
                    (view.message_target.clone(), view.reply_filter.clone())
                };
                self.emit(SyncEvent::PlayersChanged {
                    players,
                    message_target,
                    reply_filter,
                });
            }
            Entity::Replies => {
                let replies: Vec<PlayerReply> =
                    parse_keyed::<PlayerReply>(entity, value).into_values().collect();
                self.view.write().await.replies = replies.clone();
                self.emit(SyncEvent::RepliesChanged(replies));
            }
            Entity::AccessControl => {
                let access: AccessControl = parse_value(entity, value);
                self.view.write().await.access = access.clone();
                self.emit(SyncEvent::AccessControlChanged(access));
            }
        }
    }

    /// Apply a new table, then re-read the key-gate against it.
    async fn apply_cipher(&self, value: Option<Value>) {
        let table = match value {
            Some(value) => match serde_json::from_value::<CipherTable>(value) {
                Ok(table) => table,
                Err(e) => {
                    warn!(error = %e, "Malformed cipher table, using default");
                    CipherTable::default_table()
                }
            },
            None => {
                // No table yet: every terminal falls back to the default, so publish it.
                let table = CipherTable::default_table();
                let path = Entity::Cipher.path();
                if let Err(e) = write_typed(self.store.as_ref(), &path, &table).await {
                    error!(path = %path, error = %e, "Failed to seed default cipher table");
                }
                table
            }
        };

        self.view.write().await.cipher = table.clone();
        self.emit(SyncEvent::CipherChanged(table));

        let keys_path = Entity::Keys.path();
        let keys = match self.store.get(&keys_path).await {
            Ok(value) => parse_value::<KeyGate>(Entity::Keys, value),
            Err(e) => {
                error!(path = %keys_path, error = %e, "Key-gate re-read failed");
                self.view.read().await.keys.clone()
            }
        };
        let switches = {
            let mut view = self.view.write().await;
            view.keys = keys;
            view.recompute_switches();
            view.key_switches.clone()
        };
        self.emit(SyncEvent::KeySwitchesChanged(switches));
    }

    async fn apply_glitches(&self, value: Option<Value>) {
        let glitches: GlitchState = parse_value(Entity::Glitches, value);
        self.view.write().await.glitches = glitches.clone();
        let reset = glitches.reset_access_timestamp;
        self.emit(SyncEvent::GlitchesChanged(glitches));

        // One-shot signal: notify, then claim it by deleting. Another observer
        // may do the same before our delete lands.
        if let Some(timestamp) = reset {
            info!(timestamp, "Player access reset observed");
            self.emit(SyncEvent::AccessResetNotice { timestamp });
            let path = StorePath::nested(GLITCHES, RESET_ACCESS_TIMESTAMP);
            if let Err(e) = self.store.remove(&path).await {
                error!(path = %path, error = %e, "Failed to clear access reset signal");
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}

/// Absent values are the default. Malformed values are logged and treated as absent.
fn parse_value<T: DeserializeOwned + Default>(entity: Entity, value: Option<Value>) -> T {
    match value {
        None => T::default(),
        Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(entity = entity.path_name(), error = %e, "Malformed value, using default");
            T::default()
        }),
    }
}

/// Keyed collection, parsed entry by entry so one bad record doesn't hide the rest.
fn parse_keyed<T: DeserializeOwned>(entity: Entity, value: Option<Value>) -> BTreeMap<String, T> {
    let Some(value) = value else {
        return BTreeMap::new();
    };
    let Value::Object(map) = value else {
        warn!(entity = entity.path_name(), "Expected a keyed collection");
        return BTreeMap::new();
    };

    map.into_iter()
        .filter_map(|(key, v)| match serde_json::from_value(v) {
            Ok(item) => Some((key, item)),
            Err(e) => {
                warn!(entity = entity.path_name(), key = %key, error = %e, "Skipping malformed entry");
                None
            }
        })
        .collect()
}

fn connected_players(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter(|(_, v)| is_connected(v))
            .map(|(name, _)| name)
            .collect(),
        _ => Vec::new(),
    }
}
