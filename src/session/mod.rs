//! GM session
//!
//! Every GM action is a write to one or more store paths. Nothing here updates
//! local view state: the synchronizer sees the change come back from the store
//! like any other client would.
//!
//! Failed writes are logged and returned. They are not retried.

pub mod local;
pub mod timers;

pub use local::{ConfigPresets, LocalHistory, MESSAGE_TEMPLATES};
pub use timers::ExpiryTimers;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::{ConsoleError, Result};
use crate::keygate::KeyGate;
use crate::kohd::{self, Burst, CipherTable, PLAINTEXT};
use crate::models::{
    AccessControl, CustomCommand, FileKind, FileSystemEntry, OverrideState, PlayerResource,
    SpecialAction, Target, TerminalConfig, User,
};
use crate::store::path::{
    sanitize_filename, ACCESS_CONTROL, CIPHER_CONFIG, CUSTOM_COMMANDS, DATASTREAM_HISTORY,
    DECRYPTION_KEYS, DIRECT_MESSAGES, FILE_SYSTEM, GLITCHED_COMMAND, GLITCHES, HISTORY_CLEARED,
    KOHD_DATASTREAM, OVERRIDE_STATE, PLAYER_RESOURCES, RESET_ACCESS_TIMESTAMP, SCRAMBLE_NEXT,
    TERMINAL_CONFIG, USERS,
};
use crate::store::{RemoteStore, StoreError, StorePath};

/// Tunables taken from the `[console]` and `[glitch]` config sections.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub default_noise: usize,
    pub history_limit: usize,
    pub glitched_command_ttl: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_noise: 20,
            history_limit: 20,
            glitched_command_ttl: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransmitMode {
    /// Cipher-encoded payload inside the noise wrapper.
    #[default]
    Encoded,
    /// Plain payload inside the noise wrapper.
    Decoded,
    /// Raw SVG markup, no wrapper.
    Svg,
    /// GIF URL, no wrapper.
    Gif,
}

#[derive(Debug, Clone)]
pub struct Transmission {
    pub mode: TransmitMode,
    pub content: String,
    pub target: Target,
    /// Total noise characters. Falls back to the configured default.
    pub noise: Option<usize>,
}

impl Transmission {
    pub fn encoded(message: impl Into<String>) -> Self {
        Self {
            mode: TransmitMode::Encoded,
            content: message.into(),
            target: Target::All,
            noise: None,
        }
    }

    pub fn with_mode(mut self, mode: TransmitMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn to(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_noise(mut self, noise: usize) -> Self {
        self.noise = Some(noise);
        self
    }
}

/// Result of a rename. The two writes are not atomic as a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenameOutcome {
    Completed { key: String },
    /// The new entry was written but the old one could not be removed, so
    /// both exist.
    Partial { key: String, stale_key: String },
}

pub struct GmSession {
    store: Arc<dyn RemoteStore>,
    timers: ExpiryTimers,
    history: LocalHistory,
    presets: ConfigPresets,
    settings: SessionSettings,
}

impl GmSession {
    /// Session whose local history and presets live only in memory.
    pub fn new(store: Arc<dyn RemoteStore>, settings: SessionSettings) -> Self {
        Self {
            timers: ExpiryTimers::new(Arc::clone(&store)),
            history: LocalHistory::in_memory(settings.history_limit),
            presets: ConfigPresets::in_memory(),
            store,
            settings,
        }
    }

    /// Session with local history and presets persisted under `data_dir`.
    pub fn open(
        store: Arc<dyn RemoteStore>,
        settings: SessionSettings,
        data_dir: &Path,
    ) -> Result<Self> {
        Ok(Self {
            timers: ExpiryTimers::new(Arc::clone(&store)),
            history: LocalHistory::load(data_dir, settings.history_limit)?,
            presets: ConfigPresets::load(data_dir)?,
            store,
            settings,
        })
    }

    pub fn history(&self) -> &[String] {
        self.history.entries()
    }

    pub fn presets(&self) -> &ConfigPresets {
        &self.presets
    }

    pub fn presets_mut(&mut self) -> &mut ConfigPresets {
        &mut self.presets
    }

    pub fn timers(&self) -> &ExpiryTimers {
        &self.timers
    }

    // Transmission

    /// Build the burst for `tx`, send it, and return the wire string.
    pub async fn transmit(&mut self, tx: Transmission) -> Result<String> {
        if tx.content.trim().is_empty() {
            return Err(ConsoleError::validation(match tx.mode {
                TransmitMode::Svg => "SVG markup is required",
                TransmitMode::Gif => "GIF URL is required",
                _ => "message is required",
            }));
        }
        let noise = tx.noise.unwrap_or(self.settings.default_noise);

        let mut scrambled = false;
        let burst = match tx.mode {
            TransmitMode::Encoded => {
                let (payload, consumed) = self.encode_payload(&tx.content).await?;
                scrambled = consumed;
                Burst::Datastream(payload)
            }
            TransmitMode::Decoded => Burst::Datastream(tx.content.clone()),
            TransmitMode::Svg => Burst::Svg(tx.content.clone()),
            TransmitMode::Gif => Burst::Gif(tx.content.trim().to_string()),
        };
        let wire = burst.to_wire(noise);

        match &tx.target {
            Target::All => {
                self.write(&root(KOHD_DATASTREAM), json!(wire)).await?;
                let history = root(DATASTREAM_HISTORY);
                if let Err(e) = self.store.push(&history, json!(wire)).await {
                    error!(path = %history, error = %e, "Failed to append datastream history");
                    return Err(e.into());
                }
            }
            Target::Player(name) => {
                let path = child(DIRECT_MESSAGES, name)?;
                self.write(&path, json!(wire)).await?;
            }
        }
        info!(mode = ?tx.mode, target = ?tx.target, len = wire.len(), "Transmitted burst");

        // The glitch is used up only once the scrambled burst is out.
        if scrambled {
            self.delete(&glitch(SCRAMBLE_NEXT)).await?;
        }

        if matches!(tx.mode, TransmitMode::Encoded | TransmitMode::Decoded) {
            self.history.record(&tx.content)?;
        }
        Ok(wire)
    }

    /// Encode against the table currently in the store. The flag is true when
    /// a pending scramble was applied and still has to be cleared.
    async fn encode_payload(&self, message: &str) -> Result<(String, bool)> {
        let table = self
            .read::<CipherTable>(&root(CIPHER_CONFIG))
            .await?
            .unwrap_or_default();
        let encoded = kohd::encode(message, &table);

        let scramble = self.read::<bool>(&glitch(SCRAMBLE_NEXT)).await?.unwrap_or(false);
        if !scramble {
            return Ok((encoded, false));
        }
        info!("Scrambled outgoing datastream");
        Ok((kohd::scramble(&encoded), true))
    }

    /// Wipe the shared datastream history and this GM's local history.
    pub async fn clear_history(&mut self) -> Result<()> {
        self.delete(&root(DATASTREAM_HISTORY)).await?;
        self.write(&root(HISTORY_CLEARED), json!(now_millis())).await?;
        self.history.clear()?;
        info!("Transmission history cleared");
        Ok(())
    }

    // Cipher and key-gate

    /// Replace the whole table and clear the key-gate with it.
    pub async fn replace_cipher(&self, table: &CipherTable) -> Result<()> {
        self.write_typed(&root(CIPHER_CONFIG), table).await?;
        self.delete(&root(DECRYPTION_KEYS)).await?;
        info!(symbols = table.len(), "Cipher replaced, decryption keys cleared");
        Ok(())
    }

    pub async fn reset_cipher(&self) -> Result<()> {
        self.replace_cipher(&CipherTable::default_table()).await
    }

    pub async fn regenerate_cipher(&self) -> Result<CipherTable> {
        let table = CipherTable::generate();
        self.replace_cipher(&table).await?;
        Ok(table)
    }

    pub async fn set_key(&self, symbol: char, unlocked: bool) -> Result<()> {
        let symbol = symbol.to_ascii_uppercase();
        if !PLAINTEXT.contains(symbol) {
            return Err(ConsoleError::validation(format!("no such symbol: {symbol}")));
        }
        let path = child(DECRYPTION_KEYS, &symbol.to_string())?;
        self.write(&path, json!(unlocked)).await
    }

    pub async fn unlock_all(&self) -> Result<()> {
        self.write(&root(DECRYPTION_KEYS), KeyGate::unlock_all_value()).await
    }

    pub async fn lock_all(&self) -> Result<()> {
        self.delete(&root(DECRYPTION_KEYS)).await
    }

    // Terminal setup

    pub async fn update_terminal_config(&self, config: TerminalConfig) -> Result<()> {
        self.write_typed(&root(TERMINAL_CONFIG), &config.normalized()).await
    }

    /// Push a saved preset to the terminal.
    pub async fn apply_preset(&self, name: &str) -> Result<()> {
        let config = self
            .presets
            .get(name)
            .cloned()
            .ok_or_else(|| ConsoleError::not_found(format!("preset {name}")))?;
        self.update_terminal_config(config).await
    }

    /// Overwrite the access passwords. Blank passwords are left out.
    pub async fn save_access_passwords(&self, level2: &str, level3: &str) -> Result<()> {
        let non_empty = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
        let access = AccessControl {
            level2: non_empty(level2),
            level3: non_empty(level3),
        };
        self.write_typed(&root(ACCESS_CONTROL), &access).await
    }

    // Files

    /// Create or overwrite a file. Returns the store key.
    pub async fn create_file(
        &self,
        kind: FileKind,
        name: &str,
        content: &str,
        level: u32,
    ) -> Result<String> {
        let name = normalize_filename(name);
        if name.is_empty() || content.trim().is_empty() {
            return Err(ConsoleError::validation("filename and content cannot be empty"));
        }
        let key = file_key(&name)?;
        let entry = FileSystemEntry::new(kind, content, level);
        self.write_typed(&child(FILE_SYSTEM, &key)?, &entry).await?;
        info!(file = %name, ?kind, level, "File created");
        Ok(key)
    }

    /// Change a file's content and level. The file must still exist.
    pub async fn edit_file(&self, name: &str, content: &str, level: u32) -> Result<()> {
        if content.trim().is_empty() {
            return Err(ConsoleError::validation("content cannot be empty"));
        }
        let (path, mut entry) = self.existing_file(name).await?;
        entry.content = content.to_string();
        entry.level = level;
        self.write_typed(&path, &entry).await
    }

    pub async fn set_file_hidden(&self, name: &str, hidden: bool) -> Result<()> {
        let (path, mut entry) = self.existing_file(name).await?;
        entry.hidden = hidden;
        self.write_typed(&path, &entry).await
    }

    /// Copy the entry to the new name, then remove the old one.
    pub async fn rename_file(&self, old_name: &str, new_name: &str) -> Result<RenameOutcome> {
        let new_name = normalize_filename(new_name);
        if new_name.is_empty() {
            return Err(ConsoleError::validation("new filename cannot be empty"));
        }
        let new_key = file_key(&new_name)?;
        let (old_path, entry) = self.existing_file(old_name).await?;
        let old_key = old_path.key().to_string();
        if new_key == old_key {
            return Ok(RenameOutcome::Completed { key: new_key });
        }

        let new_path = child(FILE_SYSTEM, &new_key)?;
        if self.store.get(&new_path).await?.is_some() {
            return Err(ConsoleError::validation(format!("{new_name} already exists")));
        }

        self.write_typed(&new_path, &entry).await?;
        match self.store.remove(&old_path).await {
            Ok(()) => Ok(RenameOutcome::Completed { key: new_key }),
            Err(e) => {
                warn!(old = %old_path, new = %new_path, error = %e, "Rename left both entries");
                Ok(RenameOutcome::Partial {
                    key: new_key,
                    stale_key: old_key,
                })
            }
        }
    }

    /// Remove a file. Deleting a file that does not exist is an error.
    pub async fn delete_file(&self, name: &str) -> Result<()> {
        let (path, _) = self.existing_file(name).await?;
        self.delete(&path).await?;
        info!(file = %normalize_filename(name), "File deleted");
        Ok(())
    }

    /// Look a file up by the name the GM typed, with the same case folding
    /// as [`GmSession::create_file`].
    async fn existing_file(&self, name: &str) -> Result<(StorePath, FileSystemEntry)> {
        let key = sanitize_filename(&normalize_filename(name));
        let path = child(FILE_SYSTEM, &key)?;
        match self.read::<FileSystemEntry>(&path).await? {
            Some(entry) => Ok((path, entry)),
            None => Err(ConsoleError::not_found(format!("file {}", name.trim()))),
        }
    }

    // Commands, resources, users

    /// Create or overwrite a custom command under its lowercase name.
    pub async fn create_command(&self, name: &str, command: CustomCommand) -> Result<String> {
        let name = name.trim().to_lowercase();
        if name.is_empty() || command.response.trim().is_empty() {
            return Err(ConsoleError::validation("command name and response cannot be empty"));
        }
        let path = child(CUSTOM_COMMANDS, &name)?;
        self.write_typed(&path, &command).await?;
        info!(command = %name, costs = command.costs_resource(), "Custom command saved");
        Ok(name)
    }

    /// Command that triggers a built-in terminal behaviour. Always costs a resource.
    pub async fn create_special_command(
        &self,
        name: &str,
        action: SpecialAction,
        response: &str,
    ) -> Result<String> {
        let command = CustomCommand {
            response: response.to_string(),
            args: None,
            consumes_resource: true,
            special_action: Some(action),
        };
        self.create_command(name, command).await
    }

    pub async fn delete_command(&self, name: &str) -> Result<()> {
        let name = name.trim().to_lowercase();
        self.delete(&child(CUSTOM_COMMANDS, &name)?).await
    }

    pub async fn set_player_resources(&self, name: &str, count: u32) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConsoleError::validation("resource name cannot be empty"));
        }
        let resource = PlayerResource {
            name: name.to_string(),
            count,
        };
        self.write_typed(&root(PLAYER_RESOURCES), &resource).await
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Result<String> {
        let username = username.trim().to_lowercase();
        let password = password.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ConsoleError::validation("username and password cannot be empty"));
        }
        let user = User {
            password: password.to_string(),
        };
        self.write_typed(&child(USERS, &username)?, &user).await?;
        info!(user = %username, "User created");
        Ok(username)
    }

    pub async fn delete_user(&self, username: &str) -> Result<()> {
        let username = username.trim().to_lowercase();
        self.delete(&child(USERS, &username)?).await
    }

    // Glitches

    /// Make the next encoded transmission come out scrambled.
    pub async fn scramble_next(&self) -> Result<()> {
        self.write(&glitch(SCRAMBLE_NEXT), json!(true)).await
    }

    /// Report `command` as offline on the player terminal for a while.
    pub async fn glitch_command(&self, command: &str) -> Result<()> {
        let command = command.trim().to_lowercase();
        if command.is_empty() {
            return Err(ConsoleError::validation("command name cannot be empty"));
        }
        let path = glitch(GLITCHED_COMMAND);
        // Cancel first so a countdown already firing cannot delete the new value.
        self.timers.cancel(&path).await;
        self.write(&path, json!(command)).await?;
        self.timers.arm(path, self.settings.glitched_command_ttl).await;
        Ok(())
    }

    pub async fn clear_glitched_command(&self) -> Result<()> {
        let path = glitch(GLITCHED_COMMAND);
        self.timers.cancel(&path).await;
        self.delete(&path).await
    }

    /// Show an override. A previous countdown is always cancelled; a new one
    /// is armed when the override has a timer.
    pub async fn trigger_override(&self, state: OverrideState) -> Result<()> {
        let has_body = !state.message.trim().is_empty()
            || state.content.as_deref().is_some_and(|c| !c.trim().is_empty());
        if !has_body {
            return Err(ConsoleError::validation("override needs a message or content"));
        }

        let path = glitch(OVERRIDE_STATE);
        self.timers.cancel(&path).await;
        self.write_typed(&path, &state).await?;
        if let Some(secs) = state.timer.filter(|secs| *secs > 0) {
            self.timers.arm(path, Duration::from_secs(secs)).await;
        }
        info!(kind = ?state.kind, timer = ?state.timer, "Override triggered");
        Ok(())
    }

    pub async fn clear_override(&self) -> Result<()> {
        let path = glitch(OVERRIDE_STATE);
        self.timers.cancel(&path).await;
        self.delete(&path).await
    }

    /// Signal the player terminal to drop back to base clearance.
    pub async fn reset_player_access(&self) -> Result<()> {
        self.write(&glitch(RESET_ACCESS_TIMESTAMP), json!(now_millis()))
            .await
    }

    // Store helpers

    async fn read<T: DeserializeOwned>(&self, path: &StorePath) -> Result<Option<T>> {
        crate::store::read_typed(self.store.as_ref(), path)
            .await
            .map_err(|e| {
                error!(path = %path, error = %e, "Store read failed");
                e.into()
            })
    }

    async fn write(&self, path: &StorePath, value: Value) -> Result<()> {
        self.store.set(path, value).await.map_err(|e| {
            error!(path = %path, error = %e, "Store write failed");
            e.into()
        })
    }

    async fn write_typed<T: Serialize + ?Sized>(&self, path: &StorePath, value: &T) -> Result<()> {
        self.write(path, serde_json::to_value(value)?).await
    }

    async fn delete(&self, path: &StorePath) -> Result<()> {
        self.store.remove(path).await.map_err(|e| {
            error!(path = %path, error = %e, "Store remove failed");
            e.into()
        })
    }
}

fn root(name: &str) -> StorePath {
    StorePath::root(name)
}

fn glitch(name: &str) -> StorePath {
    StorePath::nested(GLITCHES, name)
}

/// Child of a well-known root. Keys the store would reject are a validation error.
fn child(parent: &str, key: &str) -> Result<StorePath> {
    StorePath::root(parent).child(key).map_err(|e| match e {
        StoreError::InvalidPath(key) => ConsoleError::validation(format!("invalid name: {key:?}")),
        other => other.into(),
    })
}

fn normalize_filename(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Filenames need an extension and become keys with the dots swapped out.
/// `name` is already normalized.
fn file_key(name: &str) -> Result<String> {
    if !name.contains('.') {
        return Err(ConsoleError::validation(
            "filename must include an extension (e.g. .txt, .log)",
        ));
    }
    Ok(sanitize_filename(name))
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filenames_fold_to_one_key() {
        let key = |n: &str| sanitize_filename(&normalize_filename(n));
        assert_eq!(key(" Notes.TXT "), "notes·txt");
        assert_eq!(key("notes.txt"), key("NOTES.txt"));
    }

    #[test]
    fn test_file_key_requires_extension() {
        assert!(file_key("readme").is_err());
        assert_eq!(file_key("notes.txt").unwrap(), "notes·txt");
    }

    #[test]
    fn test_child_maps_bad_keys_to_validation() {
        assert!(matches!(child(USERS, "a/b"), Err(ConsoleError::Validation(_))));
        assert!(child(USERS, "neo").is_ok());
    }

    #[test]
    fn test_transmission_builder() {
        let tx = Transmission::encoded("HI")
            .to(Target::Player("neo".into()))
            .with_mode(TransmitMode::Decoded)
            .with_noise(4);
        assert_eq!(tx.mode, TransmitMode::Decoded);
        assert_eq!(tx.noise, Some(4));
        assert_eq!(tx.target, Target::Player("neo".into()));
    }
}
