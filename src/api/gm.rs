//! GM console handlers
//!
//! Reads come from the synchronizer's local view. Writes go through the
//! [`GmSession`](crate::session::GmSession) and show up in the view once the
//! store echoes them back.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::routes::{bearer_token, ApiError};
use super::SharedState;
use crate::auth::AuthError;
use crate::error::ConsoleError;
use crate::keygate::KeySwitch;
use crate::kohd::CipherTable;
use crate::models::{
    AccessControl, CustomCommand, FileKind, FileListing, GlitchState, OverrideState, PlayerReply,
    PlayerResource, Target, TerminalConfig,
};
use crate::session::{RenameOutcome, Transmission, TransmitMode, MESSAGE_TEMPLATES};
use crate::sync::HistoryEntry;

type ApiResult<T> = Result<T, ApiError>;

fn authorize(state: &SharedState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.gm_token.as_deref() else {
        return Ok(());
    };
    match bearer_token(headers) {
        Some(token) if token == expected => Ok(()),
        _ => {
            warn!("GM request without a valid token");
            Err(AuthError::Unauthenticated.into())
        }
    }
}

// === Status ===

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub players: Vec<String>,
    pub message_target: Target,
    pub reply_filter: Target,
    pub key_switches: Vec<KeySwitch>,
    pub terminal_config: TerminalConfig,
    pub files: Vec<FileListing>,
    pub commands: BTreeMap<String, CustomCommand>,
    pub resources: PlayerResource,
    pub glitches: GlitchState,
    pub users: Vec<String>,
    pub history: Vec<HistoryEntry>,
    /// Replies passed through the reply filter.
    pub replies: Vec<PlayerReply>,
    pub access: AccessControl,
    pub local_history: Vec<String>,
    pub templates: Vec<&'static str>,
}

/// GET /api/gm/status
pub async fn status(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<Json<StatusResponse>> {
    authorize(&state, &headers)?;
    let view = state.sync.snapshot().await;
    let local_history = state.session.lock().await.history().to_vec();

    Ok(Json(StatusResponse {
        replies: view.filtered_replies().into_iter().cloned().collect(),
        players: view.players,
        message_target: view.message_target,
        reply_filter: view.reply_filter,
        key_switches: view.key_switches,
        terminal_config: view.terminal_config,
        files: view.files,
        commands: view.commands,
        resources: view.resources,
        glitches: view.glitches,
        users: view.users,
        history: view.history,
        access: view.access,
        local_history,
        templates: MESSAGE_TEMPLATES.to_vec(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    #[serde(default)]
    pub target: String,
}

#[derive(Debug, Serialize)]
pub struct TargetResponse {
    pub target: Target,
}

/// PUT /api/gm/target - falls back to everyone when the player is not connected
pub async fn select_target(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<TargetRequest>,
) -> ApiResult<Json<TargetResponse>> {
    authorize(&state, &headers)?;
    let target = state.sync.select_message_target(Target::parse(&req.target)).await;
    Ok(Json(TargetResponse { target }))
}

/// PUT /api/gm/reply-filter
pub async fn select_reply_filter(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<TargetRequest>,
) -> ApiResult<Json<TargetResponse>> {
    authorize(&state, &headers)?;
    let target = state.sync.select_reply_filter(Target::parse(&req.target)).await;
    Ok(Json(TargetResponse { target }))
}

// === Transmission ===

#[derive(Debug, Deserialize)]
pub struct TransmitRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub mode: TransmitMode,
    /// Player name. Missing sends to the currently selected target.
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub noise: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TransmitResponse {
    pub wire: String,
}

/// POST /api/gm/transmit
pub async fn transmit(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<TransmitRequest>,
) -> ApiResult<Json<TransmitResponse>> {
    authorize(&state, &headers)?;
    let target = match req.target.as_deref() {
        Some(name) => Target::parse(name),
        None => state.sync.snapshot().await.message_target,
    };

    let mut tx = Transmission::encoded(req.message).with_mode(req.mode).to(target);
    if let Some(noise) = req.noise {
        tx = tx.with_noise(noise);
    }
    let wire = state.session.lock().await.transmit(tx).await?;
    Ok(Json(TransmitResponse { wire }))
}

/// DELETE /api/gm/history
pub async fn clear_history(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.clear_history().await?;
    Ok(StatusCode::NO_CONTENT)
}

// === Cipher and keys ===

#[derive(Debug, Serialize)]
pub struct CipherResponse {
    pub table: CipherTable,
    pub grid: String,
}

impl From<CipherTable> for CipherResponse {
    fn from(table: CipherTable) -> Self {
        Self {
            grid: table.to_string(),
            table,
        }
    }
}

/// GET /api/gm/cipher
pub async fn cipher_grid(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<Json<CipherResponse>> {
    authorize(&state, &headers)?;
    Ok(Json(state.sync.snapshot().await.cipher.into()))
}

/// POST /api/gm/cipher/regenerate
pub async fn regenerate_cipher(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<Json<CipherResponse>> {
    authorize(&state, &headers)?;
    let table = state.session.lock().await.regenerate_cipher().await?;
    Ok(Json(table.into()))
}

/// POST /api/gm/cipher/reset
pub async fn reset_cipher(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<Json<CipherResponse>> {
    authorize(&state, &headers)?;
    state.session.lock().await.reset_cipher().await?;
    Ok(Json(CipherTable::default_table().into()))
}

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub unlocked: bool,
}

/// PUT /api/gm/keys/:symbol
pub async fn set_key(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(symbol): Path<String>,
    Json(req): Json<KeyRequest>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    let mut chars = symbol.chars();
    let (Some(symbol), None) = (chars.next(), chars.next()) else {
        return Err(ConsoleError::validation("key must be a single symbol").into());
    };
    state.session.lock().await.set_key(symbol, req.unlocked).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/gm/keys/unlock-all
pub async fn unlock_all(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.unlock_all().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/gm/keys/lock-all
pub async fn lock_all(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.lock_all().await?;
    Ok(StatusCode::NO_CONTENT)
}

// === Terminal setup ===

/// PUT /api/gm/terminal-config
pub async fn update_terminal_config(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(config): Json<TerminalConfig>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.update_terminal_config(config).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/gm/presets
pub async fn list_presets(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<String>>> {
    authorize(&state, &headers)?;
    let session = state.session.lock().await;
    Ok(Json(session.presets().names().into_iter().map(String::from).collect()))
}

/// PUT /api/gm/presets/:name
pub async fn save_preset(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(config): Json<TerminalConfig>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.presets_mut().save(&name, config)?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/gm/presets/:name
pub async fn delete_preset(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    if state.session.lock().await.presets_mut().delete(&name)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ConsoleError::not_found(format!("preset {name}")).into())
    }
}

/// POST /api/gm/presets/:name/apply
pub async fn apply_preset(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.apply_preset(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AccessRequest {
    #[serde(default)]
    pub level2: String,
    #[serde(default)]
    pub level3: String,
}

/// PUT /api/gm/access
pub async fn save_access_passwords(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<AccessRequest>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    let session = state.session.lock().await;
    session.save_access_passwords(&req.level2, &req.level3).await?;
    Ok(StatusCode::NO_CONTENT)
}

// === Files ===

#[derive(Debug, Deserialize)]
pub struct CreateFileRequest {
    #[serde(default)]
    pub kind: FileKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_level() -> u32 { 1 }

#[derive(Debug, Serialize)]
pub struct FileKeyResponse {
    pub key: String,
}

/// POST /api/gm/files
pub async fn create_file(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<CreateFileRequest>,
) -> ApiResult<(StatusCode, Json<FileKeyResponse>)> {
    authorize(&state, &headers)?;
    let session = state.session.lock().await;
    let key = session
        .create_file(req.kind, &req.name, &req.content, req.level)
        .await?;
    Ok((StatusCode::CREATED, Json(FileKeyResponse { key })))
}

#[derive(Debug, Deserialize)]
pub struct EditFileRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_level")]
    pub level: u32,
}

/// PUT /api/gm/files/:name
pub async fn edit_file(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(req): Json<EditFileRequest>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    let session = state.session.lock().await;
    session.edit_file(&name, &req.content, req.level).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct HiddenRequest {
    pub hidden: bool,
}

/// PUT /api/gm/files/:name/hidden
pub async fn set_file_hidden(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(req): Json<HiddenRequest>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    let session = state.session.lock().await;
    session.set_file_hidden(&name, req.hidden).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    #[serde(default)]
    pub new_name: String,
}

/// POST /api/gm/files/:name/rename
pub async fn rename_file(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(req): Json<RenameRequest>,
) -> ApiResult<Json<RenameOutcome>> {
    authorize(&state, &headers)?;
    let session = state.session.lock().await;
    Ok(Json(session.rename_file(&name, &req.new_name).await?))
}

/// DELETE /api/gm/files/:name
pub async fn delete_file(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.delete_file(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

// === Commands, resources, users ===

/// PUT /api/gm/commands/:name
///
/// A command with a special action always costs a resource.
pub async fn save_command(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(command): Json<CustomCommand>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    let session = state.session.lock().await;
    match command.special_action {
        Some(action) => {
            session
                .create_special_command(&name, action, &command.response)
                .await?
        }
        None => session.create_command(&name, command).await?,
    };
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/gm/commands/:name
pub async fn delete_command(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.delete_command(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/gm/resources
pub async fn set_player_resources(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(resource): Json<PlayerResource>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    let session = state.session.lock().await;
    session
        .set_player_resources(&resource.name, resource.count)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// POST /api/gm/users
pub async fn create_user(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    let session = state.session.lock().await;
    session.create_user(&req.username, &req.password).await?;
    Ok(StatusCode::CREATED)
}

/// DELETE /api/gm/users/:name
pub async fn delete_user(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.delete_user(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

// === Glitches ===

/// POST /api/gm/glitches/scramble
pub async fn scramble_next(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.scramble_next().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct GlitchCommandRequest {
    #[serde(default)]
    pub command: String,
}

/// POST /api/gm/glitches/command
pub async fn glitch_command(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<GlitchCommandRequest>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.glitch_command(&req.command).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/gm/glitches/command
pub async fn clear_glitched_command(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.clear_glitched_command().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/gm/glitches/override
pub async fn trigger_override(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(override_state): Json<OverrideState>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.trigger_override(override_state).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/gm/glitches/override
pub async fn clear_override(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.clear_override().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/gm/glitches/reset-access
pub async fn reset_player_access(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state.session.lock().await.reset_player_access().await?;
    Ok(StatusCode::NO_CONTENT)
}
