//! HTTP API
//!
//! Player-facing:
//! - `GET /config`  store credentials
//! - `POST /login`  username/password to bearer token
//! - `GET /session`, `POST /logout`  check or drop a login token
//! - `GET /health`
//!
//! GM-facing, under `/api/gm`, drive the [`GmSession`]. When a GM token is
//! configured they require `Authorization: Bearer <token>`.

pub mod gm;
pub mod routes;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tokio::sync::Mutex;

use crate::auth::AuthService;
use crate::bootstrap::StoreCredentials;
use crate::session::GmSession;
use crate::sync::Synchronizer;

/// State shared across handlers
pub struct ApiState {
    pub credentials: StoreCredentials,
    pub auth: Arc<AuthService>,
    /// One GM per console. Handlers take turns on it.
    pub session: Mutex<GmSession>,
    pub sync: Arc<Synchronizer>,
    pub gm_token: Option<String>,
}

pub type SharedState = Arc<ApiState>;

/// Create the API router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        // Player terminal
        .route("/config", get(routes::config))
        .route("/login", post(routes::login))
        .route("/session", get(routes::session))
        .route("/logout", post(routes::logout))
        // GM console
        .route("/api/gm/status", get(gm::status))
        .route("/api/gm/transmit", post(gm::transmit))
        .route("/api/gm/history", delete(gm::clear_history))
        .route("/api/gm/target", put(gm::select_target))
        .route("/api/gm/reply-filter", put(gm::select_reply_filter))
        .route("/api/gm/cipher", get(gm::cipher_grid))
        .route("/api/gm/cipher/regenerate", post(gm::regenerate_cipher))
        .route("/api/gm/cipher/reset", post(gm::reset_cipher))
        .route("/api/gm/keys/unlock-all", post(gm::unlock_all))
        .route("/api/gm/keys/lock-all", post(gm::lock_all))
        .route("/api/gm/keys/:symbol", put(gm::set_key))
        .route("/api/gm/terminal-config", put(gm::update_terminal_config))
        .route("/api/gm/presets", get(gm::list_presets))
        .route(
            "/api/gm/presets/:name",
            put(gm::save_preset).delete(gm::delete_preset),
        )
        .route("/api/gm/presets/:name/apply", post(gm::apply_preset))
        .route("/api/gm/access", put(gm::save_access_passwords))
        .route("/api/gm/files", post(gm::create_file))
        .route("/api/gm/files/:name", put(gm::edit_file).delete(gm::delete_file))
        .route("/api/gm/files/:name/hidden", put(gm::set_file_hidden))
        .route("/api/gm/files/:name/rename", post(gm::rename_file))
        .route(
            "/api/gm/commands/:name",
            put(gm::save_command).delete(gm::delete_command),
        )
        .route("/api/gm/resources", put(gm::set_player_resources))
        .route("/api/gm/users", post(gm::create_user))
        .route("/api/gm/users/:name", delete(gm::delete_user))
        .route("/api/gm/glitches/scramble", post(gm::scramble_next))
        .route(
            "/api/gm/glitches/command",
            post(gm::glitch_command).delete(gm::clear_glitched_command),
        )
        .route(
            "/api/gm/glitches/override",
            post(gm::trigger_override).delete(gm::clear_override),
        )
        .route("/api/gm/glitches/reset-access", post(gm::reset_player_access))
        // Health check
        .route("/health", get(routes::health))
        .with_state(state)
}

#[cfg(test)]
pub(crate) fn test_state(
    store: Arc<dyn crate::store::RemoteStore>,
    gm_token: Option<&str>,
) -> SharedState {
    use crate::session::SessionSettings;
    use std::time::Duration;

    Arc::new(ApiState {
        credentials: StoreCredentials {
            database_url: Some("http://localhost:9000".into()),
            ..StoreCredentials::default()
        },
        auth: Arc::new(AuthService::new(Arc::clone(&store), Duration::from_secs(60))),
        session: Mutex::new(GmSession::new(Arc::clone(&store), SessionSettings::default())),
        sync: Synchronizer::new(store),
        gm_token: gm_token.map(str::to_string),
    })
}
