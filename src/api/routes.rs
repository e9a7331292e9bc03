//! Player-facing handlers and the shared error response

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;

use super::SharedState;
use crate::auth::{AuthError, LoginRequest, LoginResponse};
use crate::bootstrap::StoreCredentials;
use crate::error::ConsoleError;

/// Error body in the shape the player terminal expects: `{code, message}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

pub enum ApiError {
    Auth(AuthError),
    Console(ConsoleError),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl From<ConsoleError> for ApiError {
    fn from(e: ConsoleError) -> Self {
        match e {
            ConsoleError::Auth(e) => Self::Auth(e),
            other => Self::Console(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Auth(e) => {
                let status = match &e {
                    AuthError::InvalidArgument => StatusCode::BAD_REQUEST,
                    AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
                    AuthError::Store(e) => {
                        error!(error = %e, "Login lookup failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.code(), e.to_string())
            }
            ApiError::Console(ConsoleError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "invalid-argument", msg)
            }
            ApiError::Console(ConsoleError::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "not-found", msg)
            }
            ApiError::Console(e) => {
                error!(error = %e, "Console operation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
            }
        };
        (status, Json(ErrorBody { code, message })).into_response()
    }
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// GET /config
pub async fn config(State(state): State<SharedState>) -> Json<StoreCredentials> {
    Json(state.credentials.clone())
}

/// POST /login
pub async fn login(
    State(state): State<SharedState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let response = state.auth.login(&request.username, &request.password).await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub uid: String,
}

/// GET /session - who a login token belongs to
pub async fn session(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, ApiError> {
    let token = bearer_token(&headers).ok_or(AuthError::Unauthenticated)?;
    let uid = state.auth.verify(token).ok_or(AuthError::Unauthenticated)?;
    Ok(Json(SessionResponse { uid }))
}

/// POST /logout
pub async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = bearer_token(&headers) {
        state.auth.revoke(token);
    }
    StatusCode::NO_CONTENT
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}
