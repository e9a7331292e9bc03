//! Player login
//!
//! Checks `{username, password}` against `users/<username>` and hands out an
//! opaque bearer token. The username doubles as the uid.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::User;
use crate::store::path::USERS;
use crate::store::{read_typed, RemoteStore, StoreError, StorePath};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Username and password are required.")]
    InvalidArgument,

    #[error("Invalid credentials.")]
    Unauthenticated,

    #[error("User lookup failed: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Wire code reported to the caller.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidArgument => "invalid-argument",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::Store(_) => "internal",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

struct IssuedToken {
    uid: String,
    expires_at: Instant,
}

pub struct AuthService {
    store: Arc<dyn RemoteStore>,
    tokens: DashMap<String, IssuedToken>,
    ttl: Duration,
}

impl AuthService {
    pub fn new(store: Arc<dyn RemoteStore>, ttl: Duration) -> Self {
        Self {
            store,
            tokens: DashMap::new(),
            ttl,
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let username = username.to_lowercase();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidArgument);
        }

        // A name the store can't address can't belong to anyone.
        let Ok(path) = StorePath::root(USERS).child(&username) else {
            warn!(user = %username, "Login with unaddressable username");
            return Err(AuthError::Unauthenticated);
        };

        match read_typed::<User>(self.store.as_ref(), &path).await? {
            Some(user) if user.password == password => {}
            _ => {
                warn!(user = %username, "Login rejected");
                return Err(AuthError::Unauthenticated);
            }
        }

        let purged = self.purge_expired();
        if purged > 0 {
            debug!(purged, "Expired tokens dropped before issuing");
        }

        let token = Uuid::new_v4().to_string();
        self.tokens.insert(
            token.clone(),
            IssuedToken {
                uid: username.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        info!(user = %username, "Login token issued");
        Ok(LoginResponse { token })
    }

    /// The uid a live token was issued to. Expired tokens are dropped.
    pub fn verify(&self, token: &str) -> Option<String> {
        let live = {
            let entry = self.tokens.get(token)?;
            (entry.expires_at > Instant::now()).then(|| entry.uid.clone())
        };
        if live.is_none() {
            self.tokens.remove(token);
            debug!("Expired token removed");
        }
        live
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }

    /// Drop every expired token. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.tokens.len();
        self.tokens.retain(|_, t| t.expires_at > now);
        before.saturating_sub(self.tokens.len())
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

/// Purge expired tokens every `every` until the task is aborted.
pub fn spawn_token_purge(auth: Arc<AuthService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let purged = auth.purge_expired();
            if purged > 0 {
                info!(purged, remaining = auth.token_count(), "Purged expired login tokens");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn service_with_user(ttl: Duration) -> AuthService {
        let store = Arc::new(MemoryStore::new());
        let path = StorePath::root(USERS).child("neo").unwrap();
        store.set(&path, json!({"password": "redpill"})).await.unwrap();
        AuthService::new(store, ttl)
    }

    #[tokio::test]
    async fn test_login_success_is_case_insensitive() {
        let auth = service_with_user(Duration::from_secs(60)).await;
        let response = auth.login("NEO", "redpill").await.unwrap();
        assert_eq!(auth.verify(&response.token), Some("neo".to_string()));
    }

    #[tokio::test]
    async fn test_login_errors() {
        let auth = service_with_user(Duration::from_secs(60)).await;

        let err = auth.login("", "x").await.unwrap_err();
        assert_eq!(err.code(), "invalid-argument");
        let err = auth.login("neo", "").await.unwrap_err();
        assert_eq!(err.code(), "invalid-argument");

        let err = auth.login("neo", "bluepill").await.unwrap_err();
        assert_eq!(err.code(), "unauthenticated");
        let err = auth.login("smith", "redpill").await.unwrap_err();
        assert_eq!(err.code(), "unauthenticated");
        let err = auth.login("a/b", "redpill").await.unwrap_err();
        assert_eq!(err.code(), "unauthenticated");
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let auth = service_with_user(Duration::ZERO).await;
        let response = auth.login("neo", "redpill").await.unwrap();
        assert_eq!(auth.verify(&response.token), None);
        assert_eq!(auth.purge_expired(), 0);
    }

    #[tokio::test]
    async fn test_login_drops_expired_tokens() {
        let auth = service_with_user(Duration::ZERO).await;
        for _ in 0..5 {
            auth.login("neo", "redpill").await.unwrap();
        }
        // Each login purges the ones issued before it.
        assert_eq!(auth.token_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_task_empties_expired_tokens() {
        let auth = Arc::new(service_with_user(Duration::from_secs(10)).await);
        auth.login("neo", "redpill").await.unwrap();
        auth.login("neo", "redpill").await.unwrap();
        assert_eq!(auth.token_count(), 2);

        let task = spawn_token_purge(Arc::clone(&auth), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(auth.token_count(), 0);
        task.abort();
    }

    #[tokio::test]
    async fn test_revoke() {
        let auth = service_with_user(Duration::from_secs(60)).await;
        let response = auth.login("neo", "redpill").await.unwrap();
        assert!(auth.revoke(&response.token));
        assert_eq!(auth.verify(&response.token), None);
    }

    #[test]
    fn test_unknown_token() {
        let store = Arc::new(MemoryStore::new());
        let auth = AuthService::new(store, Duration::from_secs(1));
        assert_eq!(auth.verify("nope"), None);
    }
}
