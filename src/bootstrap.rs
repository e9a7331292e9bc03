//! Store credentials bootstrap
//!
//! The serving side assembles credentials from `VITE_*` environment variables
//! and hands them out as JSON. The console fetches them once at startup, or
//! reads the same shape from a local file during development.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::BootstrapConfig;
use crate::error::{ConsoleError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCredentials {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub auth_domain: Option<String>,
    #[serde(rename = "databaseURL", default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub storage_bucket: Option<String>,
    #[serde(default)]
    pub messaging_sender_id: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
}

impl StoreCredentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any `VITE_*` key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            api_key: get("VITE_API_KEY"),
            auth_domain: get("VITE_AUTH_DOMAIN"),
            database_url: get("VITE_DATABASE_URL"),
            project_id: get("VITE_PROJECT_ID"),
            storage_bucket: get("VITE_STORAGE_BUCKET"),
            messaging_sender_id: get("VITE_MESSAGING_SENDER_ID"),
            app_id: get("VITE_APP_ID"),
        }
    }

    /// Credentials are only usable with a database to point at.
    pub fn is_complete(&self) -> bool {
        self.database_url.is_some()
    }
}

/// Fetch credentials from the configured URL, falling back to the local file.
pub async fn load(config: &BootstrapConfig) -> Result<StoreCredentials> {
    if let Some(url) = &config.url {
        match fetch(url).await {
            Ok(credentials) => {
                info!(url = %url, "Loaded store credentials");
                return Ok(credentials);
            }
            Err(e) if config.local_file.is_some() => {
                warn!(url = %url, error = %e, "Bootstrap fetch failed, trying local file");
            }
            Err(e) => return Err(e),
        }
    }

    match &config.local_file {
        Some(file) => load_file(file),
        None => Err(ConsoleError::Bootstrap(
            "no bootstrap url or local file configured".to_string(),
        )),
    }
}

pub async fn fetch(url: &str) -> Result<StoreCredentials> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| ConsoleError::Bootstrap(e.to_string()))?;

    if !response.status().is_success() {
        return Err(ConsoleError::Bootstrap(format!(
            "config endpoint returned HTTP {}",
            response.status()
        )));
    }

    response
        .json::<StoreCredentials>()
        .await
        .map_err(|e| ConsoleError::Bootstrap(e.to_string()))
}

pub fn load_file(file: &Path) -> Result<StoreCredentials> {
    let content = std::fs::read_to_string(file)?;
    let credentials = serde_json::from_str(&content)?;
    info!(file = %file.display(), "Loaded store credentials from local file");
    Ok(credentials)
}
