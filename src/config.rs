//! Console configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::error::Result;
use crate::session::SessionSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub glitch: GlitchConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Where local history and presets are kept
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Noise characters wrapped around a burst when none is given
    #[serde(default = "default_noise")]
    pub default_noise: usize,

    /// Sent messages remembered locally
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            default_noise: default_noise(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlitchConfig {
    /// How long a glitched command stays offline
    #[serde(default = "default_glitched_command_secs")]
    pub glitched_command_secs: u64,
}

impl Default for GlitchConfig {
    fn default() -> Self {
        Self {
            glitched_command_secs: default_glitched_command_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Endpoint serving the store credentials
    #[serde(default)]
    pub url: Option<String>,

    /// Local-development fallback with the same JSON shape
    #[serde(default)]
    pub local_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of issued login tokens
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// How often expired login tokens are swept
    #[serde(default = "default_token_purge")]
    pub token_purge_secs: u64,

    /// Bearer token required on the GM routes. Unset leaves them open.
    #[serde(default)]
    pub gm_token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl(),
            token_purge_secs: default_token_purge(),
            gm_token: None,
        }
    }
}

// Defaults
fn default_data_dir() -> PathBuf { PathBuf::from(".kohd-console") }
fn default_noise() -> usize { 20 }
fn default_history_limit() -> usize { 20 }
fn default_glitched_command_secs() -> u64 { 30 }
fn default_http_port() -> u16 { 8080 }
fn default_token_ttl() -> u64 { 3600 }
fn default_token_purge() -> u64 { 60 }

impl Config {
    /// Read `path`, or fall back to defaults when it doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            default_noise: self.console.default_noise,
            history_limit: self.console.history_limit,
            glitched_command_ttl: Duration::from_secs(self.glitch.glitched_command_secs),
        }
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.token_ttl_secs)
    }

    pub fn token_purge_interval(&self) -> Duration {
        Duration::from_secs(self.auth.token_purge_secs.max(1))
    }
}
