//! Client settings loaded from `.wsrpc/config.toml`
//!
//! ```toml
//! base_url = "https://api.example.com"
//! endpoint_path = "/mcp/ws"
//! token_file = "/home/me/.config/wsrpc/token"
//! command_buffer = 32
//! ```
//!
//! `WSRPC_BASE_URL` and `WSRPC_TOKEN` override the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use wsrpc_core::prelude::*;

use crate::credentials::{CredentialStore, EnvTokenStore, FileTokenStore};
use crate::endpoint::{Endpoint, DEFAULT_ENDPOINT_PATH};

pub const CONFIG_DIR: &str = ".wsrpc";
pub const CONFIG_FILENAME: &str = "config.toml";

pub const BASE_URL_ENV: &str = "WSRPC_BASE_URL";
pub const TOKEN_ENV: &str = "WSRPC_TOKEN";

/// Settings consumed by [`RpcClient`](crate::RpcClient).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientSettings {
    /// HTTP(S) origin of the server; the socket URL is derived from it.
    pub base_url: String,

    /// Path of the RPC endpoint below `base_url`.
    pub endpoint_path: String,

    /// File holding the bearer token. `None` uses the platform default.
    pub token_file: Option<PathBuf>,

    /// Capacity of the outbound command queue per connection.
    pub command_buffer: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            token_file: None,
            command_buffer: 32,
        }
    }
}

impl ClientSettings {
    /// Check values that would otherwise only fail at connect time.
    pub fn validate(&self) -> Result<()> {
        if self.command_buffer == 0 {
            return Err(Error::config_invalid("command_buffer must be at least 1"));
        }
        self.endpoint()
            .map(|_| ())
            .map_err(|e| Error::config_invalid(e.to_string()))
    }

    /// Resolve the endpoint described by these settings.
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::new(&self.base_url, self.endpoint_path.clone())
    }

    /// Path of the token file in effect.
    pub fn token_path(&self) -> PathBuf {
        self.token_file
            .clone()
            .unwrap_or_else(FileTokenStore::default_path)
    }

    /// Credential store: `WSRPC_TOKEN` first, then the token file.
    pub fn credential_store(&self) -> Arc<dyn CredentialStore> {
        Arc::new(EnvTokenStore::new(
            TOKEN_ENV,
            FileTokenStore::new(self.token_path()),
        ))
    }

    /// Apply environment variable overrides in place.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            let base_url = base_url.trim();
            if !base_url.is_empty() {
                debug!("Base URL overridden by {}", BASE_URL_ENV);
                self.base_url = base_url.to_string();
            }
        }
    }
}

/// Load settings from `<dir>/.wsrpc/config.toml`, falling back to defaults
/// when the file is absent or unreadable.
pub fn load_settings(dir: &Path) -> ClientSettings {
    let config_path = dir.join(CONFIG_DIR).join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return ClientSettings::default();
    }

    match load_settings_from(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("{}; using defaults", e);
            ClientSettings::default()
        }
    }
}

/// Load settings from an explicit file. Unlike [`load_settings`], a missing
/// or invalid file is an error.
pub fn load_settings_from(path: &Path) -> Result<ClientSettings> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("Failed to read {}: {}", path.display(), e)))?;
    let settings: ClientSettings = toml::from_str(&content)
        .map_err(|e| Error::config(format!("Failed to parse {}: {}", path.display(), e)))?;
    debug!("Loaded settings from {:?}", path);
    Ok(settings)
}
