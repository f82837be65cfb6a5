//! Configuration management for spotwatch.
//!
//! Configuration values come from environment variables, optionally seeded
//! from a `.env` file in the local data directory. Lookup order:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Built-in defaults for the public Spotify endpoints

use std::{env, path::PathBuf, time::Duration};

use crate::{
    client::DEFAULT_API_URL,
    error::{Error, Result},
    token::{DEFAULT_AUTHORIZE_URL, DEFAULT_TOKEN_URL},
    watcher::DEFAULT_POLL_INTERVAL,
};

pub const CLIENT_ID: &str = "SPOTIFY_API_AUTH_CLIENT_ID";
pub const CLIENT_SECRET: &str = "SPOTIFY_API_AUTH_CLIENT_SECRET";
pub const REDIRECT_URI: &str = "SPOTIFY_API_REDIRECT_URI";
pub const SCOPE: &str = "SPOTIFY_API_AUTH_SCOPE";
pub const REFRESH_TOKEN: &str = "SPOTIFY_API_REFRESH_TOKEN";
pub const AUTH_URL: &str = "SPOTIFY_API_AUTH_URL";
pub const TOKEN_URL: &str = "SPOTIFY_API_TOKEN_URL";
pub const API_URL: &str = "SPOTIFY_API_URL";
pub const SERVER_ADDRESS: &str = "SERVER_ADDRESS";
pub const POLL_INTERVAL_MS: &str = "SPOTWATCH_POLL_INTERVAL_MS";

const DEFAULT_SCOPE: &str = "user-read-playback-state user-read-currently-playing \
                             user-read-recently-played playlist-read-private \
                             playlist-modify-public playlist-modify-private";
const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8888";

/// Path of the `.env` file: `<data_local_dir>/spotwatch/.env`.
///
/// - Linux: `~/.local/share/spotwatch/.env`
/// - macOS: `~/Library/Application Support/spotwatch/.env`
/// - Windows: `%LOCALAPPDATA%/spotwatch/.env`
pub fn env_file_path() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("spotwatch/.env");
    path
}

/// Loads environment variables from the `.env` file in the local data
/// directory.
///
/// Creates the directory if it does not exist. A missing `.env` file is not an
/// error, since every value can also come from the process environment.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory cannot be created and
/// [`Error::Config`] if the file exists but cannot be parsed.
pub async fn load_env() -> Result<()> {
    let path = env_file_path();
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent).await?;
    }

    match dotenv::from_path(&path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "loaded environment file");
            Ok(())
        }
        Err(dotenv::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no environment file");
            Ok(())
        }
        Err(e) => Err(Error::Config(format!(
            "failed to load {}: {e}",
            path.display()
        ))),
    }
}

/// Runtime configuration.
#[derive(Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
    pub refresh_token: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    pub api_url: String,
    /// Address the OAuth callback server binds to.
    pub server_address: String,
    pub poll_interval: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("scope", &self.scope)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("api_url", &self.api_url)
            .field("server_address", &self.server_address)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when the client id, the client secret or the
    /// redirect URI is missing, or the poll interval is not a positive number.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| Error::Config(format!("{key} must be set")))
        };

        let poll_interval = match get(POLL_INTERVAL_MS) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(Error::Config(format!(
                        "{POLL_INTERVAL_MS} must be a positive number of milliseconds, got '{raw}'"
                    )));
                }
            },
            None => DEFAULT_POLL_INTERVAL,
        };

        Ok(Self {
            client_id: required(CLIENT_ID)?,
            client_secret: required(CLIENT_SECRET)?,
            redirect_uri: required(REDIRECT_URI)?,
            scope: get(SCOPE).unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            refresh_token: get(REFRESH_TOKEN),
            auth_url: get(AUTH_URL).unwrap_or_else(|| DEFAULT_AUTHORIZE_URL.to_string()),
            token_url: get(TOKEN_URL).unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            api_url: get(API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            server_address: get(SERVER_ADDRESS)
                .unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string()),
            poll_interval,
        })
    }

    /// Scopes from `SPOTIFY_API_AUTH_SCOPE`, split on whitespace.
    pub fn scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(str::to_string).collect()
    }
}
