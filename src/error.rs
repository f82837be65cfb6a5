//! Error types shared by the token manager, the playback watcher and the
//! resource methods of [`crate::client::SpotifyClient`].
//!
//! Every variant carries owned strings so errors can be cloned and fanned out
//! to several subscribers of the watcher's error channel.

use std::fmt;

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The token endpoint call that produced an [`Error::Auth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthStage {
    /// Initial exchange of an authorization code from the redirect callback.
    /// Usually a one-time setup mistake (wrong redirect URI, reused code).
    CodeExchange,
    /// Exchange of the stored refresh token for a new access token. The
    /// refresh token is probably revoked and the user has to re-authorize.
    Refresh,
}

impl fmt::Display for AuthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStage::CodeExchange => write!(f, "authorization code exchange"),
            AuthStage::Refresh => write!(f, "token refresh"),
        }
    }
}

/// Errors surfaced by this crate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The accounts service rejected a token request.
    #[error("Authorization failed during {stage}: {description}")]
    Auth {
        stage: AuthStage,
        /// Description provided by the accounts service.
        description: String,
    },

    /// A caller supplied argument failed a precondition. Raised before any
    /// network traffic.
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// An endpoint answered with a structured error body.
    #[error("API error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// The request never produced a response.
    #[error("Network error: {0}")]
    Transport(String),

    /// Missing or malformed configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Local file system failure (token cache, env file).
    #[error("IO error: {0}")]
    Io(String),

    /// A payload could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(String),
}

impl Error {
    pub(crate) fn auth(stage: AuthStage, description: impl Into<String>) -> Self {
        Error::Auth {
            stage,
            description: description.into(),
        }
    }

    /// Check if this is an authorization error of either stage.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth { .. }) || matches!(self, Error::Remote { status: 401, .. })
    }

    /// True when the stored refresh token should be considered dead.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Error::Auth {
                stage: AuthStage::Refresh,
                ..
            }
        )
    }

    /// Check if this is a network level failure.
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Error::Json(e.to_string());
        }
        Error::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
