use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabled::Tabled;

use crate::error::{Error, Result};

/// OAuth credential owned by the token manager.
///
/// The access token is considered valid while
/// `now <= last_refresh_ms + expires_in_ms`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in_ms: i64,
    pub last_refresh_ms: i64,
}

impl Credential {
    /// A credential that only knows its refresh token. The first authorized
    /// call will refresh.
    pub fn from_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: Some(refresh_token.into()),
            ..Self::default()
        }
    }

    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.access_token.is_some() && now_ms <= self.expires_at_ms()
    }

    /// Saturates instead of overflowing on corrupt stored values.
    pub fn expires_at_ms(&self) -> i64 {
        self.last_refresh_ms.saturating_add(self.expires_in_ms)
    }
}

/// Tokens handed out by a successful authorization code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, as reported by the accounts service.
    pub expires_in: i64,
}

/// Requested OAuth scopes, either one pre-joined string or a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scopes {
    Single(String),
    List(Vec<String>),
}

impl Scopes {
    /// All scopes joined by a single space.
    pub fn joined(&self) -> String {
        match self {
            Scopes::Single(scope) => scope.clone(),
            Scopes::List(scopes) => scopes.join(" "),
        }
    }
}

impl From<&str> for Scopes {
    fn from(scope: &str) -> Self {
        Scopes::Single(scope.to_string())
    }
}

impl From<String> for Scopes {
    fn from(scope: String) -> Self {
        Scopes::Single(scope)
    }
}

impl From<Vec<String>> for Scopes {
    fn from(scopes: Vec<String>) -> Self {
        Scopes::List(scopes)
    }
}

impl From<Vec<&str>> for Scopes {
    fn from(scopes: Vec<&str>) -> Self {
        Scopes::List(scopes.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Scopes {
    fn from(scopes: &[&str]) -> Self {
        Scopes::List(scopes.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Scopes {
    fn from(scopes: [&str; N]) -> Self {
        Scopes::List(scopes.iter().map(|s| s.to_string()).collect())
    }
}

/// The catalog item kinds that can be looked up by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Album,
    Artist,
    Playlist,
    Track,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Album => "album",
            ItemType::Artist => "artist",
            ItemType::Playlist => "playlist",
            ItemType::Track => "track",
        }
    }

    /// Path segment of the collection endpoint, e.g. `tracks`.
    pub fn collection(&self) -> &'static str {
        match self {
            ItemType::Album => "albums",
            ItemType::Artist => "artists",
            ItemType::Playlist => "playlists",
            ItemType::Track => "tracks",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "album" => Ok(ItemType::Album),
            "artist" => Ok(ItemType::Artist),
            "playlist" => Ok(ItemType::Playlist),
            "track" => Ok(ItemType::Track),
            other => Err(Error::Validation(format!(
                "unsupported item type '{other}', expected album, artist, playlist or track"
            ))),
        }
    }
}

/// One page of recently played tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentlyPlayed {
    pub items: Vec<Value>,
    /// Absolute URL of the next (older) page.
    pub next: Option<String>,
}

/// One page of the current user's playlists.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistPage {
    pub items: Vec<Value>,
    pub page: u32,
    pub limit: u32,
    pub next: Option<String>,
}

/// Request body for playlist creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlaylist {
    pub name: String,
    pub public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub collaborative: bool,
}

impl NewPlaylist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public: true,
            description: None,
            collaborative: false,
        }
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn collaborative(mut self, collaborative: bool) -> Self {
        self.collaborative = collaborative;
        self
    }
}

/// What was playing at the time of one poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub track_name: Option<String>,
    pub progress_ms: i64,
    pub duration_ms: i64,
    /// The payload the snapshot was built from.
    pub raw: Value,
}

impl PlaybackSnapshot {
    /// Builds a snapshot from a `/me/player` payload. Returns `None` when the
    /// payload has no `item`, which means nothing is playing.
    ///
    /// Both snake_case and camelCase payloads are accepted.
    pub fn from_payload(raw: Value) -> Option<Self> {
        let item = raw.get("item").filter(|item| !item.is_null())?;

        let track_name = item.get("name").and_then(Value::as_str).map(str::to_string);
        let duration_ms = field(item, "duration_ms", "durationMs");
        let progress_ms = field(&raw, "progress_ms", "progressMs");

        Some(Self {
            track_name,
            progress_ms,
            duration_ms,
            raw,
        })
    }
}

fn field(value: &Value, snake: &str, camel: &str) -> i64 {
    value
        .get(snake)
        .or_else(|| value.get(camel))
        .and_then(Value::as_i64)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NewTrack,
    TrackSkipped,
}

/// Emitted by the playback watcher when the playing track changes.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEvent {
    pub kind: EventKind,
    pub snapshot: PlaybackSnapshot,
}

impl PlaybackEvent {
    pub fn new_track(snapshot: PlaybackSnapshot) -> Self {
        Self {
            kind: EventKind::NewTrack,
            snapshot,
        }
    }

    pub fn track_skipped(snapshot: PlaybackSnapshot) -> Self {
        Self {
            kind: EventKind::TrackSkipped,
            snapshot,
        }
    }
}

/// A poll tick that failed.
#[derive(Debug, Clone, PartialEq)]
pub struct PollError {
    pub error: Error,
    pub at_ms: i64,
}

/// What the OAuth redirect delivered to the local callback server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCallback {
    Code(String),
    /// The user declined, or the accounts service reported an error.
    Denied(String),
}

#[derive(Tabled)]
pub struct PlaylistTableRow {
    pub name: String,
    pub tracks: String,
    pub public: String,
    pub uri: String,
}

#[derive(Tabled)]
pub struct RecentTableRow {
    pub played_at: String,
    pub track: String,
    pub artists: String,
}
