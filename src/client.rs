//! The Web API client.
//!
//! [`SpotifyClient`] composes the [`TokenManager`], the [`PlaybackWatcher`] and
//! the key normalizer. Every resource method follows the same contract:
//!
//! 1. validate arguments, failing with [`Error::Validation`] before any request
//! 2. obtain a valid access token (refreshing if needed)
//! 3. send the request with a bearer header
//! 4. turn an `error` object in the body into [`Error::Remote`]
//! 5. camelCase the keys of the body when `camel_case_keys` is enabled
//!
//! # Example
//!
//! ```rust,ignore
//! use spotwatch::{SpotifyClient, types::ItemType};
//!
//! let client = SpotifyClient::builder()
//!     .client_id("id")
//!     .client_secret("secret")
//!     .refresh_token("refresh")
//!     .build()?;
//!
//! let track = client.get_item("spotify:track:4uLU6hMCjMI75M1A2tKUQC", ItemType::Track).await?;
//! ```

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use urlencoding::encode;

use crate::{
    clock::{SharedClock, SystemClock},
    config::Config,
    error::{Error, Result},
    normalize::normalize,
    store::{FileTokenStore, TokenStore},
    timer::{SharedTimer, TokioTimer},
    token::{OAuthConfig, TokenManager},
    transport::{HttpRequest, HttpResponse, ReqwestTransport, SharedTransport},
    types::{
        Credential, ItemType, NewPlaylist, PlaybackEvent, PlaylistPage, PollError, RecentlyPlayed,
        Scopes, TokenGrant,
    },
    utils::{ItemReference, id_from_uri, looks_like_spotify_id, parse_item_reference},
    watcher::{DEFAULT_POLL_INTERVAL, PlaybackSource, PlaybackWatcher},
};

pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";

pub const DEFAULT_PLAYLIST_LIMIT: u32 = 20;
const MAX_PLAYLIST_LIMIT: u32 = 50;

/// Spotify Web API client.
///
/// Cheap to clone; clones share the credential and the playback watcher.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    api: Arc<ApiContext>,
    tokens: Arc<TokenManager>,
    watcher: PlaybackWatcher,
}

/// What every request needs besides the token.
#[derive(Debug)]
struct ApiContext {
    api_url: String,
    camel_case_keys: bool,
    transport: SharedTransport,
}

impl ApiContext {
    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn send(&self, request: HttpRequest, access_token: &str) -> Result<Value> {
        let response = self.transport.send(request.bearer(access_token)).await?;
        self.check_response(response)
    }

    fn check_response(&self, response: HttpResponse) -> Result<Value> {
        if let Some(message) = response.error_message() {
            return Err(Error::Remote {
                status: response.error_status(),
                message,
            });
        }

        if !(200..300).contains(&response.status) {
            return Err(Error::Remote {
                status: response.status,
                message: format!("unexpected status {}", response.status),
            });
        }

        Ok(if self.camel_case_keys {
            normalize(&response.body)
        } else {
            response.body
        })
    }
}

/// `GET /me/player` as the watcher's playback source.
#[derive(Debug)]
struct ApiPlaybackSource {
    api: Arc<ApiContext>,
}

#[async_trait]
impl PlaybackSource for ApiPlaybackSource {
    async fn current_playback(&self, access_token: &str) -> Result<Option<Value>> {
        let request = HttpRequest::get(self.api.url("me/player"));
        let body = self.api.send(request, access_token).await?;

        // 204 No Content when no device is active.
        Ok(match body {
            Value::Null => None,
            body => Some(body),
        })
    }
}

impl SpotifyClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Client configured from environment derived [`Config`], persisting
    /// credentials to the default [`FileTokenStore`].
    pub fn from_config(config: &Config) -> Result<Self> {
        ClientBuilder::from_config(config).build()
    }

    /// The token manager shared with the playback watcher.
    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.inner.tokens
    }

    /// The playback watcher, for direct control and inspection.
    pub fn watcher(&self) -> &PlaybackWatcher {
        &self.inner.watcher
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authorization
    // ─────────────────────────────────────────────────────────────────────────

    /// Consent page URL for `scopes`.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let url = client.authorization_url(["user-read-playback-state"]);
    /// webbrowser::open(&url)?;
    /// ```
    pub fn authorization_url(&self, scopes: impl Into<Scopes>) -> String {
        self.inner.tokens.build_authorization_url(scopes)
    }

    /// Trades the code from the redirect for a token pair and persists it.
    pub async fn exchange_authorization_code(&self, code: &str) -> Result<TokenGrant> {
        self.inner.tokens.exchange_authorization_code(code).await
    }

    /// Replaces the in-memory credential with the persisted one, if any.
    pub async fn load_stored_credential(&self) -> Result<bool> {
        self.inner.tokens.load_from_store().await
    }

    /// Copy of the current credential.
    pub async fn credential(&self) -> Credential {
        self.inner.tokens.credential().await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Playback watching
    // ─────────────────────────────────────────────────────────────────────────

    /// Receiver for track changes. Ends when watching stops.
    pub fn playback_events(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.watcher.subscribe()
    }

    /// Receiver for failed polls. Ends when watching stops.
    pub fn playback_errors(&self) -> broadcast::Receiver<PollError> {
        self.inner.watcher.errors()
    }

    /// Starts polling playback. Does nothing if already watching.
    pub fn start_watching(&self) {
        self.inner.watcher.start();
    }

    /// Stops polling and closes the current event streams.
    pub async fn stop_watching(&self) {
        self.inner.watcher.stop().await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resources
    // ─────────────────────────────────────────────────────────────────────────

    async fn get(&self, url: String) -> Result<Value> {
        let token = self.inner.tokens.ensure_valid_access_token().await?;
        self.inner.api.send(HttpRequest::get(url), &token).await
    }

    fn url(&self, path: &str) -> String {
        self.inner.api.url(path)
    }

    /// Searches the catalog and returns the URI of the best match.
    ///
    /// # Arguments
    ///
    /// * `query` - Free text, percent-encoded before sending
    /// * `item_type` - Kind of item to search for
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for an empty query
    /// - [`Error::Remote`] with status 404 when nothing matches
    pub async fn search_uri(&self, query: &str, item_type: ItemType) -> Result<String> {
        if query.trim().is_empty() {
            return Err(Error::Validation("search query is empty".to_string()));
        }

        let url = self.url(&format!("search?q={}&type={item_type}", encode(query)));
        let body = self.get(url).await?;

        body.get(item_type.collection())
            .and_then(|results| results.get("items"))
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("uri"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Remote {
                status: 404,
                message: format!("no {item_type} found for '{query}'"),
            })
    }

    /// Whether `id` names an existing item of `item_type`. The remote
    /// answering with an error counts as `false`.
    pub async fn is_valid_id(&self, id: &str, item_type: ItemType) -> Result<bool> {
        match self.get_item_with_id(id, item_type).await {
            Ok(_) => Ok(true),
            Err(Error::Remote { .. }) | Err(Error::Validation(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fetches the item with `id` from its collection endpoint, e.g.
    /// `GET /tracks/{id}`.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for an empty id or one containing `/`
    /// - [`Error::Remote`] when the id is unknown
    pub async fn get_item_with_id(&self, id: &str, item_type: ItemType) -> Result<Value> {
        let id = id.trim();
        if id.is_empty() || id.contains('/') {
            return Err(Error::Validation(format!("invalid {item_type} id '{id}'")));
        }

        let url = self.url(&format!("{}/{}", item_type.collection(), encode(id)));
        self.get(url).await
    }

    /// `GET /tracks/{id}`
    pub async fn get_track_with_id(&self, id: &str) -> Result<Value> {
        self.get_item_with_id(id, ItemType::Track).await
    }

    /// `GET /artists/{id}`
    pub async fn get_artist_with_id(&self, id: &str) -> Result<Value> {
        self.get_item_with_id(id, ItemType::Artist).await
    }

    /// `GET /albums/{id}`
    pub async fn get_album_with_id(&self, id: &str) -> Result<Value> {
        self.get_item_with_id(id, ItemType::Album).await
    }

    /// `GET /playlists/{id}`
    pub async fn get_playlist_with_id(&self, id: &str) -> Result<Value> {
        self.get_item_with_id(id, ItemType::Playlist).await
    }

    /// Looks up an item by URI, URL, id or name.
    ///
    /// Text that is not a URI or URL is tried as an id first when it has the
    /// shape of one; otherwise, or when that lookup fails remotely, the best
    /// search match is fetched.
    pub async fn get_item(&self, reference: &str, item_type: ItemType) -> Result<Value> {
        let text = match parse_item_reference(reference, item_type)? {
            ItemReference::Id(id) => return self.get_item_with_id(&id, item_type).await,
            ItemReference::Text(text) => text,
        };

        if looks_like_spotify_id(&text) {
            match self.get_item_with_id(&text, item_type).await {
                Err(Error::Remote { status, message }) => {
                    tracing::debug!(status, "lookup by id failed ({message}), searching instead");
                }
                other => return other,
            }
        }

        let uri = self.search_uri(&text, item_type).await?;
        let id = id_from_uri(&uri).ok_or_else(|| Error::Remote {
            status: 404,
            message: format!("search returned malformed uri '{uri}'"),
        })?;
        self.get_item_with_id(id, item_type).await
    }

    /// Track by URI, URL, id or name. See [`get_item`](Self::get_item).
    pub async fn get_track(&self, reference: &str) -> Result<Value> {
        self.get_item(reference, ItemType::Track).await
    }

    /// Artist by URI, URL, id or name.
    pub async fn get_artist(&self, reference: &str) -> Result<Value> {
        self.get_item(reference, ItemType::Artist).await
    }

    /// Album by URI, URL, id or name.
    pub async fn get_album(&self, reference: &str) -> Result<Value> {
        self.get_item(reference, ItemType::Album).await
    }

    /// Playlist by URI, URL, id or name.
    pub async fn get_playlist(&self, reference: &str) -> Result<Value> {
        self.get_item(reference, ItemType::Playlist).await
    }

    /// Audio analysis of the track `reference` resolves to.
    pub async fn track_audio_analysis(&self, reference: &str) -> Result<Value> {
        let track = self.get_track(reference).await?;
        let id = track
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Json("track object without id".to_string()))?;

        self.get(self.url(&format!("audio-analysis/{}", encode(id))))
            .await
    }

    /// Profile of the authorized user.
    pub async fn user_data(&self) -> Result<Value> {
        self.get(self.url("me")).await
    }

    /// The user's playback state, or `None` when nothing is active.
    pub async fn current_playback(&self) -> Result<Option<Value>> {
        let token = self.inner.tokens.ensure_valid_access_token().await?;
        ApiPlaybackSource {
            api: Arc::clone(&self.inner.api),
        }
        .current_playback(&token)
        .await
    }

    /// Most recently played tracks.
    pub async fn recently_played(&self) -> Result<RecentlyPlayed> {
        self.recently_played_at(self.url("me/player/recently-played"))
            .await
    }

    /// The page after `page`, or `None` on the last page.
    pub async fn recently_played_page(
        &self,
        page: &RecentlyPlayed,
    ) -> Result<Option<RecentlyPlayed>> {
        match &page.next {
            Some(next) => self.recently_played_at(next.clone()).await.map(Some),
            None => Ok(None),
        }
    }

    async fn recently_played_at(&self, url: String) -> Result<RecentlyPlayed> {
        let body = self.get(url).await?;
        Ok(RecentlyPlayed {
            items: items_of(&body),
            next: next_of(&body),
        })
    }

    /// Creates a playlist owned by the authorized user.
    pub async fn create_playlist(&self, playlist: NewPlaylist) -> Result<Value> {
        if playlist.name.trim().is_empty() {
            return Err(Error::Validation("playlist name is empty".to_string()));
        }

        let me = self.user_data().await?;
        let user_id = me
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Json("user profile without id".to_string()))?;

        let token = self.inner.tokens.ensure_valid_access_token().await?;
        let request = HttpRequest::post(self.url(&format!("users/{}/playlists", encode(user_id))))
            .json(serde_json::to_value(&playlist)?);

        let created = self.inner.api.send(request, &token).await?;
        tracing::info!(name = %playlist.name, "playlist created");
        Ok(created)
    }

    /// One page of the user's playlists, `None` when the page is empty.
    ///
    /// `page` starts at 1; `limit` must be within 1..=50.
    pub async fn list_playlists(&self, page: u32, limit: u32) -> Result<Option<PlaylistPage>> {
        if page == 0 {
            return Err(Error::Validation("page numbers start at 1".to_string()));
        }
        if !(1..=MAX_PLAYLIST_LIMIT).contains(&limit) {
            return Err(Error::Validation(format!(
                "limit must be between 1 and {MAX_PLAYLIST_LIMIT}, got {limit}"
            )));
        }

        let offset = u64::from(page - 1) * u64::from(limit);
        let body = self
            .get(self.url(&format!("me/playlists?offset={offset}&limit={limit}")))
            .await?;

        let items = items_of(&body);
        if items.is_empty() {
            return Ok(None);
        }

        Ok(Some(PlaylistPage {
            items,
            page,
            limit,
            next: next_of(&body),
        }))
    }

    /// The page after `current`, or `None` when `current` is the last one.
    pub async fn next_playlists(&self, current: &PlaylistPage) -> Result<Option<PlaylistPage>> {
        if current.next.is_none() {
            return Ok(None);
        }
        self.list_playlists(current.page + 1, current.limit).await
    }
}

fn items_of(body: &Value) -> Vec<Value> {
    body.get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn next_of(body: &Value) -> Option<String> {
    body.get("next").and_then(Value::as_str).map(str::to_string)
}

/// Builder for [`SpotifyClient`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    redirect_uri: Option<String>,
    listen_for_playback_changes: bool,
    camel_case_keys: Option<bool>,
    poll_interval: Option<Duration>,
    authorize_url: Option<String>,
    token_url: Option<String>,
    api_url: Option<String>,
    transport: Option<SharedTransport>,
    clock: Option<SharedClock>,
    timer: Option<SharedTimer>,
    token_store: Option<Arc<dyn TokenStore>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let mut builder = Self::new()
            .client_id(&config.client_id)
            .client_secret(&config.client_secret)
            .redirect_uri(&config.redirect_uri)
            .authorize_url(&config.auth_url)
            .token_url(&config.token_url)
            .api_url(&config.api_url)
            .poll_interval(config.poll_interval)
            .token_store(Arc::new(FileTokenStore::new()));

        if let Some(refresh_token) = &config.refresh_token {
            builder = builder.refresh_token(refresh_token);
        }
        builder
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Seeds the credential; the first authorized call refreshes.
    pub fn refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Start the playback watcher as soon as the client is built. Requires a
    /// tokio runtime when the default timer is used.
    pub fn listen_for_playback_changes(mut self, listen: bool) -> Self {
        self.listen_for_playback_changes = listen;
        self
    }

    /// camelCase every response key. On by default.
    pub fn camel_case_keys(mut self, enabled: bool) -> Self {
        self.camel_case_keys = Some(enabled);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Base URL of the accounts service; sets both the authorize and the
    /// token endpoint.
    pub fn accounts_url(self, accounts_url: impl AsRef<str>) -> Self {
        let base = accounts_url.as_ref().trim_end_matches('/');
        self.authorize_url(format!("{base}/authorize"))
            .token_url(format!("{base}/api/token"))
    }

    pub fn authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = Some(url.into());
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn transport(mut self, transport: SharedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn timer(mut self, timer: SharedTimer) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    pub fn build(self) -> Result<SpotifyClient> {
        let client_id = self
            .client_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Config("client id is required".to_string()))?;
        let client_secret = self
            .client_secret
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| Error::Config("client secret is required".to_string()))?;

        let transport: SharedTransport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let timer = self.timer.unwrap_or_else(|| Arc::new(TokioTimer));

        let mut oauth = OAuthConfig::new(client_id, client_secret);
        oauth.redirect_uri = self.redirect_uri.filter(|uri| !uri.is_empty());
        if let Some(url) = self.authorize_url {
            oauth.authorize_url = url;
        }
        if let Some(url) = self.token_url {
            oauth.token_url = url;
        }

        let credential = match self.refresh_token {
            Some(refresh_token) => Credential::from_refresh_token(refresh_token),
            None => Credential::default(),
        };

        let mut tokens = TokenManager::new(oauth, credential, Arc::clone(&transport), Arc::clone(&clock));
        if let Some(store) = self.token_store {
            tokens = tokens.with_store(store);
        }
        let tokens = Arc::new(tokens);

        let api = Arc::new(ApiContext {
            api_url: self.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            camel_case_keys: self.camel_case_keys.unwrap_or(true),
            transport,
        });

        let watcher = PlaybackWatcher::new(
            Arc::clone(&tokens),
            Arc::new(ApiPlaybackSource {
                api: Arc::clone(&api),
            }),
            timer,
            clock,
            self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
        );

        if self.listen_for_playback_changes {
            watcher.start();
        }

        Ok(SpotifyClient {
            inner: Arc::new(ClientInner {
                api,
                tokens,
                watcher,
            }),
        })
    }
}
