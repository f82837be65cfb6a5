#![allow(dead_code)]

use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Value, json};
use spotwatch::{
    Result,
    clock::ManualClock,
    token::{OAuthConfig, TokenManager},
    transport::{HttpRequest, HttpResponse, Transport},
    types::Credential,
    watcher::PlaybackSource,
};

type Responder = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync>;

/// Transport that records every request and answers through a closure.
pub struct MockTransport {
    responder: Responder,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("requests", &self.requests.lock().unwrap().len())
            .finish()
    }
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Every request gets the same 200 response.
    pub fn ok(body: Value) -> Self {
        Self::new(move |_| Ok(HttpResponse::new(200, body.clone())))
    }

    /// Sleeps before answering, so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_to(&self, url_part: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(url_part))
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(&request)
    }
}

pub fn token_body(access_token: &str, expires_in: i64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in,
        "scope": "user-read-playback-state"
    })
}

pub fn oauth() -> OAuthConfig {
    OAuthConfig::new("client-id", "client-secret").with_redirect_uri("http://127.0.0.1:8888/callback")
}

/// A credential that is valid until `expires_at_ms`.
pub fn fresh_credential(access_token: &str, last_refresh_ms: i64, expires_in_ms: i64) -> Credential {
    Credential {
        access_token: Some(access_token.to_string()),
        refresh_token: Some("refresh-0".to_string()),
        expires_in_ms,
        last_refresh_ms,
    }
}

pub fn manager(
    credential: Credential,
    transport: Arc<MockTransport>,
    clock: Arc<ManualClock>,
) -> TokenManager {
    TokenManager::new(oauth(), credential, transport, clock)
}

/// Payload of `/me/player` while `name` plays.
pub fn playing(name: &str, progress_ms: i64, duration_ms: i64) -> Value {
    json!({
        "is_playing": true,
        "progress_ms": progress_ms,
        "item": { "name": name, "duration_ms": duration_ms, "artists": [{ "name": "Artist" }] }
    })
}

/// Playback source answering from a script, one entry per poll. Once the
/// script is exhausted it reports nothing playing.
#[derive(Debug, Default)]
pub struct ScriptedPlayback {
    script: Mutex<VecDeque<Result<Option<Value>>>>,
    tokens_seen: Mutex<Vec<String>>,
}

impl ScriptedPlayback {
    pub fn new(script: Vec<Result<Option<Value>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            tokens_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, entry: Result<Option<Value>>) {
        self.script.lock().unwrap().push_back(entry);
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaybackSource for ScriptedPlayback {
    async fn current_playback(&self, access_token: &str) -> Result<Option<Value>> {
        self.tokens_seen.lock().unwrap().push(access_token.to_string());
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}
