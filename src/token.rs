//! OAuth token lifecycle.
//!
//! [`TokenManager`] owns the [`Credential`] and hands out a valid access token
//! to every authorized call. When the cached token has expired it is refreshed
//! against the accounts service. The credential sits behind one async mutex
//! that is held across the check and the refresh, so concurrent callers that
//! all see an expired token cause exactly one refresh request.

use std::{fmt, sync::Arc};

use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tokio::sync::Mutex;
use urlencoding::encode;

use crate::{
    clock::SharedClock,
    error::{AuthStage, Error, Result},
    store::TokenStore,
    transport::{HttpRequest, HttpResponse, SharedTransport},
    types::{Credential, Scopes, TokenGrant},
};

pub const DEFAULT_AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Application registration and accounts service endpoints.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

impl OAuthConfig {
    /// Configuration for the public accounts service endpoints, without a
    /// redirect URI.
    ///
    /// # Arguments
    ///
    /// * `client_id` - Id of the registered application
    /// * `client_secret` - Secret of the registered application
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: None,
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    /// Sets the redirect URI sent with the authorize URL and the code
    /// exchange. It must match one registered for the application.
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// `Basic base64(client_id:client_secret)`
    pub fn basic_auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.client_id, self.client_secret);
        format!("Basic {}", STANDARD.encode(credentials))
    }
}

#[derive(Debug, Deserialize)]
struct RawTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

/// A token response whose lifetime fits the credential's millisecond fields.
#[derive(Debug)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
    expires_in_ms: i64,
}

pub struct TokenManager {
    oauth: OAuthConfig,
    transport: SharedTransport,
    clock: SharedClock,
    credential: Mutex<Credential>,
    store: Option<Arc<dyn TokenStore>>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("client_id", &self.oauth.client_id)
            .field("token_url", &self.oauth.token_url)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Creates a manager around `credential`.
    ///
    /// # Arguments
    ///
    /// * `oauth` - Application registration and endpoints
    /// * `credential` - Starting credential, possibly only a refresh token
    /// * `transport` - Sends the token requests
    /// * `clock` - Decides whether the access token has expired
    pub fn new(
        oauth: OAuthConfig,
        credential: Credential,
        transport: SharedTransport,
        clock: SharedClock,
    ) -> Self {
        Self {
            oauth,
            transport,
            clock,
            credential: Mutex::new(credential),
            store: None,
        }
    }

    /// Persist credentials through `store` whenever they change.
    pub fn with_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The application registration this manager authenticates as.
    pub fn oauth(&self) -> &OAuthConfig {
        &self.oauth
    }

    /// Replaces the in-memory credential with the stored one, if any.
    ///
    /// Returns whether a stored credential was found.
    pub async fn load_from_store(&self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };

        match store.load().await? {
            Some(stored) => {
                let mut credential = self.credential.lock().await;
                // A refresh token given at construction wins over an empty
                // stored one.
                let refresh_token = stored
                    .refresh_token
                    .clone()
                    .or_else(|| credential.refresh_token.take());
                *credential = Credential {
                    refresh_token,
                    ..stored
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Copy of the current credential.
    pub async fn credential(&self) -> Credential {
        self.credential.lock().await.clone()
    }

    /// `Bearer <token>` for the current access token, without refreshing.
    pub async fn bearer_header(&self) -> Option<String> {
        self.credential
            .lock()
            .await
            .access_token
            .as_ref()
            .map(|token| format!("Bearer {token}"))
    }

    /// Returns an access token that is valid right now, refreshing it first
    /// if it has expired.
    pub async fn ensure_valid_access_token(&self) -> Result<String> {
        let mut credential = self.credential.lock().await;

        let now = self.clock.now_millis();
        if let Some(token) = credential.access_token.as_ref().filter(|_| credential.is_valid_at(now)) {
            return Ok(token.clone());
        }

        let Some(refresh_token) = credential.refresh_token.clone() else {
            return Err(Error::auth(
                AuthStage::Refresh,
                "no refresh token available, authorize the application first",
            ));
        };

        tracing::debug!("access token expired, refreshing");

        let request = self.token_request().form(&[
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ]);
        let response = self.transport.send(request).await?;
        let token = parse_token_response(AuthStage::Refresh, response)?;

        credential.access_token = Some(token.access_token.clone());
        credential.expires_in_ms = token.expires_in_ms;
        credential.last_refresh_ms = self.clock.now_millis();

        let rotated = matches!(
            &token.refresh_token,
            Some(new) if Some(new) != credential.refresh_token.as_ref()
        );
        if let Some(new) = token.refresh_token {
            credential.refresh_token = Some(new);
        }

        tracing::info!(
            expires_in = token.expires_in,
            rotated,
            "access token refreshed"
        );

        if rotated {
            if let Err(e) = self.persist(&credential).await {
                // The new access token is usable even if the cache is not.
                tracing::warn!("failed to persist rotated refresh token: {e}");
            }
        }

        Ok(token.access_token)
    }

    /// Exchanges the authorization code delivered to the redirect URI for a
    /// token pair and seeds the credential with it.
    pub async fn exchange_authorization_code(&self, code: &str) -> Result<TokenGrant> {
        if code.is_empty() {
            return Err(Error::Validation("authorization code is empty".to_string()));
        }

        let redirect_uri = self.oauth.redirect_uri.clone().unwrap_or_default();
        let request = self.token_request().form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
        ]);

        let response = self.transport.send(request).await?;
        let token = parse_token_response(AuthStage::CodeExchange, response)?;

        let mut credential = self.credential.lock().await;
        credential.access_token = Some(token.access_token.clone());
        if token.refresh_token.is_some() {
            credential.refresh_token = token.refresh_token.clone();
        }
        credential.expires_in_ms = token.expires_in_ms;
        credential.last_refresh_ms = self.clock.now_millis();

        self.persist(&credential).await?;
        tracing::info!("authorization code exchanged");

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: credential.refresh_token.clone(),
            expires_in: token.expires_in,
        })
    }

    /// URL of the consent page the user has to visit to authorize the
    /// application.
    pub fn build_authorization_url(&self, scopes: impl Into<Scopes>) -> String {
        let scopes = scopes.into().joined();
        let mut url = format!(
            "{}?response_type=code&client_id={}&scope={}",
            self.oauth.authorize_url,
            encode(&self.oauth.client_id),
            encode(&scopes),
        );

        if let Some(redirect_uri) = &self.oauth.redirect_uri {
            url.push_str("&redirect_uri=");
            url.push_str(&encode(redirect_uri));
        }

        url
    }

    fn token_request(&self) -> HttpRequest {
        HttpRequest::post(&self.oauth.token_url)
            .header(AUTHORIZATION.as_str(), self.oauth.basic_auth_header())
    }

    async fn persist(&self, credential: &Credential) -> Result<()> {
        match &self.store {
            Some(store) => store.save(credential).await,
            None => Ok(()),
        }
    }
}

fn parse_token_response(stage: AuthStage, response: HttpResponse) -> Result<TokenResponse> {
    if let Some(description) = response.error_message() {
        tracing::warn!(status = response.status, "token request rejected during {stage}");
        return Err(Error::auth(stage, description));
    }

    if !(200..300).contains(&response.status) {
        return Err(Error::auth(
            stage,
            format!("accounts service answered with status {}", response.status),
        ));
    }

    let raw: RawTokenResponse = serde_json::from_value(response.body)
        .map_err(|e| Error::auth(stage, format!("malformed token response: {e}")))?;

    // Negative or absurdly long lifetimes are rejected.
    let expires_in_ms = u32::try_from(raw.expires_in)
        .map(|secs| i64::from(secs) * 1000)
        .map_err(|_| {
            Error::auth(
                stage,
                format!(
                    "malformed token response: expires_in {} out of range",
                    raw.expires_in
                ),
            )
        })?;

    Ok(TokenResponse {
        access_token: raw.access_token,
        refresh_token: raw.refresh_token,
        expires_in: raw.expires_in,
        expires_in_ms,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{clock::ManualClock, transport::Transport};

    #[derive(Debug, Default)]
    struct Canned {
        response: StdMutex<Option<HttpResponse>>,
        requests: StdMutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            Ok(self
                .response
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| HttpResponse::new(500, json!(null))))
        }
    }

    fn manager(transport: Arc<Canned>, oauth: OAuthConfig) -> TokenManager {
        TokenManager::new(
            oauth,
            Credential::from_refresh_token("r0"),
            transport,
            Arc::new(ManualClock::new(0)),
        )
    }

    #[test]
    fn test_basic_auth_header() {
        let oauth = OAuthConfig::new("id", "secret");
        assert_eq!(oauth.basic_auth_header(), "Basic aWQ6c2VjcmV0");
    }

    #[test]
    fn test_authorization_url() {
        let oauth = OAuthConfig::new("client", "secret")
            .with_redirect_uri("http://127.0.0.1:8080/callback");
        let manager = manager(Arc::new(Canned::default()), oauth);

        assert_eq!(
            manager.build_authorization_url(["a", "b c"]),
            "https://accounts.spotify.com/authorize?response_type=code&client_id=client\
             &scope=a%20b%20c&redirect_uri=http%3A%2F%2F127.0.0.1%3A8080%2Fcallback"
        );
    }

    #[test]
    fn test_authorization_url_without_redirect() {
        let manager = manager(Arc::new(Canned::default()), OAuthConfig::new("client", "s"));
        let url = manager.build_authorization_url("user-read-playback-state");

        assert!(url.ends_with("&scope=user-read-playback-state"));
        assert!(!url.contains("redirect_uri"));
    }

    #[tokio::test]
    async fn test_code_exchange_error_names_stage() {
        let transport = Arc::new(Canned::default());
        *transport.response.lock().unwrap() = Some(HttpResponse::new(
            400,
            json!({ "error": "invalid_grant", "error_description": "Invalid authorization code" }),
        ));

        let manager = manager(transport.clone(), OAuthConfig::new("id", "secret"));
        let err = manager.exchange_authorization_code("bad").await.unwrap_err();

        assert_eq!(
            err,
            Error::Auth {
                stage: AuthStage::CodeExchange,
                description: "Invalid authorization code".to_string()
            }
        );

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].form_value("grant_type"), Some("authorization_code"));
        assert_eq!(requests[0].form_value("code"), Some("bad"));
        assert_eq!(
            requests[0].header_value("authorization"),
            Some("Basic aWQ6c2VjcmV0")
        );
    }

    #[tokio::test]
    async fn test_empty_code_is_rejected_locally() {
        let transport = Arc::new(Canned::default());
        let manager = manager(transport.clone(), OAuthConfig::new("id", "secret"));

        let err = manager.exchange_authorization_code("").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bearer_header_follows_credential() {
        let transport = Arc::new(Canned::default());
        *transport.response.lock().unwrap() = Some(HttpResponse::new(
            200,
            json!({ "access_token": "a1", "expires_in": 3600 }),
        ));
        let manager = manager(transport, OAuthConfig::new("id", "secret"));

        assert_eq!(manager.bearer_header().await, None);
        manager.ensure_valid_access_token().await.unwrap();
        assert_eq!(manager.bearer_header().await.as_deref(), Some("Bearer a1"));
    }
}
