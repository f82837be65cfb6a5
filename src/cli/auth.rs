use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;

use crate::{
    SpotifyClient,
    config::Config,
    error, info,
    server::{CallbackState, start_api_server},
    success,
    types::AuthCallback,
    warning,
};

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Runs the authorization code flow.
///
/// Starts the local callback server, opens the consent page in the browser,
/// waits for the redirect and exchanges the delivered code. The resulting
/// credential is persisted to the token cache.
pub async fn auth(config: &Config) {
    let client = match SpotifyClient::from_config(config) {
        Ok(client) => client,
        Err(e) => error!("Cannot create client. Err: {}", e),
    };

    let state: CallbackState = Arc::new(Mutex::new(None));

    let server_state = Arc::clone(&state);
    let address = config.server_address.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = start_api_server(&address, server_state).await {
            warning!("Callback server stopped: {}", e);
        }
    });

    let auth_url = client.authorization_url(config.scopes());
    if webbrowser::open(&auth_url).is_err() {
        warning!(
            "Failed to open browser. Please navigate to the following URL manually:\n{}",
            auth_url
        )
    } else {
        info!("Waiting for authorization in the browser...");
    }

    let pb = super::spinner("Waiting for callback...");
    let outcome = wait_for_callback(state).await;
    pb.finish_and_clear();
    server.abort();

    let code = match outcome {
        Some(AuthCallback::Code(code)) => code,
        Some(AuthCallback::Denied(reason)) => error!("Authorization denied: {}", reason),
        None => error!("Authorization timed out."),
    };

    match client.exchange_authorization_code(&code).await {
        Ok(grant) => {
            success!("Authentication successful!");
            if grant.refresh_token.is_some() {
                info!("Credential stored in the token cache");
            }
        }
        Err(e) => super::fail("Token exchange failed", e),
    }
}

async fn wait_for_callback(state: CallbackState) -> Option<AuthCallback> {
    let start = Instant::now();

    while start.elapsed() < CALLBACK_TIMEOUT {
        if let Some(outcome) = state.lock().await.clone() {
            return Some(outcome);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    None
}
