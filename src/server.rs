//! Local HTTP server that receives the OAuth redirect.
//!
//! Exposes `/health` and `/callback`. The callback handler only records what
//! the accounts service sent; the code exchange happens in the `auth` command.

use std::{net::SocketAddr, str::FromStr, sync::Arc};

use axum::{Extension, Router, routing::get};
use tokio::sync::Mutex;

use crate::{
    api,
    error::{Error, Result},
    types::AuthCallback,
};

/// Slot the callback handler fills in.
pub type CallbackState = Arc<Mutex<Option<AuthCallback>>>;

pub fn router(state: CallbackState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/callback", get(api::callback).layer(Extension(state)))
}

/// Serves the callback routes on `address` until the task is dropped.
pub async fn start_api_server(address: &str, state: CallbackState) -> Result<()> {
    let addr = SocketAddr::from_str(address)
        .map_err(|e| Error::Config(format!("invalid server address '{address}': {e}")))?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "callback server listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
