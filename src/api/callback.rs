use std::collections::HashMap;

use axum::{Extension, extract::Query, response::Html};

use crate::{server::CallbackState, types::AuthCallback};

/// Receives the redirect from the consent page and records the authorization
/// code, or the reason it is missing.
pub async fn callback(
    Query(params): Query<HashMap<String, String>>,
    Extension(shared_state): Extension<CallbackState>,
) -> Html<&'static str> {
    let (outcome, page) = match (params.get("code"), params.get("error")) {
        (Some(code), _) if !code.is_empty() => (
            AuthCallback::Code(code.clone()),
            "<h2>Authorization received.</h2><p>You can close this window.</p>",
        ),
        (_, Some(error)) => (
            AuthCallback::Denied(error.clone()),
            "<h4>Authorization was denied.</h4>",
        ),
        _ => (
            AuthCallback::Denied("callback without code".to_string()),
            "<h4>Missing authorization code.</h4>",
        ),
    };

    let mut state = shared_state.lock().await;
    // The first answer wins; reloads of the page must not replace a code.
    if state.is_none() {
        *state = Some(outcome);
    }

    Html(page)
}
