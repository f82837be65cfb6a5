mod common;

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use serde_json::json;
use spotwatch::{
    AuthStage, Error,
    clock::{Clock, ManualClock},
    store::{MemoryTokenStore, TokenStore},
    transport::HttpResponse,
    types::Credential,
};

use common::{MockTransport, fresh_credential, manager, token_body};

#[tokio::test]
async fn test_fresh_token_makes_no_transport_calls() {
    let transport = Arc::new(MockTransport::ok(token_body("new", 3600)));
    let clock = Arc::new(ManualClock::new(10_000));
    let tokens = manager(
        fresh_credential("cached", 10_000, 60_000),
        transport.clone(),
        clock.clone(),
    );

    for _ in 0..5 {
        assert_eq!(tokens.ensure_valid_access_token().await.unwrap(), "cached");
        clock.advance(10_000);
    }

    // now == last_refresh + expires_in is still valid
    clock.set(70_000);
    assert_eq!(tokens.ensure_valid_access_token().await.unwrap(), "cached");
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_expired_token_is_refreshed() {
    let transport = Arc::new(MockTransport::ok(token_body("fresh", 3600)));
    let clock = Arc::new(ManualClock::new(70_001));
    let tokens = manager(
        fresh_credential("stale", 10_000, 60_000),
        transport.clone(),
        clock.clone(),
    );

    assert_eq!(tokens.ensure_valid_access_token().await.unwrap(), "fresh");

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://accounts.spotify.com/api/token");
    assert_eq!(requests[0].form_value("grant_type"), Some("refresh_token"));
    assert_eq!(requests[0].form_value("refresh_token"), Some("refresh-0"));
    assert_eq!(
        requests[0].header_value("authorization"),
        Some("Basic Y2xpZW50LWlkOmNsaWVudC1zZWNyZXQ=")
    );
    assert_eq!(requests[0].header_value("accept"), Some("application/json"));

    let credential = tokens.credential().await;
    assert_eq!(credential.expires_in_ms, 3_600_000);
    assert_eq!(credential.last_refresh_ms, 70_001);
    assert_eq!(credential.refresh_token.as_deref(), Some("refresh-0"));
}

#[tokio::test]
async fn test_last_refresh_is_taken_after_the_call() {
    let clock = Arc::new(ManualClock::new(100_000));
    let responder_clock = Arc::clone(&clock);
    let transport = Arc::new(MockTransport::new(move |_| {
        // The request takes 250 ms.
        responder_clock.advance(250);
        Ok(HttpResponse::new(200, token_body("fresh", 60)))
    }));

    let tokens = manager(Credential::from_refresh_token("r"), transport, clock.clone());
    tokens.ensure_valid_access_token().await.unwrap();

    assert_eq!(tokens.credential().await.last_refresh_ms, 100_250);
    assert_eq!(clock.now_millis(), 100_250);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let transport = Arc::new(
        MockTransport::ok(token_body("fresh", 3600)).with_delay(Duration::from_millis(50)),
    );
    let clock = Arc::new(ManualClock::new(1_000_000));
    let tokens = Arc::new(manager(
        fresh_credential("stale", 0, 1_000),
        transport.clone(),
        clock,
    ));

    let calls = (0..16).map(|_| {
        let tokens = Arc::clone(&tokens);
        tokio::spawn(async move { tokens.ensure_valid_access_token().await })
    });

    for result in join_all(calls).await {
        assert_eq!(result.unwrap().unwrap(), "fresh");
    }
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_refresh_error_is_reported_as_refresh_stage() {
    let transport = Arc::new(MockTransport::new(|_| {
        Ok(HttpResponse::new(
            400,
            json!({ "error": "invalid_grant", "error_description": "Refresh token revoked" }),
        ))
    }));
    let tokens = manager(
        fresh_credential("stale", 0, 1),
        transport,
        Arc::new(ManualClock::new(10)),
    );

    let err = tokens.ensure_valid_access_token().await.unwrap_err();
    assert_eq!(
        err,
        Error::Auth {
            stage: AuthStage::Refresh,
            description: "Refresh token revoked".to_string(),
        }
    );
    assert!(err.requires_reauthentication());

    // The stale credential is left alone.
    assert_eq!(
        tokens.credential().await.access_token.as_deref(),
        Some("stale")
    );
}

#[tokio::test]
async fn test_transport_failure_is_not_an_auth_error() {
    let transport = Arc::new(MockTransport::new(|_| {
        Err(Error::Transport("connection refused".to_string()))
    }));
    let tokens = manager(
        Credential::from_refresh_token("r"),
        transport,
        Arc::new(ManualClock::new(0)),
    );

    let err = tokens.ensure_valid_access_token().await.unwrap_err();
    assert!(err.is_transport_error());
    assert!(!err.is_auth_error());
}

#[tokio::test]
async fn test_missing_refresh_token_fails_without_network() {
    let transport = Arc::new(MockTransport::ok(token_body("x", 1)));
    let tokens = manager(Credential::default(), transport.clone(), Arc::new(ManualClock::new(0)));

    let err = tokens.ensure_valid_access_token().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Auth {
            stage: AuthStage::Refresh,
            ..
        }
    ));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_rotated_refresh_token_is_persisted() {
    let transport = Arc::new(MockTransport::ok(json!({
        "access_token": "fresh",
        "refresh_token": "refresh-1",
        "expires_in": 3600
    })));
    let store = Arc::new(MemoryTokenStore::new());
    let tokens = manager(
        Credential::from_refresh_token("refresh-0"),
        transport,
        Arc::new(ManualClock::new(5)),
    )
    .with_store(store.clone());

    tokens.ensure_valid_access_token().await.unwrap();

    let stored = store.load().await.unwrap().expect("credential persisted");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(stored.access_token.as_deref(), Some("fresh"));
    assert_eq!(stored.last_refresh_ms, 5);
}

#[tokio::test]
async fn test_unchanged_refresh_token_is_not_persisted() {
    let transport = Arc::new(MockTransport::ok(token_body("fresh", 3600)));
    let store = Arc::new(MemoryTokenStore::new());
    let tokens = manager(
        Credential::from_refresh_token("refresh-0"),
        transport,
        Arc::new(ManualClock::new(5)),
    )
    .with_store(store.clone());

    tokens.ensure_valid_access_token().await.unwrap();
    assert_eq!(store.load().await.unwrap(), None);
}

#[tokio::test]
async fn test_code_exchange_seeds_and_persists_credential() {
    let transport = Arc::new(MockTransport::ok(json!({
        "access_token": "first",
        "refresh_token": "refresh-a",
        "expires_in": 3600
    })));
    let store = Arc::new(MemoryTokenStore::new());
    let clock = Arc::new(ManualClock::new(42));
    let tokens = manager(Credential::default(), transport.clone(), clock.clone())
        .with_store(store.clone());

    let grant = tokens.exchange_authorization_code("code-123").await.unwrap();
    assert_eq!(grant.access_token, "first");
    assert_eq!(grant.refresh_token.as_deref(), Some("refresh-a"));
    assert_eq!(grant.expires_in, 3600);

    let request = &transport.requests()[0];
    assert_eq!(request.form_value("grant_type"), Some("authorization_code"));
    assert_eq!(request.form_value("code"), Some("code-123"));
    assert_eq!(
        request.form_value("redirect_uri"),
        Some("http://127.0.0.1:8888/callback")
    );

    let expected = Credential {
        access_token: Some("first".to_string()),
        refresh_token: Some("refresh-a".to_string()),
        expires_in_ms: 3_600_000,
        last_refresh_ms: 42,
    };
    assert_eq!(tokens.credential().await, expected);
    assert_eq!(store.load().await.unwrap(), Some(expected));

    // Seeded token is used without another request.
    clock.advance(1_000);
    assert_eq!(tokens.ensure_valid_access_token().await.unwrap(), "first");
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_load_from_store_replaces_credential() {
    let store = Arc::new(MemoryTokenStore::new());
    store
        .save(&fresh_credential("stored", 1_000, 3_600_000))
        .await
        .unwrap();

    let transport = Arc::new(MockTransport::ok(token_body("x", 1)));
    let tokens = manager(Credential::default(), transport.clone(), Arc::new(ManualClock::new(2_000)))
        .with_store(store);

    assert!(tokens.load_from_store().await.unwrap());
    assert_eq!(tokens.ensure_valid_access_token().await.unwrap(), "stored");
    assert_eq!(transport.calls(), 0);
}

#[test]
fn test_authorization_url_encodes_joined_scopes_once() {
    let tokens = manager(
        Credential::default(),
        Arc::new(MockTransport::ok(json!({}))),
        Arc::new(ManualClock::new(0)),
    );

    let url = tokens.build_authorization_url(["a", "b c"]);
    assert!(url.starts_with("https://accounts.spotify.com/authorize?response_type=code"));
    assert!(url.contains("&client_id=client-id"));
    assert!(url.contains("&scope=a%20b%20c"));
    assert!(!url.contains("%2520"));
    assert!(url.ends_with("&redirect_uri=http%3A%2F%2F127.0.0.1%3A8888%2Fcallback"));

    assert_eq!(
        tokens.build_authorization_url("a b c"),
        tokens.build_authorization_url(vec!["a", "b", "c"])
    );
}

#[tokio::test]
async fn test_out_of_range_lifetime_is_rejected() {
    for expires_in in [i64::MAX / 10, i64::MAX, -1] {
        let transport = Arc::new(MockTransport::ok(json!({
            "access_token": "x",
            "expires_in": expires_in
        })));
        let tokens = manager(
            fresh_credential("stale", 0, 1),
            transport,
            Arc::new(ManualClock::new(10)),
        );

        let err = tokens.ensure_valid_access_token().await.unwrap_err();
        assert!(
            matches!(err, Error::Auth { stage: AuthStage::Refresh, .. }),
            "expires_in {expires_in}: {err:?}"
        );
        assert_eq!(
            tokens.credential().await.access_token.as_deref(),
            Some("stale")
        );
    }
}

#[tokio::test]
async fn test_code_exchange_rejects_negative_lifetime() {
    let transport = Arc::new(MockTransport::ok(json!({
        "access_token": "x",
        "refresh_token": "r",
        "expires_in": -3600
    })));
    let tokens = manager(Credential::default(), transport, Arc::new(ManualClock::new(0)));

    let err = tokens.exchange_authorization_code("code").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Auth {
            stage: AuthStage::CodeExchange,
            ..
        }
    ));
}

#[test]
fn test_corrupt_stored_expiry_does_not_overflow() {
    let credential = Credential {
        access_token: Some("a".to_string()),
        refresh_token: None,
        expires_in_ms: i64::MAX,
        last_refresh_ms: 1_000,
    };

    assert_eq!(credential.expires_at_ms(), i64::MAX);
    assert!(credential.is_valid_at(i64::MAX));
}
