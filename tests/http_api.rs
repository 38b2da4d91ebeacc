//! HTTP surface driven through the router with in-memory collaborators.

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use daling::account::AccountService;
use daling::api::{router, AppState};
use daling::auth::{
    AuthFacade, ManualClock, SequenceCodeSource, SessionManager, TokenService,
    VerificationCodeService,
};
use daling::captcha::AllowAllVerifier;
use daling::mail::LogMailSender;
use daling::store::{MemoryAccountStore, MemoryCache};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app(codes: &[&str]) -> Router {
    app_with(codes, false)
}

fn app_with(codes: &[&str], trust_proxy: bool) -> Router {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let store = Arc::new(MemoryAccountStore::new());
    let tokens = TokenService::new(
        SecretString::from("http-secret"),
        Duration::from_secs(30 * 24 * 60 * 60),
        clock.clone(),
    );
    let sessions = SessionManager::new(store.clone(), clock.clone());
    let auth = Arc::new(AuthFacade::new(store.clone(), tokens, sessions));
    let codes = VerificationCodeService::new(
        Arc::new(MemoryCache::with_clock(clock)),
        Arc::new(SequenceCodeSource::new(codes.iter().copied())),
    );
    let accounts = AccountService::new(
        store,
        auth,
        codes,
        Arc::new(LogMailSender),
        Arc::new(AllowAllVerifier),
    );
    router(Arc::new(AppState::new(accounts).with_trust_proxy(trust_proxy)))
}

async fn post(app: &Router, uri: &str, body: &Value) -> Result<(StatusCode, Value)> {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))?,
        )
        .await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

async fn register(app: &Router, name: &str, email: &str, code: &str) -> Result<()> {
    let (status, _) = post(
        app,
        "/register/code",
        &json!({ "email": email, "name": name, "challenge": "ok" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(
        app,
        "/register",
        &json!({ "name": name, "email": email, "password": "hunter2", "code": code }),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(())
}

async fn login(app: &Router, email: &str, password: &str) -> Result<(StatusCode, Value)> {
    post(app, "/login", &json!({ "email": email, "password": password })).await
}

async fn token_for(app: &Router, email: &str) -> Result<String> {
    let (status, body) = login(app, email, "hunter2").await?;
    assert_eq!(status, StatusCode::OK);
    body["token"]
        .as_str()
        .map(ToString::to_string)
        .context("token missing")
}

#[tokio::test]
async fn health_reports_memory_backend() -> Result<()> {
    let app = app(&[]);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("x-app"));
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert_eq!(body["name"], "daling");
    assert_eq!(body["database"], "memory");
    Ok(())
}

#[tokio::test]
async fn request_id_is_propagated() -> Result<()> {
    let app = app(&[]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "01HZX3J6Q8Y2N5V7W9A1B3C5D7")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("01HZX3J6Q8Y2N5V7W9A1B3C5D7")
    );
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let app = app(&[]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert!(body["paths"]["/login"].is_object());
    Ok(())
}

#[tokio::test]
async fn missing_payload_and_fields_are_bad_requests() -> Result<()> {
    let app = app(&[]);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = login(&app, "steve@daling.ac.cn", "  ").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing password");
    Ok(())
}

#[tokio::test]
async fn register_login_and_fetch_info() -> Result<()> {
    let app = app(&["482913"]);
    register(&app, "Steve", "Steve@Daling.ac.cn ", "482913").await?;

    let token = token_for(&app, "steve@daling.ac.cn").await?;
    let (status, body) = post(&app, "/login/verify", &json!({ "token": token })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_login"], true);

    let (status, body) = post(&app, "/user/info", &json!({ "token": token })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["display_name"], "Steve");
    assert_eq!(body["email"], "steve@daling.ac.cn");
    assert!(body.get("credential_hash").is_none());
    assert_eq!(body["sessions"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn login_errors_look_the_same() -> Result<()> {
    let app = app(&["482913"]);
    register(&app, "Steve", "steve@daling.ac.cn", "482913").await?;

    let wrong_password = login(&app, "steve@daling.ac.cn", "wrong").await?;
    let unknown_email = login(&app, "nobody@daling.ac.cn", "hunter2").await?;
    assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_email);
    Ok(())
}

#[tokio::test]
async fn immediate_resend_is_throttled() -> Result<()> {
    let app = app(&["482913"]);
    let request = json!({ "email": "a@x.com", "name": "A", "challenge": "ok" });

    let (status, _) = post(&app, "/register/code", &request).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(&app, "/register/code", &request).await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["retry_after"], 120);
    Ok(())
}

#[tokio::test]
async fn invalid_email_is_rejected_before_sending() -> Result<()> {
    let app = app(&[]);
    let (status, body) = post(
        &app,
        "/register/code",
        &json!({ "email": "not-an-email", "name": "A", "challenge": "ok" }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid email");
    Ok(())
}

#[tokio::test]
async fn wrong_code_and_taken_name() -> Result<()> {
    let app = app(&["482913", "555555"]);
    register(&app, "Steve", "steve@daling.ac.cn", "482913").await?;

    let (status, body) = post(
        &app,
        "/register/check",
        &json!({ "name": "Steve", "email": "other@daling.ac.cn" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_exist"], true);

    let (status, _) = post(
        &app,
        "/register/code",
        &json!({ "email": "other@daling.ac.cn", "name": "Steve", "challenge": "ok" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(
        &app,
        "/register",
        &json!({ "name": "Steve", "email": "other@daling.ac.cn", "password": "pw", "code": "000000" }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(
        &app,
        "/register",
        &json!({ "name": "Steve", "email": "other@daling.ac.cn", "password": "pw", "code": "555555" }),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn offline_and_offline_all() -> Result<()> {
    let app = app(&["482913"]);
    register(&app, "Steve", "steve@daling.ac.cn", "482913").await?;
    let first = token_for(&app, "steve@daling.ac.cn").await?;
    let second = token_for(&app, "steve@daling.ac.cn").await?;
    let third = token_for(&app, "steve@daling.ac.cn").await?;

    let (_, info) = post(&app, "/user/info", &json!({ "token": second })).await?;
    let second_session = info["current_session"]
        .as_str()
        .context("current_session missing")?
        .to_string();

    let (status, body) = post(
        &app,
        "/user/offline",
        &json!({ "token": first, "session_id": second_session }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_current_device"], false);

    let (status, body) = post(&app, "/login/verify", &json!({ "token": second })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_login"], false);

    let (status, _) = post(
        &app,
        "/user/offline",
        &json!({ "token": first, "session_id": second_session }),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(&app, "/user/offline/all", &json!({ "token": third })).await?;
    assert_eq!(status, StatusCode::OK);

    for token in [&first, &third] {
        let (status, _) = post(&app, "/user/info", &json!({ "token": token })).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    Ok(())
}

#[tokio::test]
async fn tampered_token_is_unauthorized() -> Result<()> {
    let app = app(&["482913"]);
    register(&app, "Steve", "steve@daling.ac.cn", "482913").await?;
    let token = token_for(&app, "steve@daling.ac.cn").await?;
    let tampered = format!("{token}x");

    let (status, _) = post(&app, "/user/info", &json!({ "token": tampered })).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = post(&app, "/login/verify", &json!({ "token": tampered })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_login"], false);
    Ok(())
}

#[tokio::test]
async fn retrieve_flow_signs_everyone_out() -> Result<()> {
    let app = app(&["482913", "900001"]);
    register(&app, "Steve", "steve@daling.ac.cn", "482913").await?;
    let token = token_for(&app, "steve@daling.ac.cn").await?;

    let (status, body) = post(
        &app,
        "/retrieve/check",
        &json!({ "email": "steve@daling.ac.cn" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_exist"], true);

    let (status, _) = post(
        &app,
        "/retrieve/code",
        &json!({ "email": "nobody@daling.ac.cn", "challenge": "ok" }),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(
        &app,
        "/retrieve/code",
        &json!({ "email": "steve@daling.ac.cn", "challenge": "ok" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(
        &app,
        "/retrieve",
        &json!({ "email": "steve@daling.ac.cn", "password": "correct horse", "code": "900001" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(&app, "/user/info", &json!({ "token": token })).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = login(&app, "steve@daling.ac.cn", "correct horse").await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn profile_endpoints() -> Result<()> {
    let app = app(&["482913"]);
    register(&app, "Steve", "steve@daling.ac.cn", "482913").await?;
    let token = token_for(&app, "steve@daling.ac.cn").await?;

    let (status, _) = post(&app, "/user/name", &json!({ "token": token, "name": "Alex" })).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(
        &app,
        "/user/java-id",
        &json!({ "token": token, "game_id": "Notch" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(
        &app,
        "/user/xbox-id",
        &json!({ "token": token, "game_id": "Notch" }),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = post(&app, "/user/xbox-id", &json!({ "token": token, "game_id": "" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, info) = post(&app, "/user/info", &json!({ "token": token })).await?;
    assert_eq!(info["display_name"], "Alex");
    assert_eq!(info["java_id"], "Notch");

    let (status, _) = post(
        &app,
        "/user/password",
        &json!({ "token": token, "password": "new password" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(&app, "/user/info", &json!({ "token": token })).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = login(&app, "steve@daling.ac.cn", "new password").await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn verify_without_token_is_bad_request() -> Result<()> {
    let app = app(&[]);
    let (status, body) = post(&app, "/login/verify", &json!({ "token": " " })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["is_login"], false);

    let (status, body) = post(&app, "/login/verify", &json!({})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["is_login"], false);
    Ok(())
}

/// Log in from `peer` with a spoofed `X-Forwarded-For` and return the recorded
/// session IP.
async fn session_ip(app: &Router, peer: SocketAddr) -> Result<String> {
    register(app, "Steve", "steve@daling.ac.cn", "482913").await?;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(CONTENT_TYPE, "application/json")
                .header("x-forwarded-for", "203.0.113.9")
                .extension(ConnectInfo(peer))
                .body(Body::from(
                    json!({ "email": "steve@daling.ac.cn", "password": "hunter2" }).to_string(),
                ))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    let token = body["token"].as_str().context("token missing")?;

    let (status, info) = post(app, "/user/info", &json!({ "token": token })).await?;
    assert_eq!(status, StatusCode::OK);
    info["sessions"][0]["ip"]
        .as_str()
        .map(ToString::to_string)
        .context("session ip missing")
}

#[tokio::test]
async fn forwarded_for_is_ignored_without_trusted_proxy() -> Result<()> {
    let peer: SocketAddr = ([192, 0, 2, 7], 40000).into();
    assert_eq!(session_ip(&app_with(&["482913"], false), peer).await?, "192.0.2.7");
    Ok(())
}

#[tokio::test]
async fn forwarded_for_is_used_behind_trusted_proxy() -> Result<()> {
    let peer: SocketAddr = ([10, 0, 0, 2], 40000).into();
    assert_eq!(session_ip(&app_with(&["482913"], true), peer).await?, "203.0.113.9");
    Ok(())
}
