//! Login and login-state endpoints.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;

use super::{
    error_response, missing_payload, normalize_email, require_fields, session_metadata,
    LOGIN_FAILED,
};
use crate::api::types::{
    ErrorResponse, LoginRequest, LoginResponse, LoginStatusResponse, TokenRequest,
};
use crate::api::AppState;
use crate::auth::{hash_credential, AuthError};

/// Exchange email and password for a bearer token bound to a new session.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 401, description = "Invalid email or password", body = ErrorResponse)
    ),
    tag = "login"
)]
pub async fn login(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if let Err(response) = require_fields(&[
        ("email", request.email.as_str()),
        ("password", request.password.as_str()),
    ]) {
        return response;
    }

    let email = normalize_email(&request.email);
    let metadata = session_metadata(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.trust_proxy(),
    );
    match state
        .accounts()
        .auth()
        .login(&email, &hash_credential(&request.password), metadata)
        .await
    {
        Ok(token) => (StatusCode::OK, Json(LoginResponse { token })).into_response(),
        Err(AuthError::AccountNotFound | AuthError::CredentialMismatch) => {
            super::message(StatusCode::UNAUTHORIZED, LOGIN_FAILED)
        }
        Err(err) => error_response(&err),
    }
}

/// Report whether a token still maps to a live session.
#[utoipa::path(
    post,
    path = "/login/verify",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Login state", body = LoginStatusResponse),
        (status = 400, description = "Missing token", body = LoginStatusResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    ),
    tag = "login"
)]
pub async fn verify(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<TokenRequest>>,
) -> impl IntoResponse {
    let token = payload.map(|Json(request)| request.token).unwrap_or_default();
    if token.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(LoginStatusResponse { is_login: false }),
        )
            .into_response();
    }

    match state.accounts().auth().verify_session(&token).await {
        Ok(current) => (
            StatusCode::OK,
            Json(LoginStatusResponse {
                is_login: current.is_some(),
            }),
        )
            .into_response(),
        Err(AuthError::InvalidToken) => {
            (StatusCode::OK, Json(LoginStatusResponse { is_login: false })).into_response()
        }
        Err(err) => error_response(&err),
    }
}
