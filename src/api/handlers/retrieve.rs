//! Password retrieval endpoints.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;

use super::{
    error_response, extract_client_ip, message, missing_payload, normalize_email,
    require_fields,
};
use crate::api::types::{
    CheckEmailRequest, ErrorResponse, ExistsResponse, MessageResponse, RetrievalCodeRequest,
    RetrieveRequest,
};
use crate::api::AppState;
use crate::auth::AuthError;

#[utoipa::path(
    post,
    path = "/retrieve/check",
    request_body = CheckEmailRequest,
    responses(
        (status = 200, description = "Whether the email has an account", body = ExistsResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse)
    ),
    tag = "retrieve"
)]
pub async fn check(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<CheckEmailRequest>>,
) -> impl IntoResponse {
    let request: CheckEmailRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if let Err(response) = require_fields(&[("email", request.email.as_str())]) {
        return response;
    }

    match state
        .accounts()
        .check_email(&normalize_email(&request.email))
        .await
    {
        Ok(is_exist) => (StatusCode::OK, Json(ExistsResponse { is_exist })).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/retrieve/code",
    request_body = RetrievalCodeRequest,
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 400, description = "Missing fields or bot check failed", body = ErrorResponse),
        (status = 404, description = "No account for this email", body = ErrorResponse),
        (status = 429, description = "Requested too often", body = ErrorResponse)
    ),
    tag = "retrieve"
)]
pub async fn request_code(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<RetrievalCodeRequest>>,
) -> impl IntoResponse {
    let request: RetrievalCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if let Err(response) = require_fields(&[
        ("email", request.email.as_str()),
        ("challenge", request.challenge.as_str()),
    ]) {
        return response;
    }

    let email = normalize_email(&request.email);
    let ip = extract_client_ip(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.trust_proxy(),
    );
    match state
        .accounts()
        .request_retrieval_code(&email, &request.challenge, &ip)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Code sent".to_string(),
            }),
        )
            .into_response(),
        Err(AuthError::AccountNotFound) => message(StatusCode::NOT_FOUND, "Email not registered"),
        Err(err) => error_response(&err),
    }
}

/// Reset the password with the emailed code. Every session is signed out.
#[utoipa::path(
    post,
    path = "/retrieve",
    request_body = RetrieveRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Missing fields or invalid code", body = ErrorResponse)
    ),
    tag = "retrieve"
)]
pub async fn retrieve(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<RetrieveRequest>>,
) -> impl IntoResponse {
    let request: RetrieveRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if let Err(response) = require_fields(&[
        ("email", request.email.as_str()),
        ("password", request.password.as_str()),
        ("code", request.code.as_str()),
    ]) {
        return response;
    }

    let email = normalize_email(&request.email);
    match state
        .accounts()
        .retrieve(&email, &request.password, request.code.trim())
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Password reset".to_string(),
            }),
        )
            .into_response(),
        // A code can only exist for an email that requested it, so a missing
        // account here means it was removed in between.
        Err(AuthError::AccountNotFound) => {
            message(StatusCode::BAD_REQUEST, "Verification code invalid")
        }
        Err(err) => error_response(&err),
    }
}
