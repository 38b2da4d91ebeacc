//! Registration endpoints: availability check, code request, account creation.

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
    require_fields, valid_email,
};
use crate::api::types::{
    CheckNameAndEmailRequest, ErrorResponse, ExistsResponse, MessageResponse,
    RegisterRequest, RegistrationCodeRequest,
};
use crate::api::AppState;

/// Whether the display name or the email is already registered.
#[utoipa::path(
    post,
    path = "/register/check",
    request_body = CheckNameAndEmailRequest,
    responses(
        (status = 200, description = "Availability", body = ExistsResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse)
    ),
    tag = "register"
)]
pub async fn check(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<CheckNameAndEmailRequest>>,
) -> impl IntoResponse {
    let request: CheckNameAndEmailRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if let Err(response) = require_fields(&[
        ("name", request.name.as_str()),
        ("email", request.email.as_str()),
    ]) {
        return response;
    }

    let email = normalize_email(&request.email);
    match state
        .accounts()
        .check_name_and_email(request.name.trim(), &email)
        .await
    {
        Ok(is_exist) => (StatusCode::OK, Json(ExistsResponse { is_exist })).into_response(),
        Err(err) => error_response(&err),
    }
}

/// Send a registration code after the bot check.
#[utoipa::path(
    post,
    path = "/register/code",
    request_body = RegistrationCodeRequest,
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 400, description = "Missing fields or bot check failed", body = ErrorResponse),
        (status = 429, description = "Requested too often", body = ErrorResponse),
        (status = 500, description = "Mail delivery failed", body = ErrorResponse)
    ),
    tag = "register"
)]
pub async fn request_code(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<RegistrationCodeRequest>>,
) -> impl IntoResponse {
    let request: RegistrationCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if let Err(response) = require_fields(&[
        ("email", request.email.as_str()),
        ("name", request.name.as_str()),
        ("challenge", request.challenge.as_str()),
    ]) {
        return response;
    }

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return message(StatusCode::BAD_REQUEST, "Invalid email");
    }

    let ip = extract_client_ip(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.trust_proxy(),
    );
    match state
        .accounts()
        .request_registration_code(&email, request.name.trim(), &request.challenge, &ip)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Code sent".to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// Create an account with the emailed code.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = MessageResponse),
        (status = 400, description = "Missing fields or invalid code", body = ErrorResponse),
        (status = 409, description = "Display name or email taken", body = ErrorResponse)
    ),
    tag = "register"
)]
pub async fn register(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if let Err(response) = require_fields(&[
        ("name", request.name.as_str()),
        ("email", request.email.as_str()),
        ("password", request.password.as_str()),
        ("code", request.code.as_str()),
    ]) {
        return response;
    }

    let email = normalize_email(&request.email);
    match state
        .accounts()
        .register(
            request.name.trim(),
            &email,
            &request.password,
            request.code.trim(),
        )
        .await
    {
        Ok(_account) => (
            StatusCode::CREATED,
            Json(MessageResponse {
                message: "Registered".to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
