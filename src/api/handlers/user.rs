//! Endpoints for an authenticated account. Every request carries its bearer
//! token in the body.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use super::{authenticate, error_response, missing_payload, require_fields};
use crate::api::types::{
    AccountView, ChangeNameRequest, ChangePasswordRequest, ErrorResponse, LinkGameIdRequest,
    MessageResponse, OfflineRequest, OfflineResponse, TokenRequest,
};
use crate::api::AppState;

fn ok(message: &str) -> axum::response::Response {
    (
        StatusCode::OK,
        Json(MessageResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/user/info",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Account of the token holder", body = AccountView),
        (status = 401, description = "Authentication failed", body = ErrorResponse)
    ),
    tag = "user"
)]
pub async fn info(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<TokenRequest>>,
) -> impl IntoResponse {
    let request: TokenRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if let Err(response) = require_fields(&[("token", request.token.as_str())]) {
        return response;
    }

    match authenticate(&state, &request.token).await {
        Ok(current) => (
            StatusCode::OK,
            Json(AccountView::new(&current.account, &current.current_session)),
        )
            .into_response(),
        Err(response) => response,
    }
}

/// Sign out one session of the token holder.
#[utoipa::path(
    post,
    path = "/user/offline",
    request_body = OfflineRequest,
    responses(
        (status = 200, description = "Session removed", body = OfflineResponse),
        (status = 401, description = "Authentication failed", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "user"
)]
pub async fn offline(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<OfflineRequest>>,
) -> impl IntoResponse {
    let request: OfflineRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if let Err(response) = require_fields(&[
        ("token", request.token.as_str()),
        ("session_id", request.session_id.as_str()),
    ]) {
        return response;
    }

    let current = match authenticate(&state, &request.token).await {
        Ok(current) => current,
        Err(response) => return response,
    };
    match state
        .accounts()
        .auth()
        .logout(&current, &request.session_id)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(OfflineResponse {
                is_current_device: outcome.is_current_device,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// Sign out every session of the token holder.
#[utoipa::path(
    post,
    path = "/user/offline/all",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "All sessions removed", body = MessageResponse),
        (status = 401, description = "Authentication failed", body = ErrorResponse)
    ),
    tag = "user"
)]
pub async fn offline_all(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<TokenRequest>>,
) -> impl IntoResponse {
    let request: TokenRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if let Err(response) = require_fields(&[("token", request.token.as_str())]) {
        return response;
    }

    let current = match authenticate(&state, &request.token).await {
        Ok(current) => current,
        Err(response) => return response,
    };
    match state.accounts().auth().logout_all(&current.account.id).await {
        Ok(()) => ok("Signed out everywhere"),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/user/name",
    request_body = ChangeNameRequest,
    responses(
        (status = 200, description = "Display name changed", body = MessageResponse),
        (status = 401, description = "Authentication failed", body = ErrorResponse),
        (status = 409, description = "Display name taken", body = ErrorResponse)
    ),
    tag = "user"
)]
pub async fn change_name(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<ChangeNameRequest>>,
) -> impl IntoResponse {
    let request: ChangeNameRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if let Err(response) = require_fields(&[
        ("token", request.token.as_str()),
        ("name", request.name.as_str()),
    ]) {
        return response;
    }

    let current = match authenticate(&state, &request.token).await {
        Ok(current) => current,
        Err(response) => return response,
    };
    match state
        .accounts()
        .change_display_name(&current, request.name.trim())
        .await
    {
        Ok(()) => ok("Display name changed"),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/user/java-id",
    request_body = LinkGameIdRequest,
    responses(
        (status = 200, description = "Java id linked", body = MessageResponse),
        (status = 401, description = "Authentication failed", body = ErrorResponse),
        (status = 409, description = "Id already linked", body = ErrorResponse)
    ),
    tag = "user"
)]
pub async fn link_java_id(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<LinkGameIdRequest>>,
) -> impl IntoResponse {
    let request: LinkGameIdRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if let Err(response) = require_fields(&[
        ("token", request.token.as_str()),
        ("game_id", request.game_id.as_str()),
    ]) {
        return response;
    }

    let current = match authenticate(&state, &request.token).await {
        Ok(current) => current,
        Err(response) => return response,
    };
    match state
        .accounts()
        .link_java_id(&current, request.game_id.trim())
        .await
    {
        Ok(()) => ok("Java id linked"),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/user/xbox-id",
    request_body = LinkGameIdRequest,
    responses(
        (status = 200, description = "Xbox id linked", body = MessageResponse),
        (status = 401, description = "Authentication failed", body = ErrorResponse),
        (status = 409, description = "Id already linked", body = ErrorResponse)
    ),
    tag = "user"
)]
pub async fn link_xbox_id(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<LinkGameIdRequest>>,
) -> impl IntoResponse {
    let request: LinkGameIdRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if let Err(response) = require_fields(&[
        ("token", request.token.as_str()),
        ("game_id", request.game_id.as_str()),
    ]) {
        return response;
    }

    let current = match authenticate(&state, &request.token).await {
        Ok(current) => current,
        Err(response) => return response,
    };
    match state
        .accounts()
        .link_xbox_id(&current, request.game_id.trim())
        .await
    {
        Ok(()) => ok("Xbox id linked"),
        Err(err) => error_response(&err),
    }
}

/// Change the password. Every session, the caller's included, is signed out.
#[utoipa::path(
    post,
    path = "/user/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 401, description = "Authentication failed", body = ErrorResponse)
    ),
    tag = "user"
)]
pub async fn change_password(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> impl IntoResponse {
    let request: ChangePasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if let Err(response) = require_fields(&[
        ("token", request.token.as_str()),
        ("password", request.password.as_str()),
    ]) {
        return response;
    }

    let current = match authenticate(&state, &request.token).await {
        Ok(current) => current,
        Err(response) => return response,
    };
    match state
        .accounts()
        .change_password(&current, &request.password)
        .await
    {
        Ok(()) => ok("Password changed"),
        Err(err) => error_response(&err),
    }
}
