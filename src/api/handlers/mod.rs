pub mod health;
pub mod login;
pub mod register;
pub mod retrieve;
pub mod user;

// common functions for the handlers
use axum::{
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use regex::Regex;
use std::net::SocketAddr;
use tracing::error;

use super::types::ErrorResponse;
use super::AppState;
use crate::auth::{AuthError, AuthenticatedAccount};
use crate::model::SessionMetadata;

/// Shown for both unknown email and wrong password.
pub const LOGIN_FAILED: &str = "Invalid email or password";

/// Normalize an email for lookup/uniqueness checks.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Client IP. Proxy headers are read only when `trust_proxy` is set, otherwise
/// the peer address is used.
pub fn extract_client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy: bool,
) -> String {
    let peer_ip = || peer.map(|addr| addr.ip().to_string()).unwrap_or_default();
    if !trust_proxy {
        return peer_ip();
    }
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(peer_ip, str::to_string)
}

fn capture<'a>(pattern: &str, haystack: &'a str) -> Option<&'a str> {
    Regex::new(pattern)
        .ok()?
        .captures(haystack)?
        .get(1)
        .map(|m| m.as_str())
}

/// Coarse browser/os/platform guess from a `User-Agent` string.
pub fn parse_user_agent(user_agent: &str) -> (String, String, String, String) {
    let (browser, version) = [
        ("Edge", r"Edg(?:e|A|iOS)?/([\d.]+)"),
        ("Opera", r"OPR/([\d.]+)"),
        ("Firefox", r"Firefox/([\d.]+)"),
        ("Chrome", r"Chrome/([\d.]+)"),
        ("Safari", r"Version/([\d.]+).*Safari/"),
    ]
    .iter()
    .find_map(|(name, pattern)| capture(pattern, user_agent).map(|v| (*name, v)))
    .unwrap_or(("unknown", "unknown"));

    let os = if user_agent.contains("Windows") {
        "Windows"
    } else if user_agent.contains("Android") {
        "Android"
    } else if user_agent.contains("iPhone") || user_agent.contains("iPad") {
        "iOS"
    } else if user_agent.contains("Mac OS X") {
        "macOS"
    } else if user_agent.contains("Linux") {
        "Linux"
    } else {
        "unknown"
    };

    let platform = if user_agent.contains("iPhone") {
        "iPhone"
    } else if user_agent.contains("iPad") {
        "iPad"
    } else if user_agent.contains("Android") {
        "Android"
    } else if user_agent.contains("Macintosh") {
        "Apple Mac"
    } else if user_agent.contains("Windows") || user_agent.contains("Linux") {
        "Desktop"
    } else {
        "unknown"
    };

    (
        browser.to_string(),
        version.to_string(),
        os.to_string(),
        platform.to_string(),
    )
}

pub fn session_metadata(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy: bool,
) -> SessionMetadata {
    let source = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let (browser, client_version, os, platform) = parse_user_agent(&source);
    SessionMetadata {
        ip: extract_client_ip(headers, peer, trust_proxy),
        source,
        client_version,
        browser,
        os,
        platform,
    }
}

pub fn message(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            message: message.to_string(),
            retry_after: None,
        }),
    )
        .into_response()
}

pub fn missing_payload() -> Response {
    message(StatusCode::BAD_REQUEST, "Missing payload")
}

/// `400` when any of the named fields is blank.
pub fn require_fields(fields: &[(&str, &str)]) -> Result<(), Response> {
    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((name, _)) => Err(message(StatusCode::BAD_REQUEST, &format!("Missing {name}"))),
        None => Ok(()),
    }
}

/// Map a flow error to its HTTP response. Store details are logged, never returned.
pub fn error_response(err: &AuthError) -> Response {
    match err {
        AuthError::InvalidToken => message(StatusCode::UNAUTHORIZED, "Authentication failed"),
        AuthError::AccountNotFound | AuthError::CredentialMismatch => {
            message(StatusCode::UNAUTHORIZED, LOGIN_FAILED)
        }
        AuthError::SessionNotFound => message(StatusCode::NOT_FOUND, "Session not found"),
        AuthError::Throttled(wait) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                message: format!("Code requested too often, retry in {wait}s"),
                retry_after: Some(*wait),
            }),
        )
            .into_response(),
        AuthError::CodeInvalid => message(StatusCode::BAD_REQUEST, "Verification code invalid"),
        AuthError::NameOrEmailTaken => {
            message(StatusCode::CONFLICT, "Display name or email already in use")
        }
        AuthError::GameIdTaken => message(StatusCode::CONFLICT, "Game id already linked"),
        AuthError::BotCheckFailed => message(StatusCode::BAD_REQUEST, "Bot verification failed"),
        AuthError::BotService(reason) => {
            error!("Bot verification service error: {reason}");
            message(
                StatusCode::BAD_REQUEST,
                "Bot verification service unavailable",
            )
        }
        AuthError::MailDelivery(reason) => {
            error!("Mail delivery failed: {reason}");
            message(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send mail")
        }
        AuthError::TokenIssue(reason) => {
            error!("Token issuance failed: {reason}");
            message(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
        AuthError::Store(reason) => {
            error!("Store error: {reason}");
            message(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// Resolve the bearer token or produce the `401` to return.
pub async fn authenticate(state: &AppState, token: &str) -> Result<AuthenticatedAccount, Response> {
    match state.accounts().auth().verify_session(token).await {
        Ok(Some(current)) => Ok(current),
        Ok(None) | Err(AuthError::InvalidToken) => Err(message(
            StatusCode::UNAUTHORIZED,
            "Authentication failed",
        )),
        Err(err) => Err(error_response(&err)),
    }
}
