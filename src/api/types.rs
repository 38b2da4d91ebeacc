//! Request/response types for the HTTP endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::{Account, Session};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub message: String,
    /// Seconds to wait before retrying; only set on 429.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginStatusResponse {
    pub is_login: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CheckNameAndEmailRequest {
    pub name: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CheckEmailRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ExistsResponse {
    pub is_exist: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegistrationCodeRequest {
    pub email: String,
    pub name: String,
    /// Turnstile challenge response from the client widget.
    pub challenge: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RetrievalCodeRequest {
    pub email: String,
    pub challenge: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RetrieveRequest {
    pub email: String,
    pub password: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OfflineRequest {
    pub token: String,
    pub session_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OfflineResponse {
    pub is_current_device: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangeNameRequest {
    pub token: String,
    pub name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LinkGameIdRequest {
    pub token: String,
    pub game_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct SessionView {
    pub session_id: String,
    pub ip: String,
    pub login_time: i64,
    pub source: String,
    pub client_version: String,
    pub browser: String,
    pub os: String,
    pub platform: String,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            ip: session.ip.clone(),
            login_time: session.login_time,
            source: session.source.clone(),
            client_version: session.client_version.clone(),
            browser: session.browser.clone(),
            os: session.os.clone(),
            platform: session.platform.clone(),
        }
    }
}

/// Account as returned to its owner. The credential hash is never included.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccountView {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub java_id: String,
    pub xbox_id: String,
    pub sessions: Vec<SessionView>,
    pub current_session: String,
    pub permissions: Vec<String>,
    pub balances: [i64; 2],
}

impl AccountView {
    #[must_use]
    pub fn new(account: &Account, current_session: &str) -> Self {
        Self {
            id: account.id.clone(),
            display_name: account.display_name.clone(),
            email: account.email.clone(),
            java_id: account.java_id.clone(),
            xbox_id: account.xbox_id.clone(),
            sessions: account.sessions.iter().map(SessionView::from).collect(),
            current_session: current_session.to_string(),
            permissions: account.permissions.clone(),
            balances: account.balances,
        }
    }
}
