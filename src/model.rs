//! Account and session records shared by the stores and the auth core.

use serde::{Deserialize, Serialize};

/// Capability granted to every newly registered account.
pub const DEFAULT_PERMISSION: &str = "player";

/// Durable per-account record as held by the account store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub display_name: String,
    pub email: String,
    /// Output of the one-way password function. Never returned to clients.
    pub credential_hash: String,
    pub java_id: String,
    pub xbox_id: String,
    pub sessions: Vec<Session>,
    pub permissions: Vec<String>,
    pub balances: [i64; 2],
}

impl Account {
    /// Build a freshly registered account with default permissions and zero balances.
    #[must_use]
    pub fn new(id: String, display_name: String, email: String, credential_hash: String) -> Self {
        Self {
            id,
            display_name,
            email,
            credential_hash,
            java_id: String::new(),
            xbox_id: String::new(),
            sessions: Vec::new(),
            permissions: vec![DEFAULT_PERMISSION.to_string()],
            balances: [0, 0],
        }
    }
}

/// Descriptive client data captured once at login.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub ip: String,
    pub source: String,
    pub client_version: String,
    pub browser: String,
    pub os: String,
    pub platform: String,
}

/// One logged-in device. `login_time` is unix milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub ip: String,
    pub login_time: i64,
    pub source: String,
    pub client_version: String,
    pub browser: String,
    pub os: String,
    pub platform: String,
}

impl Session {
    #[must_use]
    pub fn new(session_id: String, login_time: i64, metadata: SessionMetadata) -> Self {
        Self {
            session_id,
            ip: metadata.ip,
            login_time,
            source: metadata.source,
            client_version: metadata.client_version,
            browser: metadata.browser,
            os: metadata.os,
            platform: metadata.platform,
        }
    }
}
