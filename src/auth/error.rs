use thiserror::Error;

use super::TokenError;
use crate::store::StoreError;

/// Failures of the auth core and the account flows built on it.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
    #[error("account not found")]
    AccountNotFound,
    #[error("session not found")]
    SessionNotFound,
    #[error("credential mismatch")]
    CredentialMismatch,
    /// Wait this many seconds before asking for another code.
    #[error("code requested too often, retry in {0}s")]
    Throttled(u64),
    #[error("verification code invalid")]
    CodeInvalid,
    #[error("display name or email already in use")]
    NameOrEmailTaken,
    #[error("game id already linked")]
    GameIdTaken,
    #[error("bot verification failed")]
    BotCheckFailed,
    #[error("bot verification service error: {0}")]
    BotService(String),
    #[error("mail delivery failed: {0}")]
    MailDelivery(String),
    #[error("token issuance failed: {0}")]
    TokenIssue(#[source] TokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
