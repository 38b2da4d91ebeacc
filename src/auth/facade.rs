//! Login, session verification and logout on top of the token service and the
//! session manager.

use std::sync::Arc;
use tracing::{debug, instrument};

use super::{AuthError, SessionManager, TokenService};
use crate::model::{Account, SessionMetadata};
use crate::store::{AccountFilter, AccountStore};

/// An account whose bearer token passed every check, with the session that token
/// is bound to.
#[derive(Clone, Debug)]
pub struct AuthenticatedAccount {
    pub account: Account,
    pub current_session: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogoutOutcome {
    pub is_current_device: bool,
}

pub struct AuthFacade {
    store: Arc<dyn AccountStore>,
    tokens: TokenService,
    sessions: SessionManager,
}

impl AuthFacade {
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, tokens: TokenService, sessions: SessionManager) -> Self {
        Self {
            store,
            tokens,
            sessions,
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Open a new session and return its bearer token.
    ///
    /// # Errors
    /// `AccountNotFound` or `CredentialMismatch`; callers must present both to
    /// clients identically.
    #[instrument(skip(self, credential_hash, metadata))]
    pub async fn login(
        &self,
        email: &str,
        credential_hash: &str,
        metadata: SessionMetadata,
    ) -> Result<String, AuthError> {
        let mut account = self
            .store
            .find(&AccountFilter::Email(email.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or(AuthError::AccountNotFound)?;
        if account.credential_hash != credential_hash {
            return Err(AuthError::CredentialMismatch);
        }

        let session = self.sessions.create_session(&mut account, metadata).await?;
        let token = self
            .tokens
            .issue(&account.id, &session.session_id)
            .map_err(AuthError::TokenIssue)?;
        debug!(account_id = %account.id, "login succeeded");
        Ok(token)
    }

    /// Resolve a bearer token to its account.
    ///
    /// Returns `Ok(None)` when the token is well formed but its account or session
    /// is gone, or the session is older than the validity window.
    ///
    /// # Errors
    /// `InvalidToken` when the signature, structure or expiry check fails.
    pub async fn verify_session(&self, token: &str) -> Result<Option<AuthenticatedAccount>, AuthError> {
        let claims = self.tokens.verify(token).map_err(|err| {
            debug!("token rejected: {err}");
            AuthError::InvalidToken
        })?;

        let Some(account) = self
            .store
            .find(&AccountFilter::Id(claims.account_id))
            .await?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };

        let fresh = match SessionManager::find_session(&account, &claims.session_id) {
            Some(session) => self.sessions.is_session_fresh(session, self.tokens.validity()),
            None => return Ok(None),
        };
        if !fresh {
            return Ok(None);
        }

        Ok(Some(AuthenticatedAccount {
            account,
            current_session: claims.session_id,
        }))
    }

    /// Remove one of the caller's sessions.
    ///
    /// # Errors
    /// `AccountNotFound`, `SessionNotFound` or `Store`.
    pub async fn logout(
        &self,
        current: &AuthenticatedAccount,
        session_id: &str,
    ) -> Result<LogoutOutcome, AuthError> {
        self.sessions
            .remove_session(&current.account.id, session_id)
            .await?;
        Ok(LogoutOutcome {
            is_current_device: current.current_session == session_id,
        })
    }

    /// Invalidate every session of the account.
    ///
    /// # Errors
    /// `AccountNotFound` or `Store`.
    pub async fn logout_all(&self, account_id: &str) -> Result<(), AuthError> {
        self.sessions.remove_all_sessions(account_id).await
    }
}
