//! Per-account session list maintenance.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{AuthError, Clock};
use crate::model::{Account, Session, SessionMetadata};
use crate::store::{AccountFilter, AccountPatch, AccountStore};

pub struct SessionManager {
    store: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Append a fresh session to `account` and persist the whole list.
    ///
    /// # Errors
    /// Returns `AuthError::Store` if the update fails.
    pub async fn create_session(
        &self,
        account: &mut Account,
        metadata: SessionMetadata,
    ) -> Result<Session, AuthError> {
        let session = Session::new(
            Uuid::new_v4().to_string(),
            self.clock.now_millis(),
            metadata,
        );
        account.sessions.push(session.clone());
        self.store
            .update(
                &AccountFilter::Id(account.id.clone()),
                &AccountPatch::SetSessions(account.sessions.clone()),
            )
            .await?;
        debug!(account_id = %account.id, session_id = %session.session_id, "session created");
        Ok(session)
    }

    #[must_use]
    pub fn find_session<'a>(account: &'a Account, session_id: &str) -> Option<&'a Session> {
        account
            .sessions
            .iter()
            .find(|session| session.session_id == session_id)
    }

    /// True while `now - login_time` is within `window`.
    #[must_use]
    pub fn is_session_fresh(&self, session: &Session, window: Duration) -> bool {
        let window_millis = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        self.clock.now_millis().saturating_sub(session.login_time) <= window_millis
    }

    /// # Errors
    /// `AccountNotFound` or `SessionNotFound` when there is nothing to remove,
    /// `Store` on backend failure.
    pub async fn remove_session(&self, account_id: &str, session_id: &str) -> Result<(), AuthError> {
        let filter = AccountFilter::Id(account_id.to_string());
        let account = self
            .store
            .find(&filter)
            .await?
            .into_iter()
            .next()
            .ok_or(AuthError::AccountNotFound)?;
        if Self::find_session(&account, session_id).is_none() {
            return Err(AuthError::SessionNotFound);
        }
        self.store
            .update(&filter, &AccountPatch::PullSession(session_id.to_string()))
            .await?;
        debug!(account_id, session_id, "session removed");
        Ok(())
    }

    /// # Errors
    /// `AccountNotFound` when the account is missing, `Store` on backend failure.
    pub async fn remove_all_sessions(&self, account_id: &str) -> Result<(), AuthError> {
        let filter = AccountFilter::Id(account_id.to_string());
        if self.store.find(&filter).await?.is_empty() {
            return Err(AuthError::AccountNotFound);
        }
        self.store
            .update(&filter, &AccountPatch::SetSessions(Vec::new()))
            .await?;
        debug!(account_id, "all sessions removed");
        Ok(())
    }
}
