//! Collaborator interfaces for the account store and the ephemeral cache.
//!
//! The auth core only talks to these traits. Two backends ship with the crate:
//!
//! - `postgres`: `PgAccountStore` keeps one row per account with the session list
//!   as `JSONB`; `PgCache` keeps verification codes with an `expires_at` column.
//! - `memory`: in-process maps used by tests and local runs. `MemoryCache` reads
//!   time from an injected [`Clock`](crate::auth::Clock) so TTL expiry can be simulated.
//!
//! Neither backend retries. Transport failures surface as [`StoreError`] and are
//! passed up unmodified.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::model::{Account, Session};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryAccountStore, MemoryCache};
pub use postgres::{PgAccountStore, PgCache};

/// Boxed future returned by the collaborator traits so they stay object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid stored record: {0}")]
    Corrupt(String),
    #[error("unique constraint violated")]
    Conflict,
}

/// Equality filters understood by every account store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountFilter {
    Id(String),
    Email(String),
    DisplayName(String),
    /// Matches when either the display name or the email is taken.
    NameOrEmail { name: String, email: String },
    /// Matches when the value is linked as either a Java or an Xbox id.
    GameId(String),
}

impl AccountFilter {
    /// In-process evaluation, shared by the memory store and tests.
    #[must_use]
    pub fn matches(&self, account: &Account) -> bool {
        match self {
            Self::Id(id) => account.id == *id,
            Self::Email(email) => account.email == *email,
            Self::DisplayName(name) => account.display_name == *name,
            Self::NameOrEmail { name, email } => {
                account.display_name == *name || account.email == *email
            }
            Self::GameId(game_id) => account.java_id == *game_id || account.xbox_id == *game_id,
        }
    }
}

/// Partial updates, the equivalent of `$set` / `$pull` on a document store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountPatch {
    SetSessions(Vec<Session>),
    PullSession(String),
    SetCredentialHash(String),
    SetDisplayName(String),
    SetJavaId(String),
    SetXboxId(String),
}

impl AccountPatch {
    /// Apply the patch to an in-memory record.
    pub fn apply(&self, account: &mut Account) {
        match self {
            Self::SetSessions(sessions) => account.sessions.clone_from(sessions),
            Self::PullSession(session_id) => account
                .sessions
                .retain(|session| session.session_id != *session_id),
            Self::SetCredentialHash(hash) => account.credential_hash.clone_from(hash),
            Self::SetDisplayName(name) => account.display_name.clone_from(name),
            Self::SetJavaId(id) => account.java_id.clone_from(id),
            Self::SetXboxId(id) => account.xbox_id.clone_from(id),
        }
    }
}

/// Durable per-account records.
pub trait AccountStore: Send + Sync {
    fn find<'a>(&'a self, filter: &'a AccountFilter)
        -> BoxFuture<'a, Result<Vec<Account>, StoreError>>;

    fn insert<'a>(&'a self, account: &'a Account) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Apply `patch` to the first account matching `filter`; returns the number of
    /// records touched (0 or 1).
    fn update<'a>(
        &'a self,
        filter: &'a AccountFilter,
        patch: &'a AccountPatch,
    ) -> BoxFuture<'a, Result<u64, StoreError>>;

    fn delete<'a>(&'a self, filter: &'a AccountFilter) -> BoxFuture<'a, Result<u64, StoreError>>;
}

/// Key/value store whose entries expire on their own.
pub trait EphemeralCache: Send + Sync {
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl_seconds: u64,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>>;

    /// Remaining lifetime in whole seconds (rounded up), 0 when absent.
    fn ttl<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<u64, StoreError>>;

    fn del<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;
}
