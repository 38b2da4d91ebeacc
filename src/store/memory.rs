//! In-process store and cache.
//!
//! Entries live behind a `tokio::sync::Mutex`. Each trait call takes the lock once,
//! so a single call is atomic but a read followed by a write is not, matching the
//! guarantees of the remote backends.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{AccountFilter, AccountPatch, AccountStore, BoxFuture, EphemeralCache, StoreError};
use crate::auth::{Clock, SystemClock};
use crate::model::Account;

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<Vec<Account>>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryAccountStore {
    fn find<'a>(
        &'a self,
        filter: &'a AccountFilter,
    ) -> BoxFuture<'a, Result<Vec<Account>, StoreError>> {
        Box::pin(async move {
            let accounts = self.accounts.lock().await;
            Ok(accounts
                .iter()
                .filter(|account| filter.matches(account))
                .cloned()
                .collect())
        })
    }

    fn insert<'a>(&'a self, account: &'a Account) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut accounts = self.accounts.lock().await;
            // Same unique columns as the Postgres schema.
            if accounts.iter().any(|existing| {
                existing.id == account.id
                    || existing.email == account.email
                    || existing.display_name == account.display_name
            }) {
                return Err(StoreError::Conflict);
            }
            accounts.push(account.clone());
            Ok(())
        })
    }

    fn update<'a>(
        &'a self,
        filter: &'a AccountFilter,
        patch: &'a AccountPatch,
    ) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move {
            let mut accounts = self.accounts.lock().await;
            match accounts.iter_mut().find(|account| filter.matches(account)) {
                Some(account) => {
                    patch.apply(account);
                    Ok(1)
                }
                None => Ok(0),
            }
        })
    }

    fn delete<'a>(&'a self, filter: &'a AccountFilter) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move {
            let mut accounts = self.accounts.lock().await;
            let before = accounts.len();
            accounts.retain(|account| !filter.matches(account));
            Ok((before - accounts.len()) as u64)
        })
    }
}

struct CacheEntry {
    value: String,
    expires_at_millis: i64,
}

/// TTL cache driven by a [`Clock`]. Expired entries are dropped lazily on access.
pub struct MemoryCache {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EphemeralCache for MemoryCache {
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl_seconds: u64,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let ttl_millis = i64::try_from(ttl_seconds)
                .unwrap_or(i64::MAX / 1000)
                .saturating_mul(1000);
            let now = self.clock.now_millis();
            let mut entries = self.entries.lock().await;
            entries.retain(|_, entry| entry.expires_at_millis > now);
            entries.insert(
                key.to_string(),
                CacheEntry {
                    value: value.to_string(),
                    expires_at_millis: now.saturating_add(ttl_millis),
                },
            );
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        Box::pin(async move {
            let now = self.clock.now_millis();
            let mut entries = self.entries.lock().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at_millis > now => Ok(Some(entry.value.clone())),
                Some(_) => {
                    entries.remove(key);
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    fn ttl<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move {
            let now = self.clock.now_millis();
            let entries = self.entries.lock().await;
            let remaining_millis = entries
                .get(key)
                .map_or(0, |entry| entry.expires_at_millis - now);
            if remaining_millis <= 0 {
                return Ok(0);
            }
            Ok(u64::try_from((remaining_millis + 999) / 1000).unwrap_or(0))
        })
    }

    fn del<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.entries.lock().await.remove(key);
            Ok(())
        })
    }
}
