//! `PostgreSQL` backends for the account store and the verification-code cache.
//!
//! Table layout lives in `sql/schema.sql`. The session list is stored as `JSONB`
//! so logout can pull a single entry in one statement.

use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row};
use tracing::Instrument;

use super::{AccountFilter, AccountPatch, AccountStore, BoxFuture, EphemeralCache, StoreError};
use crate::model::{Account, Session};

const ACCOUNT_COLUMNS: &str = "id, display_name, email, credential_hash, java_id, xbox_id, \
     sessions, permissions, balance_primary, balance_secondary";

#[derive(Clone, Debug)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `WHERE` fragment for `filter` with placeholders starting at `$first`.
fn filter_clause(filter: &AccountFilter, first: usize) -> String {
    match filter {
        AccountFilter::Id(_) => format!("id = ${first}"),
        AccountFilter::Email(_) => format!("email = ${first}"),
        AccountFilter::DisplayName(_) => format!("display_name = ${first}"),
        AccountFilter::NameOrEmail { .. } => {
            format!("(display_name = ${first} OR email = ${})", first + 1)
        }
        AccountFilter::GameId(_) => format!("(java_id = ${first} OR xbox_id = ${first})"),
    }
}

fn bind_filter<'q>(
    query: Query<'q, Postgres, PgArguments>,
    filter: &'q AccountFilter,
) -> Query<'q, Postgres, PgArguments> {
    match filter {
        AccountFilter::Id(value)
        | AccountFilter::Email(value)
        | AccountFilter::DisplayName(value)
        | AccountFilter::GameId(value) => query.bind(value.as_str()),
        AccountFilter::NameOrEmail { name, email } => query.bind(name.as_str()).bind(email.as_str()),
    }
}

/// `SET` fragment for `patch`; always binds exactly one value as `$1`.
fn patch_clause(patch: &AccountPatch) -> &'static str {
    match patch {
        AccountPatch::SetSessions(_) => "sessions = $1",
        AccountPatch::PullSession(_) => {
            "sessions = COALESCE((SELECT jsonb_agg(s) FROM jsonb_array_elements(sessions) s \
             WHERE s->>'sessionId' <> $1), '[]'::jsonb)"
        }
        AccountPatch::SetCredentialHash(_) => "credential_hash = $1",
        AccountPatch::SetDisplayName(_) => "display_name = $1",
        AccountPatch::SetJavaId(_) => "java_id = $1",
        AccountPatch::SetXboxId(_) => "xbox_id = $1",
    }
}

fn bind_patch<'q>(
    query: Query<'q, Postgres, PgArguments>,
    patch: &'q AccountPatch,
) -> Query<'q, Postgres, PgArguments> {
    match patch {
        AccountPatch::SetSessions(sessions) => query.bind(Json(sessions)),
        AccountPatch::PullSession(value)
        | AccountPatch::SetCredentialHash(value)
        | AccountPatch::SetDisplayName(value)
        | AccountPatch::SetJavaId(value)
        | AccountPatch::SetXboxId(value) => query.bind(value.as_str()),
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let sessions: Json<Vec<Session>> = row
        .try_get("sessions")
        .map_err(|err| StoreError::Corrupt(format!("sessions: {err}")))?;
    Ok(Account {
        id: row.try_get("id")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        credential_hash: row.try_get("credential_hash")?,
        java_id: row.try_get("java_id")?,
        xbox_id: row.try_get("xbox_id")?,
        sessions: sessions.0,
        permissions: row.try_get("permissions")?,
        balances: [
            row.try_get("balance_primary")?,
            row.try_get("balance_secondary")?,
        ],
    })
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            StoreError::Conflict
        }
        _ => StoreError::Database(err),
    }
}

impl AccountStore for PgAccountStore {
    fn find<'a>(
        &'a self,
        filter: &'a AccountFilter,
    ) -> BoxFuture<'a, Result<Vec<Account>, StoreError>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {}",
                filter_clause(filter, 1)
            );
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = %query
            );
            let rows = bind_filter(sqlx::query(&query), filter)
                .fetch_all(&self.pool)
                .instrument(span)
                .await?;
            rows.iter().map(account_from_row).collect()
        })
    }

    fn insert<'a>(&'a self, account: &'a Account) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let query = format!(
                "INSERT INTO accounts ({ACCOUNT_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
            );
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = %query
            );
            sqlx::query(&query)
                .bind(&account.id)
                .bind(&account.display_name)
                .bind(&account.email)
                .bind(&account.credential_hash)
                .bind(&account.java_id)
                .bind(&account.xbox_id)
                .bind(Json(&account.sessions))
                .bind(&account.permissions)
                .bind(account.balances[0])
                .bind(account.balances[1])
                .execute(&self.pool)
                .instrument(span)
                .await
                .map_err(map_write_error)?;
            Ok(())
        })
    }

    fn update<'a>(
        &'a self,
        filter: &'a AccountFilter,
        patch: &'a AccountPatch,
    ) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move {
            let query = format!(
                "UPDATE accounts SET {} WHERE id = (SELECT id FROM accounts WHERE {} LIMIT 1)",
                patch_clause(patch),
                filter_clause(filter, 2)
            );
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = %query
            );
            let result = bind_filter(bind_patch(sqlx::query(&query), patch), filter)
                .execute(&self.pool)
                .instrument(span)
                .await
                .map_err(map_write_error)?;
            Ok(result.rows_affected())
        })
    }

    fn delete<'a>(&'a self, filter: &'a AccountFilter) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move {
            let query = format!("DELETE FROM accounts WHERE {}", filter_clause(filter, 1));
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = %query
            );
            let result = bind_filter(sqlx::query(&query), filter)
                .execute(&self.pool)
                .instrument(span)
                .await?;
            Ok(result.rows_affected())
        })
    }
}

/// Verification-code cache backed by the `ephemeral_entries` table.
///
/// Expiry is evaluated against the database clock; expired rows are purged on write.
#[derive(Clone, Debug)]
pub struct PgCache {
    pool: PgPool,
}

impl PgCache {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl EphemeralCache for PgCache {
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl_seconds: u64,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);

            let purge = "DELETE FROM ephemeral_entries WHERE expires_at <= NOW()";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = purge
            );
            sqlx::query(purge)
                .execute(&self.pool)
                .instrument(span)
                .await?;

            let query = r"
                INSERT INTO ephemeral_entries (key, value, expires_at)
                VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
                ON CONFLICT (key) DO UPDATE
                SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPSERT",
                db.statement = query
            );
            sqlx::query(query)
                .bind(key)
                .bind(value)
                .bind(ttl)
                .execute(&self.pool)
                .instrument(span)
                .await?;
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        Box::pin(async move {
            let query = "SELECT value FROM ephemeral_entries WHERE key = $1 AND expires_at > NOW()";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let value: Option<String> = sqlx::query_scalar(query)
                .bind(key)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await?;
            Ok(value)
        })
    }

    fn ttl<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move {
            let query = r"
                SELECT CEIL(EXTRACT(EPOCH FROM (expires_at - NOW())))::BIGINT
                FROM ephemeral_entries
                WHERE key = $1 AND expires_at > NOW()
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let remaining: Option<i64> = sqlx::query_scalar(query)
                .bind(key)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await?;
            Ok(remaining.map_or(0, |seconds| u64::try_from(seconds).unwrap_or(0)))
        })
    }

    fn del<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let query = "DELETE FROM ephemeral_entries WHERE key = $1";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(key)
                .execute(&self.pool)
                .instrument(span)
                .await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_clause_numbers_placeholders_from_offset() {
        assert_eq!(
            filter_clause(&AccountFilter::Id("a".to_string()), 1),
            "id = $1"
        );
        assert_eq!(
            filter_clause(
                &AccountFilter::NameOrEmail {
                    name: "n".to_string(),
                    email: "e".to_string(),
                },
                2
            ),
            "(display_name = $2 OR email = $3)"
        );
        assert_eq!(
            filter_clause(&AccountFilter::GameId("g".to_string()), 1),
            "(java_id = $1 OR xbox_id = $1)"
        );
    }

    #[test]
    fn pull_session_keeps_empty_array() {
        let clause = patch_clause(&AccountPatch::PullSession("s".to_string()));
        assert!(clause.contains("'[]'::jsonb"));
        assert!(clause.contains("sessionId"));
    }
}
