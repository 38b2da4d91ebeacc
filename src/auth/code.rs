//! One-time email verification codes.
//!
//! A code lives in the ephemeral cache for [`CODE_TTL_SECONDS`]. The cache TTL is
//! the only clock: while more than [`THROTTLE_REMAINING_SECONDS`] remain, a new
//! request is refused, so the minimum gap between two codes is 60 seconds. The
//! wait reported to the caller is `remaining - REPORTED_WAIT_OFFSET_SECONDS`.

use rand::Rng;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::AuthError;
use crate::store::EphemeralCache;

pub const CODE_TTL_SECONDS: u64 = 300;
pub const THROTTLE_REMAINING_SECONDS: u64 = 240;
pub const REPORTED_WAIT_OFFSET_SECONDS: u64 = 180;

/// Flow a code unlocks. Codes of different purposes never collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodePurpose {
    Registration,
    Retrieval,
}

impl CodePurpose {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "register",
            Self::Retrieval => "retrieve",
        }
    }

    /// Cache key holding the pending code for `email`.
    #[must_use]
    pub fn cache_key(self, email: &str) -> String {
        format!("mail_{}_code_{email}", self.as_str())
    }
}

/// Generator of 6-digit numeric codes.
pub trait CodeSource: Send + Sync {
    fn next_code(&self) -> String;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RandomCodeSource;

impl CodeSource for RandomCodeSource {
    fn next_code(&self) -> String {
        let value: u32 = rand::rngs::OsRng.gen_range(0..1_000_000);
        format!("{value:06}")
    }
}

/// Hands out a fixed sequence of codes, then repeats the last one.
#[derive(Debug, Default)]
pub struct SequenceCodeSource {
    codes: Mutex<VecDeque<String>>,
}

impl SequenceCodeSource {
    #[must_use]
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: Mutex::new(codes.into_iter().map(Into::into).collect()),
        }
    }
}

impl CodeSource for SequenceCodeSource {
    fn next_code(&self) -> String {
        let Ok(mut codes) = self.codes.lock() else {
            return RandomCodeSource.next_code();
        };
        match codes.len() {
            0 => RandomCodeSource.next_code(),
            1 => codes.front().cloned().unwrap_or_default(),
            _ => codes.pop_front().unwrap_or_default(),
        }
    }
}

pub struct VerificationCodeService {
    cache: Arc<dyn EphemeralCache>,
    source: Arc<dyn CodeSource>,
}

impl VerificationCodeService {
    #[must_use]
    pub fn new(cache: Arc<dyn EphemeralCache>, source: Arc<dyn CodeSource>) -> Self {
        Self { cache, source }
    }

    /// Issue and store a new code unless the previous one is too recent.
    ///
    /// # Errors
    /// `Throttled(wait)` while the pending code has more than 240 s left,
    /// `Store` on cache failure.
    pub async fn request_code(&self, purpose: CodePurpose, email: &str) -> Result<String, AuthError> {
        let key = purpose.cache_key(email);
        let remaining = self.cache.ttl(&key).await?;
        if remaining > THROTTLE_REMAINING_SECONDS {
            let wait = remaining - REPORTED_WAIT_OFFSET_SECONDS;
            debug!(purpose = purpose.as_str(), remaining, wait, "code request throttled");
            return Err(AuthError::Throttled(wait));
        }

        let code = self.source.next_code();
        self.cache.set(&key, &code, CODE_TTL_SECONDS).await?;
        debug!(purpose = purpose.as_str(), "verification code stored");
        Ok(code)
    }

    /// Compare `candidate` with the pending code without consuming it.
    ///
    /// # Errors
    /// `Store` on cache failure.
    pub async fn verify_code(
        &self,
        purpose: CodePurpose,
        email: &str,
        candidate: &str,
    ) -> Result<bool, AuthError> {
        let stored = self.cache.get(&purpose.cache_key(email)).await?;
        Ok(stored.is_some_and(|code| code == candidate))
    }

    /// Drop the pending code. Call only after the guarded action succeeded.
    ///
    /// # Errors
    /// `Store` on cache failure.
    pub async fn consume_code(&self, purpose: CodePurpose, email: &str) -> Result<(), AuthError> {
        self.cache.del(&purpose.cache_key(email)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ManualClock;
    use crate::store::MemoryCache;
    use anyhow::Result;

    fn service(codes: &[&str]) -> (VerificationCodeService, Arc<ManualClock>, Arc<MemoryCache>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
        let source = Arc::new(SequenceCodeSource::new(codes.iter().copied()));
        (
            VerificationCodeService::new(cache.clone(), source),
            clock,
            cache,
        )
    }

    #[test]
    fn cache_keys_are_scoped_by_purpose() {
        assert_eq!(
            CodePurpose::Registration.cache_key("a@b.c"),
            "mail_register_code_a@b.c"
        );
        assert_eq!(
            CodePurpose::Retrieval.cache_key("a@b.c"),
            "mail_retrieve_code_a@b.c"
        );
    }

    #[test]
    fn random_codes_are_six_digits() {
        for _ in 0..100 {
            let code = RandomCodeSource.next_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn immediate_resend_is_throttled() -> Result<()> {
        let (codes, _clock, cache) = service(&["111111", "222222"]);
        let first = codes
            .request_code(CodePurpose::Registration, "a@b.c")
            .await?;
        assert_eq!(first, "111111");
        assert_eq!(
            cache.ttl("mail_register_code_a@b.c").await?,
            CODE_TTL_SECONDS
        );

        let result = codes.request_code(CodePurpose::Registration, "a@b.c").await;
        assert!(matches!(result, Err(AuthError::Throttled(120))));
        assert!(codes.verify_code(CodePurpose::Registration, "a@b.c", "111111").await?);
        Ok(())
    }

    #[tokio::test]
    async fn resend_after_a_minute_replaces_the_code() -> Result<()> {
        let (codes, clock, _cache) = service(&["111111", "222222"]);
        codes
            .request_code(CodePurpose::Registration, "a@b.c")
            .await?;

        clock.advance_seconds(30);
        let result = codes.request_code(CodePurpose::Registration, "a@b.c").await;
        assert!(matches!(result, Err(AuthError::Throttled(90))));

        clock.advance_seconds(31);
        let second = codes
            .request_code(CodePurpose::Registration, "a@b.c")
            .await?;
        assert_eq!(second, "222222");
        assert!(!codes.verify_code(CodePurpose::Registration, "a@b.c", "111111").await?);
        assert!(codes.verify_code(CodePurpose::Registration, "a@b.c", "222222").await?);
        Ok(())
    }

    #[tokio::test]
    async fn codes_do_not_cross_purposes() -> Result<()> {
        let (codes, _clock, _cache) = service(&["111111"]);
        codes
            .request_code(CodePurpose::Registration, "a@b.c")
            .await?;
        assert!(!codes.verify_code(CodePurpose::Retrieval, "a@b.c", "111111").await?);
        // A pending registration code does not throttle retrieval.
        codes.request_code(CodePurpose::Retrieval, "a@b.c").await?;
        Ok(())
    }

    #[tokio::test]
    async fn consumed_or_expired_codes_fail_verification() -> Result<()> {
        let (codes, clock, _cache) = service(&["111111"]);
        codes.request_code(CodePurpose::Retrieval, "a@b.c").await?;
        codes.consume_code(CodePurpose::Retrieval, "a@b.c").await?;
        assert!(!codes.verify_code(CodePurpose::Retrieval, "a@b.c", "111111").await?);

        codes.request_code(CodePurpose::Retrieval, "a@b.c").await?;
        clock.advance_seconds(i64::try_from(CODE_TTL_SECONDS)?);
        assert!(!codes.verify_code(CodePurpose::Retrieval, "a@b.c", "111111").await?);
        Ok(())
    }
}
