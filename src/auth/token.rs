//! HS256 bearer tokens binding an account to one login session.
//!
//! Tokens use the compact JWT layout `header.claims.signature` with base64url
//! segments. Verification only checks structure, signature and `exp`; whether the
//! session still exists is decided by the caller against the account store.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::Clock;

type HmacSha256 = Hmac<Sha256>;

/// Lifetime of a login when nothing else is configured.
pub const DEFAULT_LOGIN_VALID_DAYS: u64 = 30;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid signing key")]
    Key,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    #[serde(rename = "uuid")]
    pub account_id: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub iat: i64,
    pub exp: i64,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub struct TokenService {
    secret: SecretString,
    validity: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: SecretString, validity: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret,
            validity,
            clock,
        }
    }

    /// Validity window shared by tokens and session freshness.
    #[must_use]
    pub fn validity(&self) -> Duration {
        self.validity
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| TokenError::Key)
    }

    /// Mint a signed token for `(account_id, session_id)` expiring one validity
    /// window from now.
    ///
    /// # Errors
    /// Returns `TokenError::Json` if the header or claims cannot be encoded, or
    /// `TokenError::Key` if the secret is rejected by the MAC.
    pub fn issue(&self, account_id: &str, session_id: &str) -> Result<String, TokenError> {
        let iat = self.clock.now_seconds();
        let window = i64::try_from(self.validity.as_secs()).unwrap_or(i64::MAX);
        let claims = TokenClaims {
            account_id: account_id.to_string(),
            session_id: session_id.to_string(),
            iat,
            exp: iat.saturating_add(window),
        };

        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Check structure, signature and expiry, and return the decoded claims.
    ///
    /// # Errors
    /// Returns a `TokenError` describing the first check that failed.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        if parts.next().is_some() {
            return Err(TokenError::TokenFormat);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlg(header.alg));
        }

        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
        let mut mac = self.mac()?;
        mac.update(format!("{header_b64}.{claims_b64}").as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: TokenClaims = b64d_json(claims_b64)?;
        if claims.exp <= self.clock.now_seconds() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}
