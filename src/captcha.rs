//! Bot verification for the code-request endpoints.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::store::BoxFuture;

pub const TURNSTILE_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

#[derive(Debug, Error)]
pub enum BotVerifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct BotVerdict {
    pub success: bool,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default, rename = "error-codes")]
    pub error_codes: Vec<String>,
}

pub trait BotVerifier: Send + Sync {
    fn verify<'a>(
        &'a self,
        challenge: &'a str,
        ip: &'a str,
    ) -> BoxFuture<'a, Result<BotVerdict, BotVerifyError>>;
}

#[derive(Serialize)]
struct SiteVerifyRequest<'a> {
    secret: &'a str,
    response: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remoteip: Option<&'a str>,
}

/// Cloudflare Turnstile `siteverify` client.
pub struct TurnstileVerifier {
    client: Client,
    secret: SecretString,
    url: String,
    use_ip: bool,
}

impl TurnstileVerifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(secret: SecretString) -> Result<Self, BotVerifyError> {
        let client = Client::builder().user_agent(crate::APP_USER_AGENT).build()?;
        Ok(Self {
            client,
            secret,
            url: TURNSTILE_VERIFY_URL.to_string(),
            use_ip: false,
        })
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Forward the client IP as `remoteip`.
    #[must_use]
    pub fn with_use_ip(mut self, use_ip: bool) -> Self {
        self.use_ip = use_ip;
        self
    }
}

impl BotVerifier for TurnstileVerifier {
    fn verify<'a>(
        &'a self,
        challenge: &'a str,
        ip: &'a str,
    ) -> BoxFuture<'a, Result<BotVerdict, BotVerifyError>> {
        Box::pin(async move {
            let body = SiteVerifyRequest {
                secret: self.secret.expose_secret(),
                response: challenge,
                remoteip: (self.use_ip && !ip.is_empty()).then_some(ip),
            };
            let response = self.client.post(&self.url).json(&body).send().await?;
            if !response.status().is_success() {
                let status = response.status();
                error!("turnstile siteverify failed: {status}");
                return Err(BotVerifyError::Status(status));
            }
            let verdict: BotVerdict = response.json().await?;
            debug!(
                success = verdict.success,
                error_codes = ?verdict.error_codes,
                "turnstile verdict"
            );
            Ok(verdict)
        })
    }
}

/// Accepts every challenge. For local runs without a Turnstile secret.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAllVerifier;

impl BotVerifier for AllowAllVerifier {
    fn verify<'a>(
        &'a self,
        _challenge: &'a str,
        _ip: &'a str,
    ) -> BoxFuture<'a, Result<BotVerdict, BotVerifyError>> {
        Box::pin(async move {
            Ok(BotVerdict {
                success: true,
                ..BotVerdict::default()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    #[tokio::test]
    async fn turnstile_posts_secret_and_response() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/siteverify"))
            .and(body_json(json!({ "secret": "s3cret", "response": "challenge" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "error-codes": []
            })))
            .mount(&server)
            .await;

        let verifier = TurnstileVerifier::new(SecretString::from("s3cret".to_string()))?
            .with_url(format!("{}/siteverify", server.uri()));
        let verdict = verifier.verify("challenge", "1.2.3.4").await?;
        assert!(verdict.success);
        Ok(())
    }

    #[tokio::test]
    async fn turnstile_forwards_ip_when_enabled() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/siteverify"))
            .and(body_json(json!({
                "secret": "s3cret",
                "response": "challenge",
                "remoteip": "1.2.3.4"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error-codes": ["invalid-input-response"]
            })))
            .mount(&server)
            .await;

        let verifier = TurnstileVerifier::new(SecretString::from("s3cret".to_string()))?
            .with_url(format!("{}/siteverify", server.uri()))
            .with_use_ip(true);
        let verdict = verifier.verify("challenge", "1.2.3.4").await?;
        assert!(!verdict.success);
        assert_eq!(verdict.error_codes, vec!["invalid-input-response".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn turnstile_surfaces_server_errors() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let verifier = TurnstileVerifier::new(SecretString::from("s3cret".to_string()))?
            .with_url(server.uri());
        let result = verifier.verify("challenge", "").await;
        assert!(matches!(result, Err(BotVerifyError::Status(_))));
        Ok(())
    }

    #[tokio::test]
    async fn allow_all_accepts() -> Result<()> {
        assert!(AllowAllVerifier.verify("", "").await?.success);
        Ok(())
    }
}
