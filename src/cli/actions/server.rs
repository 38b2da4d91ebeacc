use crate::account::AccountService;
use crate::api::{self, AppState};
use crate::auth::{
    AuthFacade, Clock, RandomCodeSource, SessionManager, SystemClock, TokenService,
    VerificationCodeService,
};
use crate::captcha::{AllowAllVerifier, BotVerifier, TurnstileVerifier};
use crate::cli::telemetry;
use crate::mail::{LogMailSender, MailSender, SmtpConfig, SmtpMailSender};
use crate::store::{
    AccountStore, EphemeralCache, MemoryAccountStore, MemoryCache, PgAccountStore, PgCache,
};
use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug)]
pub struct TurnstileArgs {
    pub secret: SecretString,
    pub url: String,
    pub use_ip: bool,
}

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub db_username: Option<String>,
    pub db_password: Option<SecretString>,
    pub trust_proxy: bool,
    pub token_secret: SecretString,
    pub login_valid_days: u64,
    pub smtp: Option<SmtpConfig>,
    pub turnstile: Option<TurnstileArgs>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, a collaborator cannot be
/// built, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let pool = match &args.dsn {
        Some(dsn) => {
            let dsn = build_dsn(dsn, args.db_username.as_deref(), args.db_password.as_ref())?;
            Some(connect(&dsn).await?)
        }
        None => None,
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (store, cache): (Arc<dyn AccountStore>, Arc<dyn EphemeralCache>) = match &pool {
        Some(pool) => (
            Arc::new(PgAccountStore::new(pool.clone())),
            Arc::new(PgCache::new(pool.clone())),
        ),
        None => {
            warn!("No DSN configured, accounts are kept in memory");
            (
                Arc::new(MemoryAccountStore::new()),
                Arc::new(MemoryCache::with_clock(clock.clone())),
            )
        }
    };

    let mail: Arc<dyn MailSender> = match &args.smtp {
        Some(config) => Arc::new(SmtpMailSender::new(config).context("Invalid SMTP settings")?),
        None => {
            warn!("No SMTP host configured, mails are only logged");
            Arc::new(LogMailSender)
        }
    };

    let bot: Arc<dyn BotVerifier> = match args.turnstile {
        Some(turnstile) => Arc::new(
            TurnstileVerifier::new(turnstile.secret)
                .context("Failed to build Turnstile client")?
                .with_url(turnstile.url)
                .with_use_ip(turnstile.use_ip),
        ),
        None => {
            warn!("No Turnstile secret configured, bot checks are disabled");
            Arc::new(AllowAllVerifier)
        }
    };

    let validity = Duration::from_secs(args.login_valid_days.saturating_mul(SECONDS_PER_DAY));
    let tokens = TokenService::new(args.token_secret, validity, clock.clone());
    let sessions = SessionManager::new(store.clone(), clock);
    let auth = Arc::new(AuthFacade::new(store.clone(), tokens, sessions));
    let codes = VerificationCodeService::new(cache, Arc::new(RandomCodeSource));
    let accounts = AccountService::new(store, auth, codes, mail, bot);

    let state = AppState::new(accounts).with_trust_proxy(args.trust_proxy);
    let state = match &pool {
        Some(pool) => state.with_pool(pool.clone()),
        None => state,
    };

    let result = api::new(args.port, Arc::new(state), shutdown_signal()).await;

    if let Some(pool) = pool {
        pool.close().await;
    }
    telemetry::shutdown_tracer();

    result
}

async fn connect(dsn: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")
}

/// Replace the DSN credentials with the ones given separately, if any.
fn build_dsn(
    dsn: &str,
    username: Option<&str>,
    password: Option<&SecretString>,
) -> Result<String> {
    let mut dsn = Url::parse(dsn).context("Invalid DSN")?;

    if let Some(username) = username {
        dsn.set_username(username)
            .map_err(|()| anyhow!("Error setting username"))?;
    }

    if let Some(password) = password {
        dsn.set_password(Some(password.expose_secret()))
            .map_err(|()| anyhow!("Error setting password"))?;
    }

    Ok(dsn.to_string())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
        // Without a signal handler the server runs until killed.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "dsn",
            args.dsn
                .as_deref()
                .map_or_else(|| "memory".to_string(), redact_dsn),
        ),
        ("trust_proxy", args.trust_proxy.to_string()),
        ("login_valid_days", args.login_valid_days.to_string()),
        ("smtp", args.smtp.is_some().to_string()),
        ("turnstile", args.turnstile.is_some().to_string()),
    ];
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "daling {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
