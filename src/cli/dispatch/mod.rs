use crate::cli::actions::{
    server::{Args, TurnstileArgs},
    Action,
};
use crate::cli::commands::{
    auth, captcha, mail, ARG_DB_PASSWORD, ARG_DB_USERNAME, ARG_DSN, ARG_PORT, ARG_TRUST_PROXY,
};
use crate::mail::SmtpConfig;
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches.get_one::<String>(ARG_DSN).cloned();
    let db_username = matches.get_one::<String>(ARG_DB_USERNAME).cloned();
    let db_password = matches
        .get_one::<String>(ARG_DB_PASSWORD)
        .map(|s| SecretString::from(s.as_str()));
    let trust_proxy = matches.get_flag(ARG_TRUST_PROXY);

    let token_secret = matches
        .get_one::<String>(auth::ARG_TOKEN_SECRET)
        .map(|s| SecretString::from(s.as_str()))
        .context("missing required argument: --token-secret")?;
    let login_valid_days = matches
        .get_one::<u64>(auth::ARG_LOGIN_VALID_DAYS)
        .copied()
        .unwrap_or(crate::auth::token::DEFAULT_LOGIN_VALID_DAYS);

    Ok(Action::Server(Args {
        port,
        dsn,
        db_username,
        db_password,
        trust_proxy,
        token_secret,
        login_valid_days,
        smtp: smtp_config(matches)?,
        turnstile: turnstile_args(matches),
    }))
}

fn smtp_config(matches: &clap::ArgMatches) -> Result<Option<SmtpConfig>> {
    let Some(host) = matches.get_one::<String>(mail::ARG_SMTP_HOST).cloned() else {
        return Ok(None);
    };
    let port = matches
        .get_one::<u16>(mail::ARG_SMTP_PORT)
        .copied()
        .unwrap_or(465);
    let user = matches
        .get_one::<String>(mail::ARG_SMTP_USER)
        .cloned()
        .context("missing required argument: --smtp-user")?;
    let password = matches
        .get_one::<String>(mail::ARG_SMTP_PASSWORD)
        .map(|s| SecretString::from(s.as_str()))
        .context("missing required argument: --smtp-password")?;

    let config = SmtpConfig::new(host, port, user, password);
    Ok(Some(match matches.get_one::<String>(mail::ARG_SMTP_SENDER) {
        Some(sender) => config.with_sender(sender.clone()),
        None => config,
    }))
}

fn turnstile_args(matches: &clap::ArgMatches) -> Option<TurnstileArgs> {
    let secret = matches.get_one::<String>(captcha::ARG_TURNSTILE_SECRET)?;
    Some(TurnstileArgs {
        secret: SecretString::from(secret.as_str()),
        url: matches
            .get_one::<String>(captcha::ARG_TURNSTILE_URL)
            .cloned()
            .unwrap_or_else(|| crate::captcha::TURNSTILE_VERIFY_URL.to_string()),
        use_ip: matches.get_flag(captcha::ARG_TURNSTILE_USE_IP),
    })
}
