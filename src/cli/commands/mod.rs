pub mod auth;
pub mod captcha;
pub mod logging;
pub mod mail;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_DB_USERNAME: &str = "db-username";
pub const ARG_DB_PASSWORD: &str = "db-password";
pub const ARG_TRUST_PROXY: &str = "trust-proxy";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("daling")
        .about("Account, session and verification-code service")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("DALING_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .long_help(
                    "Database connection string. Without it accounts and codes are kept in memory and lost on restart.",
                )
                .env("DALING_DSN"),
        )
        .arg(
            Arg::new(ARG_DB_USERNAME)
                .long(ARG_DB_USERNAME)
                .help("Database username, replaces the one in the DSN")
                .env("DALING_DB_USERNAME")
                .requires(ARG_DSN),
        )
        .arg(
            Arg::new(ARG_DB_PASSWORD)
                .long(ARG_DB_PASSWORD)
                .help("Database password, replaces the one in the DSN")
                .env("DALING_DB_PASSWORD")
                .hide_env_values(true)
                .requires(ARG_DSN),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY)
                .long(ARG_TRUST_PROXY)
                .help("Take the client IP from X-Forwarded-For / X-Real-IP")
                .long_help(
                    "Take the client IP from X-Forwarded-For / X-Real-IP. Only enable behind a reverse proxy that sets these headers, otherwise clients can choose the IP recorded for their sessions.",
                )
                .env("DALING_TRUST_PROXY")
                .action(clap::ArgAction::SetTrue),
        );

    let command = auth::with_args(command);
    let command = mail::with_args(command);
    let command = captcha::with_args(command);
    logging::with_args(command)
}
