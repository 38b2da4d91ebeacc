use clap::{Arg, Command};

pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USER: &str = "smtp-user";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";
pub const ARG_SMTP_SENDER: &str = "smtp-sender";

/// Without `--smtp-host` mails are only logged.
#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host; mails are logged instead of sent when unset")
                .env("DALING_SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP relay port")
                .env("DALING_SMTP_PORT")
                .default_value("465")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SMTP_USER)
                .long(ARG_SMTP_USER)
                .help("SMTP username")
                .env("DALING_SMTP_USER")
                .requires(ARG_SMTP_HOST),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP password")
                .env("DALING_SMTP_PASSWORD")
                .hide_env_values(true)
                .requires(ARG_SMTP_USER),
        )
        .arg(
            Arg::new(ARG_SMTP_SENDER)
                .long(ARG_SMTP_SENDER)
                .help("Sender address, defaults to the SMTP username")
                .env("DALING_SMTP_SENDER"),
        )
}
