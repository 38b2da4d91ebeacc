use clap::{Arg, Command};

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_LOGIN_VALID_DAYS: &str = "login-valid-days";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("Secret used to sign login tokens (HS256)")
                .env("DALING_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_LOGIN_VALID_DAYS)
                .long(ARG_LOGIN_VALID_DAYS)
                .help("How many days a login token and its session stay valid")
                .env("DALING_LOGIN_VALID_DAYS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
