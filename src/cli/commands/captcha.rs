use clap::{Arg, ArgAction, Command};

pub const ARG_TURNSTILE_SECRET: &str = "turnstile-secret";
pub const ARG_TURNSTILE_URL: &str = "turnstile-url";
pub const ARG_TURNSTILE_USE_IP: &str = "turnstile-use-ip";

/// Without a secret every challenge is accepted.
#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TURNSTILE_SECRET)
                .long(ARG_TURNSTILE_SECRET)
                .help("Cloudflare Turnstile secret key; bot checks are skipped when unset")
                .env("DALING_TURNSTILE_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_TURNSTILE_URL)
                .long(ARG_TURNSTILE_URL)
                .help("Turnstile siteverify endpoint")
                .env("DALING_TURNSTILE_URL")
                .default_value(crate::captcha::TURNSTILE_VERIFY_URL),
        )
        .arg(
            Arg::new(ARG_TURNSTILE_USE_IP)
                .long(ARG_TURNSTILE_USE_IP)
                .help("Forward the client IP to Turnstile")
                .env("DALING_TURNSTILE_USE_IP")
                .action(ArgAction::SetTrue),
        )
}
