use clap::Args;

use crate::validation::{parse_non_empty, parse_positive_u64, parse_positive_usize};

/// HTTP listener, API key, session and seeded admin account flags.
#[derive(Debug, Args)]
pub struct CliGatewayFlags {
    #[arg(
        long = "bind",
        env = "TALLY_BIND",
        default_value = "0.0.0.0:8080",
        help = "Socket address for the HTTP gateway"
    )]
    pub bind: String,

    #[arg(
        long = "api-key",
        env = "TALLY_API_KEY",
        hide_env_values = true,
        value_parser = parse_non_empty,
        help = "Shared secret expected in the X-API-Key header. \
                The JSON API rejects every request when unset"
    )]
    pub api_key: Option<String>,

    #[arg(
        long = "session-secret",
        env = "TALLY_SESSION_SECRET",
        hide_env_values = true,
        value_parser = parse_non_empty,
        help = "Secret used to sign session cookies. A random per-process secret is used when unset"
    )]
    pub session_secret: Option<String>,

    #[arg(
        long = "session-ttl-seconds",
        env = "TALLY_SESSION_TTL_SECONDS",
        default_value_t = 86_400,
        value_parser = parse_positive_u64,
        help = "Lifetime of a dashboard session"
    )]
    pub session_ttl_seconds: u64,

    #[arg(
        long = "dashboard-entry-limit",
        env = "TALLY_DASHBOARD_ENTRY_LIMIT",
        default_value_t = 100,
        value_parser = parse_positive_usize,
        help = "Number of recent entries shown on the dashboard"
    )]
    pub dashboard_entry_limit: usize,

    #[arg(
        long = "admin-username",
        env = "TALLY_ADMIN_USERNAME",
        default_value = "admin",
        value_parser = parse_non_empty,
        help = "Dashboard account seeded at startup"
    )]
    pub admin_username: String,

    #[arg(
        long = "admin-password",
        env = "TALLY_ADMIN_PASSWORD",
        hide_env_values = true,
        value_parser = parse_non_empty,
        help = "Password for the seeded dashboard account. No account is seeded when unset"
    )]
    pub admin_password: Option<String>,
}
