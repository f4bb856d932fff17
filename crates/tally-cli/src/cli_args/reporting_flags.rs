use clap::Args;

use crate::validation::{parse_non_empty, parse_positive_u64};

/// SMTP digest delivery and summarization flags.
#[derive(Debug, Args)]
pub struct CliReportingFlags {
    #[arg(
        long = "smtp-host",
        env = "TALLY_SMTP_HOST",
        help = "SMTP relay host. Email delivery is disabled when unset"
    )]
    pub smtp_host: Option<String>,

    #[arg(
        long = "smtp-port",
        env = "TALLY_SMTP_PORT",
        default_value_t = 587,
        help = "SMTP relay port (STARTTLS)"
    )]
    pub smtp_port: u16,

    #[arg(long = "smtp-user", env = "TALLY_SMTP_USER", default_value = "")]
    pub smtp_user: String,

    #[arg(
        long = "smtp-password",
        env = "TALLY_SMTP_PASSWORD",
        hide_env_values = true,
        default_value = ""
    )]
    pub smtp_password: String,

    #[arg(
        long = "smtp-from",
        env = "TALLY_SMTP_FROM",
        help = "Sender mailbox. Defaults to the SMTP user"
    )]
    pub smtp_from: Option<String>,

    #[arg(
        long = "report-email",
        env = "TALLY_REPORT_EMAIL",
        help = "Recipient of the daily digest"
    )]
    pub report_email: Option<String>,

    #[arg(
        long = "smtp-timeout-ms",
        env = "TALLY_SMTP_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64
    )]
    pub smtp_timeout_ms: u64,

    #[arg(
        long = "openai-api-key",
        env = "TALLY_OPENAI_API_KEY",
        hide_env_values = true,
        value_parser = parse_non_empty,
        help = "API key for an OpenAI-compatible endpoint. Summaries are disabled when unset"
    )]
    pub openai_api_key: Option<String>,

    #[arg(
        long = "openai-api-base",
        env = "TALLY_OPENAI_API_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    pub openai_api_base: String,

    #[arg(
        long = "openai-model",
        env = "TALLY_OPENAI_MODEL",
        default_value = "gpt-4o-mini",
        value_parser = parse_non_empty
    )]
    pub openai_model: String,

    #[arg(
        long = "summary-timeout-ms",
        env = "TALLY_SUMMARY_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Upper bound on a single summarization call"
    )]
    pub summary_timeout_ms: u64,
}
