use clap::Args;

use crate::validation::{parse_positive_f64, parse_positive_u64, parse_threshold_percent};

/// Telegram polling and host-health alert flags flattened into `Cli`.
#[derive(Debug, Args)]
pub struct CliChannelFlags {
    #[arg(
        long = "telegram-bot-token",
        env = "TALLY_TELEGRAM_BOT_TOKEN",
        hide_env_values = true,
        help = "Telegram bot token. The chat reconciler is disabled when unset"
    )]
    pub telegram_bot_token: Option<String>,

    #[arg(
        long = "telegram-api-base",
        env = "TALLY_TELEGRAM_API_BASE",
        default_value = "https://api.telegram.org",
        help = "Base URL for the Telegram Bot API"
    )]
    pub telegram_api_base: String,

    #[arg(
        long = "telegram-chat-id",
        env = "TALLY_TELEGRAM_CHAT_ID",
        allow_hyphen_values = true,
        help = "Operator chat id. Receives health alerts and is always allowed to issue commands"
    )]
    pub telegram_chat_id: Option<i64>,

    #[arg(
        long = "telegram-allowed-chat-ids",
        env = "TALLY_TELEGRAM_ALLOWED_CHAT_IDS",
        value_delimiter = ',',
        allow_hyphen_values = true,
        help = "Additional chat ids allowed to issue commands. \
                Empty together with no operator chat accepts every chat"
    )]
    pub telegram_allowed_chat_ids: Vec<i64>,

    #[arg(
        long = "telegram-poll-interval-ms",
        env = "TALLY_TELEGRAM_POLL_INTERVAL_MS",
        default_value_t = 2_000,
        value_parser = parse_positive_u64,
        help = "Delay between getUpdates cycles"
    )]
    pub telegram_poll_interval_ms: u64,

    #[arg(
        long = "telegram-long-poll-timeout-seconds",
        env = "TALLY_TELEGRAM_LONG_POLL_TIMEOUT_SECONDS",
        default_value_t = 20,
        help = "Server-side long-poll timeout passed to getUpdates"
    )]
    pub telegram_long_poll_timeout_seconds: u64,

    #[arg(
        long = "telegram-request-timeout-ms",
        env = "TALLY_TELEGRAM_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Client timeout for a single Telegram request"
    )]
    pub telegram_request_timeout_ms: u64,

    #[arg(
        long = "health-interval-seconds",
        env = "TALLY_HEALTH_INTERVAL_SECONDS",
        default_value_t = 300,
        value_parser = parse_positive_u64,
        help = "Seconds between host health samples"
    )]
    pub health_interval_seconds: u64,

    #[arg(
        long = "health-memory-threshold-percent",
        env = "TALLY_HEALTH_MEMORY_THRESHOLD_PERCENT",
        default_value_t = 90.0,
        value_parser = parse_threshold_percent,
        help = "Memory usage that triggers an alert"
    )]
    pub health_memory_threshold_percent: f64,

    #[arg(
        long = "health-disk-threshold-percent",
        env = "TALLY_HEALTH_DISK_THRESHOLD_PERCENT",
        default_value_t = 90.0,
        value_parser = parse_threshold_percent,
        help = "Disk usage that triggers an alert"
    )]
    pub health_disk_threshold_percent: f64,

    #[arg(
        long = "health-load-threshold",
        env = "TALLY_HEALTH_LOAD_THRESHOLD",
        default_value_t = 4.0,
        value_parser = parse_positive_f64,
        help = "One-minute load average that triggers an alert"
    )]
    pub health_load_threshold: f64,

    #[arg(
        long = "health-disk-path",
        env = "TALLY_HEALTH_DISK_PATH",
        default_value = "/",
        help = "Filesystem sampled for disk usage"
    )]
    pub health_disk_path: std::path::PathBuf,
}
