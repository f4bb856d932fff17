//! Turns parsed CLI flags into typed runtime configs and collaborators.

use anyhow::{Context, Result};
use rand::Rng;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tally_ai::{
    DisabledSummarizer, LlmSummarizer, OpenAiClient, OpenAiConfig, Summarizer, SummarizerConfig,
};
use tally_channels::{
    ChatSender, MailTransport, Notifier, SmtpConfig, SmtpMailer, TelegramApiClient, TelegramConfig,
};
use tally_cli::Cli;
use tally_gateway::GatewayConfig;
use tally_runtime::{
    AppContext, HealthMonitorConfig, HealthThresholds, ProcfsSystemMetrics, ReconcilerConfig,
    ReporterConfig,
};
use tally_store::{LogStore, SqliteLogStore, UserRole, UserStore};

const SESSION_SECRET_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const SESSION_SECRET_LEN: usize = 64;
const SUMMARY_MAX_RETRIES: usize = 2;

pub(crate) fn telegram_config(cli: &Cli) -> Option<TelegramConfig> {
    let bot_token = cli.channel.telegram_bot_token.as_deref()?.trim();
    if bot_token.is_empty() {
        return None;
    }
    Some(TelegramConfig {
        api_base: cli.channel.telegram_api_base.clone(),
        bot_token: bot_token.to_string(),
        long_poll_timeout_seconds: cli.channel.telegram_long_poll_timeout_seconds,
        request_timeout_ms: cli.channel.telegram_request_timeout_ms,
        ..TelegramConfig::default()
    })
}

pub(crate) fn smtp_config(cli: &Cli) -> Option<SmtpConfig> {
    let reporting = &cli.reporting;
    let host = reporting.smtp_host.as_deref()?.trim();
    let to = reporting.report_email.as_deref()?.trim();
    if host.is_empty() || to.is_empty() {
        return None;
    }
    let from = reporting
        .smtp_from
        .clone()
        .filter(|from| !from.trim().is_empty())
        .unwrap_or_else(|| reporting.smtp_user.clone());
    Some(SmtpConfig {
        host: host.to_string(),
        port: reporting.smtp_port,
        username: reporting.smtp_user.clone(),
        password: reporting.smtp_password.clone(),
        from,
        to: to.to_string(),
        timeout_ms: reporting.smtp_timeout_ms,
    })
}

pub(crate) fn reconciler_config(cli: &Cli) -> ReconcilerConfig {
    let mut allowed_chat_ids = cli
        .channel
        .telegram_allowed_chat_ids
        .iter()
        .copied()
        .collect::<BTreeSet<_>>();
    if let Some(chat_id) = cli.channel.telegram_chat_id {
        allowed_chat_ids.insert(chat_id);
    }
    ReconcilerConfig {
        poll_interval: Duration::from_millis(cli.channel.telegram_poll_interval_ms),
        allowed_chat_ids,
        ..ReconcilerConfig::default()
    }
}

pub(crate) fn reporter_config(cli: &Cli) -> ReporterConfig {
    ReporterConfig {
        report_time: cli.report_time,
        timezone: cli.timezone,
    }
}

pub(crate) fn health_monitor_config(cli: &Cli) -> Option<HealthMonitorConfig> {
    let alert_chat_id = cli.channel.telegram_chat_id?;
    Some(HealthMonitorConfig {
        alert_chat_id,
        interval: Duration::from_secs(cli.channel.health_interval_seconds),
        thresholds: HealthThresholds {
            memory_percent: cli.channel.health_memory_threshold_percent,
            disk_percent: cli.channel.health_disk_threshold_percent,
            load_1m: cli.channel.health_load_threshold,
        },
    })
}

pub(crate) fn gateway_config(cli: &Cli) -> Result<GatewayConfig> {
    let session_secret = match cli.gateway.session_secret.clone() {
        Some(secret) => secret,
        None => {
            tracing::warn!("no session secret configured; sessions will not survive a restart");
            random_secret()
        }
    };
    let api_key = cli.gateway.api_key.clone().unwrap_or_else(|| {
        tracing::warn!("no API key configured; the JSON API will reject every request");
        String::new()
    });
    Ok(GatewayConfig {
        bind: cli.gateway.bind.clone(),
        api_key,
        session_secret,
        session_ttl_seconds: cli.gateway.session_ttl_seconds,
        dashboard_entry_limit: cli.gateway.dashboard_entry_limit,
    })
}

fn random_secret() -> String {
    let mut rng = rand::rng();
    (0..SESSION_SECRET_LEN)
        .map(|_| {
            let idx = rng.random_range(0..SESSION_SECRET_CHARSET.len());
            SESSION_SECRET_CHARSET[idx] as char
        })
        .collect()
}

/// Splits the summary budget across every attempt so retries fit inside it.
fn per_request_timeout_ms(budget_ms: u64, max_retries: usize) -> u64 {
    let attempts = u64::try_from(max_retries).unwrap_or(u64::MAX).saturating_add(1);
    (budget_ms / attempts).max(1)
}

pub(crate) fn build_summarizer(cli: &Cli) -> Result<Arc<dyn Summarizer>> {
    let Some(api_key) = cli.reporting.openai_api_key.clone() else {
        tracing::info!("no summarization API key configured; summaries disabled");
        return Ok(Arc::new(DisabledSummarizer));
    };
    let client = OpenAiClient::new(OpenAiConfig {
        api_base: cli.reporting.openai_api_base.clone(),
        api_key,
        request_timeout_ms: per_request_timeout_ms(
            cli.reporting.summary_timeout_ms,
            SUMMARY_MAX_RETRIES,
        ),
        max_retries: SUMMARY_MAX_RETRIES,
    })
    .context("failed to build summarization client")?;
    Ok(Arc::new(LlmSummarizer::new(
        Arc::new(client),
        SummarizerConfig {
            model: cli.reporting.openai_model.clone(),
            timeout_ms: cli.reporting.summary_timeout_ms,
            ..SummarizerConfig::default()
        },
    )))
}

/// Opens storage, seeds the admin account and assembles the shared context.
/// Returns the Telegram client separately since only the reconciler polls it.
pub(crate) fn build_app_context(cli: &Cli) -> Result<(AppContext, Option<Arc<TelegramApiClient>>)> {
    let store = SqliteLogStore::new(&cli.db_path)
        .with_context(|| format!("failed to open log store at {}", cli.db_path.display()))?;
    let users = UserStore::new(&cli.db_path)
        .with_context(|| format!("failed to open user store at {}", cli.db_path.display()))?;
    if let Some(password) = cli.gateway.admin_password.as_deref() {
        users
            .ensure_user(&cli.gateway.admin_username, password, UserRole::Admin)
            .context("failed to seed admin account")?;
        tracing::info!(user = %cli.gateway.admin_username, "admin account ready");
    } else {
        tracing::warn!(
            "no admin password configured; dashboard login requires an existing account"
        );
    }

    let telegram = telegram_config(cli)
        .map(TelegramApiClient::new)
        .transpose()
        .context("failed to build Telegram client")?
        .map(Arc::new);
    let chat_sender = telegram
        .clone()
        .map(|client| -> Arc<dyn ChatSender> { client });
    let mailer = smtp_config(cli)
        .map(|config| SmtpMailer::new(&config))
        .transpose()
        .context("failed to build SMTP transport")?
        .map(|mailer| -> Arc<dyn MailTransport> { Arc::new(mailer) });
    if mailer.is_none() {
        tracing::info!("SMTP not configured; daily digests will only be logged");
    }

    let store: Arc<dyn LogStore> = Arc::new(store);
    let context = AppContext::new(
        store,
        users,
        Notifier::new(chat_sender, mailer),
        build_summarizer(cli)?,
        Arc::new(ProcfsSystemMetrics::new(cli.channel.health_disk_path.clone())),
        cli.timezone,
    );
    Ok((context, telegram))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["tally"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse cli")
    }

    #[test]
    fn unit_optional_integrations_are_disabled_by_default() {
        let cli = parse(&[]);
        assert!(telegram_config(&cli).is_none());
        assert!(smtp_config(&cli).is_none());
        assert!(health_monitor_config(&cli).is_none());
        assert!(reconciler_config(&cli).allowed_chat_ids.is_empty());
    }

    #[test]
    fn unit_operator_chat_joins_allowlist_and_enables_alerts() {
        let cli = parse(&[
            "--telegram-chat-id",
            "42",
            "--telegram-allowed-chat-ids",
            "7,8",
            "--telegram-poll-interval-ms",
            "500",
        ]);
        let config = reconciler_config(&cli);
        assert_eq!(
            config.allowed_chat_ids.into_iter().collect::<Vec<_>>(),
            vec![7, 8, 42]
        );
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        let health = health_monitor_config(&cli).expect("health config");
        assert_eq!(health.alert_chat_id, 42);
        assert_eq!(health.thresholds.load_1m, 4.0);
    }

    #[test]
    fn unit_smtp_requires_host_and_recipient_and_defaults_sender() {
        let cli = parse(&["--smtp-host", "smtp.example.com", "--smtp-user", "bot@example.com"]);
        assert!(smtp_config(&cli).is_none());

        let cli = parse(&[
            "--smtp-host",
            "smtp.example.com",
            "--smtp-user",
            "bot@example.com",
            "--report-email",
            "ops@example.com",
        ]);
        let config = smtp_config(&cli).expect("smtp config");
        assert_eq!(config.from, "bot@example.com");
        assert_eq!(config.to, "ops@example.com");
        assert_eq!(config.port, 587);
    }

    #[test]
    fn unit_gateway_config_generates_secret_when_unset() {
        let cli = parse(&["--api-key", "k"]);
        let first = gateway_config(&cli).expect("gateway config");
        let second = gateway_config(&cli).expect("gateway config");
        assert_eq!(first.session_secret.len(), SESSION_SECRET_LEN);
        assert!(first.session_secret.chars().all(|ch| ch.is_ascii_alphanumeric()));
        assert_ne!(first.session_secret, second.session_secret);
        assert_eq!(first.api_key, "k");
    }

    #[test]
    fn regression_summary_retries_fit_inside_the_timeout_budget() {
        let per_request = per_request_timeout_ms(30_000, SUMMARY_MAX_RETRIES);
        assert_eq!(per_request, 10_000);
        assert!(per_request * (SUMMARY_MAX_RETRIES as u64 + 1) <= 30_000);
        assert_eq!(per_request_timeout_ms(0, SUMMARY_MAX_RETRIES), 1);
        assert_eq!(per_request_timeout_ms(500, 0), 500);
    }

    #[test]
    fn integration_app_context_seeds_admin_account() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let db_path = tempdir.path().join("data/tally.sqlite");
        let db_path = db_path.to_string_lossy().to_string();
        let cli = parse(&["--db-path", &db_path, "--admin-password", "s3cret"]);
        let (context, telegram) = build_app_context(&cli).expect("context");
        assert!(telegram.is_none());
        assert!(context
            .users
            .verify_credentials("admin", "s3cret")
            .expect("verify")
            .is_some());
        assert!(!context.notifier.health().chat_enabled);
    }
}
