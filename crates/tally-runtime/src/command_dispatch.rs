//! Chat command parsing and dispatch against the log store.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tally_store::{LogEntry, LogQuery, LogSource, LogStore, StoreError};

use crate::system_health::SystemMetrics;

pub const REPORT_MAX_ENTRIES: usize = 50;
pub const RECENT_DEFAULT: usize = 10;
pub const RECENT_MAX: usize = 50;
pub const REPORT_EMPTY_MESSAGE: &str = "Nothing logged yet today.";
pub const RECENT_EMPTY_MESSAGE: &str = "No log entries yet.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Log(String),
    Stats,
    Report,
    ListRecent(usize),
    Help,
    Health,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub command: Command,
    pub response: String,
}

pub fn command_usage() -> String {
    [
        "Supported commands:",
        "- /log <text>: record an entry",
        "- /stats: entry counts by source",
        "- /report: today's entries",
        "- /recent [n]: the n most recent entries (default 10, max 50)",
        "- /health: host health snapshot",
        "- /help: this message",
    ]
    .join("\n")
}

/// Parses inbound chat text. The verb is the first whitespace-separated token;
/// a `@botname` suffix on it is ignored.
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let token = parts.next().unwrap_or_default();
    let remainder = parts.next().unwrap_or_default().trim();
    let verb = token
        .split_once('@')
        .map(|(verb, _)| verb)
        .unwrap_or(token)
        .to_ascii_lowercase();

    let unknown = || Command::Unknown(trimmed.to_string());
    match verb.as_str() {
        "/log" if !remainder.is_empty() => Command::Log(remainder.to_string()),
        "/stats" if remainder.is_empty() => Command::Stats,
        "/report" if remainder.is_empty() => Command::Report,
        "/help" | "/start" if remainder.is_empty() => Command::Help,
        "/health" if remainder.is_empty() => Command::Health,
        "/recent" if remainder.is_empty() => Command::ListRecent(RECENT_DEFAULT),
        "/recent" => match remainder.parse::<usize>() {
            Ok(count) => Command::ListRecent(count.clamp(1, RECENT_MAX)),
            Err(_) => unknown(),
        },
        _ => unknown(),
    }
}

/// Maps parsed commands to store operations and reply text. Never retries;
/// store failures go back to the caller.
pub struct CommandDispatcher {
    store: Arc<dyn LogStore>,
    metrics: Arc<dyn SystemMetrics>,
    timezone: Tz,
}

impl CommandDispatcher {
    pub fn new(store: Arc<dyn LogStore>, metrics: Arc<dyn SystemMetrics>, timezone: Tz) -> Self {
        Self {
            store,
            metrics,
            timezone,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub async fn dispatch(
        &self,
        origin_id: i64,
        raw_text: &str,
    ) -> Result<DispatchOutcome, StoreError> {
        self.dispatch_at(origin_id, raw_text, Utc::now()).await
    }

    /// Dispatches with an explicit clock; `now` decides what "today" is.
    pub async fn dispatch_at(
        &self,
        origin_id: i64,
        raw_text: &str,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, StoreError> {
        let command = parse_command(raw_text);
        tracing::debug!(origin_id, ?command, "dispatching chat command");
        let response = match &command {
            Command::Log(text) => {
                let entry = self.store.append(LogSource::Chat, text).await?;
                format!("Logged: {}", entry.message)
            }
            Command::Stats => {
                let counts = self.store.count_by_source().await?;
                render_stats(&counts)
            }
            Command::Report => self.render_report(now).await?,
            Command::ListRecent(count) => {
                let entries = self
                    .store
                    .query(LogQuery::all().most_recent(*count))
                    .await?;
                if entries.is_empty() {
                    RECENT_EMPTY_MESSAGE.to_string()
                } else {
                    let mut lines = vec![format!("Last {} entries:", entries.len())];
                    lines.extend(entries.iter().map(|entry| self.render_entry(entry, true)));
                    lines.join("\n")
                }
            }
            Command::Help => command_usage(),
            Command::Health => match self.metrics.sample() {
                Ok(snapshot) => snapshot.render(),
                Err(error) => format!("System health unavailable: {error}"),
            },
            Command::Unknown(raw) => format!(
                "Unknown command: {}\n{}",
                tally_core::truncate_chars(raw, 64),
                command_usage()
            ),
        };
        Ok(DispatchOutcome { command, response })
    }

    async fn render_report(&self, now: DateTime<Utc>) -> Result<String, StoreError> {
        let (start, end) = tally_core::local_day_bounds(self.timezone, now);
        let entries = self.store.query(LogQuery::between(start, end)).await?;
        if entries.is_empty() {
            return Ok(REPORT_EMPTY_MESSAGE.to_string());
        }
        let today = tally_core::local_date(self.timezone, now);
        let shown = &entries[entries.len().saturating_sub(REPORT_MAX_ENTRIES)..];
        let mut lines = vec![if shown.len() < entries.len() {
            format!(
                "Today ({today}): {} entries, showing the last {}",
                entries.len(),
                shown.len()
            )
        } else {
            format!("Today ({today}): {} entries", entries.len())
        }];
        lines.extend(shown.iter().map(|entry| self.render_entry(entry, false)));
        Ok(lines.join("\n"))
    }

    fn render_entry(&self, entry: &LogEntry, with_date: bool) -> String {
        let local = entry.timestamp.with_timezone(&self.timezone);
        let stamp = if with_date {
            local.format("%Y-%m-%d %H:%M")
        } else {
            local.format("%H:%M")
        };
        format!("{stamp} [{}] {}", entry.source, entry.message)
    }
}

pub fn render_stats(counts: &std::collections::BTreeMap<LogSource, u64>) -> String {
    let total: u64 = counts.values().sum();
    let mut by_name = counts.iter().collect::<Vec<_>>();
    by_name.sort_by_key(|(source, _)| source.as_str());
    let mut lines = vec![format!("Total entries: {total}")];
    lines.extend(
        by_name
            .into_iter()
            .map(|(source, count)| format!("{source}: {count}")),
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests;
