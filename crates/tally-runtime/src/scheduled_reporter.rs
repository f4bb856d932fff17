//! Daily digest job: once per calendar day at a wall-clock time in the
//! configured timezone. Missed fires are not backfilled.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tally_ai::Summarizer;
use tally_channels::{NotifyOutcome, Notifier};
use tally_store::{LogEntry, LogQuery, LogSource, LogStore, StoreError};

use crate::command_dispatch::{render_stats, REPORT_MAX_ENTRIES};
use crate::service_handle::{sleep_or_shutdown, ShutdownSignal};

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub report_time: NaiveTime,
    pub timezone: Tz,
}

/// Parses a `HH:MM` wall-clock time.
pub fn parse_report_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|error| format!("invalid report time '{}' (expected HH:MM): {error}", raw.trim()))
}

fn daily_schedule(report_time: NaiveTime) -> Result<Schedule> {
    let expression = format!("0 {} {} * * *", report_time.minute(), report_time.hour());
    Schedule::from_str(&expression)
        .with_context(|| format!("invalid cron expression '{expression}'"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportDigest {
    pub date: NaiveDate,
    pub timezone: Tz,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub count_by_source: BTreeMap<LogSource, u64>,
    pub narrative_summary: Option<String>,
    pub entries: Vec<LogEntry>,
}

impl ReportDigest {
    pub fn total(&self) -> u64 {
        self.count_by_source.values().sum()
    }
}

/// Renders `(subject, body)` for the digest mail.
pub fn render_digest(digest: &ReportDigest) -> (String, String) {
    let subject = format!("Tally daily digest for {}", digest.date);
    let start = digest.period_start.with_timezone(&digest.timezone);
    let end = digest.period_end.with_timezone(&digest.timezone);
    let mut body = vec![
        format!("Daily digest for {} ({})", digest.date, digest.timezone),
        format!(
            "Period: {} to {}",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M")
        ),
        render_stats(&digest.count_by_source),
        String::new(),
        "Summary:".to_string(),
        digest
            .narrative_summary
            .clone()
            .unwrap_or_else(|| "(none)".to_string()),
    ];
    if !digest.entries.is_empty() {
        body.push(String::new());
        body.push("Entries:".to_string());
        let shown = &digest.entries[digest.entries.len().saturating_sub(REPORT_MAX_ENTRIES)..];
        for entry in shown {
            body.push(format!(
                "{} [{}] {}",
                entry.timestamp.with_timezone(&digest.timezone).format("%H:%M"),
                entry.source,
                entry.message
            ));
        }
    }
    (subject, body.join("\n"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportTickOutcome {
    Sent(NotifyOutcome),
    AlreadyReported(NaiveDate),
    StorageFailed(String),
}

pub struct ScheduledReporter {
    store: Arc<dyn LogStore>,
    summarizer: Arc<dyn Summarizer>,
    notifier: Notifier,
    config: ReporterConfig,
    schedule: Schedule,
    last_report_date: Option<NaiveDate>,
}

impl ScheduledReporter {
    pub fn new(
        store: Arc<dyn LogStore>,
        summarizer: Arc<dyn Summarizer>,
        notifier: Notifier,
        config: ReporterConfig,
    ) -> Result<Self> {
        let schedule = daily_schedule(config.report_time)?;
        Ok(Self {
            store,
            summarizer,
            notifier,
            config,
            schedule,
            last_report_date: None,
        })
    }

    pub fn last_report_date(&self) -> Option<NaiveDate> {
        self.last_report_date
    }

    /// First scheduled instant strictly after `after`.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.config.timezone);
        self.schedule
            .after(&local)
            .next()
            .map(|next| next.with_timezone(&Utc))
    }

    pub async fn build_digest(&self, now: DateTime<Utc>) -> Result<ReportDigest, StoreError> {
        let timezone = self.config.timezone;
        let (period_start, period_end) = tally_core::local_day_bounds(timezone, now);
        let entries = self
            .store
            .query(LogQuery::between(period_start, period_end))
            .await?;
        let mut count_by_source = BTreeMap::new();
        for entry in &entries {
            *count_by_source.entry(entry.source).or_insert(0_u64) += 1;
        }
        let narrative_summary = match self.summarizer.summarize(&entries).await {
            Ok(summary) => summary,
            Err(error) => {
                tracing::warn!(%error, "digest summary unavailable");
                format!("Summary unavailable: {error}")
            }
        };
        Ok(ReportDigest {
            date: tally_core::local_date(timezone, now),
            timezone,
            period_start,
            period_end,
            count_by_source,
            narrative_summary: Some(narrative_summary),
            entries,
        })
    }

    /// Builds and mails the digest for the local day containing `now`, at most
    /// once per day. Never returns an error.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> ReportTickOutcome {
        let today = tally_core::local_date(self.config.timezone, now);
        if self.last_report_date == Some(today) {
            tracing::debug!(%today, "digest already sent today");
            return ReportTickOutcome::AlreadyReported(today);
        }
        let digest = match self.build_digest(now).await {
            Ok(digest) => digest,
            Err(error) => {
                tracing::error!(%error, %today, "digest skipped: storage unavailable");
                return ReportTickOutcome::StorageFailed(error.to_string());
            }
        };
        let (subject, body) = render_digest(&digest);
        let outcome = self.notifier.notify_email(&subject, &body).await;
        self.last_report_date = Some(today);
        tracing::info!(%today, total = digest.total(), ?outcome, "daily digest attempted");
        ReportTickOutcome::Sent(outcome)
    }

    pub async fn run(mut self, mut shutdown_rx: ShutdownSignal) -> Result<()> {
        loop {
            let now = Utc::now();
            let next = self
                .next_fire_after(now)
                .ok_or_else(|| anyhow!("daily report schedule has no future occurrence"))?;
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::debug!(next_fire = %next, "scheduled reporter sleeping");
            if sleep_or_shutdown(wait, &mut shutdown_rx).await {
                tracing::info!("scheduled reporter stopping");
                return Ok(());
            }
            self.tick(next).await;
        }
    }
}
