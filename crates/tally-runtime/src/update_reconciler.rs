//! Telegram update reconciliation: fetch pending updates, dispatch each at
//! most once per process, reply, then advance the cursor.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tally_channels::{InboundUpdate, Notifier, UpdateSource};
use tally_store::StoreError;

use crate::command_dispatch::CommandDispatcher;
use crate::service_handle::{sleep_or_shutdown, ShutdownSignal};

/// Last update id whose processing finished. Only moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Cursor {
    pub last_seen_id: Option<i64>,
}

impl Cursor {
    pub fn has_seen(&self, update_id: i64) -> bool {
        self.last_seen_id.is_some_and(|last| update_id <= last)
    }

    fn advance(&mut self, update_id: i64) {
        if !self.has_seen(update_id) {
            self.last_seen_id = Some(update_id);
        }
    }

    /// Offset to request from the source: one past the last seen id.
    pub fn next_offset(&self) -> Option<i64> {
        self.last_seen_id.map(|last| last.saturating_add(1))
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub poll_interval: Duration,
    /// Chats allowed to issue commands. Empty accepts every chat.
    pub allowed_chat_ids: BTreeSet<i64>,
    pub fetch_backoff_base: Duration,
    pub fetch_backoff_max: Duration,
    pub max_consecutive_storage_failures: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            allowed_chat_ids: BTreeSet::new(),
            fetch_backoff_base: Duration::from_secs(1),
            fetch_backoff_max: Duration::from_secs(60),
            max_consecutive_storage_failures: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCycleReport {
    pub discovered: usize,
    pub dispatched: usize,
    pub duplicates_skipped: usize,
    pub ignored: usize,
    pub reply_failures: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilerState {
    #[default]
    Idle,
    Polling,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilerHealthSnapshot {
    pub state: ReconcilerState,
    pub last_seen_id: Option<i64>,
    pub cycles: u64,
    pub dispatched_total: u64,
    pub duplicates_total: u64,
    pub ignored_total: u64,
    pub reply_failures_total: u64,
    pub fetch_failure_streak: u32,
    pub storage_failure_streak: u32,
    pub last_success_unix_ms: Option<u64>,
    pub last_error: Option<String>,
}

/// Shared view of the reconciler for status endpoints. Written only by the
/// reconciler loop.
#[derive(Debug, Default)]
pub struct ReconcilerHealth {
    inner: RwLock<ReconcilerHealthSnapshot>,
}

impl ReconcilerHealth {
    pub fn snapshot(&self) -> ReconcilerHealthSnapshot {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn update(&self, apply: impl FnOnce(&mut ReconcilerHealthSnapshot)) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut guard);
    }
}

pub struct UpdateReconciler {
    source: Arc<dyn UpdateSource>,
    dispatcher: Arc<CommandDispatcher>,
    notifier: Notifier,
    config: ReconcilerConfig,
    cursor: Cursor,
    health: Arc<ReconcilerHealth>,
}

impl UpdateReconciler {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        dispatcher: Arc<CommandDispatcher>,
        notifier: Notifier,
        config: ReconcilerConfig,
        health: Arc<ReconcilerHealth>,
    ) -> Self {
        Self {
            source,
            dispatcher,
            notifier,
            config,
            cursor: Cursor::default(),
            health,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    fn chat_allowed(&self, chat_id: i64) -> bool {
        self.config.allowed_chat_ids.is_empty() || self.config.allowed_chat_ids.contains(&chat_id)
    }

    /// Processes one fetched batch in ascending id order. On a storage
    /// failure the cursor stays before the failing update and the error is
    /// returned; updates already handled in this batch keep their progress.
    pub async fn process_batch(
        &mut self,
        mut updates: Vec<InboundUpdate>,
    ) -> Result<ReconcileCycleReport, StoreError> {
        updates.sort_by_key(|update| update.update_id);
        let mut report = ReconcileCycleReport {
            discovered: updates.len(),
            ..ReconcileCycleReport::default()
        };

        for update in updates {
            if self.cursor.has_seen(update.update_id) {
                report.duplicates_skipped += 1;
                continue;
            }

            let text = update.text.as_deref().map(str::trim).unwrap_or_default();
            let Some(chat_id) = update.chat_id.filter(|chat_id| self.chat_allowed(*chat_id)) else {
                tracing::debug!(
                    update_id = update.update_id,
                    chat_id = ?update.chat_id,
                    "ignoring update from chat outside allowlist"
                );
                report.ignored += 1;
                self.cursor.advance(update.update_id);
                continue;
            };
            if text.is_empty() {
                tracing::debug!(update_id = update.update_id, "ignoring update without text");
                report.ignored += 1;
                self.cursor.advance(update.update_id);
                continue;
            }

            let outcome = match self.dispatcher.dispatch(chat_id, text).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::error!(
                        update_id = update.update_id,
                        %error,
                        dispatched = report.dispatched,
                        "dispatch failed; update will be retried next cycle"
                    );
                    self.record_cycle(&report);
                    return Err(error);
                }
            };
            report.dispatched += 1;
            if !self
                .notifier
                .notify_channel(chat_id, &outcome.response)
                .await
                .is_delivered()
            {
                report.reply_failures += 1;
            }
            self.cursor.advance(update.update_id);
        }

        self.record_cycle(&report);
        Ok(report)
    }

    fn record_cycle(&self, report: &ReconcileCycleReport) {
        let last_seen_id = self.cursor.last_seen_id;
        self.health.update(|health| {
            health.last_seen_id = last_seen_id;
            health.dispatched_total += report.dispatched as u64;
            health.duplicates_total += report.duplicates_skipped as u64;
            health.ignored_total += report.ignored as u64;
            health.reply_failures_total += report.reply_failures as u64;
        });
    }

    fn fetch_backoff(&self, failure_streak: u32) -> Duration {
        let base_ms = u64::try_from(self.config.fetch_backoff_base.as_millis()).unwrap_or(u64::MAX);
        tally_core::retry_delay(base_ms, failure_streak as usize, None)
            .min(self.config.fetch_backoff_max)
    }

    /// Runs until shutdown. Returns an error only after
    /// `max_consecutive_storage_failures` cycles in a row fail on storage.
    pub async fn run(mut self, mut shutdown_rx: ShutdownSignal) -> anyhow::Result<()> {
        let mut fetch_failure_streak = 0_u32;
        let mut storage_failure_streak = 0_u32;
        loop {
            self.health.update(|health| health.state = ReconcilerState::Polling);
            let offset = self.cursor.next_offset();
            let fetched = tokio::select! {
                _ = &mut shutdown_rx => {
                    self.health.update(|health| health.state = ReconcilerState::Stopped);
                    tracing::info!(
                        last_seen_id = ?self.cursor.last_seen_id,
                        "update reconciler stopping"
                    );
                    return Ok(());
                }
                fetched = self.source.fetch_updates(offset) => fetched,
            };

            let mut wait = self.config.poll_interval;
            match fetched {
                Err(error) => {
                    fetch_failure_streak = fetch_failure_streak.saturating_add(1);
                    wait = self.fetch_backoff(fetch_failure_streak);
                    tracing::warn!(
                        code = %error.code,
                        %error,
                        failure_streak = fetch_failure_streak,
                        backoff_ms = wait.as_millis() as u64,
                        "update fetch failed"
                    );
                    let message = error.to_string();
                    self.health.update(|health| {
                        health.fetch_failure_streak = fetch_failure_streak;
                        health.last_error = Some(message);
                    });
                }
                Ok(updates) => {
                    fetch_failure_streak = 0;
                    match self.process_batch(updates).await {
                        Ok(report) => {
                            storage_failure_streak = 0;
                            if report.discovered > 0 {
                                tracing::info!(
                                    discovered = report.discovered,
                                    dispatched = report.dispatched,
                                    duplicates_skipped = report.duplicates_skipped,
                                    ignored = report.ignored,
                                    reply_failures = report.reply_failures,
                                    "reconcile cycle complete"
                                );
                            }
                            self.health.update(|health| {
                                health.cycles += 1;
                                health.fetch_failure_streak = 0;
                                health.storage_failure_streak = 0;
                                health.last_success_unix_ms =
                                    Some(tally_core::current_unix_timestamp_ms());
                            });
                        }
                        Err(error) => {
                            storage_failure_streak = storage_failure_streak.saturating_add(1);
                            let message = error.to_string();
                            self.health.update(|health| {
                                health.cycles += 1;
                                health.fetch_failure_streak = 0;
                                health.storage_failure_streak = storage_failure_streak;
                                health.last_error = Some(message);
                            });
                            let limit = self.config.max_consecutive_storage_failures.max(1);
                            if storage_failure_streak >= limit {
                                tracing::error!(
                                    %error,
                                    failures = storage_failure_streak,
                                    "storage unavailable; update reconciler exiting"
                                );
                                self.health.update(|health| health.state = ReconcilerState::Failed);
                                return Err(anyhow::Error::new(error).context(
                                    "update reconciler stopped after repeated storage failures",
                                ));
                            }
                        }
                    }
                }
            }

            self.health.update(|health| health.state = ReconcilerState::Idle);
            if sleep_or_shutdown(wait, &mut shutdown_rx).await {
                self.health.update(|health| health.state = ReconcilerState::Stopped);
                tracing::info!(
                    last_seen_id = ?self.cursor.last_seen_id,
                    "update reconciler stopping"
                );
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests;
