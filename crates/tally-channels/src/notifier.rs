//! Failure-isolating fan-out to the chat channel and to email.
//!
//! Each call makes exactly one delivery attempt. Failures are logged and
//! counted, never returned, so callers keep running.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{ChatSender, MailTransport, TELEGRAM_MESSAGE_MAX_CHARS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    /// The channel is not configured.
    Skipped,
    Failed(String),
}

impl NotifyOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotifierHealth {
    pub chat_enabled: bool,
    pub chat_delivered: u64,
    pub chat_failed: u64,
    pub email_enabled: bool,
    pub email_delivered: u64,
    pub email_failed: u64,
}

#[derive(Debug, Default)]
struct ChannelCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl ChannelCounters {
    fn record(&self, outcome: &NotifyOutcome) {
        match outcome {
            NotifyOutcome::Delivered => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            NotifyOutcome::Failed(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            NotifyOutcome::Skipped => {}
        }
    }
}

#[derive(Clone, Default)]
pub struct Notifier {
    chat: Option<Arc<dyn ChatSender>>,
    mail: Option<Arc<dyn MailTransport>>,
    chat_counters: Arc<ChannelCounters>,
    email_counters: Arc<ChannelCounters>,
}

impl Notifier {
    pub fn new(chat: Option<Arc<dyn ChatSender>>, mail: Option<Arc<dyn MailTransport>>) -> Self {
        Self {
            chat,
            mail,
            ..Self::default()
        }
    }

    pub async fn notify_channel(&self, origin_id: i64, text: &str) -> NotifyOutcome {
        let Some(chat) = self.chat.as_ref() else {
            tracing::debug!(origin_id, "chat channel not configured; skipping notification");
            return NotifyOutcome::Skipped;
        };
        let text = if text.chars().count() > TELEGRAM_MESSAGE_MAX_CHARS {
            tally_core::truncate_chars(text, TELEGRAM_MESSAGE_MAX_CHARS - 3)
        } else {
            text.to_string()
        };
        let outcome = match chat.send_text(origin_id, &text).await {
            Ok(()) => NotifyOutcome::Delivered,
            Err(error) => {
                tracing::warn!(origin_id, code = %error.code, %error, "chat notification dropped");
                NotifyOutcome::Failed(error.to_string())
            }
        };
        self.chat_counters.record(&outcome);
        outcome
    }

    pub async fn notify_email(&self, subject: &str, body: &str) -> NotifyOutcome {
        let Some(mail) = self.mail.as_ref() else {
            tracing::debug!(subject, "mail transport not configured; skipping notification");
            return NotifyOutcome::Skipped;
        };
        let outcome = match mail.send_mail(subject, body).await {
            Ok(()) => NotifyOutcome::Delivered,
            Err(error) => {
                tracing::warn!(subject, code = %error.code, %error, "email notification dropped");
                NotifyOutcome::Failed(error.to_string())
            }
        };
        self.email_counters.record(&outcome);
        outcome
    }

    pub fn health(&self) -> NotifierHealth {
        NotifierHealth {
            chat_enabled: self.chat.is_some(),
            chat_delivered: self.chat_counters.delivered.load(Ordering::Relaxed),
            chat_failed: self.chat_counters.failed.load(Ordering::Relaxed),
            email_enabled: self.mail.is_some(),
            email_delivered: self.email_counters.delivered.load(Ordering::Relaxed),
            email_failed: self.email_counters.failed.load(Ordering::Relaxed),
        }
    }
}
