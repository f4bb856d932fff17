//! Outbound and inbound messaging transports: the Telegram Bot API, SMTP mail,
//! and the failure-isolating `Notifier` that fronts both.

mod error;
mod notifier;
mod smtp;
mod telegram;

pub use error::{UpstreamError, UpstreamErrorCode};
pub use notifier::{NotifyOutcome, Notifier, NotifierHealth};
pub use smtp::{SmtpConfig, SmtpMailer};
pub use telegram::{InboundUpdate, TelegramApiClient, TelegramConfig, TELEGRAM_MESSAGE_MAX_CHARS};

use async_trait::async_trait;

/// Source of inbound chat updates polled with offset semantics.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Returns pending updates with `update_id >= offset` (all pending when `None`).
    async fn fetch_updates(&self, offset: Option<i64>) -> Result<Vec<InboundUpdate>, UpstreamError>;
}

/// Sends text to a chat identified by `chat_id`.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), UpstreamError>;
}

/// Delivers a plain-text mail to the configured recipient.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send_mail(&self, subject: &str, body: &str) -> Result<(), UpstreamError>;
}
