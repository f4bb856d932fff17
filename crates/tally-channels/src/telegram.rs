//! Telegram Bot API client: `getUpdates` long polling and `sendMessage`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;

use crate::{ChatSender, UpdateSource, UpstreamError, UpstreamErrorCode};

/// Telegram rejects messages longer than this many characters.
pub const TELEGRAM_MESSAGE_MAX_CHARS: usize = 4096;

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: String,
    /// Seconds the server may hold a `getUpdates` call open.
    pub long_poll_timeout_seconds: u64,
    pub request_timeout_ms: u64,
    /// Attempts per `getUpdates` call. `sendMessage` is never retried.
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            bot_token: String::new(),
            long_poll_timeout_seconds: 25,
            request_timeout_ms: 10_000,
            retry_max_attempts: 2,
            retry_base_delay_ms: 250,
        }
    }
}

/// One inbound update reduced to the fields the reconciler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub chat_id: Option<i64>,
    pub text: Option<String>,
}

impl InboundUpdate {
    fn from_value(update: &Value) -> Option<Self> {
        let update_id = update.get("update_id").and_then(Value::as_i64)?;
        let message = update
            .get("message")
            .or_else(|| update.get("edited_message"));
        let chat_id = message
            .and_then(|message| message.pointer("/chat/id"))
            .and_then(Value::as_i64);
        let text = message
            .and_then(|message| message.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            update_id,
            chat_id,
            text,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TelegramApiClient {
    client: Client,
    config: TelegramConfig,
}

impl TelegramApiClient {
    pub fn new(config: TelegramConfig) -> Result<Self, UpstreamError> {
        if config.bot_token.trim().is_empty() {
            return Err(UpstreamError::new(
                UpstreamErrorCode::AuthFailed,
                "telegram bot token cannot be empty",
                false,
            ));
        }
        if config.api_base.trim().trim_end_matches('/').is_empty() {
            return Err(UpstreamError::new(
                UpstreamErrorCode::ProviderUnavailable,
                "telegram api base cannot be empty",
                false,
            ));
        }
        // The long-poll hold time sits on top of the normal request budget.
        let timeout = Duration::from_millis(config.request_timeout_ms.max(1))
            + Duration::from_secs(config.long_poll_timeout_seconds);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                UpstreamError::new(
                    UpstreamErrorCode::TransportError,
                    format!("failed to create telegram client: {}", error.without_url()),
                    false,
                )
            })?;
        Ok(Self { client, config })
    }

    fn method_url(&self, method: &str) -> String {
        let base = self.config.api_base.trim().trim_end_matches('/');
        format!("{base}/bot{}/{method}", self.config.bot_token.trim())
    }

    pub async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<Vec<InboundUpdate>, UpstreamError> {
        let url = self.method_url("getUpdates");
        let timeout = self.config.long_poll_timeout_seconds.to_string();
        let offset = offset.map(|value| value.to_string());
        let max_attempts = self.config.retry_max_attempts;
        let response = self
            .request_json_with_retry(max_attempts, || {
                let mut query = vec![("timeout", timeout.as_str())];
                if let Some(offset) = offset.as_deref() {
                    query.push(("offset", offset));
                }
                self.client.get(url.as_str()).query(&query)
            })
            .await?;

        let updates = response
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                UpstreamError::new(
                    UpstreamErrorCode::ParseFailed,
                    "telegram getUpdates response missing result[]",
                    false,
                )
            })?;
        let mut parsed = Vec::with_capacity(updates.len());
        for update in updates {
            match InboundUpdate::from_value(update) {
                Some(update) => parsed.push(update),
                None => tracing::warn!("skipping telegram update without update_id"),
            }
        }
        Ok(parsed)
    }

    /// Single attempt. A retried send could reach the chat twice, so failures
    /// are returned to the caller as-is.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), UpstreamError> {
        let url = self.method_url("sendMessage");
        let body = json!({ "chat_id": chat_id, "text": text });
        self.request_json_with_retry(1, || self.client.post(url.as_str()).json(&body))
            .await?;
        Ok(())
    }

    async fn request_json_with_retry<F>(
        &self,
        max_attempts: usize,
        build_request: F,
    ) -> Result<Value, UpstreamError>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = match build_request().send().await {
                Ok(response) => response,
                Err(error) => {
                    if attempt < max_attempts {
                        self.sleep_retry_backoff(attempt, None).await;
                        continue;
                    }
                    return Err(UpstreamError::new(
                        UpstreamErrorCode::TransportError,
                        format!("telegram transport error: {}", error.without_url()),
                        true,
                    ));
                }
            };

            let status = response.status();
            if status.is_success() {
                let parsed = response.json::<Value>().await.map_err(|error| {
                    UpstreamError::new(
                        UpstreamErrorCode::ParseFailed,
                        format!("telegram response parse error: {}", error.without_url()),
                        false,
                    )
                })?;
                if parsed.get("ok").and_then(Value::as_bool) == Some(false) {
                    let description = parsed
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error");
                    return Err(UpstreamError::new(
                        UpstreamErrorCode::ProviderUnavailable,
                        format!("telegram api error: {description}"),
                        false,
                    ));
                }
                return Ok(parsed);
            }

            let retry_after = parse_retry_after(response.headers());
            if tally_core::is_retryable_status(status.as_u16()) && attempt < max_attempts {
                self.sleep_retry_backoff(attempt, retry_after).await;
                continue;
            }
            return Err(UpstreamError::from_status("telegram", status.as_u16()));
        }
    }

    async fn sleep_retry_backoff(&self, attempt: usize, retry_after_seconds: Option<u64>) {
        if self.config.retry_base_delay_ms == 0 && retry_after_seconds.is_none() {
            return;
        }
        sleep(tally_core::retry_delay(
            self.config.retry_base_delay_ms,
            attempt,
            retry_after_seconds,
        ))
        .await;
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().parse::<u64>().ok())
}

#[async_trait]
impl UpdateSource for TelegramApiClient {
    async fn fetch_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<Vec<InboundUpdate>, UpstreamError> {
        self.get_updates(offset).await
    }
}

#[async_trait]
impl ChatSender for TelegramApiClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), UpstreamError> {
        self.send_message(chat_id, text).await
    }
}
