use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;

use crate::retry::{
    is_retryable_http_error, parse_retry_after_ms, provider_retry_delay_ms, should_retry_status,
};
use crate::{ChatRequest, ChatResponse, LlmClient, TallyAiError};

#[derive(Debug, Clone)]
/// Connection settings for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, TallyAiError> {
        if config.api_key.trim().is_empty() {
            return Err(TallyAiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|e| {
                TallyAiError::InvalidResponse(format!("invalid API key header: {e}"))
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self { client, config })
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, TallyAiError> {
        let body = build_chat_request_body(&request);
        let url = self.chat_completions_url();
        let max_retries = self.config.max_retries;

        for attempt in 0..=max_retries {
            let response = self
                .client
                .post(&url)
                .header("x-tally-retry-attempt", attempt.to_string())
                .json(&body)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let raw = response.text().await?;
                        return parse_chat_response(&raw);
                    }

                    let retry_after_ms = parse_retry_after_ms(response.headers());
                    let raw = response.text().await.unwrap_or_default();
                    if attempt < max_retries && should_retry_status(status.as_u16()) {
                        let delay_ms = provider_retry_delay_ms(attempt + 1, retry_after_ms);
                        tracing::debug!(
                            status = status.as_u16(),
                            attempt,
                            delay_ms,
                            "retrying completion request"
                        );
                        sleep(Duration::from_millis(delay_ms)).await;
                        continue;
                    }
                    return Err(TallyAiError::HttpStatus {
                        status: status.as_u16(),
                        body: tally_core::truncate_for_error(&raw, 512),
                    });
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_http_error(&error) {
                        let delay_ms = provider_retry_delay_ms(attempt + 1, None);
                        tracing::debug!(
                            %error,
                            attempt,
                            delay_ms,
                            "retrying completion request after transport error"
                        );
                        sleep(Duration::from_millis(delay_ms)).await;
                        continue;
                    }
                    return Err(TallyAiError::Http(error));
                }
            }
        }

        Err(TallyAiError::InvalidResponse(
            "request retry loop terminated unexpectedly".to_string(),
        ))
    }
}

fn build_chat_request_body(request: &ChatRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": request.messages,
    });
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<Value>,
}

fn parse_chat_response(raw: &str) -> Result<ChatResponse, TallyAiError> {
    let parsed: OpenAiChatResponse = serde_json::from_str(raw)?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| TallyAiError::InvalidResponse("response contained no choices".to_string()))?;

    let text = match choice.message.content {
        Some(Value::String(text)) => text,
        // Content-part arrays: concatenate the text parts.
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    };
    if text.trim().is_empty() {
        return Err(TallyAiError::InvalidResponse(
            "response contained no text content".to_string(),
        ));
    }

    Ok(ChatResponse {
        text: text.trim().to_string(),
        finish_reason: choice.finish_reason,
    })
}
