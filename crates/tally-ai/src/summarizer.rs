//! Narrative summaries of a day's log entries.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tally_store::LogEntry;

use crate::{ChatRequest, LlmClient, Message, TallyAiError};

const SYSTEM_PROMPT: &str = "You summarize a personal activity log. Reply with a short, \
plain-text paragraph describing what happened. Do not invent entries.";

/// Produces a narrative for a set of entries. Failures are reported, never retried here.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, entries: &[LogEntry]) -> Result<String, TallyAiError>;
}

#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub model: String,
    pub timeout_ms: u64,
    pub max_entries: usize,
    pub max_tokens: u32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            timeout_ms: 30_000,
            max_entries: 200,
            max_tokens: 300,
        }
    }
}

/// Summarizer backed by any [`LlmClient`], bounded by a timeout.
#[derive(Clone)]
pub struct LlmSummarizer {
    client: Arc<dyn LlmClient>,
    config: SummarizerConfig,
}

impl LlmSummarizer {
    pub fn new(client: Arc<dyn LlmClient>, config: SummarizerConfig) -> Self {
        Self { client, config }
    }

    fn build_request(&self, entries: &[LogEntry]) -> ChatRequest {
        let skip = entries.len().saturating_sub(self.config.max_entries);
        let lines = entries[skip..]
            .iter()
            .map(LogEntry::render_line)
            .collect::<Vec<_>>()
            .join("\n");
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(format!("Log entries:\n{lines}")),
            ],
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(0.3),
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, entries: &[LogEntry]) -> Result<String, TallyAiError> {
        if entries.is_empty() {
            return Ok("No activity was logged.".to_string());
        }
        let request = self.build_request(entries);
        let timeout = Duration::from_millis(self.config.timeout_ms.max(1));
        match tokio::time::timeout(timeout, self.client.complete(request)).await {
            Ok(result) => result.map(|response| response.text),
            Err(_) => Err(TallyAiError::Timeout(self.config.timeout_ms)),
        }
    }
}

/// Used when no completion API key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, _entries: &[LogEntry]) -> Result<String, TallyAiError> {
        Err(TallyAiError::MissingApiKey)
    }
}
