//! Text-completion collaborator used to narrate daily digests.

mod openai;
mod retry;
mod summarizer;
mod types;

pub use openai::{OpenAiClient, OpenAiConfig};
pub use summarizer::{DisabledSummarizer, LlmSummarizer, Summarizer, SummarizerConfig};
pub use types::{ChatRequest, ChatResponse, LlmClient, Message, MessageRole, TallyAiError};
