//! Log store abstractions, the in-memory backend, and the SQLite backend.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

mod sqlite;
mod users;

pub use sqlite::SqliteLogStore;
pub use users::{User, UserRole, UserStore};

/// Result type for log store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Persistence is unreachable or a write failed. Callers must surface it.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

impl StoreError {
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::StorageUnavailable(error.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        Self::StorageUnavailable(error.to_string())
    }
}

impl From<bcrypt::BcryptError> for StoreError {
    fn from(error: bcrypt::BcryptError) -> Self {
        Self::PasswordHash(error.to_string())
    }
}

/// Origin of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogSource {
    Web,
    Chat,
    System,
}

impl LogSource {
    pub const ALL: [LogSource; 3] = [LogSource::Web, LogSource::Chat, LogSource::System];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Web => "WEB",
            Self::Chat => "CHAT",
            Self::System => "SYSTEM",
        }
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogSource {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "WEB" => Ok(Self::Web),
            "CHAT" => Ok(Self::Chat),
            "SYSTEM" => Ok(Self::System),
            other => Err(StoreError::InvalidPersistedValue {
                field: "source",
                value: other.to_string(),
            }),
        }
    }
}

/// Immutable persisted log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub source: LogSource,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// Plain-text line with a UTC wall-clock timestamp.
    pub fn render_line(&self) -> String {
        self.render_line_in(&Utc)
    }

    /// Same as [`LogEntry::render_line`] with the timestamp shown in `tz`.
    pub fn render_line_in<Z>(&self, tz: &Z) -> String
    where
        Z: TimeZone,
        Z::Offset: fmt::Display,
    {
        format!(
            "[{}] {} - {}",
            self.source,
            self.timestamp
                .with_timezone(tz)
                .format("%Y-%m-%d %H:%M:%S"),
            self.message
        )
    }
}

/// Filter accepted by [`LogStore::query`]. Every field narrows the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub source: Option<LogSource>,
    /// Case-insensitive substring match on the message.
    pub text_contains: Option<String>,
    /// Inclusive lower bound.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub until: Option<DateTime<Utc>>,
    /// Keep only the `n` most recent matches, still returned oldest-first.
    pub limit_recent: Option<usize>,
}

impl LogQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            until: Some(until),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, needle: impl Into<String>) -> Self {
        self.text_contains = Some(needle.into());
        self
    }

    pub fn with_source(mut self, source: LogSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn most_recent(mut self, limit: usize) -> Self {
        self.limit_recent = Some(limit);
        self
    }

    fn matches(&self, entry: &LogEntry) -> bool {
        if self.source.is_some_and(|source| source != entry.source) {
            return false;
        }
        if self.since.is_some_and(|since| entry.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| entry.timestamp >= until) {
            return false;
        }
        match self.text_contains.as_deref() {
            Some(needle) => contains_case_insensitive(&entry.message, needle),
            None => true,
        }
    }
}

pub(crate) fn contains_case_insensitive(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Sorts by timestamp then id and applies the recent-window limit.
pub(crate) fn finalize_query_result(mut entries: Vec<LogEntry>, query: &LogQuery) -> Vec<LogEntry> {
    entries.sort_by(|left, right| {
        left.timestamp
            .cmp(&right.timestamp)
            .then(left.id.cmp(&right.id))
    });
    if let Some(limit) = query.limit_recent {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }
    entries
}

/// Async store contract shared by the HTTP surface, the dispatcher and the reporter.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn append(&self, source: LogSource, message: &str) -> StoreResult<LogEntry>;
    async fn query(&self, query: LogQuery) -> StoreResult<Vec<LogEntry>>;
    async fn count_by_source(&self) -> StoreResult<BTreeMap<LogSource, u64>>;
}

/// In-memory implementation for tests and local experimentation.
#[derive(Debug, Default)]
pub struct InMemoryLogStore {
    inner: RwLock<Vec<LogEntry>>,
    unavailable: AtomicBool,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `StorageUnavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Appends with an explicit timestamp.
    pub async fn append_at(
        &self,
        source: LogSource,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<LogEntry> {
        self.ensure_available()?;
        let mut inner = self.inner.write().await;
        let id = inner.last().map(|entry| entry.id + 1).unwrap_or(1);
        let entry = LogEntry {
            id,
            source,
            message: message.to_string(),
            timestamp,
        };
        inner.push(entry.clone());
        Ok(entry)
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::StorageUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn append(&self, source: LogSource, message: &str) -> StoreResult<LogEntry> {
        self.append_at(source, message, Utc::now()).await
    }

    async fn query(&self, query: LogQuery) -> StoreResult<Vec<LogEntry>> {
        self.ensure_available()?;
        let inner = self.inner.read().await;
        let matched = inner
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect::<Vec<_>>();
        Ok(finalize_query_result(matched, &query))
    }

    async fn count_by_source(&self) -> StoreResult<BTreeMap<LogSource, u64>> {
        self.ensure_available()?;
        let inner = self.inner.read().await;
        let mut counts = BTreeMap::new();
        for entry in inner.iter() {
            *counts.entry(entry.source).or_insert(0_u64) += 1;
        }
        Ok(counts)
    }
}
