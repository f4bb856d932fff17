//! SQLite-backed `LogStore` implementation with durable persistence.

use crate::{
    finalize_query_result, LogEntry, LogQuery, LogSource, LogStore, StoreError, StoreResult,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ToSql};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Persistent SQLite store. Appends go through a single writer connection
/// behind a lock; every read opens its own connection and runs one statement.
#[derive(Debug)]
pub struct SqliteLogStore {
    db_path: PathBuf,
    writer: Mutex<Connection>,
}

impl SqliteLogStore {
    /// Creates a SQLite-backed store at `path`, creating schema if needed.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let connection = open_connection(&db_path)?;
        initialize_schema(&connection)?;
        Ok(Self {
            db_path,
            writer: Mutex::new(connection),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Appends with an explicit timestamp.
    pub fn append_at(
        &self,
        source: LogSource,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<LogEntry> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| StoreError::StorageUnavailable("writer lock poisoned".to_string()))?;
        writer.execute(
            "INSERT INTO logs (source, message, timestamp) VALUES (?1, ?2, ?3)",
            params![source.as_str(), message, timestamp_to_db(timestamp)],
        )?;
        let id = writer.last_insert_rowid();
        Ok(LogEntry {
            id,
            source,
            message: message.to_string(),
            timestamp: timestamp_from_db(&timestamp_to_db(timestamp))?,
        })
    }
}

pub(crate) fn open_connection(db_path: &Path) -> StoreResult<Connection> {
    let connection = Connection::open(db_path)?;
    connection.busy_timeout(Duration::from_secs(5))?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        "#,
    )?;
    Ok(connection)
}

pub(crate) fn initialize_schema(connection: &Connection) -> StoreResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            message TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs (timestamp, id);

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn append(&self, source: LogSource, message: &str) -> StoreResult<LogEntry> {
        self.append_at(source, message, Utc::now())
    }

    async fn query(&self, query: LogQuery) -> StoreResult<Vec<LogEntry>> {
        let connection = open_connection(&self.db_path)?;
        let mut sql = String::from("SELECT id, source, message, timestamp FROM logs WHERE 1 = 1");
        let mut values: Vec<String> = Vec::new();
        if let Some(source) = query.source {
            values.push(source.as_str().to_string());
            sql.push_str(&format!(" AND source = ?{}", values.len()));
        }
        if let Some(since) = query.since {
            values.push(timestamp_to_db(since));
            sql.push_str(&format!(" AND timestamp >= ?{}", values.len()));
        }
        if let Some(until) = query.until {
            values.push(timestamp_to_db(until));
            sql.push_str(&format!(" AND timestamp < ?{}", values.len()));
        }
        sql.push_str(" ORDER BY timestamp ASC, id ASC");

        let mut statement = connection.prepare(&sql)?;
        let bound = values
            .iter()
            .map(|value| value as &dyn ToSql)
            .collect::<Vec<_>>();
        let mut rows = statement.query(bound.as_slice())?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let message: String = row.get(2)?;
            if let Some(needle) = query.text_contains.as_deref() {
                if !crate::contains_case_insensitive(&message, needle) {
                    continue;
                }
            }
            let source: String = row.get(1)?;
            let timestamp: String = row.get(3)?;
            entries.push(LogEntry {
                id: row.get(0)?,
                source: source.parse()?,
                message,
                timestamp: timestamp_from_db(&timestamp)?,
            });
        }
        Ok(finalize_query_result(entries, &query))
    }

    async fn count_by_source(&self) -> StoreResult<BTreeMap<LogSource, u64>> {
        let connection = open_connection(&self.db_path)?;
        let mut statement =
            connection.prepare("SELECT source, COUNT(*) FROM logs GROUP BY source")?;
        let mut rows = statement.query([])?;
        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let source: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            counts.insert(source.parse::<LogSource>()?, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }
}

/// Fixed-width UTC form so lexicographic order equals chronological order.
fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_from_db(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidPersistedValue {
            field: "timestamp",
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::SqliteLogStore;
    use crate::{LogQuery, LogSource, LogStore};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn integration_persists_entries_across_reopen() {
        let temp = tempdir().expect("create tempdir");
        let db_path = temp.path().join("nested").join("tally.sqlite");
        {
            let store = SqliteLogStore::new(&db_path).expect("open store");
            store.append(LogSource::Web, "first").await.expect("append");
            store.append(LogSource::Chat, "second").await.expect("append");
        }

        let reopened = SqliteLogStore::new(&db_path).expect("reopen store");
        let entries = reopened.query(LogQuery::all()).await.expect("query");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[1].source, LogSource::Chat);
        assert!(entries[0].id < entries[1].id);
    }

    #[tokio::test]
    async fn functional_query_orders_ties_by_id_and_applies_bounds() {
        let temp = tempdir().expect("create tempdir");
        let store = SqliteLogStore::new(temp.path().join("tally.sqlite")).expect("open store");
        let base = Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap();
        store
            .append_at(LogSource::Web, "after", base + Duration::seconds(1))
            .expect("append");
        store.append_at(LogSource::Web, "tie-1", base).expect("append");
        store.append_at(LogSource::Chat, "tie-2", base).expect("append");
        store
            .append_at(LogSource::System, "yesterday", base - Duration::days(1))
            .expect("append");

        let bounded = store
            .query(LogQuery::between(base, base + Duration::hours(1)))
            .await
            .expect("query");
        let messages = bounded
            .iter()
            .map(|entry| entry.message.as_str())
            .collect::<Vec<_>>();
        assert_eq!(messages, vec!["tie-1", "tie-2", "after"]);

        let chat_only = store
            .query(LogQuery::all().with_source(LogSource::Chat))
            .await
            .expect("query");
        assert_eq!(chat_only.len(), 1);
    }

    #[tokio::test]
    async fn functional_search_is_case_insensitive_and_recent_window_keeps_order() {
        let temp = tempdir().expect("create tempdir");
        let store = SqliteLogStore::new(temp.path().join("tally.sqlite")).expect("open store");
        for message in ["Alpha", "beta", "ALPHA two", "alpha three"] {
            store.append(LogSource::Web, message).await.expect("append");
        }

        let matched = store
            .query(LogQuery::all().with_text("alpha").most_recent(2))
            .await
            .expect("query");
        let messages = matched
            .iter()
            .map(|entry| entry.message.as_str())
            .collect::<Vec<_>>();
        assert_eq!(messages, vec!["ALPHA two", "alpha three"]);
    }

    #[tokio::test]
    async fn functional_count_by_source_omits_empty_sources() {
        let temp = tempdir().expect("create tempdir");
        let store = SqliteLogStore::new(temp.path().join("tally.sqlite")).expect("open store");
        assert!(store.count_by_source().await.expect("counts").is_empty());

        store.append(LogSource::Web, "a").await.expect("append");
        store.append(LogSource::Web, "b").await.expect("append");
        store.append(LogSource::System, "c").await.expect("append");
        let counts = store.count_by_source().await.expect("counts");
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[&LogSource::Web], 2);
        assert_eq!(counts[&LogSource::System], 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn integration_concurrent_appends_are_serialized() {
        let temp = tempdir().expect("create tempdir");
        let store = Arc::new(SqliteLogStore::new(temp.path().join("tally.sqlite")).expect("open"));
        let mut tasks = Vec::new();
        for worker in 0..4 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                for index in 0..10 {
                    store
                        .append(LogSource::Chat, &format!("w{worker}-{index}"))
                        .await
                        .expect("append");
                }
            }));
        }
        for task in tasks {
            task.await.expect("join");
        }

        let entries = store.query(LogQuery::all()).await.expect("query");
        assert_eq!(entries.len(), 40);
        let mut ids = entries.iter().map(|entry| entry.id).collect::<Vec<_>>();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 40);
    }

    #[tokio::test]
    async fn regression_unwritable_path_reports_storage_unavailable() {
        let temp = tempdir().expect("create tempdir");
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "file").expect("write blocker");
        let error = SqliteLogStore::new(blocker.join("tally.sqlite")).expect_err("must fail");
        assert!(error.is_storage_unavailable());
    }
}
