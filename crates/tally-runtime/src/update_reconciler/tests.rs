use super::*;
use crate::service_handle::spawn_service;
use crate::system_health::{MetricsError, SystemMetrics, SystemMetricsSnapshot};
use async_trait::async_trait;
use chrono_tz::Tz;
use std::collections::VecDeque;
use std::sync::Mutex;
use tally_channels::{ChatSender, UpstreamError, UpstreamErrorCode};
use tally_store::{InMemoryLogStore, LogQuery, LogStore};

struct NoMetrics;

impl SystemMetrics for NoMetrics {
    fn sample(&self) -> Result<SystemMetricsSnapshot, MetricsError> {
        Err(MetricsError::Parse {
            what: "test",
            detail: "disabled".to_string(),
        })
    }
}

/// Serves scripted batches, then either repeats `fallback` or returns empty.
#[derive(Default)]
struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<InboundUpdate>, UpstreamError>>>,
    fallback: Vec<InboundUpdate>,
    offsets: Mutex<Vec<Option<i64>>>,
}

impl ScriptedSource {
    fn new(script: Vec<Result<Vec<InboundUpdate>, UpstreamError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    fn offsets(&self) -> Vec<Option<i64>> {
        self.offsets.lock().expect("lock").clone()
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn fetch_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<Vec<InboundUpdate>, UpstreamError> {
        self.offsets.lock().expect("lock").push(offset);
        let next = self.script.lock().expect("lock").pop_front();
        match next {
            Some(result) => result,
            None => Ok(self.fallback.clone()),
        }
    }
}

#[derive(Default)]
struct RecordingChat {
    sent: Mutex<Vec<(i64, String)>>,
    fail: bool,
}

#[async_trait]
impl ChatSender for RecordingChat {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), UpstreamError> {
        if self.fail {
            return Err(UpstreamError::new(
                UpstreamErrorCode::TransportError,
                "send failed",
                true,
            ));
        }
        self.sent.lock().expect("lock").push((chat_id, text.to_string()));
        Ok(())
    }
}

fn update(update_id: i64, chat_id: i64, text: &str) -> InboundUpdate {
    InboundUpdate {
        update_id,
        chat_id: Some(chat_id),
        text: Some(text.to_string()),
    }
}

struct Harness {
    store: Arc<InMemoryLogStore>,
    chat: Arc<RecordingChat>,
    health: Arc<ReconcilerHealth>,
}

fn test_config() -> ReconcilerConfig {
    ReconcilerConfig {
        poll_interval: Duration::from_millis(5),
        allowed_chat_ids: BTreeSet::new(),
        fetch_backoff_base: Duration::from_millis(1),
        fetch_backoff_max: Duration::from_millis(10),
        max_consecutive_storage_failures: 3,
    }
}

fn build_reconciler(
    source: Arc<ScriptedSource>,
    chat: RecordingChat,
    config: ReconcilerConfig,
) -> (UpdateReconciler, Harness) {
    let store = Arc::new(InMemoryLogStore::new());
    let chat = Arc::new(chat);
    let chat_sender: Arc<dyn ChatSender> = chat.clone();
    let dispatcher = Arc::new(CommandDispatcher::new(
        store.clone(),
        Arc::new(NoMetrics),
        Tz::UTC,
    ));
    let health = Arc::new(ReconcilerHealth::default());
    let reconciler = UpdateReconciler::new(
        source,
        dispatcher,
        Notifier::new(Some(chat_sender), None),
        config,
        Arc::clone(&health),
    );
    (
        reconciler,
        Harness {
            store,
            chat,
            health,
        },
    )
}

async fn chat_messages(store: &InMemoryLogStore) -> Vec<String> {
    store
        .query(LogQuery::all())
        .await
        .expect("query")
        .into_iter()
        .map(|entry| entry.message)
        .collect()
}

async fn wait_for<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached before deadline"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[test]
fn unit_cursor_only_moves_forward() {
    let mut cursor = Cursor::default();
    assert_eq!(cursor.next_offset(), None);
    cursor.advance(10);
    cursor.advance(4);
    assert_eq!(cursor.last_seen_id, Some(10));
    assert_eq!(cursor.next_offset(), Some(11));
    assert!(cursor.has_seen(10));
    assert!(!cursor.has_seen(11));
}

#[tokio::test]
async fn functional_batch_is_processed_in_ascending_id_order() {
    let source = Arc::new(ScriptedSource::default());
    let (mut reconciler, harness) =
        build_reconciler(source, RecordingChat::default(), test_config());

    let report = reconciler
        .process_batch(vec![
            update(3, 7, "/log third"),
            update(1, 7, "/log first"),
            update(2, 7, "/log second"),
        ])
        .await
        .expect("batch");
    assert_eq!(report.discovered, 3);
    assert_eq!(report.dispatched, 3);
    assert_eq!(reconciler.cursor().last_seen_id, Some(3));
    assert_eq!(
        chat_messages(&harness.store).await,
        vec!["first", "second", "third"]
    );
    let sent = harness.chat.sent.lock().expect("lock");
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0], (7, "Logged: first".to_string()));
}

#[tokio::test]
async fn regression_duplicates_within_and_across_batches_dispatch_once() {
    let source = Arc::new(ScriptedSource::default());
    let (mut reconciler, harness) =
        build_reconciler(source, RecordingChat::default(), test_config());

    let first = reconciler
        .process_batch(vec![
            update(5, 1, "/log a"),
            update(5, 1, "/log a"),
            update(6, 1, "/log b"),
        ])
        .await
        .expect("batch");
    assert_eq!(first.dispatched, 2);
    assert_eq!(first.duplicates_skipped, 1);

    let second = reconciler
        .process_batch(vec![
            update(4, 1, "/log stale"),
            update(6, 1, "/log b"),
            update(7, 1, "/log c"),
        ])
        .await
        .expect("batch");
    assert_eq!(second.dispatched, 1);
    assert_eq!(second.duplicates_skipped, 2);
    assert_eq!(reconciler.cursor().last_seen_id, Some(7));
    assert_eq!(chat_messages(&harness.store).await, vec!["a", "b", "c"]);

    let health = harness.health.snapshot();
    assert_eq!(health.dispatched_total, 3);
    assert_eq!(health.duplicates_total, 3);
}

#[tokio::test]
async fn functional_foreign_chats_and_textless_updates_are_acknowledged_only() {
    let source = Arc::new(ScriptedSource::default());
    let mut config = test_config();
    config.allowed_chat_ids = BTreeSet::from([100]);
    let (mut reconciler, harness) = build_reconciler(source, RecordingChat::default(), config);

    let report = reconciler
        .process_batch(vec![
            update(1, 999, "/log intruder"),
            InboundUpdate {
                update_id: 2,
                chat_id: Some(100),
                text: None,
            },
            InboundUpdate {
                update_id: 3,
                chat_id: None,
                text: Some("/log orphan".to_string()),
            },
            update(4, 100, "/log owner"),
        ])
        .await
        .expect("batch");
    assert_eq!(report.ignored, 3);
    assert_eq!(report.dispatched, 1);
    assert_eq!(reconciler.cursor().last_seen_id, Some(4));
    assert_eq!(chat_messages(&harness.store).await, vec!["owner"]);
    assert_eq!(harness.chat.sent.lock().expect("lock").len(), 1);
}

#[tokio::test]
async fn regression_storage_failure_holds_cursor_before_failing_update() {
    let source = Arc::new(ScriptedSource::default());
    let (mut reconciler, harness) =
        build_reconciler(source, RecordingChat::default(), test_config());

    harness.store.set_unavailable(true);
    let error = reconciler
        .process_batch(vec![
            update(1, 1, "/help"),
            update(2, 1, "/log keep me"),
            update(3, 1, "/log me too"),
        ])
        .await
        .expect_err("storage failure");
    assert!(error.is_storage_unavailable());
    assert_eq!(reconciler.cursor().last_seen_id, Some(1));

    harness.store.set_unavailable(false);
    let report = reconciler
        .process_batch(vec![update(2, 1, "/log keep me"), update(3, 1, "/log me too")])
        .await
        .expect("retry batch");
    assert_eq!(report.dispatched, 2);
    assert_eq!(reconciler.cursor().last_seen_id, Some(3));
    assert_eq!(chat_messages(&harness.store).await, vec!["keep me", "me too"]);
}

#[tokio::test]
async fn functional_reply_failure_is_counted_and_does_not_block_cursor() {
    let source = Arc::new(ScriptedSource::default());
    let chat = RecordingChat {
        fail: true,
        ..RecordingChat::default()
    };
    let (mut reconciler, harness) = build_reconciler(source, chat, test_config());

    let report = reconciler
        .process_batch(vec![update(8, 1, "/log still stored")])
        .await
        .expect("batch");
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.reply_failures, 1);
    assert_eq!(reconciler.cursor().last_seen_id, Some(8));
    assert_eq!(chat_messages(&harness.store).await, vec!["still stored"]);
}

#[tokio::test]
async fn integration_run_loop_requests_offsets_recovers_from_fetch_errors_and_stops() {
    let source = Arc::new(ScriptedSource::new(vec![
        Err(UpstreamError::new(
            UpstreamErrorCode::ProviderUnavailable,
            "telegram request failed with status 502",
            true,
        )),
        Ok(vec![update(10, 1, "/log from loop")]),
    ]));
    let (reconciler, harness) =
        build_reconciler(Arc::clone(&source), RecordingChat::default(), test_config());

    let mut handle = spawn_service("update-reconciler", move |shutdown_rx| {
        reconciler.run(shutdown_rx)
    })
    .expect("spawn");
    let health = Arc::clone(&harness.health);
    wait_for(|| health.snapshot().dispatched_total == 1).await;
    let offsets_source = Arc::clone(&source);
    wait_for(|| offsets_source.offsets().len() >= 3).await;
    handle.shutdown().await.expect("clean shutdown");

    let offsets = source.offsets();
    assert_eq!(offsets[0], None);
    assert_eq!(offsets[1], None);
    assert!(offsets[2..].iter().all(|offset| *offset == Some(11)));
    let snapshot = harness.health.snapshot();
    assert_eq!(snapshot.state, ReconcilerState::Stopped);
    assert_eq!(snapshot.last_seen_id, Some(10));
    assert_eq!(snapshot.fetch_failure_streak, 0);
    assert!(snapshot.last_success_unix_ms.is_some());
    assert_eq!(chat_messages(&harness.store).await, vec!["from loop"]);
}

#[tokio::test]
async fn regression_run_loop_exits_after_consecutive_storage_failures() {
    let source = Arc::new(ScriptedSource {
        fallback: vec![update(1, 1, "/log never stored")],
        ..ScriptedSource::default()
    });
    let (reconciler, harness) =
        build_reconciler(Arc::clone(&source), RecordingChat::default(), test_config());
    harness.store.set_unavailable(true);

    let (_shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let result = tokio::time::timeout(Duration::from_secs(5), reconciler.run(shutdown_rx))
    .await
    .expect("loop should exit on its own");
    let error = result.expect_err("storage failures are fatal");
    assert!(error.to_string().contains("repeated storage failures"));
    assert_eq!(source.offsets().len(), 3);
    assert!(source.offsets().iter().all(|offset| offset.is_none()));
    let snapshot = harness.health.snapshot();
    assert_eq!(snapshot.state, ReconcilerState::Failed);
    assert_eq!(snapshot.storage_failure_streak, 3);
    assert_eq!(snapshot.last_seen_id, None);
}
