use super::*;
use crate::system_health::{MetricsError, SystemMetricsSnapshot};
use chrono::{Duration, TimeZone};
use tally_store::InMemoryLogStore;

struct FixedMetrics(Option<SystemMetricsSnapshot>);

impl SystemMetrics for FixedMetrics {
    fn sample(&self) -> Result<SystemMetricsSnapshot, MetricsError> {
        self.0.ok_or_else(|| MetricsError::Parse {
            what: "meminfo",
            detail: "not available in test".to_string(),
        })
    }
}

fn dispatcher_with(store: Arc<InMemoryLogStore>, timezone: Tz) -> CommandDispatcher {
    CommandDispatcher::new(store, Arc::new(FixedMetrics(None)), timezone)
}

#[test]
fn unit_parse_command_maps_verbs_and_strips_bot_suffix() {
    assert_eq!(parse_command("/log hello world"), Command::Log("hello world".to_string()));
    assert_eq!(parse_command("/log@tally_bot  spaced  "), Command::Log("spaced".to_string()));
    assert_eq!(parse_command("/stats"), Command::Stats);
    assert_eq!(parse_command("/REPORT"), Command::Report);
    assert_eq!(parse_command("/recent"), Command::ListRecent(RECENT_DEFAULT));
    assert_eq!(parse_command("/recent 3"), Command::ListRecent(3));
    assert_eq!(parse_command("/recent 500"), Command::ListRecent(RECENT_MAX));
    assert_eq!(parse_command("/recent 0"), Command::ListRecent(1));
    assert_eq!(parse_command("/help"), Command::Help);
    assert_eq!(parse_command("/health"), Command::Health);
}

#[test]
fn regression_parse_command_rejects_prefix_lookalikes_and_empty_log() {
    assert_eq!(parse_command("/log"), Command::Unknown("/log".to_string()));
    assert_eq!(parse_command("/log   "), Command::Unknown("/log".to_string()));
    assert_eq!(parse_command("/logger x"), Command::Unknown("/logger x".to_string()));
    assert_eq!(parse_command("/recent many"), Command::Unknown("/recent many".to_string()));
    assert_eq!(parse_command("hello"), Command::Unknown("hello".to_string()));
    assert_eq!(parse_command(""), Command::Unknown(String::new()));
}

#[tokio::test]
async fn functional_log_appends_one_chat_entry_and_confirms() {
    let store = Arc::new(InMemoryLogStore::new());
    let dispatcher = dispatcher_with(store.clone(), Tz::UTC);

    let outcome = dispatcher.dispatch(42, "/log hello").await.expect("dispatch");
    assert_eq!(outcome.command, Command::Log("hello".to_string()));
    assert!(outcome.response.contains("hello"));

    let entries = store.query(LogQuery::all()).await.expect("query");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, LogSource::Chat);
    assert_eq!(entries[0].message, "hello");
}

#[tokio::test]
async fn functional_report_on_empty_day_returns_fixed_message_without_appending() {
    let store = Arc::new(InMemoryLogStore::new());
    let now = Utc.with_ymd_and_hms(2024, 4, 2, 9, 0, 0).unwrap();
    store
        .append_at(LogSource::Web, "yesterday", now - Duration::days(1))
        .await
        .expect("append");
    let dispatcher = dispatcher_with(store.clone(), Tz::UTC);

    let outcome = dispatcher.dispatch_at(1, "/report", now).await.expect("dispatch");
    assert_eq!(outcome.response, REPORT_EMPTY_MESSAGE);
    assert_eq!(store.query(LogQuery::all()).await.expect("query").len(), 1);
}

#[tokio::test]
async fn regression_report_uses_local_calendar_day_not_rolling_window() {
    let store = Arc::new(InMemoryLogStore::new());
    let timezone: Tz = "America/New_York".parse().expect("tz");
    // 2024-04-02 01:00 local (EDT) is 05:00 UTC.
    let now = Utc.with_ymd_and_hms(2024, 4, 2, 5, 0, 0).unwrap();
    store
        .append_at(LogSource::Chat, "late last night", now - Duration::hours(2))
        .await
        .expect("append");
    store
        .append_at(LogSource::Chat, "just after midnight", now - Duration::minutes(30))
        .await
        .expect("append");
    let dispatcher = dispatcher_with(store, timezone);

    let response = dispatcher
        .dispatch_at(1, "/report", now)
        .await
        .expect("dispatch")
        .response;
    assert!(response.contains("just after midnight"));
    assert!(!response.contains("late last night"));
    assert!(response.starts_with("Today (2024-04-02): 1 entries"));
}

#[tokio::test]
async fn functional_report_caps_at_fifty_most_recent_oldest_first() {
    let store = Arc::new(InMemoryLogStore::new());
    let start = Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap();
    for index in 0..60 {
        store
            .append_at(
                LogSource::Web,
                &format!("entry-{index:02}"),
                start + Duration::minutes(index),
            )
            .await
            .expect("append");
    }
    let dispatcher = dispatcher_with(store, Tz::UTC);

    let response = dispatcher
        .dispatch_at(1, "/report", start + Duration::hours(12))
        .await
        .expect("dispatch")
        .response;
    let lines = response.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 51);
    assert!(lines[0].contains("60 entries, showing the last 50"));
    assert!(lines[1].ends_with("entry-10"));
    assert!(lines[50].ends_with("entry-59"));
}

#[tokio::test]
async fn functional_stats_orders_sources_by_name() {
    let store = Arc::new(InMemoryLogStore::new());
    for _ in 0..2 {
        store.append(LogSource::Web, "w").await.expect("append");
    }
    store.append(LogSource::System, "s").await.expect("append");
    store.append(LogSource::Chat, "c").await.expect("append");
    let dispatcher = dispatcher_with(store, Tz::UTC);

    let response = dispatcher.dispatch(1, "/stats").await.expect("dispatch").response;
    assert_eq!(response, "Total entries: 4\nCHAT: 1\nSYSTEM: 1\nWEB: 2");
}

#[tokio::test]
async fn functional_recent_lists_most_recent_oldest_first() {
    let store = Arc::new(InMemoryLogStore::new());
    let dispatcher = dispatcher_with(store.clone(), Tz::UTC);
    assert_eq!(
        dispatcher.dispatch(1, "/recent").await.expect("dispatch").response,
        RECENT_EMPTY_MESSAGE
    );

    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for index in 0..5 {
        store
            .append_at(LogSource::Chat, &format!("m{index}"), base + Duration::minutes(index))
            .await
            .expect("append");
    }
    let response = dispatcher.dispatch(1, "/recent 2").await.expect("dispatch").response;
    let lines = response.lines().collect::<Vec<_>>();
    assert_eq!(
        lines,
        vec![
            "Last 2 entries:",
            "2024-01-01 00:03 [CHAT] m3",
            "2024-01-01 00:04 [CHAT] m4"
        ]
    );
}

#[tokio::test]
async fn unit_unknown_command_rejects_without_mutating_store() {
    let store = Arc::new(InMemoryLogStore::new());
    let dispatcher = dispatcher_with(store.clone(), Tz::UTC);
    let outcome = dispatcher.dispatch(1, "/delete everything").await.expect("dispatch");
    assert!(matches!(outcome.command, Command::Unknown(_)));
    assert!(outcome.response.starts_with("Unknown command: /delete everything"));
    assert!(outcome.response.contains("/log <text>"));
    assert!(store.query(LogQuery::all()).await.expect("query").is_empty());
}

#[tokio::test]
async fn unit_health_renders_snapshot_or_readable_error() {
    let store = Arc::new(InMemoryLogStore::new());
    let unavailable = dispatcher_with(store.clone(), Tz::UTC);
    let response = unavailable.dispatch(1, "/health").await.expect("dispatch").response;
    assert!(response.starts_with("System health unavailable:"));

    let snapshot = SystemMetricsSnapshot {
        uptime_seconds: 3_600,
        memory_used_percent: 42.0,
        disk_used_percent: 10.0,
        load_average_1m: 0.5,
    };
    let available = CommandDispatcher::new(store, Arc::new(FixedMetrics(Some(snapshot))), Tz::UTC);
    let response = available.dispatch(1, "/health").await.expect("dispatch").response;
    assert!(response.contains("Memory used: 42.0%"));
}

#[tokio::test]
async fn regression_store_failure_propagates_from_log_command() {
    let store = Arc::new(InMemoryLogStore::new());
    store.set_unavailable(true);
    let dispatcher = dispatcher_with(store, Tz::UTC);
    let error = dispatcher.dispatch(1, "/log lost?").await.expect_err("must fail");
    assert!(error.is_storage_unavailable());
}
