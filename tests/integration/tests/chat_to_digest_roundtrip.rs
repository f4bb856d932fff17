use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use httpmock::prelude::*;
use serde_json::json;
use tally_ai::{ChatRequest, ChatResponse, LlmClient, LlmSummarizer, SummarizerConfig, TallyAiError};
use tally_channels::{
    ChatSender, MailTransport, Notifier, NotifyOutcome, TelegramApiClient, TelegramConfig,
    UpdateSource, UpstreamError,
};
use tally_runtime::{
    CommandDispatcher, ProcfsSystemMetrics, ReconcilerConfig, ReconcilerHealth, ReportTickOutcome,
    ReporterConfig, ScheduledReporter, UpdateReconciler,
};
use tally_store::{LogQuery, LogSource, LogStore, SqliteLogStore};
use tokio::sync::Mutex as AsyncMutex;

struct ScriptedClient {
    responses: AsyncMutex<VecDeque<ChatResponse>>,
    requests: AsyncMutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: AsyncMutex::new(VecDeque::from(responses)),
            requests: AsyncMutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, TallyAiError> {
        self.requests.lock().await.push(request);
        self.responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| {
                TallyAiError::InvalidResponse("scripted response queue exhausted".into())
            })
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send_mail(&self, subject: &str, body: &str) -> Result<(), UpstreamError> {
        self.sent
            .lock()
            .expect("mail log")
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

fn telegram_config(api_base: String) -> TelegramConfig {
    TelegramConfig {
        api_base,
        bot_token: "integration-token".to_string(),
        long_poll_timeout_seconds: 0,
        request_timeout_ms: 2_000,
        retry_max_attempts: 1,
        retry_base_delay_ms: 1,
    }
}

#[tokio::test]
async fn integration_chat_commands_flow_into_daily_digest() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let store: Arc<dyn LogStore> =
        Arc::new(SqliteLogStore::new(tempdir.path().join("tally.sqlite")).expect("store"));

    let server = MockServer::start();
    let updates_mock = server.mock(|when, then| {
        when.method(GET).path("/botintegration-token/getUpdates");
        then.status(200).json_body(json!({
            "ok": true,
            "result": [
                {
                    "update_id": 100,
                    "message": {"chat": {"id": 7}, "text": "/log shipped release 1.2"}
                },
                {"update_id": 101, "message": {"chat": {"id": 99}, "text": "/log from a stranger"}},
                {"update_id": 102, "message": {"chat": {"id": 7}, "text": "/stats"}}
            ]
        }));
    });
    let send_mock = server.mock(|when, then| {
        when.method(POST).path("/botintegration-token/sendMessage");
        then.status(200).json_body(json!({"ok": true, "result": {}}));
    });

    let telegram =
        Arc::new(TelegramApiClient::new(telegram_config(server.base_url())).expect("client"));
    let mailer = Arc::new(RecordingMailer::default());
    let chat_sender: Arc<dyn ChatSender> = telegram.clone();
    let mail_transport: Arc<dyn MailTransport> = mailer.clone();
    let notifier = Notifier::new(Some(chat_sender), Some(mail_transport));

    let timezone = chrono_tz::UTC;
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::clone(&store),
        Arc::new(ProcfsSystemMetrics::new(tempdir.path())),
        timezone,
    ));
    let mut reconciler = UpdateReconciler::new(
        telegram.clone(),
        dispatcher,
        notifier.clone(),
        ReconcilerConfig {
            allowed_chat_ids: [7].into_iter().collect(),
            ..ReconcilerConfig::default()
        },
        Arc::new(ReconcilerHealth::default()),
    );

    let updates = telegram.fetch_updates(None).await.expect("fetch updates");
    let report = reconciler.process_batch(updates).await.expect("process batch");
    assert_eq!(report.discovered, 3);
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.ignored, 1);
    assert_eq!(reconciler.cursor().next_offset(), Some(103));
    updates_mock.assert();
    send_mock.assert_calls(2);

    let entries = store.query(LogQuery::all()).await.expect("query");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, LogSource::Chat);
    assert_eq!(entries[0].message, "shipped release 1.2");

    let client = Arc::new(ScriptedClient::new(vec![ChatResponse {
        text: "Shipped a release.".to_string(),
        finish_reason: Some("stop".to_string()),
    }]));
    let llm_client: Arc<dyn LlmClient> = client.clone();
    let summarizer = Arc::new(LlmSummarizer::new(llm_client, SummarizerConfig::default()));
    let mut reporter = ScheduledReporter::new(
        Arc::clone(&store),
        summarizer,
        notifier,
        ReporterConfig {
            report_time: NaiveTime::from_hms_opt(18, 0, 0).expect("time"),
            timezone,
        },
    )
    .expect("reporter");

    let now = Utc::now();
    assert_eq!(
        reporter.tick(now).await,
        ReportTickOutcome::Sent(NotifyOutcome::Delivered)
    );
    assert!(matches!(
        reporter.tick(now).await,
        ReportTickOutcome::AlreadyReported(_)
    ));

    let sent = mailer.sent.lock().expect("mail log").clone();
    assert_eq!(sent.len(), 1);
    let (subject, body) = &sent[0];
    assert!(subject.starts_with("Tally daily digest for "));
    assert!(body.contains("Shipped a release."));
    assert!(body.contains("[CHAT] shipped release 1.2"));

    let requests = client.requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert!(requests[0]
        .messages
        .iter()
        .any(|message| message.content.contains("shipped release 1.2")));
}
