//! Gateway server bootstrap and router wiring.

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tally_runtime::AppContext;
use tokio::net::TcpListener;

use crate::api_handlers::{handle_api_logs, handle_api_search, handle_api_stats, handle_api_summary};
use crate::auth_runtime::SessionRuntimeState;
use crate::endpoints::*;
use crate::status_runtime::handle_status;
use crate::web_handlers::{
    handle_dashboard, handle_download, handle_log_submit, handle_login_page, handle_login_submit,
    handle_logout,
};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind: String,
    pub api_key: String,
    pub session_secret: String,
    pub session_ttl_seconds: u64,
    /// Entries shown on the dashboard.
    pub dashboard_entry_limit: usize,
}

pub struct GatewayState {
    pub(crate) config: GatewayConfig,
    pub(crate) context: AppContext,
    pub(crate) sessions: Mutex<SessionRuntimeState>,
    sequence: AtomicU64,
}

impl GatewayState {
    pub fn new(config: GatewayConfig, context: AppContext) -> Self {
        Self {
            config,
            context,
            sessions: Mutex::new(SessionRuntimeState::default()),
            sequence: AtomicU64::new(0),
        }
    }

    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }
}

pub fn build_gateway_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route(DASHBOARD_ENDPOINT, get(handle_dashboard))
        .route(LOG_FORM_ENDPOINT, post(handle_log_submit))
        .route(DOWNLOAD_ENDPOINT, get(handle_download))
        .route(LOGIN_ENDPOINT, get(handle_login_page).post(handle_login_submit))
        .route(LOGOUT_ENDPOINT, get(handle_logout))
        .route(STATUS_ENDPOINT, get(handle_status))
        .route(API_LOGS_ENDPOINT, get(handle_api_logs))
        .route(API_SEARCH_ENDPOINT, get(handle_api_search))
        .route(API_STATS_ENDPOINT, get(handle_api_stats))
        .route(API_SUMMARY_ENDPOINT, get(handle_api_summary))
        .with_state(state)
}

/// Serves until `shutdown` resolves. In-flight requests are drained first.
pub async fn run_gateway_server<F>(
    config: GatewayConfig,
    context: AppContext,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_addr = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid gateway bind address '{}'", config.bind))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind gateway server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway address")?;
    tracing::info!(addr = %local_addr, "gateway listening");

    let app = build_gateway_router(Arc::new(GatewayState::new(config, context)));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("gateway server exited unexpectedly")?;
    tracing::info!("gateway stopped");
    Ok(())
}
