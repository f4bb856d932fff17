use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::server_bootstrap::GatewayState;

/// Liveness check. Never touches storage.
pub(crate) async fn handle_status(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    let context = &state.context;
    let auth = state
        .sessions
        .lock()
        .map(|sessions| {
            json!({
                "active_sessions": sessions.sessions.len(),
                "total_sessions_issued": sessions.total_sessions_issued,
                "login_failures": sessions.login_failures,
                "api_key_failures": sessions.api_key_failures,
            })
        })
        .unwrap_or(Value::Null);
    Json(json!({
        "status": "ok",
        "message": "Bot is running",
        "timezone": context.timezone.name(),
        "reconciler": context.reconciler_health.snapshot(),
        "notifier": context.notifier.health(),
        "auth": auth,
    }))
}
