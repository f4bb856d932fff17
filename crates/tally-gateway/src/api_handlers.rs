//! API-key protected JSON endpoints.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tally_core::{local_date, local_day_bounds};
use tally_store::LogQuery;

use crate::auth_runtime::authorize_api_request;
use crate::server_bootstrap::GatewayState;
use crate::types::ApiError;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LogsQueryParams {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchQueryParams {
    #[serde(default)]
    q: Option<String>,
}

pub(crate) async fn handle_api_logs(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Query(params): Query<LogsQueryParams>,
) -> Result<Response, ApiError> {
    authorize_api_request(&state, &headers)?;
    let mut query = LogQuery::all();
    if let Some(limit) = params.limit {
        query = query.most_recent(limit);
    }
    let entries = state.context.store.query(query).await?;
    Ok(Json(entries).into_response())
}

pub(crate) async fn handle_api_search(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Query(params): Query<SearchQueryParams>,
) -> Result<Response, ApiError> {
    authorize_api_request(&state, &headers)?;
    let needle = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            ApiError::bad_request("missing_query", "query parameter 'q' is required")
        })?
        .to_string();
    let entries = state
        .context
        .store
        .query(LogQuery::all().with_text(needle))
        .await?;
    Ok(Json(entries).into_response())
}

pub(crate) async fn handle_api_stats(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authorize_api_request(&state, &headers)?;
    let counts = state.context.store.count_by_source().await?;
    let total: u64 = counts.values().sum();
    let by_source = counts
        .iter()
        .map(|(source, count)| (source.as_str().to_string(), *count))
        .collect::<BTreeMap<_, _>>();
    Ok(Json(json!({ "total": total, "by_source": by_source })).into_response())
}

/// Summarizes today's entries. A summarizer failure is reported in the
/// `summary` field rather than as an HTTP error.
pub(crate) async fn handle_api_summary(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authorize_api_request(&state, &headers)?;
    let now = chrono::Utc::now();
    let timezone = state.context.timezone;
    let (start, end) = local_day_bounds(timezone, now);
    let entries = state
        .context
        .store
        .query(LogQuery::between(start, end))
        .await?;
    let summary = match state.context.summarizer.summarize(&entries).await {
        Ok(summary) => summary,
        Err(error) => {
            tracing::warn!(%error, "summary request failed");
            format!("Summary unavailable: {error}")
        }
    };
    Ok(Json(json!({
        "summary": summary,
        "date": local_date(timezone, now).to_string(),
        "entries": entries.len(),
    }))
    .into_response())
}
