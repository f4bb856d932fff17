//! Session-gated web handlers: dashboard, entry form, download and login.

use axum::extract::{Form, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use std::sync::Arc;
use tally_store::{LogQuery, LogSource};

use crate::auth_runtime::{
    authorize_session, issue_session_token, note_login_failure, revoke_session,
};
use crate::endpoints::{DASHBOARD_ENDPOINT, LOGIN_ENDPOINT, SESSION_COOKIE_NAME};
use crate::server_bootstrap::GatewayState;
use crate::types::ApiError;
use crate::web_pages::{render_dashboard_page, render_login_page};

pub(crate) const DOWNLOAD_FILENAME: &str = "tally-logs.txt";

#[derive(Debug, Deserialize)]
pub(crate) struct LogFormRequest {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginFormRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

fn login_redirect() -> Response {
    Redirect::to(LOGIN_ENDPOINT).into_response()
}

pub(crate) async fn handle_dashboard(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Response {
    let Some(username) = authorize_session(&state, &headers) else {
        return login_redirect();
    };
    let store = &state.context.store;
    let counts = match store.count_by_source().await {
        Ok(counts) => counts,
        Err(error) => return ApiError::from(error).into_response(),
    };
    let entries = match store
        .query(LogQuery::all().most_recent(state.config.dashboard_entry_limit.max(1)))
        .await
    {
        Ok(entries) => entries,
        Err(error) => return ApiError::from(error).into_response(),
    };
    Html(render_dashboard_page(
        &username,
        &counts,
        &entries,
        state.context.timezone,
    ))
    .into_response()
}

pub(crate) async fn handle_log_submit(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Form(request): Form<LogFormRequest>,
) -> Response {
    let Some(username) = authorize_session(&state, &headers) else {
        return login_redirect();
    };
    let message = request.message.trim();
    if message.is_empty() {
        return ApiError::bad_request("empty_message", "message must not be empty").into_response();
    }
    match state.context.store.append(LogSource::Web, message).await {
        Ok(entry) => {
            tracing::info!(entry_id = entry.id, user = %username, "web entry logged");
            Redirect::to(DASHBOARD_ENDPOINT).into_response()
        }
        Err(error) => ApiError::from(error).into_response(),
    }
}

pub(crate) async fn handle_download(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Response {
    if authorize_session(&state, &headers).is_none() {
        return login_redirect();
    }
    let entries = match state.context.store.query(LogQuery::all()).await {
        Ok(entries) => entries,
        Err(error) => return ApiError::from(error).into_response(),
    };
    let timezone = state.context.timezone;
    let mut body = entries
        .iter()
        .map(|entry| entry.render_line_in(&timezone))
        .collect::<Vec<_>>()
        .join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    (
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{DOWNLOAD_FILENAME}\""),
            ),
        ],
        body,
    )
        .into_response()
}

pub(crate) async fn handle_login_page(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Response {
    if authorize_session(&state, &headers).is_some() {
        return Redirect::to(DASHBOARD_ENDPOINT).into_response();
    }
    Html(render_login_page(None)).into_response()
}

pub(crate) async fn handle_login_submit(
    State(state): State<Arc<GatewayState>>,
    Form(request): Form<LoginFormRequest>,
) -> Response {
    let username = request.username.trim().to_string();
    let users = state.context.users.clone();
    let lookup_username = username.clone();
    let verified = tokio::task::spawn_blocking(move || {
        users.verify_credentials(&lookup_username, &request.password)
    })
    .await;

    let user = match verified {
        Ok(Ok(user)) => user,
        Ok(Err(error)) => return ApiError::from(error).into_response(),
        Err(error) => {
            tracing::error!(%error, "credential check task failed");
            return ApiError::internal("credential check failed").into_response();
        }
    };
    let Some(user) = user else {
        note_login_failure(&state);
        tracing::warn!(user = %username, "login rejected");
        return (
            StatusCode::UNAUTHORIZED,
            Html(render_login_page(Some("Invalid username or password."))),
        )
            .into_response();
    };

    let token = match issue_session_token(&state, &user.username) {
        Ok(token) => token,
        Err(error) => return error.into_response(),
    };
    let cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        state.config.session_ttl_seconds
    );
    let Ok(cookie) = HeaderValue::from_str(&cookie) else {
        return ApiError::internal("failed to encode session cookie").into_response();
    };
    tracing::info!(user = %user.username, role = user.role.as_str(), "login accepted");
    let mut response = Redirect::to(DASHBOARD_ENDPOINT).into_response();
    response.headers_mut().insert(SET_COOKIE, cookie);
    response
}

pub(crate) async fn handle_logout(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Response {
    revoke_session(&state, &headers);
    let mut response = login_redirect();
    response.headers_mut().insert(
        SET_COOKIE,
        HeaderValue::from_static("tally_session=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0"),
    );
    response
}
