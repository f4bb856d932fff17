//! Session and API-key checks.
//!
//! Session tokens are `<sequence>.<issued_ms>.<hmac>` where the HMAC-SHA256
//! covers the first two parts and the username. A token is accepted only if
//! its signature verifies and it is still present, unexpired, in memory.

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;
use tally_core::is_expired_unix;

use crate::endpoints::{API_KEY_HEADER, SESSION_COOKIE_NAME};
use crate::server_bootstrap::GatewayState;
use crate::types::ApiError;

const API_KEY_COMPARE_LABEL: &[u8] = b"tally-api-key-compare";

#[derive(Debug, Clone, Default)]
pub(crate) struct SessionRuntimeState {
    pub(crate) sessions: BTreeMap<String, SessionTokenState>,
    pub(crate) total_sessions_issued: u64,
    pub(crate) login_failures: u64,
    pub(crate) api_key_failures: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct SessionTokenState {
    pub(crate) username: String,
    pub(crate) expires_unix_ms: u64,
}

fn sign(secret: &str, payload: &str) -> Result<String, ApiError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| ApiError::internal("failed to initialize session signer"))?;
    mac.update(payload.as_bytes());
    Ok(mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}

fn verify_signature(secret: &str, token: &str, username: &str) -> bool {
    let Some((payload, signature)) = token.rsplit_once('.') else {
        return false;
    };
    let Some(expected) = decode_hex(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{payload}.{username}").as_bytes());
    mac.verify_slice(&expected).is_ok()
}

fn decode_hex(raw: &str) -> Option<Vec<u8>> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return None;
    }
    (0..raw.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(raw.get(index..index + 2)?, 16).ok())
        .collect()
}

pub(crate) fn prune_expired_sessions(state: &mut SessionRuntimeState, now_unix_ms: u64) {
    state
        .sessions
        .retain(|_, session| {
            !is_expired_unix(Some(session.expires_unix_ms), now_unix_ms)
        });
}

pub(crate) fn issue_session_token(
    state: &GatewayState,
    username: &str,
) -> Result<String, ApiError> {
    let now_unix_ms = tally_core::current_unix_timestamp_ms();
    let ttl_ms = state
        .config
        .session_ttl_seconds
        .saturating_mul(1000)
        .max(1000);
    let payload = format!("{:016x}.{now_unix_ms:x}", state.next_sequence());
    let signature = sign(&state.config.session_secret, &format!("{payload}.{username}"))?;
    let token = format!("{payload}.{signature}");

    let mut sessions = state
        .sessions
        .lock()
        .map_err(|_| ApiError::internal("session state lock poisoned"))?;
    prune_expired_sessions(&mut sessions, now_unix_ms);
    sessions.sessions.insert(
        token.clone(),
        SessionTokenState {
            username: username.to_string(),
            expires_unix_ms: now_unix_ms.saturating_add(ttl_ms),
        },
    );
    sessions.total_sessions_issued = sessions.total_sessions_issued.saturating_add(1);
    Ok(token)
}

pub(crate) fn session_cookie_value(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Returns the username of a live session, if the request carries one.
pub(crate) fn authorize_session(state: &GatewayState, headers: &HeaderMap) -> Option<String> {
    let token = session_cookie_value(headers)?;
    let now_unix_ms = tally_core::current_unix_timestamp_ms();
    let mut sessions = state.sessions.lock().ok()?;
    prune_expired_sessions(&mut sessions, now_unix_ms);
    let session = sessions.sessions.get(token.as_str())?;
    if !verify_signature(&state.config.session_secret, &token, &session.username) {
        return None;
    }
    Some(session.username.clone())
}

pub(crate) fn revoke_session(state: &GatewayState, headers: &HeaderMap) {
    let Some(token) = session_cookie_value(headers) else {
        return;
    };
    if let Ok(mut sessions) = state.sessions.lock() {
        sessions.sessions.remove(token.as_str());
    }
}

pub(crate) fn note_login_failure(state: &GatewayState) {
    if let Ok(mut sessions) = state.sessions.lock() {
        sessions.login_failures = sessions.login_failures.saturating_add(1);
    }
}

/// Compares both keys through HMAC tags so the check takes the same time
/// wherever the first differing byte is.
fn api_keys_match(expected: &str, observed: &str) -> bool {
    if expected.is_empty() || observed.is_empty() {
        return false;
    }
    let tag = |value: &str| -> Option<Hmac<Sha256>> {
        let mut mac = Hmac::<Sha256>::new_from_slice(API_KEY_COMPARE_LABEL).ok()?;
        mac.update(value.as_bytes());
        Some(mac)
    };
    let (Some(expected_mac), Some(observed_mac)) = (tag(expected), tag(observed)) else {
        return false;
    };
    observed_mac
        .verify_slice(&expected_mac.finalize().into_bytes())
        .is_ok()
}

pub(crate) fn authorize_api_request(
    state: &GatewayState,
    headers: &HeaderMap,
) -> Result<(), ApiError> {
    let expected = state.config.api_key.trim();
    let observed = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    if !api_keys_match(expected, observed) {
        if let Ok(mut sessions) = state.sessions.lock() {
            sessions.api_key_failures = sessions.api_key_failures.saturating_add(1);
        }
        return Err(ApiError::forbidden());
    }
    Ok(())
}
