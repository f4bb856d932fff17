use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorCode {
    AuthFailed,
    RateLimited,
    ProviderUnavailable,
    TransportError,
    ParseFailed,
}

impl UpstreamErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthFailed => "auth_failed",
            Self::RateLimited => "rate_limited",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::TransportError => "transport_error",
            Self::ParseFailed => "parse_failed",
        }
    }
}

impl fmt::Display for UpstreamErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat, mail, or completion endpoint was unreachable or errored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct UpstreamError {
    pub code: UpstreamErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl UpstreamError {
    pub fn new(code: UpstreamErrorCode, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            retryable,
        }
    }

    pub(crate) fn from_status(channel: &str, status: u16) -> Self {
        let code = match status {
            401 | 403 => UpstreamErrorCode::AuthFailed,
            429 => UpstreamErrorCode::RateLimited,
            _ => UpstreamErrorCode::ProviderUnavailable,
        };
        Self::new(
            code,
            format!("{channel} request failed with status {status}"),
            matches!(
                code,
                UpstreamErrorCode::RateLimited | UpstreamErrorCode::ProviderUnavailable
            ),
        )
    }
}
