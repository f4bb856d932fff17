//! SMTP mail transport (STARTTLS with username/password).

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

use crate::{MailTransport, UpstreamError, UpstreamErrorCode};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: String,
    pub timeout_ms: u64,
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, UpstreamError> {
        let from = parse_mailbox("from", &config.from)?;
        let to = parse_mailbox("to", &config.to)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(config.host.trim())
            .map_err(|error| {
                UpstreamError::new(
                    UpstreamErrorCode::TransportError,
                    format!("invalid smtp relay '{}': {error}", config.host.trim()),
                    false,
                )
            })?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(Duration::from_millis(config.timeout_ms.max(1))))
            .build();
        Ok(Self {
            transport,
            from,
            to,
        })
    }

    fn build_message(&self, subject: &str, body: &str) -> Result<Message, UpstreamError> {
        build_message(&self.from, &self.to, subject, body)
    }
}

fn parse_mailbox(field: &str, raw: &str) -> Result<Mailbox, UpstreamError> {
    raw.trim().parse::<Mailbox>().map_err(|error| {
        UpstreamError::new(
            UpstreamErrorCode::ParseFailed,
            format!("invalid smtp {field} address '{}': {error}", raw.trim()),
            false,
        )
    })
}

fn build_message(
    from: &Mailbox,
    to: &Mailbox,
    subject: &str,
    body: &str,
) -> Result<Message, UpstreamError> {
    Message::builder()
        .from(from.clone())
        .to(to.clone())
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|error| {
            UpstreamError::new(
                UpstreamErrorCode::ParseFailed,
                format!("failed to build mail message: {error}"),
                false,
            )
        })
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send_mail(&self, subject: &str, body: &str) -> Result<(), UpstreamError> {
        let message = self.build_message(subject, body)?;
        self.transport.send(message).await.map_err(|error| {
            let code = if error.is_permanent() {
                UpstreamErrorCode::ProviderUnavailable
            } else {
                UpstreamErrorCode::TransportError
            };
            UpstreamError::new(code, format!("smtp send failed: {error}"), error.is_transient())
        })?;
        Ok(())
    }
}
