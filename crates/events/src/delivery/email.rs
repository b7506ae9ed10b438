//! Email notification delivery via SMTP.
//!
//! [`SmtpEmailProvider`] wraps the `lettre` async SMTP transport. The
//! transport is built once from [`EmailConfig`] and reused for every send.

use async_trait::async_trait;
use courier_core::error::ConfigError;
use courier_core::{Channel, NotificationRequest};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::ProviderError;
use crate::provider::{NotificationProvider, ProviderReceipt};

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Subject used when a request has no title.
const DEFAULT_SUBJECT: &str = "Notification";

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` if `SMTP_HOST` is not set, signalling that email
    /// delivery is not configured.
    ///
    /// | Variable        | Required            | Default |
    /// |-----------------|---------------------|---------|
    /// | `SMTP_HOST`     | enables email       |         |
    /// | `SMTP_PORT`     | no                  | `587`   |
    /// | `SMTP_FROM`     | when host is set    |         |
    /// | `SMTP_USER`     | no                  |         |
    /// | `SMTP_PASSWORD` | no                  |         |
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = lookup("SMTP_HOST") else {
            return Ok(None);
        };

        let smtp_port = match lookup("SMTP_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "SMTP_PORT",
                reason: format!("{raw:?} is not a port number"),
            })?,
            None => DEFAULT_SMTP_PORT,
        };

        let from_address = lookup("SMTP_FROM").ok_or(ConfigError::Missing("SMTP_FROM"))?;

        Ok(Some(Self {
            smtp_host,
            smtp_port,
            from_address,
            smtp_user: lookup("SMTP_USER"),
            smtp_password: lookup("SMTP_PASSWORD"),
        }))
    }
}

// ---------------------------------------------------------------------------
// SmtpEmailProvider
// ---------------------------------------------------------------------------

pub struct SmtpEmailProvider {
    from_address: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailProvider {
    pub fn new(config: EmailConfig) -> Result<Self, ProviderError> {
        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
                .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (config.smtp_user, config.smtp_password) {
            transport_builder = transport_builder.credentials(Credentials::new(user, pass));
        }

        Ok(Self {
            from_address: config.from_address,
            mailer: transport_builder.build(),
        })
    }

    fn build_message(&self, request: &NotificationRequest) -> Result<Message, ProviderError> {
        let to = request
            .email
            .as_deref()
            .ok_or_else(|| ProviderError::Address("email notification without recipient".into()))?;

        Message::builder()
            .from(self.from_address.parse()?)
            .to(to.trim().parse()?)
            .subject(request.title.as_deref().unwrap_or(DEFAULT_SUBJECT))
            .header(ContentType::TEXT_HTML)
            .body(request.message.clone().unwrap_or_default())
            .map_err(|e| ProviderError::Build(e.to_string()))
    }
}

#[async_trait]
impl NotificationProvider for SmtpEmailProvider {
    fn name(&self) -> &str {
        "smtp"
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, request: &NotificationRequest) -> Result<ProviderReceipt, ProviderError> {
        let message = self.build_message(request)?;
        let response = self.mailer.send(message).await?;

        let message_id = response.message().next().map(str::to_string);
        tracing::debug!(
            user_id = %request.user_id,
            code = %response.code(),
            "SMTP server accepted message"
        );

        Ok(ProviderReceipt { message_id })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
