//! SMS delivery and phone verification through Twilio.
//!
//! Messages go to the Programmable Messaging API; one-time codes go through
//! Twilio Verify. Both are form-encoded POSTs authenticated with the account
//! SID and auth token.

use std::time::Duration;

use async_trait::async_trait;
use courier_core::error::ConfigError;
use courier_core::{Channel, NotificationRequest};
use serde::Deserialize;

use crate::error::ProviderError;
use crate::provider::{NotificationProvider, ProviderReceipt, VerificationProvider};

const DEFAULT_API_BASE: &str = "https://api.twilio.com";
const DEFAULT_VERIFY_BASE: &str = "https://verify.twilio.com";

/// HTTP timeout for a single Twilio request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Verify status meaning the code matched.
const APPROVED: &str = "approved";

// ---------------------------------------------------------------------------
// TwilioConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender number for outgoing SMS.
    pub phone_number: String,
    /// Verify service; without it verification calls fail with `NotConfigured`.
    pub verify_service_sid: Option<String>,
    pub api_base: String,
    pub verify_base: String,
}

impl TwilioConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` when none of the three required variables are set.
    /// Setting only some of them is an error.
    ///
    /// | Variable                    | Required |
    /// |-----------------------------|----------|
    /// | `TWILIO_ACCOUNT_SID`        | yes      |
    /// | `TWILIO_AUTH_TOKEN`         | yes      |
    /// | `TWILIO_PHONE_NUMBER`       | yes      |
    /// | `TWILIO_VERIFY_SERVICE_SID` | no       |
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let account_sid = lookup("TWILIO_ACCOUNT_SID");
        let auth_token = lookup("TWILIO_AUTH_TOKEN");
        let phone_number = lookup("TWILIO_PHONE_NUMBER");

        if account_sid.is_none() && auth_token.is_none() && phone_number.is_none() {
            return Ok(None);
        }

        Ok(Some(Self {
            account_sid: account_sid.ok_or(ConfigError::Missing("TWILIO_ACCOUNT_SID"))?,
            auth_token: auth_token.ok_or(ConfigError::Missing("TWILIO_AUTH_TOKEN"))?,
            phone_number: phone_number.ok_or(ConfigError::Missing("TWILIO_PHONE_NUMBER"))?,
            verify_service_sid: lookup("TWILIO_VERIFY_SERVICE_SID"),
            api_base: DEFAULT_API_BASE.to_string(),
            verify_base: DEFAULT_VERIFY_BASE.to_string(),
        }))
    }

    /// Point both APIs at another host, e.g. a local mock server.
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.api_base = base.clone();
        self.verify_base = base;
        self
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct VerificationResponse {
    status: String,
}

// ---------------------------------------------------------------------------
// TwilioSmsProvider
// ---------------------------------------------------------------------------

pub struct TwilioSmsProvider {
    client: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioSmsProvider {
    pub fn new(config: TwilioConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    fn verify_service(&self) -> Result<&str, ProviderError> {
        self.config
            .verify_service_sid
            .as_deref()
            .ok_or(ProviderError::NotConfigured("Twilio Verify"))
    }

    /// POST a form and decode the JSON body, mapping non-2xx to `Rejected`.
    async fn post_form<T>(&self, url: &str, form: &[(&str, &str)]) -> Result<T, ProviderError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl NotificationProvider for TwilioSmsProvider {
    fn name(&self) -> &str {
        "twilio"
    }

    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, request: &NotificationRequest) -> Result<ProviderReceipt, ProviderError> {
        let to = request
            .phone
            .as_deref()
            .ok_or_else(|| ProviderError::Address("SMS notification without phone number".into()))?;
        let body = request.message.as_deref().unwrap_or_default();

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base, self.config.account_sid
        );
        let message: MessageResponse = self
            .post_form(
                &url,
                &[
                    ("To", to),
                    ("From", self.config.phone_number.as_str()),
                    ("Body", body),
                ],
            )
            .await?;

        tracing::debug!(user_id = %request.user_id, sid = %message.sid, "Twilio accepted SMS");
        Ok(ProviderReceipt {
            message_id: Some(message.sid),
        })
    }
}

#[async_trait]
impl VerificationProvider for TwilioSmsProvider {
    fn name(&self) -> &str {
        "twilio-verify"
    }

    async fn send_code(&self, phone_number: &str) -> Result<String, ProviderError> {
        let url = format!(
            "{}/v2/Services/{}/Verifications",
            self.config.verify_base,
            self.verify_service()?
        );
        let verification: VerificationResponse = self
            .post_form(&url, &[("To", phone_number), ("Channel", "sms")])
            .await?;
        Ok(verification.status)
    }

    async fn check_code(&self, phone_number: &str, code: &str) -> Result<bool, ProviderError> {
        let url = format!(
            "{}/v2/Services/{}/VerificationCheck",
            self.config.verify_base,
            self.verify_service()?
        );
        let check: VerificationResponse = self
            .post_form(&url, &[("To", phone_number), ("Code", code)])
            .await?;
        Ok(check.status == APPROVED)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
