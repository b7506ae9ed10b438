//! Notification requests and their shape validation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::channels::{Channel, NotificationType};
use crate::error::ValidationError;

/// Maximum length of a notification title, in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum length of a notification message body, in characters.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// Basic `local@domain.tld` shape. Deliverability is the provider's problem.
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

/// E.164-style phone number, checked after whitespace is stripped.
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("valid regex"));

/// A request to deliver one notification over one channel.
///
/// Built by the trigger engine from a domain event, or supplied directly by
/// a caller. `channel` is optional so that caller-supplied requests missing
/// it are rejected by [`validate`](NotificationRequest::validate) rather
/// than at deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub user_id: String,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default = "default_notification_type", rename = "type")]
    pub notification_type: NotificationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

fn default_notification_type() -> NotificationType {
    NotificationType::Info
}

impl NotificationRequest {
    pub fn new(user_id: impl Into<String>, channel: Channel) -> Self {
        Self {
            user_id: user_id.into(),
            channel: Some(channel),
            notification_type: default_notification_type(),
            title: None,
            message: None,
            email: None,
            phone: None,
            metadata: None,
        }
    }

    pub fn with_type(mut self, notification_type: NotificationType) -> Self {
        self.notification_type = notification_type;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Validate the request shape, returning the channel on success.
    ///
    /// Rules, checked in order:
    /// - `userId` must not be blank.
    /// - `channel` must be present.
    /// - EMAIL requires an `email` matching `local@domain.tld`.
    /// - SMS requires a `phone` matching `^\+?[1-9]\d{1,14}$` once spaces are removed.
    /// - `title` at most [`MAX_TITLE_LEN`] characters.
    /// - `message` at most [`MAX_MESSAGE_LEN`] characters.
    pub fn validate(&self) -> Result<Channel, ValidationError> {
        if self.user_id.trim().is_empty() {
            return Err(ValidationError::new(
                "userId",
                "User ID is required and cannot be empty",
            ));
        }

        let channel = self
            .channel
            .ok_or_else(|| ValidationError::new("channel", "Channel is required"))?;

        match channel {
            Channel::Email => {
                let email = self.email.as_deref().map(str::trim).unwrap_or_default();
                if email.is_empty() {
                    return Err(ValidationError::new(
                        "email",
                        "Email is required for email notifications",
                    ));
                }
                if !is_valid_email(email) {
                    return Err(ValidationError::new("email", "Invalid email format"));
                }
            }
            Channel::Sms => {
                let phone = self.phone.as_deref().map(str::trim).unwrap_or_default();
                if phone.is_empty() {
                    return Err(ValidationError::new(
                        "phone",
                        "Phone number is required for SMS notifications",
                    ));
                }
                if !is_valid_phone(phone) {
                    return Err(ValidationError::new("phone", "Invalid phone number format"));
                }
            }
            Channel::Push | Channel::InApp => {}
        }

        if let Some(title) = &self.title {
            if title.chars().count() > MAX_TITLE_LEN {
                return Err(ValidationError::new(
                    "title",
                    format!("Title cannot exceed {MAX_TITLE_LEN} characters"),
                ));
            }
        }

        if let Some(message) = &self.message {
            if message.chars().count() > MAX_MESSAGE_LEN {
                return Err(ValidationError::new(
                    "message",
                    format!("Message cannot exceed {MAX_MESSAGE_LEN} characters"),
                ));
            }
        }

        Ok(channel)
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Whitespace anywhere in the number is ignored.
pub fn is_valid_phone(phone: &str) -> bool {
    let compact: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
    PHONE_RE.is_match(&compact)
}
