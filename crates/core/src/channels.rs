//! Notification channels and notification categories.
//!
//! The serialized names (`EMAIL`, `SMS`, ...) are the values carried on the
//! wire and in trigger tables.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Delivery channel for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    /// Email delivered via SMTP.
    Email,
    /// Text message delivered via the SMS provider.
    Sms,
    /// Mobile push. No provider ships with the service.
    Push,
    /// In-app inbox. No provider ships with the service.
    InApp,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "EMAIL",
            Channel::Sms => "SMS",
            Channel::Push => "PUSH",
            Channel::InApp => "IN_APP",
        }
    }

    /// Parse a channel name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EMAIL" => Some(Channel::Email),
            "SMS" => Some(Channel::Sms),
            "PUSH" => Some(Channel::Push),
            "IN_APP" | "INAPP" => Some(Channel::InApp),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a notification, used for presentation and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Alert,
    Error,
    Info,
    Success,
    Warning,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Alert => "ALERT",
            NotificationType::Error => "ERROR",
            NotificationType::Info => "INFO",
            NotificationType::Success => "SUCCESS",
            NotificationType::Warning => "WARNING",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_serializes_screaming_case() {
        assert_eq!(
            serde_json::to_string(&Channel::InApp).unwrap(),
            "\"IN_APP\""
        );
        let parsed: Channel = serde_json::from_str("\"SMS\"").unwrap();
        assert_eq!(parsed, Channel::Sms);
    }

    #[test]
    fn channel_parse_is_case_insensitive() {
        assert_eq!(Channel::parse("email"), Some(Channel::Email));
        assert_eq!(Channel::parse(" Sms "), Some(Channel::Sms));
        assert_eq!(Channel::parse("in_app"), Some(Channel::InApp));
        assert_eq!(Channel::parse("fax"), None);
    }
}
