//! Notification lifecycle events.
//!
//! One [`LifecycleEvent`] is emitted per dispatch outcome (queued, sent,
//! failed) plus the specialised welcome-email and verification-code events.
//! They are consumed by observers (logging, metrics) through the listener
//! registry.

use serde::{Deserialize, Serialize};

use crate::channels::{Channel, NotificationType};
use crate::request::NotificationRequest;
use crate::types::Timestamp;

pub const NOTIFICATION_QUEUED: &str = "notification.queued";
pub const NOTIFICATION_SENT: &str = "notification.sent";
pub const NOTIFICATION_FAILED: &str = "notification.failed";
pub const WELCOME_EMAIL_SENT: &str = "welcome.email.sent";
pub const VERIFICATION_CODE_SENT: &str = "verification.code.sent";
pub const VERIFICATION_CODE_VERIFIED: &str = "verification.code.verified";

/// Every lifecycle event type, in emission-catalogue order.
pub const SUPPORTED_LIFECYCLE_EVENTS: [&str; 6] = [
    NOTIFICATION_SENT,
    NOTIFICATION_FAILED,
    NOTIFICATION_QUEUED,
    WELCOME_EMAIL_SENT,
    VERIFICATION_CODE_SENT,
    VERIFICATION_CODE_VERIFIED,
];

/// Outcome-specific part of a [`LifecycleEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all_fields = "camelCase")]
pub enum LifecycleKind {
    #[serde(rename = "notification.queued")]
    Queued { queue_id: String, priority: u8 },
    #[serde(rename = "notification.sent")]
    Sent {
        provider: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_message_id: Option<String>,
        delivery_time_ms: u64,
    },
    #[serde(rename = "notification.failed")]
    Failed {
        error: String,
        retry_count: u32,
        max_retries: u32,
    },
    #[serde(rename = "welcome.email.sent")]
    WelcomeEmailSent { template: String, provider: String },
    #[serde(rename = "verification.code.sent")]
    VerificationCodeSent {
        phone_number: String,
        expires_at: Timestamp,
        provider: String,
    },
    #[serde(rename = "verification.code.verified")]
    VerificationCodeVerified {
        phone_number: String,
        verified_at: Timestamp,
    },
}

impl LifecycleKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleKind::Queued { .. } => NOTIFICATION_QUEUED,
            LifecycleKind::Sent { .. } => NOTIFICATION_SENT,
            LifecycleKind::Failed { .. } => NOTIFICATION_FAILED,
            LifecycleKind::WelcomeEmailSent { .. } => WELCOME_EMAIL_SENT,
            LifecycleKind::VerificationCodeSent { .. } => VERIFICATION_CODE_SENT,
            LifecycleKind::VerificationCodeVerified { .. } => VERIFICATION_CODE_VERIFIED,
        }
    }
}

/// The outcome of one notification dispatch attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    /// Notification id shared by every event of the same attempt.
    pub notification_id: String,
    pub user_id: String,
    pub channel: Channel,
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
    pub timestamp: Timestamp,
    pub kind: LifecycleKind,
}

impl LifecycleEvent {
    /// Build an event describing `request` with the given outcome.
    ///
    /// `channel` is passed separately because a request may reach the
    /// dispatcher without one; validation rejects that before any event is
    /// emitted.
    pub fn for_request(
        notification_id: &str,
        request: &NotificationRequest,
        channel: Channel,
        kind: LifecycleKind,
    ) -> Self {
        Self {
            notification_id: notification_id.to_string(),
            user_id: request.user_id.clone(),
            channel,
            notification_type: request.notification_type,
            title: request.title.clone(),
            message: request.message.clone(),
            email: request.email.clone(),
            phone: request.phone.clone(),
            metadata: request.metadata.clone(),
            timestamp: chrono::Utc::now(),
            kind,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}
