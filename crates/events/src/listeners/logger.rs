//! Logs every notification lifecycle event.

use async_trait::async_trait;
use courier_core::lifecycle::SUPPORTED_LIFECYCLE_EVENTS;
use courier_core::{LifecycleEvent, LifecycleKind};

use crate::error::ListenerError;
use crate::listener::{EventProcessor, ListenerOptions, ProcessError, RetryableListener};
use crate::retry::RetryPolicy;

pub const NOTIFICATION_LOGGER: &str = "NotificationLoggerListener";

/// Writes one structured log line per lifecycle event.
///
/// Sent and completed flows log at `info`, failures at `error`, queued at
/// `debug`.
pub struct NotificationLogger;

/// The logger wrapped as a registrable listener with priority 1.
pub fn logger_listener(retry: RetryPolicy) -> RetryableListener<NotificationLogger> {
    RetryableListener::new(
        ListenerOptions::new(NOTIFICATION_LOGGER, SUPPORTED_LIFECYCLE_EVENTS)
            .priority(1)
            .retry(retry),
        NotificationLogger,
    )
}

#[async_trait]
impl EventProcessor for NotificationLogger {
    async fn process(&self, event: &LifecycleEvent) -> Result<(), ProcessError> {
        let id = event.notification_id.as_str();
        let user_id = event.user_id.as_str();
        let channel = event.channel.as_str();
        let notification_type = event.notification_type.as_str();

        match &event.kind {
            LifecycleKind::Queued { queue_id, priority } => {
                tracing::debug!(
                    notification_id = id,
                    user_id,
                    channel,
                    notification_type,
                    queue_id = %queue_id,
                    priority,
                    "Notification queued"
                );
            }
            LifecycleKind::Sent {
                provider,
                provider_message_id,
                delivery_time_ms,
            } => {
                tracing::info!(
                    notification_id = id,
                    user_id,
                    channel,
                    notification_type,
                    provider = %provider,
                    provider_message_id = provider_message_id.as_deref().unwrap_or("-"),
                    delivery_time_ms,
                    "Notification sent successfully"
                );
            }
            LifecycleKind::Failed {
                error,
                retry_count,
                max_retries,
            } => {
                tracing::error!(
                    notification_id = id,
                    user_id,
                    channel,
                    notification_type,
                    error = %error,
                    retry_count,
                    max_retries,
                    "Notification failed"
                );
            }
            LifecycleKind::WelcomeEmailSent { template, provider } => {
                tracing::info!(
                    notification_id = id,
                    user_id,
                    template = %template,
                    provider = %provider,
                    "Welcome email sent"
                );
            }
            LifecycleKind::VerificationCodeSent {
                phone_number,
                expires_at,
                provider,
            } => {
                tracing::info!(
                    notification_id = id,
                    phone_number = %phone_number,
                    expires_at = %expires_at.to_rfc3339(),
                    provider = %provider,
                    "Verification code sent"
                );
            }
            LifecycleKind::VerificationCodeVerified {
                phone_number,
                verified_at,
            } => {
                tracing::info!(
                    notification_id = id,
                    phone_number = %phone_number,
                    verified_at = %verified_at.to_rfc3339(),
                    "Verification code verified"
                );
            }
        }
        Ok(())
    }

    fn handle_error(&self, event: &LifecycleEvent, error: &ListenerError) {
        tracing::error!(
            event_type = event.event_type(),
            user_id = %event.user_id,
            error = %error.reason,
            "Failed to log notification event"
        );
    }
}
