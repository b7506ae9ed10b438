//! In-process notification counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::lifecycle::SUPPORTED_LIFECYCLE_EVENTS;
use courier_core::{LifecycleEvent, LifecycleKind};
use serde::Serialize;

use crate::listener::{EventProcessor, ListenerOptions, ProcessError, RetryableListener};
use crate::retry::RetryPolicy;

pub const NOTIFICATION_METRICS: &str = "NotificationMetricsListener";

/// Counters fed by lifecycle events.
#[derive(Debug, Default)]
pub struct NotificationMetrics {
    queued: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    welcome_emails_sent: AtomicU64,
    verification_codes_sent: AtomicU64,
    verification_codes_verified: AtomicU64,
    delivery_time_total_ms: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub queued: u64,
    pub sent: u64,
    pub failed: u64,
    pub welcome_emails_sent: u64,
    pub verification_codes_sent: u64,
    pub verification_codes_verified: u64,
    /// Mean `deliveryTimeMs` over all sent notifications.
    pub average_delivery_time_ms: f64,
    /// `sent / (sent + failed)`, or 0 before any outcome.
    pub success_rate: f64,
}

impl NotificationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: &LifecycleKind) {
        match kind {
            LifecycleKind::Queued { .. } => {
                self.queued.fetch_add(1, Ordering::Relaxed);
            }
            LifecycleKind::Sent {
                delivery_time_ms, ..
            } => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                self.delivery_time_total_ms
                    .fetch_add(*delivery_time_ms, Ordering::Relaxed);
            }
            LifecycleKind::Failed { .. } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            LifecycleKind::WelcomeEmailSent { .. } => {
                self.welcome_emails_sent.fetch_add(1, Ordering::Relaxed);
            }
            LifecycleKind::VerificationCodeSent { .. } => {
                self.verification_codes_sent.fetch_add(1, Ordering::Relaxed);
            }
            LifecycleKind::VerificationCodeVerified { .. } => {
                self.verification_codes_verified
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let sent = self.sent.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let total_ms = self.delivery_time_total_ms.load(Ordering::Relaxed);

        let average_delivery_time_ms = if sent == 0 {
            0.0
        } else {
            total_ms as f64 / sent as f64
        };
        let success_rate = if sent + failed == 0 {
            0.0
        } else {
            sent as f64 / (sent + failed) as f64
        };

        MetricsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            sent,
            failed,
            welcome_emails_sent: self.welcome_emails_sent.load(Ordering::Relaxed),
            verification_codes_sent: self.verification_codes_sent.load(Ordering::Relaxed),
            verification_codes_verified: self.verification_codes_verified.load(Ordering::Relaxed),
            average_delivery_time_ms,
            success_rate,
        }
    }
}

#[async_trait]
impl EventProcessor for NotificationMetrics {
    async fn process(&self, event: &LifecycleEvent) -> Result<(), ProcessError> {
        self.record(&event.kind);
        tracing::debug!(event_type = event.event_type(), "Metrics updated");
        Ok(())
    }
}

/// The shared counters wrapped as a registrable listener with priority 0.
pub fn metrics_listener(
    metrics: Arc<NotificationMetrics>,
    retry: RetryPolicy,
) -> RetryableListener<Arc<NotificationMetrics>> {
    RetryableListener::new(
        ListenerOptions::new(NOTIFICATION_METRICS, SUPPORTED_LIFECYCLE_EVENTS).retry(retry),
        metrics,
    )
}
