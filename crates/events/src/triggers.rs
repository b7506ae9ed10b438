//! Trigger engine: turns business events into notifications.
//!
//! For each [`DomainEvent`] the engine walks the event type's triggers in
//! table order, evaluates their conditions, builds a request for every match,
//! waits out the trigger delay and sends it through the
//! [`NotificationDispatcher`]. A failing trigger is logged and never stops
//! its siblings.

use std::sync::Arc;
use std::time::Duration;

use courier_core::trigger::build_request;
use courier_core::{DomainEvent, TriggerTable};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::bus::BusEvent;
use crate::dispatcher::NotificationDispatcher;

/// Per-event outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmitSummary {
    /// Triggers whose conditions held.
    pub matched: usize,
    pub sent: usize,
    pub failed: usize,
    /// Triggers whose conditions did not hold.
    pub skipped: usize,
}

pub struct TriggerEngine {
    table: TriggerTable,
    dispatcher: Arc<NotificationDispatcher>,
}

impl TriggerEngine {
    pub fn new(table: TriggerTable, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { table, dispatcher }
    }

    pub fn table(&self) -> &TriggerTable {
        &self.table
    }

    /// Process every trigger registered for the event's type, in order.
    ///
    /// Never fails: dispatch errors are logged and counted.
    pub async fn emit(&self, event: &DomainEvent) -> EmitSummary {
        let event_type = event.event_type();
        let triggers = self.table.for_event(event_type);
        let mut summary = EmitSummary::default();

        if triggers.is_empty() {
            tracing::debug!(event_type = %event_type, "No notification triggers for event");
            return summary;
        }

        tracing::info!(
            event_id = %event.id,
            event_type = %event_type,
            user_id = %event.user_id,
            triggers = triggers.len(),
            "Processing business event"
        );

        for trigger in triggers {
            if !trigger.matches(event) {
                summary.skipped += 1;
                tracing::debug!(template = %trigger.template, "Trigger conditions not met");
                continue;
            }
            summary.matched += 1;

            let request = build_request(event, trigger);

            if let Some(delay_ms) = trigger.delay_ms {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            match self.dispatcher.send(&request).await {
                Ok(receipt) => {
                    summary.sent += 1;
                    tracing::info!(
                        event_type = %event_type,
                        template = %trigger.template,
                        notification_id = %receipt.notification_id,
                        "Sent notification for business event"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(
                        event_type = %event_type,
                        template = %trigger.template,
                        error = %e,
                        "Failed to process notification trigger"
                    );
                }
            }
        }

        summary
    }

    /// Process every business event received from the bus.
    ///
    /// Each event runs on its own task so trigger delays never hold up the
    /// receive loop. On cancellation, in-flight events are allowed to finish.
    pub async fn run(self: Arc<Self>, mut receiver: broadcast::Receiver<BusEvent>, cancel: CancellationToken) {
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Trigger engine cancelled");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(BusEvent::Business(event)) => {
                        let engine = Arc::clone(&self);
                        tracker.spawn(async move {
                            engine.emit(&event).await;
                        });
                    }
                    Ok(BusEvent::Lifecycle(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            skipped = n,
                            "Trigger engine lagged, some business events were not processed"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, trigger engine shutting down");
                        break;
                    }
                },
            }
        }

        tracker.close();
        tracker.wait().await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use courier_core::domain_event::GeoLocation;
    use courier_core::{BusinessEvent, Channel, Contact, NotificationRequest};
    use tokio::time::Instant;

    use super::*;
    use crate::bus::EventBus;
    use crate::error::ProviderError;
    use crate::provider::{NotificationProvider, ProviderReceipt};

    struct Capture {
        channel: Channel,
        sent: Mutex<Vec<(Instant, NotificationRequest)>>,
        fail: bool,
    }

    impl Capture {
        fn new(channel: Channel, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                channel,
                sent: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn templates(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, r)| r.metadata.as_ref().unwrap()["template"].as_str().unwrap().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl NotificationProvider for Capture {
        fn name(&self) -> &str {
            "capture"
        }

        fn channel(&self) -> Channel {
            self.channel
        }

        async fn send(&self, request: &NotificationRequest) -> Result<ProviderReceipt, ProviderError> {
            self.sent.lock().unwrap().push((Instant::now(), request.clone()));
            if self.fail {
                Err(ProviderError::Transport("connection reset".into()))
            } else {
                Ok(ProviderReceipt::default())
            }
        }
    }

    fn engine(email: Arc<Capture>, sms: Arc<Capture>) -> TriggerEngine {
        let dispatcher = NotificationDispatcher::new(Arc::new(EventBus::default()))
            .with_provider(email)
            .with_provider(sms);
        TriggerEngine::new(TriggerTable::builtin(), Arc::new(dispatcher))
    }

    fn registered(contact: Contact) -> DomainEvent {
        DomainEvent::new(
            "user-1",
            BusinessEvent::UserRegistered {
                name: "Jane".into(),
                source: "web".into(),
            },
        )
        .with_contact(contact)
    }

    #[tokio::test]
    async fn registered_with_email_only_sends_welcome_email() {
        let email = Capture::new(Channel::Email, false);
        let sms = Capture::new(Channel::Sms, false);
        let engine = engine(Arc::clone(&email), Arc::clone(&sms));

        let summary = engine
            .emit(&registered(Contact::email("jane@example.com")))
            .await;

        assert_eq!(
            summary,
            EmitSummary {
                matched: 1,
                sent: 1,
                failed: 0,
                skipped: 1
            }
        );
        assert_eq!(email.templates(), vec!["welcome-email"]);
        assert!(sms.templates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_trigger_waits_before_sending() {
        let email = Capture::new(Channel::Email, false);
        let sms = Capture::new(Channel::Sms, false);
        let engine = engine(Arc::clone(&email), Arc::clone(&sms));
        let start = Instant::now();

        engine
            .emit(&registered(
                Contact::email("jane@example.com").with_phone("+15550100"),
            ))
            .await;

        let sms_sent = sms.sent.lock().unwrap()[0].0;
        assert!(sms_sent - start >= Duration::from_millis(5000));
        assert_eq!(sms.templates(), vec!["welcome-sms"]);
    }

    #[tokio::test]
    async fn failing_trigger_does_not_stop_siblings() {
        let email = Capture::new(Channel::Email, true);
        let sms = Capture::new(Channel::Sms, false);
        let engine = engine(Arc::clone(&email), Arc::clone(&sms));

        let event = DomainEvent::new(
            "user-1",
            BusinessEvent::AccountLocked {
                reason: "too many attempts".into(),
                locked_at: chrono::Utc::now(),
                unlock_at: None,
            },
        )
        .with_contact(Contact::email("jane@example.com").with_phone("+15550100"));

        let summary = engine.emit(&event).await;
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(sms.templates(), vec!["account-locked-sms"]);
    }

    #[tokio::test]
    async fn login_success_condition_is_respected() {
        let email = Capture::new(Channel::Email, false);
        let sms = Capture::new(Channel::Sms, false);
        let engine = engine(Arc::clone(&email), Arc::clone(&sms));

        let login = |success| {
            DomainEvent::new(
                "user-1",
                BusinessEvent::LoginAttempt {
                    success,
                    ip_address: "203.0.113.7".into(),
                    user_agent: "Firefox".into(),
                    location: Some(GeoLocation {
                        country: "PT".into(),
                        city: "Lisbon".into(),
                    }),
                },
            )
            .with_contact(Contact::email("jane@example.com"))
        };

        assert_eq!(engine.emit(&login(true)).await.matched, 0);
        assert_eq!(engine.emit(&login(false)).await.sent, 1);
        assert_eq!(email.templates(), vec!["login-alert"]);
    }

    #[tokio::test]
    async fn event_without_triggers_is_ignored() {
        let email = Capture::new(Channel::Email, false);
        let sms = Capture::new(Channel::Sms, false);
        let engine = engine(Arc::clone(&email), Arc::clone(&sms));

        let event = DomainEvent::new(
            "user-1",
            BusinessEvent::PasswordResetCompleted {
                reset_at: chrono::Utc::now(),
            },
        )
        .with_contact(Contact::email("jane@example.com"));

        assert_eq!(engine.emit(&event).await, EmitSummary::default());
        assert!(email.templates().is_empty());
    }

    #[tokio::test]
    async fn run_consumes_business_events_from_bus() {
        let bus = Arc::new(EventBus::default());
        let email = Capture::new(Channel::Email, false);
        let dispatcher = NotificationDispatcher::new(Arc::clone(&bus)).with_provider(email.clone());
        let engine = Arc::new(TriggerEngine::new(TriggerTable::builtin(), Arc::new(dispatcher)));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&engine).run(bus.subscribe(), cancel.clone()));

        bus.publish_business(registered(Contact::email("jane@example.com")));
        for _ in 0..50 {
            if !email.templates().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(email.templates(), vec!["welcome-email"]);

        cancel.cancel();
        handle.await.unwrap();
    }
}
