//! Notification dispatcher.
//!
//! [`NotificationDispatcher`] validates a [`NotificationRequest`], hands it
//! to the provider registered for its channel and publishes the outcome on
//! the [`EventBus`] as lifecycle events:
//!
//! - invalid request: error returned, nothing published, no provider call;
//! - otherwise `Queued`, then `Sent` on success or `Failed` on provider
//!   failure, all sharing one notification id. Provider failures are
//!   returned to the caller after `Failed` is published.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use courier_core::error::ValidationError;
use courier_core::ids::generate_notification_id;
use courier_core::{
    Channel, LifecycleEvent, LifecycleKind, NotificationRequest, NotificationType, Timestamp,
};
use tokio::time::Instant;

use crate::bus::EventBus;
use crate::error::{DispatchError, ProviderError};
use crate::provider::{NotificationProvider, VerificationProvider};

/// Priority recorded on `Queued` events.
pub const QUEUED_PRIORITY: u8 = 2;

/// Retry budget recorded on `Failed` events.
pub const MAX_RETRIES: u32 = 3;

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a verification code stays valid, in minutes.
pub const VERIFICATION_CODE_TTL_MINUTES: i64 = 10;

pub const WELCOME_TEMPLATE: &str = "welcome-email";
pub const WELCOME_TITLE: &str = "Welcome to our platform";

/// User id recorded on verification events, which are not tied to a user.
const SYSTEM_USER: &str = "system";

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A successfully delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub notification_id: String,
    pub provider: String,
    pub provider_message_id: Option<String>,
    pub delivery_time_ms: u64,
}

/// A verification code handed to the verification provider.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationReceipt {
    pub notification_id: String,
    /// Vendor status, e.g. `pending`.
    pub status: String,
    pub expires_at: Timestamp,
}

// ---------------------------------------------------------------------------
// NotificationDispatcher
// ---------------------------------------------------------------------------

pub struct NotificationDispatcher {
    bus: Arc<EventBus>,
    providers: HashMap<Channel, Arc<dyn NotificationProvider>>,
    verifier: Option<Arc<dyn VerificationProvider>>,
    timeout: Duration,
}

impl NotificationDispatcher {
    /// A dispatcher with no providers and the default provider timeout.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            providers: HashMap::new(),
            verifier: None,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    /// Route the provider's channel to it, replacing any earlier provider.
    pub fn with_provider(mut self, provider: Arc<dyn NotificationProvider>) -> Self {
        self.providers.insert(provider.channel(), provider);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn VerificationProvider>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Upper bound on a single provider call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.providers.keys().copied().collect()
    }

    // -----------------------------------------------------------------------
    // Send
    // -----------------------------------------------------------------------

    /// Validate and deliver `request`.
    pub async fn send(&self, request: &NotificationRequest) -> Result<SendReceipt, DispatchError> {
        let channel = request.validate().inspect_err(|e| {
            tracing::warn!(
                user_id = %request.user_id,
                field = e.field,
                reason = %e.reason,
                "Notification validation failed"
            );
        })?;

        let notification_id = generate_notification_id();
        let started = Instant::now();

        self.emit(
            &notification_id,
            request,
            channel,
            LifecycleKind::Queued {
                queue_id: notification_id.clone(),
                priority: QUEUED_PRIORITY,
            },
        );

        let delivered = match self.providers.get(&channel) {
            Some(provider) => self
                .call(provider.send(request))
                .await
                .map(|receipt| (provider.name().to_string(), receipt)),
            None => Err(ProviderError::UnsupportedChannel(channel)),
        };

        match delivered {
            Ok((provider, receipt)) => {
                let delivery_time_ms = started.elapsed().as_millis() as u64;
                self.emit(
                    &notification_id,
                    request,
                    channel,
                    LifecycleKind::Sent {
                        provider: provider.clone(),
                        provider_message_id: receipt.message_id.clone(),
                        delivery_time_ms,
                    },
                );
                tracing::info!(
                    notification_id = %notification_id,
                    user_id = %request.user_id,
                    channel = %channel,
                    provider = %provider,
                    delivery_time_ms,
                    "Notification sent"
                );
                Ok(SendReceipt {
                    notification_id,
                    provider,
                    provider_message_id: receipt.message_id,
                    delivery_time_ms,
                })
            }
            Err(source) => {
                self.emit_failed(&notification_id, request, channel, &source);
                tracing::error!(
                    notification_id = %notification_id,
                    user_id = %request.user_id,
                    channel = %channel,
                    error = %source,
                    "Notification failed"
                );
                Err(DispatchError::Provider {
                    notification_id,
                    source,
                })
            }
        }
    }

    /// Send the platform welcome email to `email`.
    ///
    /// Publishes `WelcomeEmailSent` after the regular `Sent` event.
    pub async fn send_welcome_email(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<SendReceipt, DispatchError> {
        let request = NotificationRequest::new(user_id, Channel::Email)
            .with_type(NotificationType::Success)
            .with_title(WELCOME_TITLE)
            .with_message(welcome_email_body(email))
            .with_email(email)
            .with_metadata(serde_json::json!({ "template": WELCOME_TEMPLATE }));

        let receipt = self.send(&request).await?;

        self.emit(
            &receipt.notification_id,
            &request,
            Channel::Email,
            LifecycleKind::WelcomeEmailSent {
                template: WELCOME_TEMPLATE.to_string(),
                provider: receipt.provider.clone(),
            },
        );
        tracing::info!(user_id, notification_id = %receipt.notification_id, "Welcome email sent");
        Ok(receipt)
    }

    // -----------------------------------------------------------------------
    // Verification codes
    // -----------------------------------------------------------------------

    /// Ask the verification provider to text a one-time code to `phone_number`.
    pub async fn send_verification_code(
        &self,
        phone_number: &str,
    ) -> Result<VerificationReceipt, DispatchError> {
        let phone_number = phone_number.trim();
        if phone_number.is_empty() {
            return Err(ValidationError::new("phone", "Phone number is required").into());
        }

        let notification_id = generate_notification_id();
        let request = verification_request(phone_number);
        let expires_at =
            chrono::Utc::now() + chrono::Duration::minutes(VERIFICATION_CODE_TTL_MINUTES);

        let result = match &self.verifier {
            Some(verifier) => self
                .call(verifier.send_code(phone_number))
                .await
                .map(|status| (verifier.name().to_string(), status)),
            None => Err(ProviderError::NotConfigured("verification")),
        };

        match result {
            Ok((provider, status)) => {
                self.emit(
                    &notification_id,
                    &request,
                    Channel::Sms,
                    LifecycleKind::VerificationCodeSent {
                        phone_number: phone_number.to_string(),
                        expires_at,
                        provider,
                    },
                );
                tracing::info!(notification_id = %notification_id, status = %status, "Verification code sent");
                Ok(VerificationReceipt {
                    notification_id,
                    status,
                    expires_at,
                })
            }
            Err(source) => {
                self.emit_failed(&notification_id, &request, Channel::Sms, &source);
                tracing::error!(notification_id = %notification_id, error = %source, "Failed to send verification code");
                Err(DispatchError::Provider {
                    notification_id,
                    source,
                })
            }
        }
    }

    /// Check `code` for `phone_number`. Returns whether it was approved.
    ///
    /// Publishes `VerificationCodeVerified` only for approved codes.
    pub async fn check_verification_code(
        &self,
        phone_number: &str,
        code: &str,
    ) -> Result<bool, DispatchError> {
        let (phone_number, code) = (phone_number.trim(), code.trim());
        if phone_number.is_empty() || code.is_empty() {
            return Err(ValidationError::new("code", "Code and phone number are required").into());
        }

        let notification_id = generate_notification_id();
        let request = verification_request(phone_number);

        let result = match &self.verifier {
            Some(verifier) => self.call(verifier.check_code(phone_number, code)).await,
            None => Err(ProviderError::NotConfigured("verification")),
        };

        match result {
            Ok(true) => {
                self.emit(
                    &notification_id,
                    &request,
                    Channel::Sms,
                    LifecycleKind::VerificationCodeVerified {
                        phone_number: phone_number.to_string(),
                        verified_at: chrono::Utc::now(),
                    },
                );
                tracing::debug!(notification_id = %notification_id, "Verification code approved");
                Ok(true)
            }
            Ok(false) => {
                tracing::debug!(notification_id = %notification_id, "Verification code rejected");
                Ok(false)
            }
            Err(source) => {
                self.emit_failed(&notification_id, &request, Channel::Sms, &source);
                tracing::error!(notification_id = %notification_id, error = %source, "Failed to check verification code");
                Err(DispatchError::Provider {
                    notification_id,
                    source,
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))?
    }

    fn emit(
        &self,
        notification_id: &str,
        request: &NotificationRequest,
        channel: Channel,
        kind: LifecycleKind,
    ) {
        self.bus.publish_lifecycle(LifecycleEvent::for_request(
            notification_id,
            request,
            channel,
            kind,
        ));
    }

    fn emit_failed(
        &self,
        notification_id: &str,
        request: &NotificationRequest,
        channel: Channel,
        error: &ProviderError,
    ) {
        self.emit(
            notification_id,
            request,
            channel,
            LifecycleKind::Failed {
                error: error.to_string(),
                retry_count: 0,
                max_retries: MAX_RETRIES,
            },
        );
    }
}

fn verification_request(phone_number: &str) -> NotificationRequest {
    NotificationRequest::new(SYSTEM_USER, Channel::Sms)
        .with_type(NotificationType::Alert)
        .with_phone(phone_number)
}

fn welcome_email_body(email: &str) -> String {
    format!(
        "<html><body>\
         <h1>Welcome, {email}!</h1>\
         <p>We are very happy to have you with us.</p>\
         <p>Your registration was successful and you can now start using our platform.</p>\
         <p>If you have any questions, please do not hesitate to contact us.</p>\
         <p>Best regards,<br>The team</p>\
         </body></html>"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    use super::*;
    use crate::bus::BusEvent;
    use crate::provider::ProviderReceipt;

    enum Behaviour {
        Succeed,
        Fail,
        Hang,
    }

    struct StubProvider {
        channel: Channel,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn new(channel: Channel, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                channel,
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl NotificationProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn channel(&self) -> Channel {
            self.channel
        }

        async fn send(&self, _request: &NotificationRequest) -> Result<ProviderReceipt, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Succeed => Ok(ProviderReceipt {
                    message_id: Some("msg-1".into()),
                }),
                Behaviour::Fail => Err(ProviderError::Rejected {
                    status: 503,
                    body: "unavailable".into(),
                }),
                Behaviour::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    struct StubVerifier {
        approve: bool,
    }

    #[async_trait]
    impl VerificationProvider for StubVerifier {
        fn name(&self) -> &str {
            "stub-verify"
        }

        async fn send_code(&self, _phone_number: &str) -> Result<String, ProviderError> {
            Ok("pending".into())
        }

        async fn check_code(&self, _phone_number: &str, code: &str) -> Result<bool, ProviderError> {
            Ok(self.approve && code == "123456")
        }
    }

    fn setup(provider: Arc<StubProvider>) -> (NotificationDispatcher, broadcast::Receiver<BusEvent>) {
        let bus = Arc::new(EventBus::default());
        let rx = bus.subscribe();
        (NotificationDispatcher::new(bus).with_provider(provider), rx)
    }

    fn drain(rx: &mut broadcast::Receiver<BusEvent>) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let BusEvent::Lifecycle(event) = event {
                events.push(event);
            }
        }
        events
    }

    fn email_request() -> NotificationRequest {
        NotificationRequest::new("user-1", Channel::Email)
            .with_email("jane@example.com")
            .with_title("Hi")
            .with_message("Hello")
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_provider() {
        let provider = StubProvider::new(Channel::Email, Behaviour::Succeed);
        let (dispatcher, mut rx) = setup(Arc::clone(&provider));

        let request = NotificationRequest::new("user-1", Channel::Email).with_email("");
        let err = dispatcher.send(&request).await.unwrap_err();

        assert_matches!(err, DispatchError::Validation(ValidationError { field: "email", .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn success_emits_queued_then_sent_with_shared_id() {
        let provider = StubProvider::new(Channel::Email, Behaviour::Succeed);
        let (dispatcher, mut rx) = setup(provider);

        let receipt = dispatcher.send(&email_request()).await.unwrap();
        assert_eq!(receipt.provider, "stub");
        assert_eq!(receipt.provider_message_id.as_deref(), Some("msg-1"));
        assert!(receipt.notification_id.starts_with("notif_"));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_matches!(
            &events[0].kind,
            LifecycleKind::Queued { queue_id, priority: QUEUED_PRIORITY } if *queue_id == receipt.notification_id
        );
        assert_matches!(&events[1].kind, LifecycleKind::Sent { provider, .. } if provider == "stub");
        assert!(events
            .iter()
            .all(|e| e.notification_id == receipt.notification_id));
    }

    #[tokio::test]
    async fn provider_failure_emits_failed_and_propagates() {
        let provider = StubProvider::new(Channel::Email, Behaviour::Fail);
        let (dispatcher, mut rx) = setup(provider);

        let err = dispatcher.send(&email_request()).await.unwrap_err();
        assert_matches!(
            err,
            DispatchError::Provider { source: ProviderError::Rejected { status: 503, .. }, .. }
        );

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_matches!(
            &events[1].kind,
            LifecycleKind::Failed { retry_count: 0, max_retries: MAX_RETRIES, error } if error.contains("503")
        );
    }

    #[tokio::test]
    async fn channel_without_provider_fails_after_queued() {
        let provider = StubProvider::new(Channel::Email, Behaviour::Succeed);
        let (dispatcher, mut rx) = setup(provider);

        let err = dispatcher
            .send(&NotificationRequest::new("user-1", Channel::Push))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            DispatchError::Provider { source: ProviderError::UnsupportedChannel(Channel::Push), .. }
        );

        let kinds: Vec<&str> = drain(&mut rx).iter().map(|e| e.event_type()).collect();
        assert_eq!(kinds, vec!["notification.queued", "notification.failed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_provider_times_out() {
        let provider = StubProvider::new(Channel::Email, Behaviour::Hang);
        let (dispatcher, mut rx) = setup(provider);
        let dispatcher = dispatcher.with_timeout(Duration::from_secs(2));

        let err = dispatcher.send(&email_request()).await.unwrap_err();
        assert_matches!(err, DispatchError::Provider { source: ProviderError::Timeout(_), .. });
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[tokio::test]
    async fn welcome_email_emits_welcome_event_after_sent() {
        let provider = StubProvider::new(Channel::Email, Behaviour::Succeed);
        let (dispatcher, mut rx) = setup(provider);

        let receipt = dispatcher
            .send_welcome_email("user-1", "jane@example.com")
            .await
            .unwrap();

        let events = drain(&mut rx);
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            kinds,
            vec!["notification.queued", "notification.sent", "welcome.email.sent"]
        );
        assert_eq!(events[2].notification_id, receipt.notification_id);
        assert_eq!(events[2].title.as_deref(), Some(WELCOME_TITLE));
    }

    #[tokio::test]
    async fn verification_code_round_trip() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let dispatcher = NotificationDispatcher::new(Arc::clone(&bus))
            .with_verifier(Arc::new(StubVerifier { approve: true }));

        let receipt = dispatcher.send_verification_code("+15550100").await.unwrap();
        assert_eq!(receipt.status, "pending");
        let ttl = receipt.expires_at - chrono::Utc::now();
        assert!(ttl <= chrono::Duration::minutes(10) && ttl > chrono::Duration::minutes(9));

        assert!(!dispatcher.check_verification_code("+15550100", "000000").await.unwrap());
        assert!(dispatcher.check_verification_code("+15550100", "123456").await.unwrap());

        let kinds: Vec<&str> = drain(&mut rx).iter().map(|e| e.event_type()).collect();
        assert_eq!(
            kinds,
            vec!["verification.code.sent", "verification.code.verified"]
        );
    }

    #[tokio::test]
    async fn verification_without_provider_reports_failure() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let dispatcher = NotificationDispatcher::new(bus);

        let err = dispatcher.send_verification_code("+15550100").await.unwrap_err();
        assert_matches!(
            err,
            DispatchError::Provider { source: ProviderError::NotConfigured("verification"), .. }
        );
        assert_matches!(
            dispatcher.send_verification_code("  ").await,
            Err(DispatchError::Validation(_))
        );
        assert_matches!(
            dispatcher.check_verification_code("+15550100", "").await,
            Err(DispatchError::Validation(_))
        );

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "notification.failed");
        assert_eq!(events[0].user_id, "system");
    }
}
