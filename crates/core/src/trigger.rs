//! Notification triggers: static rules mapping business events to
//! notifications.
//!
//! A [`TriggerTable`] holds, per [`EventType`], an ordered list of
//! [`NotificationTrigger`]s. Each trigger carries optional
//! [`TriggerConditions`] evaluated against the event; matching triggers are
//! turned into [`NotificationRequest`]s by [`build_request`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::channels::{Channel, NotificationType};
use crate::content::{render_message, render_title};
use crate::domain_event::{BusinessEvent, DomainEvent, EventType};
use crate::error::CoreError;
use crate::request::NotificationRequest;

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Named predicates a trigger requires. All declared predicates must hold.
///
/// Deserialized from a JSON object; unknown keys are ignored. A predicate
/// declared as `false` (e.g. `"hasEmail": false`) places no requirement,
/// except `success`, which is compared against the event's value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_email: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_phone: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_verified: Option<bool>,
    /// Only meaningful for `login.attempt`; ignored for other events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl TriggerConditions {
    pub fn has_email() -> Self {
        Self {
            has_email: Some(true),
            ..Self::default()
        }
    }

    pub fn has_phone() -> Self {
        Self {
            has_phone: Some(true),
            ..Self::default()
        }
    }

    /// Evaluate every declared predicate against `event`.
    pub fn matches(&self, event: &DomainEvent) -> bool {
        if self.has_email == Some(true) && !event.contact.has_email() {
            return false;
        }
        if self.has_phone == Some(true) && !event.contact.has_phone() {
            return false;
        }
        // `userVerified` always holds: only `user.verified` carries a
        // verification state and its presence means verification succeeded.
        if let Some(expected) = self.success {
            if let BusinessEvent::LoginAttempt { success, .. } = &event.event {
                return *success == expected;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// NotificationTrigger
// ---------------------------------------------------------------------------

/// A rule producing one notification for one business event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTrigger {
    pub event_type: EventType,
    pub notification_type: NotificationType,
    pub channel: Channel,
    /// Template id, recorded in the request metadata.
    pub template: String,
    /// Absent conditions always match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<TriggerConditions>,
    /// Wait this long before sending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub priority: i32,
}

impl NotificationTrigger {
    pub fn new(
        event_type: EventType,
        notification_type: NotificationType,
        channel: Channel,
        template: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            notification_type,
            channel,
            template: template.into(),
            conditions: None,
            delay_ms: None,
            priority: 0,
        }
    }

    pub fn when(mut self, conditions: TriggerConditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn delayed(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether this trigger fires for `event`.
    pub fn matches(&self, event: &DomainEvent) -> bool {
        self.event_type == event.event_type()
            && self
                .conditions
                .as_ref()
                .map_or(true, |conditions| conditions.matches(event))
    }
}

/// Build the notification request a matching trigger produces.
///
/// The recipient address is taken from the event contact according to the
/// trigger channel; the original event is embedded in the metadata.
pub fn build_request(event: &DomainEvent, trigger: &NotificationTrigger) -> NotificationRequest {
    let mut request = NotificationRequest::new(event.user_id.clone(), trigger.channel)
        .with_type(trigger.notification_type)
        .with_title(render_title(&event.event))
        .with_message(render_message(event))
        .with_metadata(serde_json::json!({
            "businessEvent": event.event_type().as_str(),
            "businessEventId": event.id,
            "template": trigger.template,
            "originalEvent": event,
        }));

    match trigger.channel {
        Channel::Email => request.email = event.contact.email.clone(),
        Channel::Sms => request.phone = event.contact.phone.clone(),
        Channel::Push | Channel::InApp => {}
    }

    request
}

// ---------------------------------------------------------------------------
// TriggerTable
// ---------------------------------------------------------------------------

/// Ordered triggers per event type.
#[derive(Debug, Clone, Default)]
pub struct TriggerTable {
    triggers: HashMap<EventType, Vec<NotificationTrigger>>,
}

impl TriggerTable {
    /// Group `triggers` by event type, preserving their relative order.
    pub fn from_triggers(triggers: impl IntoIterator<Item = NotificationTrigger>) -> Self {
        let mut table: HashMap<EventType, Vec<NotificationTrigger>> = HashMap::new();
        for trigger in triggers {
            table.entry(trigger.event_type).or_default().push(trigger);
        }
        Self { triggers: table }
    }

    /// Parse a JSON array of triggers.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let triggers: Vec<NotificationTrigger> = serde_json::from_str(json)?;
        Ok(Self::from_triggers(triggers))
    }

    /// Triggers for `event_type`, in table order. Empty when none exist.
    pub fn for_event(&self, event_type: EventType) -> &[NotificationTrigger] {
        self.triggers
            .get(&event_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.triggers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The built-in business event to notification mapping.
    pub fn builtin() -> Self {
        use Channel::{Email, Sms};
        use EventType as E;
        use NotificationType::{Alert, Info, Success};

        let email = TriggerConditions::has_email;
        let phone = TriggerConditions::has_phone;

        Self::from_triggers([
            NotificationTrigger::new(E::UserRegistered, Success, Email, "welcome-email")
                .when(email())
                .priority(1),
            NotificationTrigger::new(E::UserRegistered, Info, Sms, "welcome-sms")
                .when(phone())
                .delayed(5_000)
                .priority(2),
            NotificationTrigger::new(E::UserVerified, Success, Email, "verification-success")
                .when(TriggerConditions {
                    user_verified: Some(true),
                    ..TriggerConditions::default()
                })
                .priority(1),
            NotificationTrigger::new(E::OrderPlaced, Success, Email, "order-confirmation")
                .when(email())
                .priority(1),
            NotificationTrigger::new(E::OrderPlaced, Info, Sms, "order-confirmation-sms")
                .when(phone())
                .delayed(2_000)
                .priority(2),
            NotificationTrigger::new(E::OrderShipped, Info, Email, "order-shipped")
                .when(email())
                .priority(1),
            NotificationTrigger::new(E::OrderShipped, Info, Sms, "order-shipped-sms")
                .when(phone())
                .priority(2),
            NotificationTrigger::new(E::OrderDelivered, Success, Email, "order-delivered")
                .when(email())
                .priority(1),
            NotificationTrigger::new(E::PaymentProcessed, Success, Email, "payment-success")
                .when(email())
                .priority(1),
            NotificationTrigger::new(E::PasswordResetRequested, Alert, Email, "password-reset")
                .when(email())
                .priority(1),
            NotificationTrigger::new(E::AccountLocked, Alert, Email, "account-locked")
                .when(email())
                .priority(1),
            NotificationTrigger::new(E::AccountLocked, Alert, Sms, "account-locked-sms")
                .when(phone())
                .priority(2),
            NotificationTrigger::new(E::LoginAttempt, Alert, Email, "login-alert")
                .when(TriggerConditions {
                    has_email: Some(true),
                    success: Some(false),
                    ..TriggerConditions::default()
                })
                .priority(1),
            NotificationTrigger::new(E::SubscriptionCreated, Success, Email, "subscription-welcome")
                .when(email())
                .priority(1),
            NotificationTrigger::new(
                E::SubscriptionCancelled,
                Info,
                Email,
                "subscription-cancelled",
            )
            .when(email())
            .priority(1),
        ])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
