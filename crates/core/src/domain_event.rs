//! Business (domain) events raised by upstream producers.
//!
//! [`DomainEvent`] is the immutable envelope; [`BusinessEvent`] is the closed
//! set of variants with their type-specific payloads. Trigger evaluation and
//! content rendering match on [`BusinessEvent`] exhaustively, so adding a
//! variant is a compile error until every site handles it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::generate_event_id;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Tag identifying a [`BusinessEvent`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "user.registered")]
    UserRegistered,
    #[serde(rename = "user.verified")]
    UserVerified,
    #[serde(rename = "order.placed")]
    OrderPlaced,
    #[serde(rename = "order.shipped")]
    OrderShipped,
    #[serde(rename = "order.delivered")]
    OrderDelivered,
    #[serde(rename = "payment.processed")]
    PaymentProcessed,
    #[serde(rename = "password.reset.requested")]
    PasswordResetRequested,
    #[serde(rename = "password.reset.completed")]
    PasswordResetCompleted,
    #[serde(rename = "account.locked")]
    AccountLocked,
    #[serde(rename = "account.unlocked")]
    AccountUnlocked,
    #[serde(rename = "login.attempt")]
    LoginAttempt,
    #[serde(rename = "subscription.created")]
    SubscriptionCreated,
    #[serde(rename = "subscription.cancelled")]
    SubscriptionCancelled,
    #[serde(rename = "subscription.renewed")]
    SubscriptionRenewed,
}

impl EventType {
    /// Every event type, in catalogue order.
    pub const ALL: [EventType; 14] = [
        EventType::UserRegistered,
        EventType::UserVerified,
        EventType::OrderPlaced,
        EventType::OrderShipped,
        EventType::OrderDelivered,
        EventType::PaymentProcessed,
        EventType::PasswordResetRequested,
        EventType::PasswordResetCompleted,
        EventType::AccountLocked,
        EventType::AccountUnlocked,
        EventType::LoginAttempt,
        EventType::SubscriptionCreated,
        EventType::SubscriptionCancelled,
        EventType::SubscriptionRenewed,
    ];

    /// Dot-separated wire name, e.g. `"order.placed"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserRegistered => "user.registered",
            EventType::UserVerified => "user.verified",
            EventType::OrderPlaced => "order.placed",
            EventType::OrderShipped => "order.shipped",
            EventType::OrderDelivered => "order.delivered",
            EventType::PaymentProcessed => "payment.processed",
            EventType::PasswordResetRequested => "password.reset.requested",
            EventType::PasswordResetCompleted => "password.reset.completed",
            EventType::AccountLocked => "account.locked",
            EventType::AccountUnlocked => "account.unlocked",
            EventType::LoginAttempt => "login.attempt",
            EventType::SubscriptionCreated => "subscription.created",
            EventType::SubscriptionCancelled => "subscription.cancelled",
            EventType::SubscriptionRenewed => "subscription.renewed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payload helper types
// ---------------------------------------------------------------------------

/// Recipient details known to the producer at the time of the event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Contact {
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// `true` when a non-blank email is present.
    pub fn has_email(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    /// `true` when a non-blank phone number is present.
    pub fn has_phone(&self) -> bool {
        self.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationKind {
    Email,
    Phone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Failed,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Monthly,
    Yearly,
}

impl fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingInterval::Monthly => f.write_str("monthly"),
            BillingInterval::Yearly => f.write_str("yearly"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    pub city: String,
}

// ---------------------------------------------------------------------------
// BusinessEvent
// ---------------------------------------------------------------------------

/// Type-specific payload of a domain event, tagged by `eventType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all_fields = "camelCase")]
pub enum BusinessEvent {
    #[serde(rename = "user.registered")]
    UserRegistered {
        name: String,
        /// Where the registration came from: `web`, `mobile`, `api`.
        source: String,
    },
    #[serde(rename = "user.verified")]
    UserVerified {
        verification_type: VerificationKind,
        verified_at: Timestamp,
    },
    #[serde(rename = "order.placed")]
    OrderPlaced {
        order_id: String,
        amount: f64,
        currency: String,
        items: Vec<OrderItem>,
        shipping_address: ShippingAddress,
    },
    #[serde(rename = "order.shipped")]
    OrderShipped {
        order_id: String,
        tracking_number: String,
        carrier: String,
        estimated_delivery: Timestamp,
    },
    #[serde(rename = "order.delivered")]
    OrderDelivered {
        order_id: String,
        delivered_at: Timestamp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    #[serde(rename = "payment.processed")]
    PaymentProcessed {
        order_id: String,
        amount: f64,
        currency: String,
        payment_method: String,
        status: PaymentStatus,
        transaction_id: String,
    },
    #[serde(rename = "password.reset.requested")]
    PasswordResetRequested {
        reset_token: String,
        expires_at: Timestamp,
    },
    #[serde(rename = "password.reset.completed")]
    PasswordResetCompleted { reset_at: Timestamp },
    #[serde(rename = "account.locked")]
    AccountLocked {
        reason: String,
        locked_at: Timestamp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unlock_at: Option<Timestamp>,
    },
    #[serde(rename = "account.unlocked")]
    AccountUnlocked {
        unlocked_at: Timestamp,
        unlocked_by: String,
    },
    #[serde(rename = "login.attempt")]
    LoginAttempt {
        success: bool,
        ip_address: String,
        user_agent: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<GeoLocation>,
    },
    #[serde(rename = "subscription.created")]
    SubscriptionCreated {
        subscription_id: String,
        plan_id: String,
        plan_name: String,
        amount: f64,
        currency: String,
        interval: BillingInterval,
        start_date: Timestamp,
        end_date: Timestamp,
    },
    #[serde(rename = "subscription.cancelled")]
    SubscriptionCancelled {
        subscription_id: String,
        cancelled_at: Timestamp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        effective_date: Timestamp,
    },
    #[serde(rename = "subscription.renewed")]
    SubscriptionRenewed {
        subscription_id: String,
        renewed_at: Timestamp,
        next_billing_date: Timestamp,
        amount: f64,
        currency: String,
    },
}

impl BusinessEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            BusinessEvent::UserRegistered { .. } => EventType::UserRegistered,
            BusinessEvent::UserVerified { .. } => EventType::UserVerified,
            BusinessEvent::OrderPlaced { .. } => EventType::OrderPlaced,
            BusinessEvent::OrderShipped { .. } => EventType::OrderShipped,
            BusinessEvent::OrderDelivered { .. } => EventType::OrderDelivered,
            BusinessEvent::PaymentProcessed { .. } => EventType::PaymentProcessed,
            BusinessEvent::PasswordResetRequested { .. } => EventType::PasswordResetRequested,
            BusinessEvent::PasswordResetCompleted { .. } => EventType::PasswordResetCompleted,
            BusinessEvent::AccountLocked { .. } => EventType::AccountLocked,
            BusinessEvent::AccountUnlocked { .. } => EventType::AccountUnlocked,
            BusinessEvent::LoginAttempt { .. } => EventType::LoginAttempt,
            BusinessEvent::SubscriptionCreated { .. } => EventType::SubscriptionCreated,
            BusinessEvent::SubscriptionCancelled { .. } => EventType::SubscriptionCancelled,
            BusinessEvent::SubscriptionRenewed { .. } => EventType::SubscriptionRenewed,
        }
    }
}

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// An immutable fact about something that happened in the business domain.
///
/// Constructed via [`DomainEvent::new`] and enriched with
/// [`with_contact`](DomainEvent::with_contact) and
/// [`with_metadata`](DomainEvent::with_metadata).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    /// `event_<epoch-ms>_<suffix>`.
    pub id: String,
    pub user_id: String,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub contact: Contact,
    pub event: BusinessEvent,
}

impl DomainEvent {
    /// Create an event for `user_id` with a fresh id and the current time.
    pub fn new(user_id: impl Into<String>, event: BusinessEvent) -> Self {
        Self {
            id: generate_event_id(),
            user_id: user_id.into(),
            timestamp: chrono::Utc::now(),
            metadata: None,
            contact: Contact::default(),
            event,
        }
    }

    pub fn with_contact(mut self, contact: Contact) -> Self {
        self.contact = contact;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn event_type(&self) -> EventType {
        self.event.event_type()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
