//! Typed entry points for raising business events.
//!
//! [`BusinessEventEmitter`] has one method per [`BusinessEvent`] variant.
//! Each builds the [`DomainEvent`], publishes it on the [`EventBus`] and
//! returns a correlation id of the form `<eventType>.<epoch-ms>`. The
//! trigger engine picks the event up from the bus.

use std::sync::Arc;

use courier_core::domain_event::{
    BillingInterval, GeoLocation, OrderItem, PaymentStatus, ShippingAddress, VerificationKind,
};
use courier_core::ids::correlation_id;
use courier_core::{BusinessEvent, Contact, DomainEvent, Timestamp};

use crate::bus::EventBus;

pub struct BusinessEventEmitter {
    bus: Arc<EventBus>,
}

impl BusinessEventEmitter {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Publish a fully built event. Returns its correlation id.
    pub fn emit(&self, event: DomainEvent) -> String {
        let event_type = event.event_type();
        let correlation = correlation_id(event_type.as_str());

        match &event.event {
            BusinessEvent::LoginAttempt {
                success: false,
                ip_address,
                ..
            } => {
                tracing::warn!(user_id = %event.user_id, ip_address = %ip_address, "Failed login attempt");
            }
            BusinessEvent::AccountLocked { reason, .. } => {
                tracing::warn!(user_id = %event.user_id, reason = %reason, "Account locked");
            }
            _ => {}
        }

        tracing::info!(
            event_id = %event.id,
            event_type = %event_type,
            user_id = %event.user_id,
            correlation_id = %correlation,
            "Business event emitted"
        );
        self.bus.publish_business(event);
        correlation
    }

    fn raise(&self, user_id: &str, contact: Contact, event: BusinessEvent) -> String {
        self.emit(DomainEvent::new(user_id, event).with_contact(contact))
    }

    pub fn user_registered(&self, user_id: &str, contact: Contact, name: &str, source: &str) -> String {
        self.raise(
            user_id,
            contact,
            BusinessEvent::UserRegistered {
                name: name.to_string(),
                source: source.to_string(),
            },
        )
    }

    pub fn user_verified(
        &self,
        user_id: &str,
        contact: Contact,
        verification_type: VerificationKind,
        verified_at: Timestamp,
    ) -> String {
        self.raise(
            user_id,
            contact,
            BusinessEvent::UserVerified {
                verification_type,
                verified_at,
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn order_placed(
        &self,
        user_id: &str,
        contact: Contact,
        order_id: &str,
        amount: f64,
        currency: &str,
        items: Vec<OrderItem>,
        shipping_address: ShippingAddress,
    ) -> String {
        self.raise(
            user_id,
            contact,
            BusinessEvent::OrderPlaced {
                order_id: order_id.to_string(),
                amount,
                currency: currency.to_string(),
                items,
                shipping_address,
            },
        )
    }

    pub fn order_shipped(
        &self,
        user_id: &str,
        contact: Contact,
        order_id: &str,
        tracking_number: &str,
        carrier: &str,
        estimated_delivery: Timestamp,
    ) -> String {
        self.raise(
            user_id,
            contact,
            BusinessEvent::OrderShipped {
                order_id: order_id.to_string(),
                tracking_number: tracking_number.to_string(),
                carrier: carrier.to_string(),
                estimated_delivery,
            },
        )
    }

    pub fn order_delivered(
        &self,
        user_id: &str,
        contact: Contact,
        order_id: &str,
        delivered_at: Timestamp,
        signature: Option<String>,
    ) -> String {
        self.raise(
            user_id,
            contact,
            BusinessEvent::OrderDelivered {
                order_id: order_id.to_string(),
                delivered_at,
                signature,
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn payment_processed(
        &self,
        user_id: &str,
        contact: Contact,
        order_id: &str,
        amount: f64,
        currency: &str,
        payment_method: &str,
        status: PaymentStatus,
        transaction_id: &str,
    ) -> String {
        self.raise(
            user_id,
            contact,
            BusinessEvent::PaymentProcessed {
                order_id: order_id.to_string(),
                amount,
                currency: currency.to_string(),
                payment_method: payment_method.to_string(),
                status,
                transaction_id: transaction_id.to_string(),
            },
        )
    }

    pub fn password_reset_requested(
        &self,
        user_id: &str,
        contact: Contact,
        reset_token: &str,
        expires_at: Timestamp,
    ) -> String {
        self.raise(
            user_id,
            contact,
            BusinessEvent::PasswordResetRequested {
                reset_token: reset_token.to_string(),
                expires_at,
            },
        )
    }

    pub fn password_reset_completed(&self, user_id: &str, contact: Contact, reset_at: Timestamp) -> String {
        self.raise(user_id, contact, BusinessEvent::PasswordResetCompleted { reset_at })
    }

    pub fn account_locked(
        &self,
        user_id: &str,
        contact: Contact,
        reason: &str,
        locked_at: Timestamp,
        unlock_at: Option<Timestamp>,
    ) -> String {
        self.raise(
            user_id,
            contact,
            BusinessEvent::AccountLocked {
                reason: reason.to_string(),
                locked_at,
                unlock_at,
            },
        )
    }

    pub fn account_unlocked(
        &self,
        user_id: &str,
        contact: Contact,
        unlocked_at: Timestamp,
        unlocked_by: &str,
    ) -> String {
        self.raise(
            user_id,
            contact,
            BusinessEvent::AccountUnlocked {
                unlocked_at,
                unlocked_by: unlocked_by.to_string(),
            },
        )
    }

    pub fn login_attempt(
        &self,
        user_id: &str,
        contact: Contact,
        success: bool,
        ip_address: &str,
        user_agent: &str,
        location: Option<GeoLocation>,
    ) -> String {
        self.raise(
            user_id,
            contact,
            BusinessEvent::LoginAttempt {
                success,
                ip_address: ip_address.to_string(),
                user_agent: user_agent.to_string(),
                location,
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn subscription_created(
        &self,
        user_id: &str,
        contact: Contact,
        subscription_id: &str,
        plan_id: &str,
        plan_name: &str,
        amount: f64,
        currency: &str,
        interval: BillingInterval,
        start_date: Timestamp,
        end_date: Timestamp,
    ) -> String {
        self.raise(
            user_id,
            contact,
            BusinessEvent::SubscriptionCreated {
                subscription_id: subscription_id.to_string(),
                plan_id: plan_id.to_string(),
                plan_name: plan_name.to_string(),
                amount,
                currency: currency.to_string(),
                interval,
                start_date,
                end_date,
            },
        )
    }

    pub fn subscription_cancelled(
        &self,
        user_id: &str,
        contact: Contact,
        subscription_id: &str,
        cancelled_at: Timestamp,
        reason: Option<String>,
        effective_date: Timestamp,
    ) -> String {
        self.raise(
            user_id,
            contact,
            BusinessEvent::SubscriptionCancelled {
                subscription_id: subscription_id.to_string(),
                cancelled_at,
                reason,
                effective_date,
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn subscription_renewed(
        &self,
        user_id: &str,
        contact: Contact,
        subscription_id: &str,
        renewed_at: Timestamp,
        next_billing_date: Timestamp,
        amount: f64,
        currency: &str,
    ) -> String {
        self.raise(
            user_id,
            contact,
            BusinessEvent::SubscriptionRenewed {
                subscription_id: subscription_id.to_string(),
                renewed_at,
                next_billing_date,
                amount,
                currency: currency.to_string(),
            },
        )
    }
}
