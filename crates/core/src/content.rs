//! Title and message rendering for trigger-built notifications.

use crate::domain_event::{BusinessEvent, DomainEvent};

/// Notification title for a business event.
pub fn render_title(event: &BusinessEvent) -> &'static str {
    match event {
        BusinessEvent::UserRegistered { .. } => "Welcome!",
        BusinessEvent::UserVerified { .. } => "Account Verified",
        BusinessEvent::OrderPlaced { .. } => "Order Confirmed",
        BusinessEvent::OrderShipped { .. } => "Order Shipped",
        BusinessEvent::OrderDelivered { .. } => "Order Delivered",
        BusinessEvent::PaymentProcessed { .. } => "Payment Processed",
        BusinessEvent::PasswordResetRequested { .. } => "Password Reset",
        BusinessEvent::PasswordResetCompleted { .. } => "Password Changed",
        BusinessEvent::AccountLocked { .. } => "Account Locked",
        BusinessEvent::AccountUnlocked { .. } => "Account Unlocked",
        BusinessEvent::LoginAttempt { .. } => "Login Attempt",
        BusinessEvent::SubscriptionCreated { .. } => "Subscription Activated",
        BusinessEvent::SubscriptionCancelled { .. } => "Subscription Cancelled",
        BusinessEvent::SubscriptionRenewed { .. } => "Subscription Renewed",
    }
}

/// Notification body for a business event.
pub fn render_message(event: &DomainEvent) -> String {
    match &event.event {
        BusinessEvent::UserRegistered { name, .. } => format!(
            "Hello {name}! Welcome to our platform. Your account has been created successfully."
        ),
        BusinessEvent::UserVerified { .. } => {
            "Your account has been verified! You now have full access to every feature.".to_string()
        }
        BusinessEvent::OrderPlaced {
            order_id,
            amount,
            currency,
            ..
        } => format!("Your order #{order_id} has been confirmed! Value: {currency} {amount:.2}"),
        BusinessEvent::OrderShipped {
            order_id,
            tracking_number,
            ..
        } => format!(
            "Your order #{order_id} has been shipped! Tracking number: {tracking_number}"
        ),
        BusinessEvent::OrderDelivered { order_id, .. } => {
            format!("Your order #{order_id} has been delivered successfully!")
        }
        BusinessEvent::PaymentProcessed {
            amount, currency, ..
        } => format!("Payment processed successfully! Value: {currency} {amount:.2}"),
        BusinessEvent::PasswordResetRequested { .. } => {
            "You requested a password reset. Check your email to continue.".to_string()
        }
        BusinessEvent::PasswordResetCompleted { .. } => {
            "Your password has been changed. If this was not you, contact support immediately."
                .to_string()
        }
        BusinessEvent::AccountLocked { reason, .. } => format!(
            "Your account has been locked for security reasons. Reason: {reason}"
        ),
        BusinessEvent::AccountUnlocked { .. } => {
            "Your account has been unlocked. You can sign in again.".to_string()
        }
        BusinessEvent::LoginAttempt {
            success,
            ip_address,
            ..
        } => {
            if *success {
                "Login successful.".to_string()
            } else {
                format!(
                    "Login attempt failed. IP: {ip_address}. If it was not you, change your password."
                )
            }
        }
        BusinessEvent::SubscriptionCreated {
            plan_name,
            amount,
            currency,
            interval,
            ..
        } => format!(
            "Subscription {plan_name} activated successfully! Value: {currency} {amount:.2}/{interval}"
        ),
        BusinessEvent::SubscriptionCancelled { effective_date, .. } => format!(
            "Your subscription has been cancelled. Effective date: {}",
            effective_date.format("%Y-%m-%d")
        ),
        BusinessEvent::SubscriptionRenewed {
            next_billing_date,
            amount,
            currency,
            ..
        } => format!(
            "Your subscription has been renewed for {currency} {amount:.2}. Next billing date: {}",
            next_billing_date.format("%Y-%m-%d")
        ),
    }
}
