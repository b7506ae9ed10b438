//! Delivery provider seams.
//!
//! The dispatcher talks to channel vendors only through these traits, so
//! tests and alternative vendors can be swapped in without touching the
//! dispatch logic.

use async_trait::async_trait;
use courier_core::{Channel, NotificationRequest};

use crate::error::ProviderError;

/// What a provider reports back for an accepted message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderReceipt {
    /// Vendor-side message id, when the vendor returns one.
    pub message_id: Option<String>,
}

/// Sends notifications over one channel.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// Vendor name recorded on `Sent` lifecycle events.
    fn name(&self) -> &str;

    fn channel(&self) -> Channel;

    async fn send(&self, request: &NotificationRequest) -> Result<ProviderReceipt, ProviderError>;
}

/// One-time-code verification of phone numbers.
#[async_trait]
pub trait VerificationProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Send a code to `phone_number`. Returns the vendor status, e.g. `pending`.
    async fn send_code(&self, phone_number: &str) -> Result<String, ProviderError>;

    /// `true` when `code` is valid for `phone_number`.
    async fn check_code(&self, phone_number: &str, code: &str) -> Result<bool, ProviderError>;
}
