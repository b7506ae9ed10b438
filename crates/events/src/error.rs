//! Error types for dispatch, delivery providers and listeners.

use std::time::Duration;

use courier_core::error::ValidationError;
use courier_core::Channel;

/// A channel provider failed to deliver a notification.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Network, DNS or TLS failure talking to the provider.
    #[error("Provider transport error: {0}")]
    Transport(String),

    /// The provider answered but refused the message.
    #[error("Provider rejected the request with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// A recipient or sender address could not be used.
    #[error("Invalid address: {0}")]
    Address(String),

    /// The outgoing message could not be assembled.
    #[error("Message build error: {0}")]
    Build(String),

    #[error("Unsupported channel: {0}")]
    UnsupportedChannel(Channel),

    /// The provider call did not complete within the configured timeout.
    #[error("Provider call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("{0} provider is not configured")]
    NotConfigured(&'static str),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for ProviderError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

impl From<lettre::address::AddressError> for ProviderError {
    fn from(err: lettre::address::AddressError) -> Self {
        ProviderError::Address(err.to_string())
    }
}

/// Failure of a dispatcher operation.
///
/// Validation failures happen before any lifecycle event is emitted;
/// provider failures happen after `Queued` and are reported as `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to send notification {notification_id}: {source}")]
    Provider {
        notification_id: String,
        #[source]
        source: ProviderError,
    },
}

impl DispatchError {
    pub fn notification_id(&self) -> Option<&str> {
        match self {
            DispatchError::Validation(_) => None,
            DispatchError::Provider {
                notification_id, ..
            } => Some(notification_id),
        }
    }
}

/// A listener failed to process an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Listener {listener} failed to process {event_type}: {reason}")]
pub struct ListenerError {
    pub listener: String,
    pub event_type: String,
    pub reason: String,
}

impl ListenerError {
    pub fn new(
        listener: impl Into<String>,
        event_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            listener: listener.into(),
            event_type: event_type.into(),
            reason: reason.into(),
        }
    }
}
