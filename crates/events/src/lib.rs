//! Notification dispatch for Courier.
//!
//! Business events are published on the [`EventBus`]; the [`TriggerEngine`]
//! turns them into notification requests and hands those to the
//! [`NotificationDispatcher`], which publishes lifecycle events back onto the
//! bus. The [`ListenerRegistry`] fans lifecycle events out to registered
//! listeners, each wrapped in a retry decorator.

pub mod bus;
pub mod delivery;
pub mod dispatcher;
pub mod emitter;
pub mod error;
pub mod listener;
pub mod listeners;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod triggers;

pub use bus::{BusEvent, EventBus};
pub use dispatcher::{NotificationDispatcher, SendReceipt, VerificationReceipt};
pub use emitter::BusinessEventEmitter;
pub use error::{DispatchError, ListenerError, ProviderError};
pub use listener::{EventProcessor, Listener, ListenerOptions, RetryableListener};
pub use provider::{NotificationProvider, ProviderReceipt, VerificationProvider};
pub use registry::{ListenerRegistry, ListenerStatus};
pub use retry::RetryPolicy;
pub use triggers::{EmitSummary, TriggerEngine};
