//! Courier core domain types.
//!
//! Pure, I/O-free building blocks shared by every other crate:
//!
//! - [`DomainEvent`]: the closed set of business events producers raise.
//! - [`LifecycleEvent`]: outcome of a single notification dispatch attempt.
//! - [`NotificationRequest`]: what the dispatcher validates and sends.
//! - [`NotificationTrigger`] / [`TriggerTable`]: static rules mapping
//!   business events to notifications.
//! - [`error`]: validation and configuration errors.

pub mod channels;
pub mod content;
pub mod domain_event;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod request;
pub mod trigger;
pub mod types;

pub use channels::{Channel, NotificationType};
pub use domain_event::{BusinessEvent, Contact, DomainEvent, EventType};
pub use error::{ConfigError, CoreError, ValidationError};
pub use lifecycle::{LifecycleEvent, LifecycleKind};
pub use request::NotificationRequest;
pub use trigger::{NotificationTrigger, TriggerConditions, TriggerTable};
pub use types::Timestamp;
