//! Built-in lifecycle listeners.

pub mod logger;
pub mod metrics;

pub use logger::{logger_listener, NotificationLogger, NOTIFICATION_LOGGER};
pub use metrics::{metrics_listener, MetricsSnapshot, NotificationMetrics, NOTIFICATION_METRICS};
