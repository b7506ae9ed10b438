//! Identifier generation.
//!
//! Ids embed the epoch-millisecond timestamp followed by a random
//! alphanumeric suffix, so they sort roughly by creation time and are
//! unique per call.

use rand::Rng;

use crate::types::epoch_millis;

/// Length of the random suffix appended to generated ids.
const SUFFIX_LENGTH: usize = 9;

fn random_suffix() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(SUFFIX_LENGTH)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Business event id: `event_<epoch-ms>_<suffix>`.
pub fn generate_event_id() -> String {
    format!("event_{}_{}", epoch_millis(), random_suffix())
}

/// Notification id: `notif_<epoch-ms>_<suffix>`.
///
/// Correlates the Queued, Sent and Failed lifecycle events of one attempt.
pub fn generate_notification_id() -> String {
    format!("notif_{}_{}", epoch_millis(), random_suffix())
}

/// Correlation id returned to producers: `<eventType>.<epoch-ms>`.
pub fn correlation_id(event_type: &str) -> String {
    format!("{event_type}.{}", epoch_millis())
}
