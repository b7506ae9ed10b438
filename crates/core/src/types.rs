/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Milliseconds since the Unix epoch for the current wall-clock time.
pub fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
