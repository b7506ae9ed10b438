//! Stream errors.

/// Failure inside a [`StreamStore`](crate::store::StreamStore) backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Stream {0} does not exist")]
    NoSuchStream(String),

    #[error("Consumer group {group} already exists on stream {stream}")]
    GroupExists { stream: String, group: String },

    #[error("Consumer group {group} does not exist on stream {stream}")]
    NoSuchGroup { stream: String, group: String },

    #[error("Stream store is closed")]
    Closed,

    #[error("Stream store error: {0}")]
    Backend(String),
}

/// Failure of a [`StreamBroker`](crate::broker::StreamBroker) operation.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Failed to publish {event_type} to stream {stream}: {source}")]
    Publish {
        stream: String,
        event_type: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to create consumer group {group} on stream {stream}: {source}")]
    Group {
        stream: String,
        group: String,
        #[source]
        source: StoreError,
    },

    /// An entry is missing a wire field or carries undecodable JSON.
    #[error("Malformed stream entry {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
