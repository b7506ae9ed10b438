//! Stream entry wire format.
//!
//! Entries are flat, ordered field lists:
//!
//! | Field       | Value                               |
//! |-------------|-------------------------------------|
//! | `id`        | producer-side id `<epoch-ms>-<rnd>` |
//! | `eventType` | event type string                   |
//! | `data`      | JSON-encoded payload                |
//! | `timestamp` | epoch milliseconds                  |
//! | `metadata`  | JSON-encoded object                 |
//!
//! Dead-letter entries prepend `originalStream`, `originalGroup`,
//! `originalMessageId`, `error` and `timestamp` to the original fields.

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StreamError;

pub const FIELD_ID: &str = "id";
pub const FIELD_EVENT_TYPE: &str = "eventType";
pub const FIELD_DATA: &str = "data";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_METADATA: &str = "metadata";

/// Suffix appended to a stream name to form its dead-letter stream.
pub const DEAD_LETTER_SUFFIX: &str = ":dead-letter";

/// Ordered `(field, value)` pairs of one entry.
pub type Fields = Vec<(String, String)>;

/// An entry as stored, under its store-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamEntry {
    pub id: String,
    pub fields: Fields,
}

impl StreamEntry {
    /// First value stored under `key`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A decoded entry handed to subscription handlers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMessage {
    /// Store-assigned entry id; this is what gets acknowledged.
    pub id: String,
    /// Producer-side id from the `id` field. Falls back to the entry id.
    pub source_id: String,
    pub event_type: String,
    pub data: serde_json::Value,
    /// Epoch milliseconds at publish time.
    pub timestamp: i64,
    pub metadata: serde_json::Value,
}

impl StreamMessage {
    pub fn decode(entry: &StreamEntry) -> Result<Self, StreamError> {
        let malformed = |reason: String| StreamError::Malformed {
            id: entry.id.clone(),
            reason,
        };
        let required = |key: &'static str| {
            entry
                .field(key)
                .ok_or_else(|| malformed(format!("missing field {key}")))
        };

        let event_type = required(FIELD_EVENT_TYPE)?.to_string();
        let data = serde_json::from_str(required(FIELD_DATA)?)
            .map_err(|e| malformed(format!("data is not JSON: {e}")))?;
        let timestamp = required(FIELD_TIMESTAMP)?
            .parse()
            .map_err(|_| malformed("timestamp is not an integer".into()))?;
        let metadata = match entry.field(FIELD_METADATA) {
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| malformed(format!("metadata is not JSON: {e}")))?,
            None => serde_json::Value::Object(Default::default()),
        };

        Ok(Self {
            id: entry.id.clone(),
            source_id: entry.field(FIELD_ID).unwrap_or(&entry.id).to_string(),
            event_type,
            data,
            timestamp,
            metadata,
        })
    }

    /// Deserialize the payload into a typed value.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, StreamError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Build the wire fields for a new entry.
pub fn encode_fields(
    event_type: &str,
    data: &serde_json::Value,
    metadata: Option<&serde_json::Value>,
    timestamp_ms: i64,
) -> Fields {
    let metadata = metadata
        .cloned()
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

    vec![
        (FIELD_ID.into(), generate_source_id(timestamp_ms)),
        (FIELD_EVENT_TYPE.into(), event_type.into()),
        (FIELD_DATA.into(), data.to_string()),
        (FIELD_TIMESTAMP.into(), timestamp_ms.to_string()),
        (FIELD_METADATA.into(), metadata.to_string()),
    ]
}

/// Fields of the dead-letter copy of `entry`.
pub fn dead_letter_fields(
    stream: &str,
    group: &str,
    entry: &StreamEntry,
    error: &str,
    timestamp_ms: i64,
) -> Fields {
    let mut fields: Fields = vec![
        ("originalStream".into(), stream.into()),
        ("originalGroup".into(), group.into()),
        ("originalMessageId".into(), entry.id.clone()),
        ("error".into(), error.into()),
        (FIELD_TIMESTAMP.into(), timestamp_ms.to_string()),
    ];
    fields.extend(entry.fields.iter().cloned());
    fields
}

pub fn dead_letter_stream(stream: &str) -> String {
    format!("{stream}{DEAD_LETTER_SUFFIX}")
}

/// `<epoch-ms>-<base36 suffix>`.
fn generate_source_id(timestamp_ms: i64) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    let suffix: String = (0..11)
        .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
        .collect();
    format!("{timestamp_ms}-{suffix}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
