//! Storage seam for append-only streams with consumer groups.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::StoreError;
use crate::message::{Fields, StreamEntry};

/// Summary of one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub length: usize,
    pub last_generated_id: String,
    pub groups: usize,
    pub first_entry: Option<StreamEntry>,
    pub last_entry: Option<StreamEntry>,
}

/// Summary of one consumer group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub name: String,
    pub consumers: usize,
    /// Delivered but not yet acknowledged entries.
    pub pending: usize,
    pub last_delivered_id: String,
}

/// Pending entries of a consumer group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSummary {
    pub count: usize,
    pub lowest_id: Option<String>,
    pub highest_id: Option<String>,
    /// `(consumer, pending count)`, sorted by consumer name.
    pub consumers: Vec<(String, usize)>,
}

/// Append-only streams with consumer-group delivery.
///
/// A group starts at the end of its stream: it only sees entries appended
/// after it was created. Entries handed out by [`read_group`] stay pending
/// for the group until acknowledged.
///
/// [`read_group`]: StreamStore::read_group
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Append an entry, creating the stream if needed. Returns the entry id.
    async fn append(&self, stream: &str, fields: Fields) -> Result<String, StoreError>;

    /// Create `group` on `stream`, creating the stream if needed.
    ///
    /// Fails with [`StoreError::GroupExists`] if the group is already there.
    async fn create_group(&self, stream: &str, group: &str) -> Result<(), StoreError>;

    /// Claim up to `count` entries never delivered to `group`.
    ///
    /// Waits up to `block` for new entries when none are available. A zero
    /// `block` returns immediately.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, StoreError>;

    /// Acknowledge an entry. Returns `false` if it was not pending.
    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<bool, StoreError>;

    /// Look up a single entry by id.
    async fn entry(&self, stream: &str, id: &str) -> Result<Option<StreamEntry>, StoreError>;

    async fn stream_info(&self, stream: &str) -> Result<StreamInfo, StoreError>;

    async fn groups(&self, stream: &str) -> Result<Vec<GroupInfo>, StoreError>;

    async fn pending(&self, stream: &str, group: &str) -> Result<PendingSummary, StoreError>;

    /// Release the store. Later calls fail with [`StoreError::Closed`].
    async fn close(&self) -> Result<(), StoreError>;
}
