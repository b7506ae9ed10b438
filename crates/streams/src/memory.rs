//! In-process [`StreamStore`].
//!
//! Entry ids follow the `<epoch-ms>-<seq>` scheme and are strictly
//! increasing per stream, even if the wall clock steps backwards. Blocking
//! reads park on a [`Notify`] that every append wakes. With a maximum
//! length set, appends trim the oldest entries and drop them from every
//! group's pending list.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::message::{Fields, StreamEntry};
use crate::store::{GroupInfo, PendingSummary, StreamInfo, StreamStore};

/// Parsed entry id, ordered like the string form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct EntryId {
    ms: u64,
    seq: u64,
}

impl EntryId {
    fn parse(id: &str) -> Option<Self> {
        let (ms, seq) = id.split_once('-')?;
        Some(Self {
            ms: ms.parse().ok()?,
            seq: seq.parse().ok()?,
        })
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// Consumer an entry was delivered to.
#[derive(Debug)]
struct PendingEntry {
    consumer: String,
}

#[derive(Debug, Default)]
struct GroupState {
    last_delivered: EntryId,
    pending: BTreeMap<EntryId, PendingEntry>,
    consumers: HashSet<String>,
}

#[derive(Debug, Default)]
struct StreamData {
    entries: BTreeMap<EntryId, Fields>,
    last_id: EntryId,
    groups: HashMap<String, GroupState>,
}

impl StreamData {
    fn next_id(&mut self, now_ms: u64) -> EntryId {
        let id = if now_ms > self.last_id.ms {
            EntryId { ms: now_ms, seq: 0 }
        } else {
            EntryId {
                ms: self.last_id.ms,
                seq: self.last_id.seq + 1,
            }
        };
        self.last_id = id;
        id
    }

    /// Drop the oldest entries until at most `max_len` remain.
    fn trim(&mut self, max_len: usize) -> usize {
        let mut removed = 0;
        while self.entries.len() > max_len {
            let Some((id, _)) = self.entries.pop_first() else {
                break;
            };
            for group in self.groups.values_mut() {
                group.pending.remove(&id);
            }
            removed += 1;
        }
        removed
    }

    fn entry(&self, id: EntryId) -> Option<StreamEntry> {
        self.entries.get(&id).map(|fields| StreamEntry {
            id: id.to_string(),
            fields: fields.clone(),
        })
    }
}

#[derive(Debug, Default)]
struct StoreState {
    streams: HashMap<String, StreamData>,
    closed: bool,
}

impl StoreState {
    fn open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn stream(&self, stream: &str) -> Result<&StreamData, StoreError> {
        self.open()?;
        self.streams
            .get(stream)
            .ok_or_else(|| StoreError::NoSuchStream(stream.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStreamStore {
    state: Mutex<StoreState>,
    appended: Notify,
    /// Entries kept per stream; unbounded when `None`.
    max_len: Option<usize>,
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that keeps at most `max_len` entries per stream.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand out up to `count` new entries, or `None` if there are none yet.
    fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Option<Vec<StreamEntry>>, StoreError> {
        let mut state = self.lock();
        state.open()?;

        let no_group = || StoreError::NoSuchGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        };
        let data = state.streams.get_mut(stream).ok_or_else(no_group)?;
        let StreamData {
            entries, groups, ..
        } = data;
        let group_state = groups.get_mut(group).ok_or_else(no_group)?;
        group_state.consumers.insert(consumer.to_string());

        let start = EntryId {
            ms: group_state.last_delivered.ms,
            seq: group_state.last_delivered.seq.saturating_add(1),
        };
        let claimed: Vec<StreamEntry> = entries
            .range(start..)
            .take(count)
            .map(|(id, fields)| StreamEntry {
                id: id.to_string(),
                fields: fields.clone(),
            })
            .collect();

        if claimed.is_empty() {
            return Ok(None);
        }

        for entry in &claimed {
            if let Some(id) = EntryId::parse(&entry.id) {
                group_state.last_delivered = id;
                group_state.pending.insert(
                    id,
                    PendingEntry {
                        consumer: consumer.to_string(),
                    },
                );
            }
        }
        Ok(Some(claimed))
    }
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn append(&self, stream: &str, fields: Fields) -> Result<String, StoreError> {
        let id = {
            let mut state = self.lock();
            state.open()?;
            let now_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
            let data = state.streams.entry(stream.to_string()).or_default();
            let id = data.next_id(now_ms);
            data.entries.insert(id, fields);
            if let Some(max_len) = self.max_len {
                let removed = data.trim(max_len);
                if removed > 0 {
                    tracing::debug!(stream, removed, "Trimmed stream");
                }
            }
            id
        };
        self.appended.notify_waiters();
        Ok(id.to_string())
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.open()?;
        let data = state.streams.entry(stream.to_string()).or_default();
        if data.groups.contains_key(group) {
            return Err(StoreError::GroupExists {
                stream: stream.to_string(),
                group: group.to_string(),
            });
        }
        let last_delivered = data.last_id;
        data.groups.insert(
            group.to_string(),
            GroupState {
                last_delivered,
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let deadline = Instant::now() + block;

        loop {
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(entries) = self.claim(stream, group, consumer, count)? {
                return Ok(entries);
            }
            if block.is_zero() {
                return Ok(Vec::new());
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<bool, StoreError> {
        let mut state = self.lock();
        state.open()?;
        let Some(entry_id) = EntryId::parse(id) else {
            return Ok(false);
        };
        let group_state = state
            .streams
            .get_mut(stream)
            .and_then(|data| data.groups.get_mut(group))
            .ok_or_else(|| StoreError::NoSuchGroup {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;
        Ok(group_state.pending.remove(&entry_id).is_some())
    }

    async fn entry(&self, stream: &str, id: &str) -> Result<Option<StreamEntry>, StoreError> {
        let state = self.lock();
        let data = state.stream(stream)?;
        Ok(EntryId::parse(id).and_then(|id| data.entry(id)))
    }

    async fn stream_info(&self, stream: &str) -> Result<StreamInfo, StoreError> {
        let state = self.lock();
        let data = state.stream(stream)?;
        Ok(StreamInfo {
            length: data.entries.len(),
            last_generated_id: data.last_id.to_string(),
            groups: data.groups.len(),
            first_entry: data.entries.keys().next().and_then(|id| data.entry(*id)),
            last_entry: data.entries.keys().next_back().and_then(|id| data.entry(*id)),
        })
    }

    async fn groups(&self, stream: &str) -> Result<Vec<GroupInfo>, StoreError> {
        let state = self.lock();
        let data = state.stream(stream)?;
        let mut groups: Vec<GroupInfo> = data
            .groups
            .iter()
            .map(|(name, group)| GroupInfo {
                name: name.clone(),
                consumers: group.consumers.len(),
                pending: group.pending.len(),
                last_delivered_id: group.last_delivered.to_string(),
            })
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn pending(&self, stream: &str, group: &str) -> Result<PendingSummary, StoreError> {
        let state = self.lock();
        let group_state = state
            .stream(stream)?
            .groups
            .get(group)
            .ok_or_else(|| StoreError::NoSuchGroup {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;

        let mut per_consumer: BTreeMap<&str, usize> = BTreeMap::new();
        for pending in group_state.pending.values() {
            *per_consumer.entry(pending.consumer.as_str()).or_default() += 1;
        }

        Ok(PendingSummary {
            count: group_state.pending.len(),
            lowest_id: group_state.pending.keys().next().map(ToString::to_string),
            highest_id: group_state.pending.keys().next_back().map(ToString::to_string),
            consumers: per_consumer
                .into_iter()
                .map(|(consumer, count)| (consumer.to_string(), count))
                .collect(),
        })
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.lock().closed = true;
        self.appended.notify_waiters();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
