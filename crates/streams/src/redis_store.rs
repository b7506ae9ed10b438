//! Redis Streams [`StreamStore`].
//!
//! | Operation     | Command                                  |
//! |---------------|------------------------------------------|
//! | `append`      | `XADD <stream> [MAXLEN ~ n] * ...`        |
//! | `create_group`| `XGROUP CREATE <stream> <group> $ MKSTREAM` |
//! | `read_group`  | `XREADGROUP GROUP ... STREAMS <stream> >` |
//! | `ack`         | `XACK`                                   |
//! | `entry`       | `XRANGE <stream> <id> <id>`              |
//! | `stream_info` | `XINFO STREAM`                           |
//! | `groups`      | `XINFO GROUPS`                           |
//! | `pending`     | `XPENDING <stream> <group>`              |

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, Value};

use crate::error::StoreError;
use crate::message::{Fields, StreamEntry};
use crate::store::{GroupInfo, PendingSummary, StreamInfo, StreamStore};

pub struct RedisStreamStore {
    connection: ConnectionManager,
    /// Blocking reads run here so they never hold up appends and acks.
    /// Concurrent subscriptions take turns on it.
    reader: ConnectionManager,
    /// Approximate entries kept per stream; unbounded when `None`.
    max_len: Option<usize>,
    closed: AtomicBool,
}

impl RedisStreamStore {
    /// Connect to `url` (`redis://[:password@]host:port[/db]`).
    pub async fn connect(url: &str, max_len: Option<usize>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(backend)?;
        let connection = client.get_connection_manager().await.map_err(backend)?;
        let reader = client.get_connection_manager().await.map_err(backend)?;
        tracing::info!(max_len = ?max_len, "Connected to Redis Streams");

        Ok(Self {
            connection,
            reader,
            max_len,
            closed: AtomicBool::new(false),
        })
    }

    fn open(&self) -> Result<ConnectionManager, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(self.connection.clone())
        }
    }
}

#[async_trait]
impl StreamStore for RedisStreamStore {
    async fn append(&self, stream: &str, fields: Fields) -> Result<String, StoreError> {
        let mut connection = self.open()?;
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream);
        if let Some(max_len) = self.max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*");
        for (field, value) in &fields {
            cmd.arg(field).arg(value);
        }

        let id: String = cmd.query_async(&mut connection).await.map_err(backend)?;
        Ok(id)
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<(), StoreError> {
        let mut connection = self.open()?;
        let result: Result<Value, RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut connection)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(classify(e, stream, group)),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        self.open()?;
        let mut reader = self.reader.clone();

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer).arg("COUNT").arg(count);
        // BLOCK 0 would wait forever.
        if !block.is_zero() {
            cmd.arg("BLOCK").arg(u64::try_from(block.as_millis()).unwrap_or(u64::MAX));
        }
        cmd.arg("STREAMS").arg(stream).arg(">");

        let reply: Value = cmd
            .query_async(&mut reader)
            .await
            .map_err(|e| classify(e, stream, group))?;
        parse_read_reply(&reply)
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<bool, StoreError> {
        let mut connection = self.open()?;
        let acked: i64 = redis::cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(id)
            .query_async(&mut connection)
            .await
            .map_err(|e| classify(e, stream, group))?;
        Ok(acked > 0)
    }

    async fn entry(&self, stream: &str, id: &str) -> Result<Option<StreamEntry>, StoreError> {
        let mut connection = self.open()?;
        let reply: Value = redis::cmd("XRANGE")
            .arg(stream)
            .arg(id)
            .arg(id)
            .query_async(&mut connection)
            .await
            .map_err(backend)?;
        Ok(parse_entries(&reply)?.into_iter().next())
    }

    async fn stream_info(&self, stream: &str) -> Result<StreamInfo, StoreError> {
        let mut connection = self.open()?;
        let reply: Value = redis::cmd("XINFO")
            .arg("STREAM")
            .arg(stream)
            .query_async(&mut connection)
            .await
            .map_err(|e| classify(e, stream, ""))?;
        parse_stream_info(&reply)
    }

    async fn groups(&self, stream: &str) -> Result<Vec<GroupInfo>, StoreError> {
        let mut connection = self.open()?;
        let reply: Value = redis::cmd("XINFO")
            .arg("GROUPS")
            .arg(stream)
            .query_async(&mut connection)
            .await
            .map_err(|e| classify(e, stream, ""))?;

        let mut groups = items(&reply)?
            .iter()
            .map(parse_group_info)
            .collect::<Result<Vec<_>, _>>()?;
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn pending(&self, stream: &str, group: &str) -> Result<PendingSummary, StoreError> {
        let mut connection = self.open()?;
        let reply: Value = redis::cmd("XPENDING")
            .arg(stream)
            .arg(group)
            .query_async(&mut connection)
            .await
            .map_err(|e| classify(e, stream, group))?;
        parse_pending(&reply)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        tracing::info!("Redis Streams store closed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

fn backend(e: RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn classify(e: RedisError, stream: &str, group: &str) -> StoreError {
    server_error(e.code(), e.detail(), stream, group).unwrap_or_else(|| backend(e))
}

/// Store errors for the server replies that have one.
fn server_error(code: Option<&str>, detail: Option<&str>, stream: &str, group: &str) -> Option<StoreError> {
    match code {
        Some("BUSYGROUP") => Some(StoreError::GroupExists {
            stream: stream.to_string(),
            group: group.to_string(),
        }),
        Some("NOGROUP") => Some(StoreError::NoSuchGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        }),
        _ if detail.is_some_and(|d| d.contains("no such key")) => Some(StoreError::NoSuchStream(stream.to_string())),
        _ => None,
    }
}

fn unexpected(what: &str, value: &Value) -> StoreError {
    StoreError::Backend(format!("unexpected {what} reply: {value:?}"))
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

fn string(value: &Value) -> Result<String, StoreError> {
    redis::from_redis_value(value).map_err(backend)
}

fn number(value: &Value) -> Result<usize, StoreError> {
    redis::from_redis_value(value).map_err(backend)
}

/// Array items; nil reads as empty.
fn items(value: &Value) -> Result<&[Value], StoreError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Nil => Ok(&[]),
        other => Err(unexpected("array", other)),
    }
}

/// Flat `key value key value ...` reply, or a RESP3 map.
fn pairs(value: &Value) -> Result<Vec<(String, &Value)>, StoreError> {
    if let Value::Map(map) = value {
        return map.iter().map(|(k, v)| Ok((string(k)?, v))).collect();
    }
    items(value)?
        .chunks(2)
        .map(|pair| match pair {
            [key, value] => Ok((string(key)?, value)),
            _ => Err(unexpected("key/value", value)),
        })
        .collect()
}

fn field<'a>(pairs: &'a [(String, &'a Value)], key: &str) -> Option<&'a Value> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
}

/// `[id, [field, value, ...]]`.
fn parse_entry(value: &Value) -> Result<StreamEntry, StoreError> {
    match items(value)? {
        [id, fields] => Ok(StreamEntry {
            id: string(id)?,
            fields: pairs(fields)?
                .into_iter()
                .map(|(k, v)| Ok((k, string(v)?)))
                .collect::<Result<_, StoreError>>()?,
        }),
        _ => Err(unexpected("entry", value)),
    }
}

fn parse_entries(value: &Value) -> Result<Vec<StreamEntry>, StoreError> {
    items(value)?.iter().map(parse_entry).collect()
}

/// `[[stream, [entry, ...]], ...]`, or nil when the read timed out.
fn parse_read_reply(value: &Value) -> Result<Vec<StreamEntry>, StoreError> {
    let mut entries = Vec::new();
    for stream in items(value)? {
        match items(stream)? {
            [_, stream_entries] => entries.extend(parse_entries(stream_entries)?),
            _ => return Err(unexpected("XREADGROUP", value)),
        }
    }
    Ok(entries)
}

fn optional_entry(value: Option<&Value>) -> Result<Option<StreamEntry>, StoreError> {
    match value {
        None | Some(Value::Nil) => Ok(None),
        Some(value) => parse_entry(value).map(Some),
    }
}

fn parse_stream_info(value: &Value) -> Result<StreamInfo, StoreError> {
    let info = pairs(value)?;
    let required = |key: &str| field(&info, key).ok_or_else(|| unexpected(key, value));

    Ok(StreamInfo {
        length: number(required("length")?)?,
        last_generated_id: string(required("last-generated-id")?)?,
        groups: number(required("groups")?)?,
        first_entry: optional_entry(field(&info, "first-entry"))?,
        last_entry: optional_entry(field(&info, "last-entry"))?,
    })
}

fn parse_group_info(value: &Value) -> Result<GroupInfo, StoreError> {
    let info = pairs(value)?;
    let required = |key: &str| field(&info, key).ok_or_else(|| unexpected(key, value));

    Ok(GroupInfo {
        name: string(required("name")?)?,
        consumers: number(required("consumers")?)?,
        pending: number(required("pending")?)?,
        last_delivered_id: string(required("last-delivered-id")?)?,
    })
}

/// `[count, lowest, highest, [[consumer, count], ...]]`.
fn parse_pending(value: &Value) -> Result<PendingSummary, StoreError> {
    let [count, lowest, highest, consumers] = items(value)? else {
        return Err(unexpected("XPENDING", value));
    };
    let optional = |value: &Value| match value {
        Value::Nil => Ok(None),
        value => string(value).map(Some),
    };

    let mut per_consumer = items(consumers)?
        .iter()
        .map(|consumer| match items(consumer)? {
            [name, count] => Ok((string(name)?, number(count)?)),
            _ => Err(unexpected("XPENDING consumer", consumer)),
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
    per_consumer.sort();

    Ok(PendingSummary {
        count: number(count)?,
        lowest_id: optional(lowest)?,
        highest_id: optional(highest)?,
        consumers: per_consumer,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
