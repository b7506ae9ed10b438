//! Durable message streams with consumer groups.
//!
//! [`StreamBroker`] publishes JSON payloads to named streams and runs
//! consumer-group subscriptions over any [`StreamStore`]. Failed messages
//! are routed to a `<stream>:dead-letter` stream. [`RedisStreamStore`] keeps
//! streams in Redis; [`MemoryStreamStore`] is the in-process store.

pub mod broker;
pub mod error;
pub mod memory;
pub mod message;
pub mod redis_store;
pub mod store;

pub use broker::{handler_fn, HandlerError, MessageHandler, StreamBroker, SubscribeOptions};
pub use error::{StoreError, StreamError};
pub use memory::MemoryStreamStore;
pub use message::{StreamEntry, StreamMessage};
pub use redis_store::RedisStreamStore;
pub use store::{GroupInfo, PendingSummary, StreamInfo, StreamStore};
