//! Publish/consume broker over a [`StreamStore`].
//!
//! [`StreamBroker`] appends JSON payloads to named streams and drains them
//! through consumer groups. Each subscription runs its own polling task
//! keyed by `stream:group:consumer`: wait the poll interval, block-read a
//! batch, run the handler on each message. Handled messages are
//! acknowledged. Messages whose handler fails, or that cannot be decoded,
//! are copied to `<stream>:dead-letter` and left unacknowledged. Read errors
//! are logged and the loop keeps polling.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{StoreError, StreamError};
use crate::message::{
    dead_letter_fields, dead_letter_stream, encode_fields, StreamEntry, StreamMessage,
};
use crate::store::{GroupInfo, PendingSummary, StreamInfo, StreamStore};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_BLOCK: Duration = Duration::from_millis(5000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long shutdown waits for each subscription task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes messages delivered to a subscription.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: StreamMessage) -> Result<(), HandlerError>;
}

/// Handler backed by an async closure. See [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(StreamMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(StreamMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, message: StreamMessage) -> Result<(), HandlerError> {
        (self.f)(message).await
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Maximum messages per read.
    pub batch_size: usize,
    /// How long one read waits for new messages.
    pub block: Duration,
    /// Pause before each read.
    pub poll_interval: Duration,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            block: DEFAULT_BLOCK,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamBroker
// ---------------------------------------------------------------------------

struct Subscription {
    task_handle: JoinHandle<()>,
    /// Child of the broker's master token.
    cancel: CancellationToken,
}

pub struct StreamBroker {
    store: Arc<dyn StreamStore>,
    subscriptions: RwLock<HashMap<String, Subscription>>,
    /// Cancelled during shutdown.
    cancel: CancellationToken,
}

impl StreamBroker {
    pub fn new(store: Arc<dyn StreamStore>) -> Self {
        Self {
            store,
            subscriptions: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Append a message to `stream`. Returns the store-assigned entry id.
    pub async fn publish(
        &self,
        stream: &str,
        event_type: &str,
        data: &serde_json::Value,
        metadata: Option<&serde_json::Value>,
    ) -> Result<String, StreamError> {
        let fields = encode_fields(event_type, data, metadata, now_ms());

        match self.store.append(stream, fields).await {
            Ok(id) => {
                tracing::info!(stream, event_type, id = %id, "Published message to stream");
                Ok(id)
            }
            Err(source) => {
                tracing::error!(stream, event_type, error = %source, "Failed to publish message to stream");
                Err(StreamError::Publish {
                    stream: stream.to_string(),
                    event_type: event_type.to_string(),
                    source,
                })
            }
        }
    }

    /// Create `group` on `stream`. An existing group counts as success.
    pub async fn create_consumer_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
        match self.store.create_group(stream, group).await {
            Ok(()) => {
                tracing::info!(stream, group, "Consumer group created");
                Ok(())
            }
            Err(StoreError::GroupExists { .. }) => {
                tracing::info!(stream, group, "Consumer group already exists");
                Ok(())
            }
            Err(source) => {
                tracing::error!(stream, group, error = %source, "Failed to create consumer group");
                Err(StreamError::Group {
                    stream: stream.to_string(),
                    group: group.to_string(),
                    source,
                })
            }
        }
    }

    /// Start consuming `stream` as `consumer` in `group`.
    ///
    /// Ensures the group exists, then spawns the polling task. Subscribing
    /// again with the same stream, group and consumer replaces the earlier
    /// subscription.
    pub async fn subscribe(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        handler: Arc<dyn MessageHandler>,
        options: SubscribeOptions,
    ) -> Result<(), StreamError> {
        self.create_consumer_group(stream, group).await?;

        let key = subscription_key(stream, group, consumer);
        let cancel = self.cancel.child_token();
        let worker = Consumer {
            store: Arc::clone(&self.store),
            stream: stream.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            handler,
            options,
        };
        let task_cancel = cancel.clone();
        let task_handle = tokio::spawn(async move { worker.run(task_cancel).await });

        let previous = self.subscriptions.write().await.insert(
            key.clone(),
            Subscription {
                task_handle,
                cancel,
            },
        );
        if let Some(previous) = previous {
            tracing::warn!(subscription = %key, "Replacing existing subscription");
            stop(&key, previous).await;
        }

        tracing::info!(subscription = %key, batch_size = options.batch_size, "Subscribed to stream");
        Ok(())
    }

    /// Stop one subscription. Returns `false` if there was none.
    pub async fn unsubscribe(&self, stream: &str, group: &str, consumer: &str) -> bool {
        let key = subscription_key(stream, group, consumer);
        let removed = self.subscriptions.write().await.remove(&key);
        match removed {
            Some(subscription) => {
                stop(&key, subscription).await;
                true
            }
            None => false,
        }
    }

    /// Keys of the running subscriptions, sorted.
    pub async fn subscriptions(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.subscriptions.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Stop every subscription, then close the store.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down stream broker");
        self.cancel.cancel();

        let mut subscriptions = self.subscriptions.write().await;
        for (key, subscription) in subscriptions.drain() {
            stop(&key, subscription).await;
        }
        drop(subscriptions);

        match self.store.close().await {
            Ok(()) => tracing::info!("Stream store closed"),
            Err(e) => tracing::error!(error = %e, "Failed to close stream store"),
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub async fn stream_info(&self, stream: &str) -> Result<StreamInfo, StreamError> {
        Ok(self.store.stream_info(stream).await?)
    }

    /// `None` if the stream has no such group.
    pub async fn consumer_group_info(
        &self,
        stream: &str,
        group: &str,
    ) -> Result<Option<GroupInfo>, StreamError> {
        let groups = self.store.groups(stream).await?;
        Ok(groups.into_iter().find(|g| g.name == group))
    }

    pub async fn pending_summary(&self, stream: &str, group: &str) -> Result<PendingSummary, StreamError> {
        Ok(self.store.pending(stream, group).await?)
    }

    pub async fn pending_count(&self, stream: &str, group: &str) -> Result<usize, StreamError> {
        Ok(self.pending_summary(stream, group).await?.count)
    }
}

fn subscription_key(stream: &str, group: &str, consumer: &str) -> String {
    format!("{stream}:{group}:{consumer}")
}

/// Cancel the task and join it, aborting it if it overruns the timeout.
async fn stop(key: &str, subscription: Subscription) {
    subscription.cancel.cancel();
    let mut task_handle = subscription.task_handle;
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task_handle)
        .await
        .is_err()
    {
        tracing::warn!(subscription = %key, "Subscription task did not stop in time, aborting");
        task_handle.abort();
        if let Err(e) = task_handle.await {
            if !e.is_cancelled() {
                tracing::error!(subscription = %key, error = %e, "Subscription task failed");
            }
        }
    }
    tracing::info!(subscription = %key, "Stopped polling");
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// State of one subscription's polling task.
struct Consumer {
    store: Arc<dyn StreamStore>,
    stream: String,
    group: String,
    consumer: String,
    handler: Arc<dyn MessageHandler>,
    options: SubscribeOptions,
}

impl Consumer {
    async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }

            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = self.store.read_group(
                    &self.stream,
                    &self.group,
                    &self.consumer,
                    self.options.batch_size,
                    self.options.block,
                ) => read,
            };

            match read {
                Ok(entries) => {
                    for entry in entries {
                        // Unprocessed entries stay pending for redelivery.
                        if cancel.is_cancelled() {
                            break;
                        }
                        self.process(entry).await;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        stream = %self.stream,
                        group = %self.group,
                        error = %e,
                        "Error polling stream"
                    );
                }
            }
        }

        tracing::debug!(stream = %self.stream, consumer = %self.consumer, "Polling loop exited");
    }

    async fn process(&self, entry: StreamEntry) {
        let message = match StreamMessage::decode(&entry) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(stream = %self.stream, id = %entry.id, error = %e, "Malformed stream entry");
                self.dead_letter(&entry, &e.to_string()).await;
                return;
            }
        };

        match self.handler.handle(message).await {
            Ok(()) => match self.store.ack(&self.stream, &self.group, &entry.id).await {
                Ok(_) => tracing::debug!(stream = %self.stream, id = %entry.id, "Acked message"),
                Err(e) => {
                    tracing::error!(stream = %self.stream, id = %entry.id, error = %e, "Failed to ack message");
                }
            },
            Err(e) => {
                tracing::error!(stream = %self.stream, id = %entry.id, error = %e, "Handler failed for message");
                self.dead_letter(&entry, &e.to_string()).await;
            }
        }
    }

    async fn dead_letter(&self, entry: &StreamEntry, error: &str) {
        let target = dead_letter_stream(&self.stream);
        let fields = dead_letter_fields(&self.stream, &self.group, entry, error, now_ms());

        match self.store.append(&target, fields).await {
            Ok(_) => tracing::info!(id = %entry.id, dead_letter = %target, "Moved message to dead-letter stream"),
            Err(e) => tracing::error!(id = %entry.id, error = %e, "Dead letter failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
