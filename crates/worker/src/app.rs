//! Component wiring and lifecycle of the notification worker.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use courier_cache::Cache;
use courier_core::{DomainEvent, TriggerTable};
use courier_events::delivery::{SmtpEmailProvider, TwilioSmsProvider};
use courier_events::listeners::{logger_listener, metrics_listener, MetricsSnapshot, NotificationMetrics};
use courier_events::{
    BusinessEventEmitter, EventBus, ListenerRegistry, NotificationDispatcher, NotificationProvider,
    TriggerEngine, VerificationProvider,
};
use courier_streams::{
    HandlerError, MemoryStreamStore, MessageHandler, RedisStreamStore, StreamBroker, StreamMessage,
    StreamStore, SubscribeOptions,
};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{StreamBackend, WorkerConfig};

/// How long shutdown waits for each background task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Delivery vendors handed to the dispatcher.
#[derive(Default)]
pub struct Providers {
    pub notification: Vec<Arc<dyn NotificationProvider>>,
    pub verifier: Option<Arc<dyn VerificationProvider>>,
}

impl Providers {
    /// Build the SMTP and Twilio providers for whichever credentials are set.
    pub fn from_config(config: &WorkerConfig) -> anyhow::Result<Self> {
        let mut providers = Self::default();

        if let Some(email) = &config.email {
            let smtp = SmtpEmailProvider::new(email.clone()).context("Failed to build SMTP provider")?;
            providers.notification.push(Arc::new(smtp));
        }

        if let Some(sms) = &config.sms {
            let has_verify = sms.verify_service_sid.is_some();
            let twilio =
                Arc::new(TwilioSmsProvider::new(sms.clone()).context("Failed to build Twilio provider")?);
            providers.notification.push(twilio.clone());
            if has_verify {
                providers.verifier = Some(twilio);
            }
        }

        Ok(providers)
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// Every long-lived component of the worker.
///
/// [`App::start`] spawns the background tasks; [`App::shutdown`] stops them
/// in dependency order: stream intake first, then the trigger engine (which
/// drains its in-flight events), then listeners and the cache sweeper.
pub struct App {
    config: WorkerConfig,
    bus: Arc<EventBus>,
    cache: Arc<Cache<serde_json::Value>>,
    dispatcher: Arc<NotificationDispatcher>,
    engine: Arc<TriggerEngine>,
    registry: Arc<ListenerRegistry>,
    metrics: Arc<NotificationMetrics>,
    broker: Arc<StreamBroker>,
    /// Stops the trigger engine.
    engine_cancel: CancellationToken,
    /// Stops listeners and the cache sweeper.
    cancel: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl App {
    /// Wire the production components: real providers and the configured
    /// stream store.
    pub async fn build(config: WorkerConfig) -> anyhow::Result<Self> {
        let providers = Providers::from_config(&config)?;
        let store = connect_store(&config).await?;
        Self::new(config, providers, store).await
    }

    pub async fn new(
        config: WorkerConfig,
        providers: Providers,
        store: Arc<dyn StreamStore>,
    ) -> anyhow::Result<Self> {
        let table = load_trigger_table(&config)?;
        tracing::info!(triggers = table.len(), "Trigger table loaded");

        let bus = Arc::new(EventBus::default());
        let cache = Arc::new(Cache::new(config.cache));

        let mut dispatcher = NotificationDispatcher::new(Arc::clone(&bus)).with_timeout(config.provider_timeout);
        for provider in providers.notification {
            tracing::info!(provider = provider.name(), channel = %provider.channel(), "Delivery provider registered");
            cache.cache_provider_config(
                provider.name(),
                json!({ "channel": provider.channel(), "timeoutMs": config.provider_timeout.as_millis() as u64 }),
                None,
            );
            dispatcher = dispatcher.with_provider(provider);
        }
        if let Some(verifier) = providers.verifier {
            tracing::info!(provider = verifier.name(), "Verification provider registered");
            dispatcher = dispatcher.with_verifier(verifier);
        }
        let dispatcher = Arc::new(dispatcher);

        let missing: Vec<String> = config
            .channels
            .iter()
            .filter(|channel| !dispatcher.channels().contains(channel))
            .map(ToString::to_string)
            .collect();
        anyhow::ensure!(missing.is_empty(), "No delivery provider for channels: {}", missing.join(", "));

        let engine = Arc::new(TriggerEngine::new(table, Arc::clone(&dispatcher)));

        let metrics = Arc::new(NotificationMetrics::new());
        let registry = Arc::new(ListenerRegistry::new());
        registry.register(Arc::new(logger_listener(config.listener_retry))).await;
        registry
            .register(Arc::new(metrics_listener(Arc::clone(&metrics), config.listener_retry)))
            .await;

        let broker = Arc::new(StreamBroker::new(store));

        Ok(Self {
            config,
            bus,
            cache,
            dispatcher,
            engine,
            registry,
            metrics,
            broker,
            engine_cancel: CancellationToken::new(),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the trigger engine, listener dispatch, cache sweeper and the
    /// business-event stream subscription.
    pub async fn start(&self) -> anyhow::Result<()> {
        let mut tasks = self.tasks.lock().await;
        anyhow::ensure!(tasks.is_empty(), "Worker already started");

        // Subscribe before spawning so nothing published in between is missed.
        let engine_rx = self.bus.subscribe();
        let registry_rx = self.bus.subscribe();

        let engine = Arc::clone(&self.engine);
        let cancel = self.engine_cancel.clone();
        tasks.push(("trigger-engine", tokio::spawn(engine.run(engine_rx, cancel))));

        let registry = Arc::clone(&self.registry);
        let cancel = self.cancel.clone();
        tasks.push((
            "listener-registry",
            tokio::spawn(registry.run(registry_rx, cancel)),
        ));

        let cache = Arc::clone(&self.cache);
        let cancel = self.cancel.clone();
        tasks.push((
            "cache-sweeper",
            tokio::spawn(async move { cache.run_sweeper(cancel).await }),
        ));

        let stream = &self.config.stream;
        self.broker
            .subscribe(
                &stream.name,
                &stream.group,
                &stream.consumer,
                Arc::new(BusinessEventBridge {
                    engine: Arc::clone(&self.engine),
                }),
                SubscribeOptions {
                    batch_size: stream.batch_size,
                    block: stream.block,
                    ..SubscribeOptions::default()
                },
            )
            .await
            .with_context(|| format!("Failed to subscribe to stream {}", stream.name))?;

        tracing::info!(
            stream = %stream.name,
            group = %stream.group,
            consumer = %stream.consumer,
            channels = ?self.dispatcher.channels(),
            "Notification worker started"
        );
        Ok(())
    }

    /// Stop every background task and log final counters.
    pub async fn shutdown(&self) {
        tracing::info!("Notification worker shutting down");

        self.broker.shutdown().await;

        let mut tasks = self.tasks.lock().await;
        self.engine_cancel.cancel();
        if let Some(index) = tasks.iter().position(|(name, _)| *name == "trigger-engine") {
            let (name, handle) = tasks.remove(index);
            join(name, handle).await;
        }

        self.cancel.cancel();
        for (name, handle) in tasks.drain(..) {
            join(name, handle).await;
        }

        let metrics = self.metrics.snapshot();
        tracing::info!(
            queued = metrics.queued,
            sent = metrics.sent,
            failed = metrics.failed,
            success_rate = metrics.success_rate,
            "Final notification metrics"
        );
        let stats = self.cache.stats();
        tracing::info!(
            total_items = stats.total_items,
            expired_items = stats.expired_items,
            "Final cache statistics"
        );
        tracing::info!("Graceful shutdown complete");
    }

    /// Emitter publishing onto this worker's event bus.
    pub fn emitter(&self) -> BusinessEventEmitter {
        BusinessEventEmitter::new(Arc::clone(&self.bus))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn cache(&self) -> &Arc<Cache<serde_json::Value>> {
        &self.cache
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    pub fn broker(&self) -> &Arc<StreamBroker> {
        &self.broker
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

async fn connect_store(config: &WorkerConfig) -> anyhow::Result<Arc<dyn StreamStore>> {
    let max_len = config.stream.max_len;
    match &config.stream.backend {
        StreamBackend::Redis { url } => {
            let store = RedisStreamStore::connect(url, Some(max_len))
                .await
                .context("Failed to connect to Redis")?;
            Ok(Arc::new(store))
        }
        StreamBackend::Memory => {
            tracing::warn!("Using in-process stream store, streams will not survive a restart");
            Ok(Arc::new(MemoryStreamStore::with_max_len(max_len)))
        }
    }
}

fn load_trigger_table(config: &WorkerConfig) -> anyhow::Result<TriggerTable> {
    let Some(path) = &config.trigger_table_path else {
        return Ok(TriggerTable::builtin());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read trigger table {}", path.display()))?;
    TriggerTable::from_json(&json).with_context(|| format!("Invalid trigger table {}", path.display()))
}

async fn join(name: &'static str, handle: JoinHandle<()>) {
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
        Ok(Ok(())) => tracing::info!(task = name, "Background task stopped"),
        Ok(Err(e)) => tracing::error!(task = name, error = %e, "Background task failed"),
        Err(_) => tracing::warn!(task = name, "Background task did not stop within timeout"),
    }
}

// ---------------------------------------------------------------------------
// Stream bridge
// ---------------------------------------------------------------------------

/// Feeds domain events appended to the business-event stream into the
/// trigger engine.
///
/// A payload that is not a valid domain event fails the message, which
/// sends it to the dead-letter stream.
struct BusinessEventBridge {
    engine: Arc<TriggerEngine>,
}

#[async_trait]
impl MessageHandler for BusinessEventBridge {
    async fn handle(&self, message: StreamMessage) -> Result<(), HandlerError> {
        let event: DomainEvent = message.data_as()?;

        if event.event_type().as_str() != message.event_type {
            tracing::warn!(
                message_id = %message.id,
                declared = %message.event_type,
                actual = %event.event_type(),
                "Stream message event type does not match its payload"
            );
        }

        let summary = self.engine.emit(&event).await;
        tracing::debug!(
            message_id = %message.id,
            event_id = %event.id,
            matched = summary.matched,
            sent = summary.sent,
            failed = summary.failed,
            "Stream event processed"
        );
        Ok(())
    }
}
