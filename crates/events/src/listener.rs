//! Lifecycle event listeners.
//!
//! A [`Listener`] is anything the [`ListenerRegistry`](crate::registry::ListenerRegistry)
//! can fan lifecycle events out to. [`RetryableListener`] is the standard
//! implementation: it composes an [`EventProcessor`] with event-type
//! filtering, an enable flag, and bounded retry with linear backoff.
//! Failures are reported to [`EventProcessor::handle_error`] and never
//! returned to the caller.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::LifecycleEvent;

use crate::error::ListenerError;
use crate::retry::{with_retry, RetryPolicy};

/// Error returned by an [`EventProcessor`].
pub type ProcessError = Box<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Listener: Send + Sync {
    /// Unique registration key.
    fn name(&self) -> &str;

    fn event_types(&self) -> &[String];

    /// Lower values are dispatched first.
    fn priority(&self) -> i32;

    fn is_enabled(&self) -> bool;

    fn enable(&self);

    fn disable(&self);

    /// Process `event`. Must not fail; errors are handled internally.
    async fn handle(&self, event: &LifecycleEvent);
}

// ---------------------------------------------------------------------------
// EventProcessor
// ---------------------------------------------------------------------------

/// The work a [`RetryableListener`] performs for each accepted event.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    async fn process(&self, event: &LifecycleEvent) -> Result<(), ProcessError>;

    /// Called once when every attempt for `event` has failed.
    fn handle_error(&self, event: &LifecycleEvent, error: &ListenerError) {
        tracing::error!(
            listener = %error.listener,
            event_type = event.event_type(),
            notification_id = %event.notification_id,
            error = %error.reason,
            "Listener failed to process event"
        );
    }
}

#[async_trait]
impl<P: EventProcessor + ?Sized> EventProcessor for Arc<P> {
    async fn process(&self, event: &LifecycleEvent) -> Result<(), ProcessError> {
        (**self).process(event).await
    }

    fn handle_error(&self, event: &LifecycleEvent, error: &ListenerError) {
        (**self).handle_error(event, error)
    }
}

/// Processor backed by an async closure. See [`from_fn`].
pub struct FnProcessor<F> {
    f: F,
}

/// Wrap an async closure taking an owned event as an [`EventProcessor`].
pub fn from_fn<F, Fut>(f: F) -> FnProcessor<F>
where
    F: Fn(LifecycleEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProcessError>> + Send,
{
    FnProcessor { f }
}

#[async_trait]
impl<F, Fut> EventProcessor for FnProcessor<F>
where
    F: Fn(LifecycleEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProcessError>> + Send,
{
    async fn process(&self, event: &LifecycleEvent) -> Result<(), ProcessError> {
        (self.f)(event.clone()).await
    }
}

// ---------------------------------------------------------------------------
// RetryableListener
// ---------------------------------------------------------------------------

/// Registration attributes of a listener.
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    pub name: String,
    pub event_types: Vec<String>,
    pub priority: i32,
    pub enabled: bool,
    pub retry: RetryPolicy,
}

impl ListenerOptions {
    /// Enabled, priority 0, default retry policy.
    pub fn new<I, S>(name: impl Into<String>, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            event_types: event_types.into_iter().map(Into::into).collect(),
            priority: 0,
            enabled: true,
            retry: RetryPolicy::default(),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Filtering, enable flag and retry around an [`EventProcessor`].
pub struct RetryableListener<P> {
    name: String,
    event_types: Vec<String>,
    priority: i32,
    retry: RetryPolicy,
    enabled: AtomicBool,
    processor: P,
}

impl<P: EventProcessor> RetryableListener<P> {
    pub fn new(options: ListenerOptions, processor: P) -> Self {
        Self {
            name: options.name,
            event_types: options.event_types,
            priority: options.priority,
            retry: options.retry,
            enabled: AtomicBool::new(options.enabled),
            processor,
        }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn accepts(&self, event_type: &str) -> bool {
        self.event_types.iter().any(|t| t == event_type)
    }
}

#[async_trait]
impl<P: EventProcessor> Listener for RetryableListener<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn event_types(&self) -> &[String] {
        &self.event_types
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    async fn handle(&self, event: &LifecycleEvent) {
        if !self.is_enabled() || !self.accepts(event.event_type()) {
            return;
        }

        let retry = self.retry;
        let result = with_retry(
            retry.attempts,
            |attempt| retry.backoff(attempt),
            |attempt| async move {
                self.processor.process(event).await.inspect_err(|e| {
                    tracing::debug!(
                        listener = %self.name,
                        event_type = event.event_type(),
                        attempt,
                        error = %e,
                        "Listener attempt failed"
                    );
                })
            },
        )
        .await;

        if let Err(e) = result {
            let error = ListenerError::new(&self.name, event.event_type(), e.to_string());
            self.processor.handle_error(event, &error);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
