//! End-to-end flow: business event -> triggers -> dispatcher -> listeners.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use courier_core::domain_event::{OrderItem, ShippingAddress};
use courier_core::lifecycle::{NOTIFICATION_SENT, SUPPORTED_LIFECYCLE_EVENTS};
use courier_core::{
    BusinessEvent, Channel, Contact, DomainEvent, LifecycleEvent, LifecycleKind,
    NotificationRequest, TriggerTable,
};
use courier_events::listener::ProcessError;
use courier_events::listeners::{metrics_listener, NotificationMetrics};
use courier_events::{
    BusEvent, BusinessEventEmitter, DispatchError, EventBus, EventProcessor, Listener, ListenerError,
    ListenerOptions, ListenerRegistry, NotificationDispatcher, NotificationProvider,
    ProviderError, ProviderReceipt, RetryPolicy, RetryableListener, TriggerEngine,
};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingProvider {
    requests: Mutex<Vec<NotificationRequest>>,
}

impl RecordingProvider {
    fn requests(&self) -> Vec<NotificationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, request: &NotificationRequest) -> Result<ProviderReceipt, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(ProviderReceipt {
            message_id: Some("msg-1".into()),
        })
    }
}

fn order_placed(contact: Contact) -> DomainEvent {
    DomainEvent::new(
        "user-1",
        BusinessEvent::OrderPlaced {
            order_id: "123".into(),
            amount: 99.99,
            currency: "USD".into(),
            items: vec![OrderItem {
                id: "sku-1".into(),
                name: "Kettle".into(),
                quantity: 1,
                price: 99.99,
            }],
            shipping_address: ShippingAddress {
                street: "1 Main St".into(),
                city: "Springfield".into(),
                state: "IL".into(),
                zip_code: "62701".into(),
                country: "US".into(),
            },
        },
    )
    .with_contact(contact)
}

fn drain_lifecycle(rx: &mut tokio::sync::broadcast::Receiver<BusEvent>) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(BusEvent::Lifecycle(event)) => events.push(event),
            Ok(BusEvent::Business(_)) => {}
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            Err(TryRecvError::Lagged(_)) => {}
        }
    }
    events
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn order_placed_sends_one_confirmation_email() {
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let provider = Arc::new(RecordingProvider::default());
    let dispatcher = NotificationDispatcher::new(Arc::clone(&bus)).with_provider(provider.clone());
    let engine = TriggerEngine::new(TriggerTable::builtin(), Arc::new(dispatcher));

    let summary = engine
        .emit(&order_placed(Contact::email("jane@example.com")))
        .await;
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.skipped, 1);

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    let metadata = requests[0].metadata.as_ref().unwrap();
    assert_eq!(metadata["template"], "order-confirmation");
    assert_eq!(metadata["businessEvent"], "order.placed");
    assert_eq!(requests[0].title.as_deref(), Some("Order Confirmed"));

    let lifecycle = drain_lifecycle(&mut rx);
    assert_eq!(lifecycle.len(), 2);
    assert_matches!(lifecycle[0].kind, LifecycleKind::Queued { priority: 2, .. });
    assert_matches!(
        &lifecycle[1].kind,
        LifecycleKind::Sent { provider, provider_message_id: Some(id), .. }
            if provider == "recording" && id == "msg-1"
    );
    assert_eq!(lifecycle[0].notification_id, lifecycle[1].notification_id);
    assert!(lifecycle[0].notification_id.starts_with("notif_"));
}

#[tokio::test]
async fn invalid_request_emits_nothing() {
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let provider = Arc::new(RecordingProvider::default());
    let dispatcher = NotificationDispatcher::new(Arc::clone(&bus)).with_provider(provider.clone());

    let request = NotificationRequest::new("user-1", Channel::Email).with_email("");
    let result = dispatcher.send(&request).await;

    assert_matches!(result, Err(DispatchError::Validation(e)) if e.field == "email");
    assert!(provider.requests().is_empty());
    assert_matches!(rx.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn emitted_event_flows_through_to_listeners() {
    let bus = Arc::new(EventBus::default());
    let provider = Arc::new(RecordingProvider::default());
    let dispatcher = NotificationDispatcher::new(Arc::clone(&bus)).with_provider(provider.clone());
    let engine = Arc::new(TriggerEngine::new(TriggerTable::builtin(), Arc::new(dispatcher)));

    let metrics = Arc::new(NotificationMetrics::new());
    let registry = Arc::new(ListenerRegistry::new());
    registry
        .register(Arc::new(metrics_listener(Arc::clone(&metrics), RetryPolicy::once())))
        .await;

    let cancel = CancellationToken::new();
    let registry_task = {
        let registry = Arc::clone(&registry);
        let receiver = bus.subscribe();
        let cancel = cancel.clone();
        tokio::spawn(async move { registry.run(receiver, cancel).await })
    };
    let engine_task = tokio::spawn(Arc::clone(&engine).run(bus.subscribe(), cancel.clone()));

    let emitter = BusinessEventEmitter::new(Arc::clone(&bus));
    let event = order_placed(Contact::email("jane@example.com"));
    let correlation = emitter.emit(event);
    assert!(correlation.starts_with("order.placed."));

    for _ in 0..100 {
        if metrics.snapshot().sent == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.queued, 1);
    assert_eq!(snapshot.sent, 1);
    assert_eq!(snapshot.failed, 0);
    assert_eq!(provider.requests().len(), 1);

    cancel.cancel();
    registry_task.await.unwrap();
    engine_task.await.unwrap();
}

#[tokio::test]
async fn listeners_run_in_priority_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = ListenerRegistry::new();

    for (name, priority) in [("late", 5), ("early", 0), ("middle", 2)] {
        let log = Arc::clone(&log);
        let processor = courier_events::listener::from_fn(move |_event: LifecycleEvent| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(name);
                Ok::<(), ProcessError>(())
            }
        });
        registry
            .register(Arc::new(RetryableListener::new(
                ListenerOptions::new(name, [NOTIFICATION_SENT]).priority(priority),
                processor,
            )))
            .await;
    }

    let order: Vec<String> = registry
        .listeners_for(NOTIFICATION_SENT)
        .await
        .iter()
        .map(|l| l.name().to_string())
        .collect();
    assert_eq!(order, vec!["early", "middle", "late"]);

    registry.dispatch(&sent_event()).await;
    assert_eq!(*log.lock().unwrap(), vec!["early", "middle", "late"]);
}

struct AlwaysFails {
    calls: AtomicU32,
    errors: Mutex<Vec<ListenerError>>,
}

#[async_trait]
impl EventProcessor for AlwaysFails {
    async fn process(&self, _event: &LifecycleEvent) -> Result<(), ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err("downstream unavailable".into())
    }

    fn handle_error(&self, _event: &LifecycleEvent, error: &ListenerError) {
        self.errors.lock().unwrap().push(error.clone());
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_report_once_after_linear_backoff() {
    let processor = Arc::new(AlwaysFails {
        calls: AtomicU32::new(0),
        errors: Mutex::new(Vec::new()),
    });
    let registry = ListenerRegistry::new();
    registry
        .register(Arc::new(RetryableListener::new(
            ListenerOptions::new("flaky", SUPPORTED_LIFECYCLE_EVENTS)
                .retry(RetryPolicy::new(3, Duration::from_millis(1000))),
            Arc::clone(&processor),
        )))
        .await;

    let start = Instant::now();
    registry.dispatch(&sent_event()).await;
    let elapsed = start.elapsed();

    assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
    assert!(elapsed >= Duration::from_millis(3000));
    assert!(elapsed < Duration::from_millis(4000));

    let errors = processor.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].listener, "flaky");
    assert_eq!(errors[0].event_type, NOTIFICATION_SENT);
}

fn sent_event() -> LifecycleEvent {
    let request = NotificationRequest::new("user-1", Channel::Email).with_email("jane@example.com");
    LifecycleEvent::for_request(
        "notif_1_abcdefghi",
        &request,
        Channel::Email,
        LifecycleKind::Sent {
            provider: "recording".into(),
            provider_message_id: None,
            delivery_time_ms: 12,
        },
    )
}
