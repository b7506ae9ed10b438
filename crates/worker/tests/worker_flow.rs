use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use courier_core::{BusinessEvent, Channel, Contact, DomainEvent, NotificationRequest};
use courier_events::{NotificationProvider, ProviderError, ProviderReceipt};
use courier_streams::MemoryStreamStore;
use courier_worker::{App, Providers, WorkerConfig};
use serde_json::json;

struct Recorder {
    sent: Mutex<Vec<NotificationRequest>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationProvider for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, request: &NotificationRequest) -> Result<ProviderReceipt, ProviderError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(request.clone());
        Ok(ProviderReceipt {
            message_id: Some(format!("msg-{}", sent.len())),
        })
    }
}

fn config(extra: &[(&str, &str)]) -> WorkerConfig {
    let mut vars: Vec<(String, String)> = vec![
        ("NOTIFY_CHANNELS".into(), String::new()),
        ("STREAM_BLOCK_MS".into(), "50".into()),
        ("LISTENER_RETRY_DELAY_MS".into(), "10".into()),
    ];
    vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    WorkerConfig::from_lookup(move |key| {
        vars.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    })
    .unwrap()
}

async fn app_with(recorder: &Arc<Recorder>) -> App {
    let providers = Providers {
        notification: vec![recorder.clone() as Arc<dyn NotificationProvider>],
        verifier: None,
    };
    App::new(config(&[]), providers, Arc::new(MemoryStreamStore::new()))
        .await
        .unwrap()
}

fn registered(user_id: &str, email: &str) -> DomainEvent {
    DomainEvent::new(
        user_id,
        BusinessEvent::UserRegistered {
            name: "Ada".into(),
            source: "web".into(),
        },
    )
    .with_contact(Contact::email(email))
}

/// Poll `check` until it holds, failing after a few seconds.
async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn eventually_async<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn stream_events_are_dispatched_and_acked() {
    let recorder = Recorder::new();
    let app = app_with(&recorder).await;
    app.start().await.unwrap();

    let event = registered("user-1", "ada@example.com");
    app.broker()
        .publish(
            "business-events",
            "user.registered",
            &serde_json::to_value(&event).unwrap(),
            None,
        )
        .await
        .unwrap();

    eventually("welcome email", || recorder.sent().len() == 1).await;
    let request = &recorder.sent()[0];
    assert_eq!(request.email.as_deref(), Some("ada@example.com"));
    assert_eq!(request.metadata.as_ref().unwrap()["template"], "welcome-email");
    assert_eq!(request.metadata.as_ref().unwrap()["businessEventId"], event.id.as_str());

    let broker = app.broker().clone();
    eventually_async("ack", || {
        let broker = broker.clone();
        async move { broker.pending_count("business-events", "courier").await.unwrap() == 0 }
    })
    .await;
    eventually("metrics", || app.metrics().sent == 1).await;

    app.shutdown().await;
}

#[tokio::test]
async fn invalid_stream_payload_is_dead_lettered() {
    let recorder = Recorder::new();
    let app = app_with(&recorder).await;
    app.start().await.unwrap();

    app.broker()
        .publish("business-events", "user.registered", &json!({ "not": "an event" }), None)
        .await
        .unwrap();

    let broker = app.broker().clone();
    eventually_async("dead letter", || {
        let broker = broker.clone();
        async move {
            broker
                .stream_info("business-events:dead-letter")
                .await
                .map(|info| info.length == 1)
                .unwrap_or(false)
        }
    })
    .await;
    assert!(recorder.sent().is_empty());
    assert_eq!(
        app.broker().pending_count("business-events", "courier").await.unwrap(),
        1
    );

    app.shutdown().await;
}

#[tokio::test]
async fn emitter_events_reach_providers_and_listeners() {
    let recorder = Recorder::new();
    let app = app_with(&recorder).await;
    app.start().await.unwrap();

    let correlation = app
        .emitter()
        .user_registered("user-2", Contact::email("grace@example.com"), "Grace", "api");
    assert!(correlation.starts_with("user.registered."));

    eventually("welcome email", || recorder.sent().len() == 1).await;
    eventually("metrics", || {
        let metrics = app.metrics();
        metrics.queued == 1 && metrics.sent == 1
    })
    .await;

    app.shutdown().await;
}

#[tokio::test]
async fn registered_providers_are_cached_and_listeners_registered() {
    let recorder = Recorder::new();
    let app = app_with(&recorder).await;

    let cached = app.cache().provider_config("recorder").unwrap();
    assert_eq!(cached["channel"], "EMAIL");
    assert_eq!(cached["timeoutMs"], 30_000);

    let names: Vec<String> = app
        .registry()
        .listener_status()
        .await
        .into_iter()
        .map(|status| status.name)
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"NotificationLoggerListener".to_string()));
    assert!(names.contains(&"NotificationMetricsListener".to_string()));
}

#[tokio::test]
async fn starting_twice_is_rejected() {
    let recorder = Recorder::new();
    let app = app_with(&recorder).await;

    app.start().await.unwrap();
    let err = app.start().await.unwrap_err();
    assert!(err.to_string().contains("already started"));

    app.shutdown().await;
}

#[tokio::test]
async fn unreadable_trigger_table_fails_startup() {
    let config = config(&[("TRIGGER_TABLE_PATH", "/nonexistent/courier/triggers.json")]);
    let err = App::new(config, Providers::default(), Arc::new(MemoryStreamStore::new()))
        .await
        .err()
        .unwrap();
    assert!(format!("{err:#}").contains("Failed to read trigger table"));
}

#[tokio::test]
async fn trigger_table_file_replaces_builtin_rules() {
    let path = std::env::temp_dir().join(format!("courier-triggers-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(
        &path,
        r#"[{ "eventType": "user.registered", "notificationType": "INFO", "channel": "EMAIL", "template": "custom-welcome" }]"#,
    )
    .unwrap();

    let recorder = Recorder::new();
    let providers = Providers {
        notification: vec![recorder.clone() as Arc<dyn NotificationProvider>],
        verifier: None,
    };
    let config = config(&[("TRIGGER_TABLE_PATH", path.to_str().unwrap())]);
    let app = App::new(config, providers, Arc::new(MemoryStreamStore::new()))
        .await
        .unwrap();
    std::fs::remove_file(&path).unwrap();
    app.start().await.unwrap();

    app.emitter()
        .user_registered("user-3", Contact::email("linus@example.com"), "Linus", "web");

    eventually("custom welcome", || recorder.sent().len() == 1).await;
    assert_eq!(recorder.sent()[0].metadata.as_ref().unwrap()["template"], "custom-welcome");

    app.shutdown().await;
}

#[tokio::test]
async fn required_channel_without_provider_fails_startup() {
    let config = config(&[
        ("NOTIFY_CHANNELS", "email"),
        ("SMTP_HOST", "smtp.example.com"),
        ("SMTP_FROM", "noreply@example.com"),
    ]);
    let err = App::new(config, Providers::default(), Arc::new(MemoryStreamStore::new()))
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("EMAIL"));
}

#[tokio::test]
async fn memory_backend_is_built_from_config() {
    let app = App::build(config(&[("STREAM_BACKEND", "memory"), ("STREAM_MAX_LEN", "2")]))
        .await
        .unwrap();

    for n in 0..3 {
        app.broker()
            .publish("audit", "audit.recorded", &json!({ "n": n }), None)
            .await
            .unwrap();
    }
    let info = app.broker().stream_info("audit").await.unwrap();
    assert_eq!(info.length, 2);
    assert_eq!(info.first_entry.unwrap().field("data"), Some(r#"{"n":1}"#));
}
