use std::sync::Arc;

use assert_matches::assert_matches;
use courier_core::{Channel, NotificationRequest};
use courier_events::delivery::{TwilioConfig, TwilioSmsProvider};
use courier_events::{
    DispatchError, EventBus, NotificationDispatcher, NotificationProvider, ProviderError,
    VerificationProvider,
};
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> TwilioConfig {
    TwilioConfig {
        account_sid: "AC123".into(),
        auth_token: "secret".into(),
        phone_number: "+15550100".into(),
        verify_service_sid: Some("VA456".into()),
        api_base: String::new(),
        verify_base: String::new(),
    }
    .with_base_url(server.uri())
}

#[tokio::test]
async fn sms_returns_message_sid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
        .and(header_exists("authorization"))
        .and(body_string_contains("Body=Your+order+shipped"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "sid": "SM789" })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = TwilioSmsProvider::new(config(&server)).unwrap();
    let request = NotificationRequest::new("user-1", Channel::Sms)
        .with_phone("+15550199")
        .with_message("Your order shipped");

    let receipt = NotificationProvider::send(&provider, &request).await.unwrap();
    assert_eq!(receipt.message_id.as_deref(), Some("SM789"));
}

#[tokio::test]
async fn non_success_status_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid To number"))
        .mount(&server)
        .await;

    let provider = TwilioSmsProvider::new(config(&server)).unwrap();
    let request = NotificationRequest::new("user-1", Channel::Sms).with_phone("+15550199");

    assert_matches!(
        NotificationProvider::send(&provider, &request).await,
        Err(ProviderError::Rejected { status: 400, body }) if body == "invalid To number"
    );
}

#[tokio::test]
async fn verification_round_trip_through_dispatcher() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/Services/VA456/Verifications"))
        .and(body_string_contains("Channel=sms"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "status": "pending" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/Services/VA456/VerificationCheck"))
        .and(body_string_contains("Code=123456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "approved" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/Services/VA456/VerificationCheck"))
        .and(body_string_contains("Code=000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "pending" })))
        .mount(&server)
        .await;

    let twilio = Arc::new(TwilioSmsProvider::new(config(&server)).unwrap());
    let dispatcher = NotificationDispatcher::new(Arc::new(EventBus::default()))
        .with_provider(twilio.clone())
        .with_verifier(twilio);

    let receipt = dispatcher.send_verification_code("+15550199").await.unwrap();
    assert_eq!(receipt.status, "pending");
    assert!(receipt.expires_at > chrono::Utc::now());

    assert!(dispatcher.check_verification_code("+15550199", "123456").await.unwrap());
    assert!(!dispatcher.check_verification_code("+15550199", "000000").await.unwrap());
}

#[tokio::test]
async fn verification_vendor_failure_surfaces_as_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/Services/VA456/Verifications"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let twilio = Arc::new(TwilioSmsProvider::new(config(&server)).unwrap());
    assert_matches!(
        VerificationProvider::send_code(twilio.as_ref(), "+15550199").await,
        Err(ProviderError::Rejected { status: 503, .. })
    );

    let dispatcher =
        NotificationDispatcher::new(Arc::new(EventBus::default())).with_verifier(twilio);
    assert_matches!(
        dispatcher.send_verification_code("+15550199").await,
        Err(DispatchError::Provider { source: ProviderError::Rejected { status: 503, .. }, .. })
    );
}
