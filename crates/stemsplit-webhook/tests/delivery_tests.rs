//! Callback delivery integration tests against a mock HTTP endpoint.

use std::time::Duration;

use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stemsplit_models::WebhookPayload;
use stemsplit_webhook::{
    BackoffPolicy, DeliveryOutcome, SignatureCodec, WebhookDispatcher, SIGNATURE_HEADER,
    TIMESTAMP_HEADER,
};

const SECRET: &str = "test-secret";

fn dispatcher(max_attempts: u32) -> WebhookDispatcher {
    let policy = BackoffPolicy::default()
        .with_max_attempts(max_attempts)
        .with_base_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(50))
        .with_jitter(0.0);
    WebhookDispatcher::new(SignatureCodec::new(SECRET), policy, Duration::from_secs(5))
        .expect("Failed to build dispatcher")
}

fn payload() -> WebhookPayload {
    WebhookPayload::completed("v-test", 12_345, Vec::new())
}

fn header_value(request: &wiremock::Request, name: &str) -> Option<String> {
    request
        .headers
        .iter()
        .find(|(k, _)| k.to_string().eq_ignore_ascii_case(name))
        .map(|(_, v)| v.last().to_string())
}

#[tokio::test]
async fn delivers_after_transient_server_errors() {
    let server = MockServer::start().await;

    // Three 500s, then success
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let outcome = dispatcher(5)
        .deliver(&format!("{}/hook", server.uri()), &payload())
        .await
        .expect("Delivery errored");

    assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 4 });
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn rejected_callback_is_attempted_exactly_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = dispatcher(5)
        .deliver(&format!("{}/hook", server.uri()), &payload())
        .await
        .expect("Delivery errored");

    assert_eq!(
        outcome,
        DeliveryOutcome::Rejected {
            status: 400,
            attempts: 1
        }
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn gives_up_after_the_attempt_budget() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let outcome = dispatcher(3)
        .deliver(&format!("{}/hook", server.uri()), &payload())
        .await
        .expect("Delivery errored");

    match outcome {
        DeliveryOutcome::Exhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("503"), "last_error: {}", last_error);
        }
        other => panic!("Expected Exhausted, got {:?}", other),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn rate_limiting_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let outcome = dispatcher(5)
        .deliver(&format!("{}/hook", server.uri()), &payload())
        .await
        .expect("Delivery errored");

    assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 2 });
}

#[tokio::test]
async fn connection_errors_are_transient() {
    // Discard port; nothing listens there
    let outcome = dispatcher(2)
        .deliver("http://127.0.0.1:9/hook", &payload())
        .await
        .expect("Delivery errored");

    match outcome {
        DeliveryOutcome::Exhausted { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("Expected Exhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn callbacks_are_signed_and_verifiable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header_exists(SIGNATURE_HEADER))
        .and(header_exists(TIMESTAMP_HEADER))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let sent = payload();
    let outcome = dispatcher(1)
        .deliver(&format!("{}/hook", server.uri()), &sent)
        .await
        .expect("Delivery errored");
    assert!(outcome.is_delivered());

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];

    let signature = header_value(request, SIGNATURE_HEADER).expect("Missing signature header");
    let timestamp = header_value(request, TIMESTAMP_HEADER).expect("Missing timestamp header");

    let codec = SignatureCodec::new(SECRET);
    assert!(codec.verify(
        &request.body,
        &timestamp,
        &signature,
        Duration::from_secs(300)
    ));

    // And the wrong secret must not verify it
    assert!(!SignatureCodec::new("other-secret").verify(
        &request.body,
        &timestamp,
        &signature,
        Duration::from_secs(300)
    ));

    let body: WebhookPayload = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body.version_id, sent.version_id);
}
