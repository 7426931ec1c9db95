// Integration tests for `MessagingClient` using wiremock.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pushme_api::{Error, Keyset, MessagingClient, ReconnectConfig, SubscribeHandle};

// ── Helpers ─────────────────────────────────────────────────────────

fn setup(server: &MockServer) -> MessagingClient {
    let origin = server.uri().parse().expect("mock server URI");
    MessagingClient::with_client(
        reqwest::Client::new(),
        origin,
        Keyset {
            publish_key: "pub-key".into(),
            subscribe_key: "sub-key".into(),
        },
    )
}

const TOKEN: &str = "aabbccddeeff00112233445566778899";

// ── Publish ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_publish_returns_timetoken() {
    let server = MockServer::start().await;
    let client = setup(&server);

    Mock::given(method("GET"))
        .and(path_regex("^/publish/pub-key/sub-key/0/news/0/.+$"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([1, "Sent", "17000000000000000"])),
        )
        .mount(&server)
        .await;

    let timetoken = client
        .publish("news", &json!({ "text": "hello" }))
        .await
        .unwrap();

    assert_eq!(timetoken, "17000000000000000");
}

#[tokio::test]
async fn test_publish_rejection_triple() {
    let server = MockServer::start().await;
    let client = setup(&server);

    Mock::given(method("GET"))
        .and(path_regex("^/publish/.+$"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([0, "Message Too Large", "0"])),
        )
        .mount(&server)
        .await;

    let err = client.publish("news", &json!("x")).await.unwrap_err();
    match err {
        Error::Publish { message } => assert_eq!(message, "Message Too Large"),
        other => panic!("expected Publish error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_publish_key_rejection() {
    let server = MockServer::start().await;
    let client = setup(&server);

    Mock::given(method("GET"))
        .and(path_regex("^/publish/.+$"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "Invalid Key" })),
        )
        .mount(&server)
        .await;

    let err = client.publish("news", &json!("x")).await.unwrap_err();
    assert!(err.is_key_rejection(), "expected key rejection, got {err:?}");
}

// ── Push registration ───────────────────────────────────────────────

#[tokio::test]
async fn test_register_for_push_sends_add_param() {
    let server = MockServer::start().await;
    let client = setup(&server);

    Mock::given(method("GET"))
        .and(path(format!("/v1/push/sub-key/sub-key/devices/{TOKEN}")))
        .and(query_param("add", "news,alerts"))
        .and(query_param("type", "apns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, "Modified Channels"])))
        .mount(&server)
        .await;

    client
        .register_for_push(TOKEN, &["news", "alerts"])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unregister_from_push_sends_remove_param() {
    let server = MockServer::start().await;
    let client = setup(&server);

    Mock::given(method("GET"))
        .and(path(format!("/v1/push/sub-key/sub-key/devices/{TOKEN}")))
        .and(query_param("remove", "news"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, "Modified Channels"])))
        .mount(&server)
        .await;

    client.unregister_from_push(TOKEN, &["news"]).await.unwrap();
}

#[tokio::test]
async fn test_unregister_from_all_push() {
    let server = MockServer::start().await;
    let client = setup(&server);

    Mock::given(method("GET"))
        .and(path(format!(
            "/v1/push/sub-key/sub-key/devices/{TOKEN}/remove"
        )))
        .and(query_param("type", "apns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, "Removed Device"])))
        .mount(&server)
        .await;

    client.unregister_from_all_push(TOKEN).await.unwrap();
}

#[tokio::test]
async fn test_audit_push_returns_channel_list() {
    let server = MockServer::start().await;
    let client = setup(&server);

    Mock::given(method("GET"))
        .and(path(format!("/v1/push/sub-key/sub-key/devices/{TOKEN}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["news", "alerts"])))
        .mount(&server)
        .await;

    let channels = client.audit_push(TOKEN).await.unwrap();
    assert_eq!(channels, vec!["news".to_string(), "alerts".to_string()]);
}

#[tokio::test]
async fn test_push_server_error_carries_status() {
    let server = MockServer::start().await;
    let client = setup(&server);

    Mock::given(method("GET"))
        .and(path_regex("^/v1/push/.+$"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let err = client.register_for_push(TOKEN, &["news"]).await.unwrap_err();
    match err {
        Error::Push { status, .. } => assert_eq!(status, 503),
        other => panic!("expected Push error, got {other:?}"),
    }
}

// ── Subscribe stream ────────────────────────────────────────────────

#[tokio::test]
async fn test_subscribe_stream_delivers_messages() {
    let server = MockServer::start().await;
    let client = setup(&server);

    let body = json!({
        "t": { "t": "17000000000000000", "r": 1 },
        "m": [{
            "c": "news",
            "d": { "text": "breaking" },
            "p": { "t": "16999999999999999" }
        }]
    });

    Mock::given(method("GET"))
        .and(path("/v2/subscribe/sub-key/news/0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(&body)
                // Slow the long-poll loop down so the test sees a bounded
                // number of cycles.
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let handle = SubscribeHandle::start(
        client,
        vec!["news".into()],
        ReconnectConfig::default(),
        cancel.clone(),
    );

    let mut rx = handle.subscribe();
    let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("stream closed");

    assert_eq!(message.channel, "news");
    assert_eq!(message.payload["text"], "breaking");
    assert_eq!(message.timetoken.as_deref(), Some("16999999999999999"));

    handle.shutdown();
}
