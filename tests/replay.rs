//! Replay worker behavior against a live destination.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use deferred_relay::http::http_client;
use deferred_relay::lifecycle::Shutdown;
use deferred_relay::queue::{Delivery, MemoryQueue, QueueClient, QueueError};
use deferred_relay::replay::{push, ReplayError, ReplayWorker, Replayer};
use tower::ServiceExt;
use wiremock::matchers::{any, body_string, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

const STREAM: &str = "test-stream";

fn captured_post(host: &str) -> String {
    format!(
        "POST /hook?attempt=1 HTTP/1.1\r\nhost: {host}\r\nprefer: respond-async\r\nx-trace: abc\r\ncontent-length: 5\r\n\r\nhello"
    )
}

#[tokio::test]
async fn test_replay_strips_marker_and_addresses_by_host() {
    let destination = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(query_param("attempt", "1"))
        .and(body_string("hello"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&destination)
        .await;

    let replayer = Replayer::new(http_client(), None);
    let envelope = common::envelope("e1", captured_post(&destination.address().to_string()));

    let status = replayer.replay(&envelope).await.unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let received = destination.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].headers.get("prefer").is_none());
    assert_eq!(received[0].headers.get("x-trace").unwrap(), "abc");
}

#[tokio::test]
async fn test_large_response_is_discarded() {
    let destination = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'z'; 8 * 1024 * 1024]))
        .expect(1)
        .mount(&destination)
        .await;

    let replayer = Replayer::new(http_client(), None);
    let envelope = common::envelope("big", captured_post(&destination.address().to_string()));

    assert_eq!(replayer.replay(&envelope).await.unwrap(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_payload_is_never_sent() {
    let destination = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&destination)
        .await;

    let replayer = Replayer::new(http_client(), None);
    let host = destination.address().to_string();
    for payload in [
        "not an http request".to_string(),
        format!("GET / HTTP/1.1\r\nhost: {host}\r\n"),
        format!("POST / HTTP/1.1\r\nhost: {host}\r\ncontent-length: 10\r\n\r\nshort"),
        "GET / HTTP/1.1\r\n\r\n".to_string(),
    ] {
        let result = replayer.replay(&common::envelope("bad", payload)).await;
        assert!(matches!(result, Err(ReplayError::MalformedPayload(_))), "{result:?}");
    }
}

#[tokio::test]
async fn test_unreachable_destination_is_reported() {
    let addr = common::closed_port().await;
    let replayer = Replayer::new(http_client(), None);

    let result = replayer
        .replay(&common::envelope("e1", captured_post(&addr.to_string())))
        .await;
    assert!(matches!(result, Err(ReplayError::DestinationUnreachable(_))));
}

#[tokio::test]
async fn test_replay_timeout_counts_as_unreachable() {
    let destination = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&destination)
        .await;

    let replayer = Replayer::new(http_client(), Some(Duration::from_millis(100)));
    let result = replayer
        .replay(&common::envelope("e1", captured_post(&destination.address().to_string())))
        .await;
    assert!(matches!(result, Err(ReplayError::DestinationUnreachable(_))));
}

#[tokio::test]
async fn test_worker_replays_drops_and_acks_everything() {
    let destination = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&destination)
        .await;

    let queue = Arc::new(MemoryQueue::new());
    let host = destination.address().to_string();
    queue.append(STREAM, &common::envelope("bad", "garbage")).await.unwrap();
    queue.append(STREAM, &common::envelope("good", captured_post(&host))).await.unwrap();

    let config = common::test_config(None);
    let worker = ReplayWorker::new(
        "w-0",
        queue.clone(),
        STREAM,
        Replayer::new(http_client(), None),
        &config.worker,
    );
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(worker.run(shutdown.subscribe()));

    let drained = common::eventually(Duration::from_secs(5), || {
        let queue = queue.clone();
        async move { queue.ready_len(STREAM) == 0 && queue.pending_len(STREAM) == 0 }
    })
    .await;
    assert!(drained, "worker did not ack both entries");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_worker_backs_off_and_skips_corrupt_entries() {
    let queue = Arc::new(common::ScriptedQueue::new(vec![
        Err(QueueError::Unavailable("down".into())),
        Err(QueueError::Unavailable("still down".into())),
        Err(QueueError::CorruptEntry {
            receipt: "1-0".into(),
            reason: "not json".into(),
        }),
        Ok(Delivery {
            receipt: "2-0".into(),
            envelope: common::envelope("e2", "garbage"),
        }),
    ]));

    let config = common::test_config(None);
    let worker = ReplayWorker::new(
        "w-0",
        queue.clone(),
        STREAM,
        Replayer::new(http_client(), None),
        &config.worker,
    );
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(worker.run(shutdown.subscribe()));

    let done = common::eventually(Duration::from_secs(5), || {
        let queue = queue.clone();
        // Two failures, the corrupt entry, the delivery, then a blocked receive.
        async move { queue.acked().len() == 2 && queue.receives.load(Ordering::SeqCst) == 5 }
    })
    .await;
    assert!(done);
    assert_eq!(queue.acked(), ["1-0", "2-0"]);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_push_receiver_replays_structured_event() {
    let destination = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&destination)
        .await;

    let envelope = common::envelope("e1", captured_post(&destination.address().to_string()));
    let event = serde_json::json!({
        "specversion": "1.0",
        "id": "evt-1",
        "type": "dev.relay.deferred",
        "source": "/relay",
        "data": envelope,
    });

    let router = push::router(Arc::new(Replayer::new(http_client(), None)));
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/cloudevents+json")
        .body(Body::from(event.to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_push_receiver_rejects_non_envelope() {
    let router = push::router(Arc::new(Replayer::new(http_client(), None)));
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("ce-id", "evt-2")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"hello":"world"}"#))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
