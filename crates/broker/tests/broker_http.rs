//! Broker protocol tests over a real loopback socket.

use broker::{BrokerClient, BrokerConfig, spawn};
use scene::envelope::{compress, split_into_chunks};
use std::time::Duration;

/// Spawn a broker on an ephemeral port and build a matching client.
async fn broker_pair(mut config: BrokerConfig) -> (broker::BrokerHandle, BrokerClient) {
    config.port = 0;
    let handle = spawn(config.clone()).await.unwrap();
    config.port = handle.addr.port();
    let client = BrokerClient::new(&config).unwrap();
    (handle, client)
}

fn quick_poll_config() -> BrokerConfig {
    BrokerConfig {
        long_poll_ms: 300,
        ..BrokerConfig::default()
    }
}

#[tokio::test]
async fn submit_then_poll_delivers_at_most_once() {
    let (handle, client) = broker_pair(quick_poll_config()).await;

    let id = client
        .submit("{\"version\":\"1.0.0\"}".to_owned())
        .await
        .unwrap();
    assert!(id.is_some());

    let job = client.poll_next().await.unwrap().unwrap();
    assert_eq!(job.payload, "{\"version\":\"1.0.0\"}");

    // The job is consumed; the next window expires empty.
    assert!(client.poll_next().await.unwrap().is_none());
    handle.shutdown().await;
}

#[tokio::test]
async fn jobs_deliver_in_submission_order() {
    let (handle, client) = broker_pair(quick_poll_config()).await;
    for label in ["a", "b", "c"] {
        client
            .submit(format!("{{\"label\":\"{label}\"}}"))
            .await
            .unwrap();
    }
    for label in ["a", "b", "c"] {
        let job = client.poll_next().await.unwrap().unwrap();
        assert_eq!(job.payload, format!("{{\"label\":\"{label}\"}}"));
    }
    handle.shutdown().await;
}

#[tokio::test]
async fn out_of_order_chunks_reassemble_byte_for_byte() {
    let (handle, client) = broker_pair(quick_poll_config()).await;

    let payload = format!("{{\"blob\":\"{}\"}}", "z".repeat(4000));
    let chunks = split_into_chunks(&payload, 10);
    let mut order: Vec<usize> = (0..10).collect();
    order.reverse();
    order.swap(1, 8);

    let mut queued_id = None;
    for index in order {
        let body = serde_json::to_string(&chunks[index]).unwrap();
        if let Some(id) = client.submit(body).await.unwrap() {
            queued_id = Some(id);
        }
    }
    assert!(queued_id.is_some(), "final chunk should enqueue the job");

    let job = client.poll_next().await.unwrap().unwrap();
    assert_eq!(job.payload, payload);
    handle.shutdown().await;
}

#[tokio::test]
async fn compressed_submissions_are_served_decompressed() {
    let (handle, client) = broker_pair(quick_poll_config()).await;
    let payload = "{\"root\":{\"id\":\"n1\",\"children\":[]}}";
    let envelope = compress(payload).unwrap();
    client
        .submit(serde_json::to_string(&envelope).unwrap())
        .await
        .unwrap();
    let job = client.poll_next().await.unwrap().unwrap();
    assert_eq!(job.payload, payload);
    handle.shutdown().await;
}

#[tokio::test]
async fn payload_limit_boundary_is_exact() {
    let config = BrokerConfig {
        // Fit `{"pad":"…"}` exactly: 10 bytes of JSON syntax plus the
        // padding.
        max_payload_bytes: 1034,
        ..quick_poll_config()
    };
    let (handle, client) = broker_pair(config).await;

    let at_limit = format!("{{\"pad\":\"{}\"}}", "p".repeat(1024));
    assert_eq!(at_limit.len(), 1034);
    assert!(client.submit(at_limit).await.unwrap().is_some());

    let one_over = format!("{{\"pad\":\"{}\"}}", "p".repeat(1025));
    let err = client.submit(one_over).await.unwrap_err();
    assert_eq!(err.kind(), "PayloadTooLarge");
    handle.shutdown().await;
}

#[tokio::test]
async fn api_key_mismatch_is_rejected_generically() {
    let config = BrokerConfig {
        api_key: Some("secret".to_owned()),
        ..quick_poll_config()
    };
    let (handle, good_client) = broker_pair(config.clone()).await;

    // Same port, wrong key.
    let bad_config = BrokerConfig {
        api_key: Some("wrong".to_owned()),
        port: handle.addr.port(),
        ..config
    };
    let bad_client = BrokerClient::new(&bad_config).unwrap();
    assert!(bad_client.submit("{}".to_owned()).await.is_err());
    let rejected = bad_client.health("plugin").await.unwrap();
    assert_eq!(rejected["ok"], false);

    // The right key goes through.
    assert!(good_client.submit("{}".to_owned()).await.is_ok());
    handle.shutdown().await;
}

#[tokio::test]
async fn long_poll_wakes_on_submission() {
    let (handle, client) = broker_pair(BrokerConfig {
        long_poll_ms: 5_000,
        ..BrokerConfig::default()
    })
    .await;

    let poller = tokio::spawn(async move {
        let started = std::time::Instant::now();
        let job = client.poll_next().await.unwrap().unwrap();
        (job, started.elapsed())
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let submit_config = BrokerConfig {
        port: handle.addr.port(),
        ..BrokerConfig::default()
    };
    let submitter = BrokerClient::new(&submit_config).unwrap();
    submitter.submit("{\"wake\":true}".to_owned()).await.unwrap();

    let (job, elapsed) = poller.await.unwrap();
    assert_eq!(job.payload, "{\"wake\":true}");
    // Delivered by wakeup, well before the 5 s window expired.
    assert!(elapsed < Duration::from_secs(3));
    handle.shutdown().await;
}

#[tokio::test]
async fn health_reports_queue_and_telemetry() {
    let (handle, client) = broker_pair(quick_poll_config()).await;
    client.submit("{\"n\":1}".to_owned()).await.unwrap();
    let health = client.health("extension").await.unwrap();
    assert_eq!(health["ok"], true);
    assert_eq!(health["queueLength"], 1);
    assert!(health["telemetry"]["lastExtensionPing"].is_i64());
    handle.shutdown().await;
}

#[tokio::test]
async fn stale_chunked_transfer_surfaces_request_timeout() {
    let config = BrokerConfig {
        chunk_timeout_ms: 100,
        ..quick_poll_config()
    };
    let (handle, _client) = broker_pair(config).await;
    let jobs_url = format!("http://127.0.0.1:{}/jobs", handle.addr.port());
    let http = reqwest::Client::new();

    let chunks = split_into_chunks("{\"late\":true}", 2);
    let first = http
        .post(&jobs_url)
        .body(serde_json::to_string(&chunks[0]).unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), reqwest::StatusCode::OK);

    // Let the transfer go quiet past the inactivity timeout, then send
    // the second half: the abort must surface to this caller.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let second = http
        .post(&jobs_url)
        .body(serde_json::to_string(&chunks[1]).unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), reqwest::StatusCode::REQUEST_TIMEOUT);
    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "IncompleteTransfer");

    // Nothing half-assembled was delivered.
    let poll = http
        .get(format!("http://127.0.0.1:{}/jobs/next", handle.addr.port()))
        .send()
        .await
        .unwrap();
    let poll_body: serde_json::Value = poll.json().await.unwrap();
    assert!(poll_body["job"].is_null());
    handle.shutdown().await;
}

#[tokio::test]
async fn empty_bodies_are_rejected() {
    let (handle, _client) = broker_pair(quick_poll_config()).await;
    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/jobs", handle.addr.port()))
        .body("")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "MissingBody");
    handle.shutdown().await;
}
