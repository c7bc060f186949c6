//! Pinning client tests against a wiremock server: request construction,
//! response parsing, the retry/permanent failure split, and gateway reads.

use std::time::Duration;

use anchora_core::retry::RetryPolicy;
use anchora_ipfs::{IpfsError, PinataClient, PinataConfig};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> PinataClient {
    let mut config = PinataConfig::new("test-jwt");
    config.api_url = server.uri();
    config.gateway_url = server.uri();
    config.retry = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
    };
    PinataClient::new(config).expect("client build")
}

#[tokio::test]
async fn pin_json_returns_cid_and_sends_auth() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pinning/pinJSONToIPFS"))
        .and(header("Authorization", "Bearer test-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "IpfsHash": "QmTestCid123",
            "PinSize": 512,
            "Timestamp": "2026-03-14T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let cid = client
        .pin_json(&serde_json::json!({"invoiceId": 1}), "invoice-1-1700000000.json")
        .await
        .expect("pin");
    assert_eq!(cid, "QmTestCid123");
}

#[tokio::test]
async fn pin_json_retries_server_errors_until_success() {
    let server = MockServer::start().await;

    // First response is a 503; wiremock falls through to the second mock
    // once the first is exhausted.
    Mock::given(method("POST"))
        .and(path("/pinning/pinJSONToIPFS"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/pinning/pinJSONToIPFS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "IpfsHash": "QmAfterRetry"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let cid = client
        .pin_json(&serde_json::json!({"invoiceId": 2}), "invoice-2.json")
        .await
        .expect("pin should succeed after retry");
    assert_eq!(cid, "QmAfterRetry");
}

#[tokio::test]
async fn pin_json_does_not_retry_client_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pinning/pinJSONToIPFS"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .pin_json(&serde_json::json!({"invoiceId": 3}), "invoice-3.json")
        .await
        .expect_err("4xx must be permanent");
    assert!(matches!(err, IpfsError::Permanent { status: 400, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn rate_limit_responses_are_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pinning/pinJSONToIPFS"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .pin_json(&serde_json::json!({}), "invoice-4.json")
        .await
        .expect_err("429 with no recovery must exhaust retries");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn get_json_returns_content_on_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ipfs/QmBatchMeta"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "cids": ["QmA", "QmB"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let value = client.get_json("QmBatchMeta").await.expect("fetch").expect("present");
    assert_eq!(value["cids"][0], "QmA");
}

#[tokio::test]
async fn get_json_maps_not_found_to_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ipfs/QmMissing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let value = client.get_json("QmMissing").await.expect("fetch");
    assert!(value.is_none());
}

#[tokio::test]
async fn is_pinned_reflects_pin_list_count() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/pinList"))
        .and(query_param("hashContains", "QmPinned"))
        .and(query_param("status", "pinned"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 1,
            "rows": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/pinList"))
        .and(query_param("hashContains", "QmGone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 0,
            "rows": []
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.is_pinned("QmPinned").await.expect("lookup"));
    assert!(!client.is_pinned("QmGone").await.expect("lookup"));
}

#[tokio::test]
async fn malformed_pin_response_is_a_deserialization_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pinning/pinJSONToIPFS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "unexpected": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .pin_json(&serde_json::json!({}), "invoice-5.json")
        .await
        .expect_err("missing IpfsHash must fail");
    assert!(matches!(err, IpfsError::Deserialization { .. }));
}
