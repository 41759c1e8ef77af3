mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use evm_ingest::{ArchiveGateway, GatewayClient, GatewayClientOptions, GatewayError};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Url,
};
use serde_json::json;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use wiremock::{
    matchers::{body_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::common::{query_for, status_json};

const QUERY: &str = r#"{"fromBlock":0,"toBlock":10,"addresses":[],"fieldSelection":{"block":{},"log":{},"transaction":{}}}"#;

fn new_client(server: &MockServer) -> GatewayClient {
    new_client_with_options(server, GatewayClientOptions::default())
}

fn new_client_with_options(server: &MockServer, options: GatewayClientOptions) -> GatewayClient {
    let url = server.uri().parse::<Url>().unwrap();
    GatewayClient::new(url, options).unwrap()
}

fn query_response(height: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": status_json(height),
        "data": [],
    }))
}

async fn received_requests(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn test_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "parquetBlockNumber": 16_000_000,
            "dbMaxBlockNumber": 16_000_100,
            "dbMinBlockNumber": 15_999_000,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = new_client(&server);
    let status = client.status().await.unwrap();

    assert_eq!(status.archive_height(), 16_000_100);
}

#[tokio::test]
async fn test_query_sends_headers_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .and(header("accept", "application/json"))
        .and(header("content-type", "application/json; charset=UTF-8"))
        .and(header("x-squid-id", "test-client"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(serde_json::from_str::<serde_json::Value>(QUERY).unwrap()))
        .respond_with(query_response(100))
        .expect(1)
        .mount(&server)
        .await;

    let mut headers = HeaderMap::new();
    headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
    let options = GatewayClientOptions {
        client_id: "test-client".to_string(),
        headers,
        ..Default::default()
    };

    let client = new_client_with_options(&server, options);
    let response = client.query(QUERY).await.unwrap();

    assert_eq!(response.status.archive_height(), 100);
    assert!(response.data.is_empty());
    assert_eq!(response.next_block, None);
}

#[tokio::test]
async fn test_query_retries_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(query_for(0, Some(10)))
        .respond_with(query_response(100))
        .mount(&server)
        .await;

    let client = new_client(&server);
    let response = client.query(QUERY).await.unwrap();

    assert_eq!(response.status.archive_height(), 100);
    assert_eq!(received_requests(&server).await, 3);
}

#[tokio::test]
async fn test_query_retries_rate_limit_and_bad_gateway() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .respond_with(query_response(100))
        .mount(&server)
        .await;

    let client = new_client(&server);
    client.query(QUERY).await.unwrap();

    assert_eq!(received_requests(&server).await, 3);
}

#[tokio::test]
async fn test_query_retries_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(query_response(100).set_delay(Duration::from_secs(2)))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .respond_with(query_response(100))
        .mount(&server)
        .await;

    let options = GatewayClientOptions {
        timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let client = new_client_with_options(&server, options);
    client.query(QUERY).await.unwrap();

    assert_eq!(received_requests(&server).await, 2);
}

#[tokio::test]
async fn test_status_retries_dropped_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];

        // Read the first request and close the connection without answering.
        let (mut socket, _) = listener.accept().await.unwrap();
        let _ = socket.read(&mut buf).await.unwrap();
        drop(socket);

        let (mut socket, _) = listener.accept().await.unwrap();
        let _ = socket.read(&mut buf).await.unwrap();
        let body = status_json(42).to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    let url = format!("http://{address}").parse::<Url>().unwrap();
    let client = GatewayClient::new(url, GatewayClientOptions::default()).unwrap();
    let status = client.status().await.unwrap();

    assert_eq!(status.archive_height(), 42);
    server.await.unwrap();
}

#[tokio::test]
async fn test_bad_request_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid query"))
        .mount(&server)
        .await;

    let client = new_client(&server);
    let err = client.query(QUERY).await.unwrap_err();

    assert_matches!(err.current_context(), GatewayError::Http(400));
    assert!(format!("{err:?}").contains("invalid query"));
    assert_eq!(received_requests(&server).await, 1);
}

#[tokio::test]
async fn test_archive_errors_are_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "message": "block range is too large" }],
        })))
        .mount(&server)
        .await;

    let client = new_client(&server);
    let err = client.query(QUERY).await.unwrap_err();

    assert_matches!(err.current_context(), GatewayError::Archive);
    assert!(format!("{err:?}").contains("Archive error: block range is too large"));
    assert_eq!(received_requests(&server).await, 1);
}

#[tokio::test]
async fn test_malformed_response_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = new_client(&server);
    let err = client.query(QUERY).await.unwrap_err();

    assert_matches!(err.current_context(), GatewayError::DeserializeResponse);
    assert_eq!(received_requests(&server).await, 1);
}

#[tokio::test]
async fn test_empty_errors_array_is_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": status_json(10),
            "data": [],
            "errors": [],
        })))
        .mount(&server)
        .await;

    let client = new_client(&server);
    let response = client.query(QUERY).await.unwrap();

    assert_eq!(response.status.archive_height(), 10);
}
