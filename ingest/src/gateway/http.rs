use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::{Duration, Instant},
};

use error_stack::{Result, ResultExt};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, CONTENT_TYPE},
    Client, Method, Url,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::{
    error::{transport_error, GatewayError, GatewayErrorExt},
    metrics::GatewayMetrics,
    models::{QueryResponse, StatusResponse},
    ArchiveGateway,
};

/// Delay before each retry, indexed by the number of consecutive failures.
pub const BACKOFF_MS: [u64; 6] = [100, 500, 2_000, 5_000, 10_000, 20_000];

/// Header used by the gateway to identify the caller.
pub const CLIENT_ID_HEADER: &str = "x-squid-id";

const REQUEST_ID_WRAP: u32 = 1_000;

/// HTTP client for the archive gateway.
///
/// Transient failures (rate limiting, unavailable upstream, timeouts, refused
/// connections) are retried forever following [BACKOFF_MS]. Any other failure
/// is returned to the caller immediately.
pub struct GatewayClient {
    client: Client,
    url: String,
    options: GatewayClientOptions,
    metrics: GatewayMetrics,
    request_counter: AtomicU32,
}

#[derive(Debug, Clone)]
pub struct GatewayClientOptions {
    /// Timeout for a single request attempt, including reading the body.
    pub timeout: Duration,
    /// Sent in the [CLIENT_ID_HEADER] header.
    pub client_id: String,
    /// Extra headers to send with the requests.
    pub headers: HeaderMap<HeaderValue>,
}

impl GatewayClient {
    pub fn new(url: Url, options: GatewayClientOptions) -> Result<Self, GatewayError> {
        HeaderValue::from_str(&options.client_id)
            .change_context(GatewayError::Configuration)
            .attach_printable("client id is not a valid header value")
            .attach_printable_lazy(|| format!("client id: {}", options.client_id))?;

        let url = url.as_str().trim_end_matches('/').to_string();

        Ok(Self {
            client: Client::new(),
            url,
            options,
            metrics: GatewayMetrics::new(),
            request_counter: AtomicU32::new(0),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the id used to correlate the log lines of the next request.
    fn next_request_id(&self) -> u32 {
        let previous = self
            .request_counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
                Some((id + 1) % REQUEST_ID_WRAP)
            })
            .unwrap_or_default();
        (previous + 1) % REQUEST_ID_WRAP
    }

    async fn request<T>(&self, method: Method, path: &str, body: Option<&str>) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.url, path);
        let request_id = self.next_request_id();
        let started_at = Instant::now();

        debug!(url = %url, request_id, query = ?body, "gateway request");

        let mut errors = 0;
        let value = loop {
            match self.send_request(method.clone(), &url, body).await {
                Ok(value) => break value,
                Err(err) if err.is_retryable() => {
                    let backoff = backoff_delay(errors);
                    errors += 1;
                    self.metrics.record_retry(&self.url);
                    warn!(
                        url = %url,
                        request_id,
                        attempt = errors,
                        backoff = ?backoff,
                        query = ?body,
                        reason = %err,
                        "gateway request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    return Err(err)
                        .attach_printable_lazy(|| format!("url: {url}"))
                        .attach_printable_lazy(|| format!("request id: {request_id}"));
                }
            }
        };

        self.metrics.record_response(&self.url, started_at.elapsed());
        debug!(url = %url, request_id, attempts = errors + 1, "gateway response");
        trace!(url = %url, request_id, response = %value, "gateway response body");

        serde_json::from_value(value)
            .change_context(GatewayError::DeserializeResponse)
            .attach_printable_lazy(|| format!("url: {url}"))
            .attach_printable_lazy(|| format!("request id: {request_id}"))
    }

    /// Send a single request attempt and return the response as JSON.
    async fn send_request(&self, method: Method, url: &str, body: Option<&str>) -> Result<Value, GatewayError> {
        let mut request = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json")
            .header(ACCEPT_ENCODING, "gzip, br")
            .header(CLIENT_ID_HEADER, self.options.client_id.as_str())
            .headers(self.options.headers.clone())
            .timeout(self.options.timeout);

        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json; charset=UTF-8")
                .body(body.to_string());
        }

        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http(status.as_u16()))
                .attach_printable_lazy(|| format!("response body: {body}"));
        }

        let text = response.text().await.map_err(transport_error)?;

        let value: Value = serde_json::from_str(&text)
            .change_context(GatewayError::DeserializeResponse)
            .attach_printable("response is not valid JSON")?;

        if let Some(errors) = value.get("errors").and_then(Value::as_array) {
            if let Some(first) = errors.first() {
                let message = first
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                return Err(GatewayError::Archive)
                    .attach_printable(format!("Archive error: {message}"))
                    .attach_printable_lazy(|| format!("errors: {}", Value::Array(errors.clone())));
            }
        }

        Ok(value)
    }
}

impl ArchiveGateway for GatewayClient {
    async fn query(&self, query: &str) -> Result<QueryResponse, GatewayError> {
        self.request(Method::POST, "/query", Some(query)).await
    }

    async fn status(&self) -> Result<StatusResponse, GatewayError> {
        self.request(Method::GET, "/status", None).await
    }
}

/// The delay before the next attempt after `errors` consecutive failures.
pub fn backoff_delay(errors: usize) -> Duration {
    let index = errors.min(BACKOFF_MS.len() - 1);
    Duration::from_millis(BACKOFF_MS[index])
}

impl Default for GatewayClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            client_id: "evm-ingest".to_string(),
            headers: HeaderMap::default(),
        }
    }
}
