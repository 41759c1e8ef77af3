use clap::Args;
use error_stack::{Result, ResultExt};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Url,
};

use crate::{
    error::EvmIngestError,
    gateway::{GatewayClient, GatewayClientOptions},
};

#[derive(Args, Clone, Debug)]
pub struct GatewayArgs {
    /// Archive gateway URL.
    #[arg(long = "gateway.url", env = "EVM_GATEWAY_URL")]
    pub gateway_url: String,

    /// Client id sent to the gateway.
    #[arg(
        long = "gateway.client-id",
        env = "EVM_GATEWAY_CLIENT_ID",
        default_value = "evm-ingest"
    )]
    pub gateway_client_id: String,

    /// Timeout for a single request, for example "60s" or "1m".
    #[arg(
        long = "gateway.timeout",
        env = "EVM_GATEWAY_TIMEOUT",
        default_value = "60s"
    )]
    pub gateway_timeout: String,

    /// Headers to send with the requests, as `key:value`.
    #[arg(long = "gateway.headers", env = "EVM_GATEWAY_HEADERS")]
    pub gateway_headers: Vec<String>,
}

impl GatewayArgs {
    pub fn to_gateway_client(&self) -> Result<GatewayClient, EvmIngestError> {
        let url = self
            .gateway_url
            .parse::<Url>()
            .change_context(EvmIngestError)
            .attach_printable("failed to parse gateway URL")
            .attach_printable_lazy(|| format!("url: {}", self.gateway_url))?;

        let timeout = duration_str::parse_std(&self.gateway_timeout).or_else(|err| {
            Err(EvmIngestError)
                .attach_printable("failed to parse gateway timeout")
                .attach_printable(format!("error: {}", err))
        })?;

        let headers = parse_headers(&self.gateway_headers)?;

        let options = GatewayClientOptions {
            timeout,
            client_id: self.gateway_client_id.clone(),
            headers,
        };

        GatewayClient::new(url, options)
            .change_context(EvmIngestError)
            .attach_printable("failed to create gateway client")
    }
}

fn parse_headers(raw: &[String]) -> Result<HeaderMap, EvmIngestError> {
    let mut headers = HeaderMap::default();

    for kv in raw {
        let (key, value) = kv
            .split_once(':')
            .ok_or(EvmIngestError)
            .attach_printable("invalid header")
            .attach_printable_lazy(|| format!("header: {}", kv))?;

        headers.insert(
            key.trim()
                .parse::<HeaderName>()
                .change_context(EvmIngestError)
                .attach_printable("invalid header name")
                .attach_printable_lazy(|| format!("header name: {}", key))?,
            value
                .trim()
                .parse::<HeaderValue>()
                .change_context(EvmIngestError)
                .attach_printable("invalid header value")
                .attach_printable_lazy(|| format!("header value: {}", value))?,
        );
    }

    Ok(headers)
}
