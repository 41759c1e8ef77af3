//! Filters describing which data to ingest.
mod batch;
mod selection;

use error_stack::{Result, ResultExt};
use serde::{Deserialize, Serialize};

pub use self::batch::{apply_range_bound, merge_batches, Batch, BlockRange};
pub use self::selection::{union_option, LogRequest, TransactionRequest};

/// EVM topic filter.
///
/// Each position lists the accepted values for the topic at that index, an
/// empty position matches any value.
pub type TopicSet = Vec<Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRequest {
    pub address: String,
    pub topics: TopicSet,
}

/// The data requested for a batch of blocks.
pub trait BatchRequest: Clone + Send + Sync + 'static {
    /// Contracts (and their topic filters) to fetch logs for.
    fn addresses(&self) -> &[AddressRequest];

    /// Log fields to fetch, `None` if logs are fetched with the default fields.
    fn log_request(&self) -> Option<&LogRequest>;

    /// Transaction fields to fetch, `None` if transactions are not requested.
    fn transaction_request(&self) -> Option<&TransactionRequest>;
}

/// A [BatchRequest] built from a list of addresses and field selections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlainBatchRequest {
    pub addresses: Vec<AddressRequest>,
    pub logs: Option<LogRequest>,
    pub transactions: Option<TransactionRequest>,
}

#[derive(Debug, Clone)]
pub enum RequestError {
    InvalidRange,
    InvalidAddress,
}

impl PlainBatchRequest {
    /// Request the logs emitted by `address` that match `topics`.
    pub fn for_log(address: impl AsRef<str>, topics: TopicSet, logs: LogRequest) -> Self {
        Self {
            addresses: vec![AddressRequest {
                address: address.as_ref().to_lowercase(),
                topics,
            }],
            logs: Some(logs),
            transactions: None,
        }
    }

    /// Also request the transactions sent to the request's addresses.
    pub fn with_transactions(mut self, transactions: TransactionRequest) -> Self {
        self.transactions = Some(transactions);
        self
    }

    /// Merge two requests into a request for the data of both.
    ///
    /// Addresses are concatenated without deduplication, field selections are
    /// unioned.
    pub fn merge(&self, other: &PlainBatchRequest) -> PlainBatchRequest {
        let mut addresses = Vec::with_capacity(self.addresses.len() + other.addresses.len());
        addresses.extend(self.addresses.iter().cloned());
        addresses.extend(other.addresses.iter().cloned());

        PlainBatchRequest {
            addresses,
            logs: union_option(self.logs.as_ref(), other.logs.as_ref(), LogRequest::union),
            transactions: union_option(
                self.transactions.as_ref(),
                other.transactions.as_ref(),
                TransactionRequest::union,
            ),
        }
    }
}

impl AddressRequest {
    /// Parse an `address[:topic0,topic0]` filter.
    ///
    /// The listed topics are the accepted values for the first topic, no
    /// topics means every log of the contract.
    pub fn parse(filter: &str) -> Result<Self, RequestError> {
        let (address, topics) = match filter.split_once(':') {
            Some((address, topics)) => (address, Some(topics)),
            None => (filter, None),
        };

        let address =
            parse_hex(address, 20).attach_printable_lazy(|| format!("filter: {filter}"))?;

        let topics = match topics {
            None => Vec::new(),
            Some(topics) => {
                let topic0 = topics
                    .split(',')
                    .map(|topic| parse_hex(topic, 32))
                    .collect::<Result<Vec<_>, _>>()
                    .attach_printable_lazy(|| format!("filter: {filter}"))?;
                vec![topic0]
            }
        };

        Ok(Self { address, topics })
    }
}

/// Lowercase `value` after checking it's a `0x` prefixed hex string of `bytes` bytes.
fn parse_hex(value: &str, bytes: usize) -> Result<String, RequestError> {
    let value = value.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or_default();

    if digits.len() != bytes * 2 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(RequestError::InvalidAddress)
            .attach_printable_lazy(|| format!("expected {bytes} bytes hex string, got: {value}"));
    }

    Ok(value.to_lowercase())
}

impl BatchRequest for PlainBatchRequest {
    fn addresses(&self) -> &[AddressRequest] {
        &self.addresses
    }

    fn log_request(&self) -> Option<&LogRequest> {
        self.logs.as_ref()
    }

    fn transaction_request(&self) -> Option<&TransactionRequest> {
        self.transactions.as_ref()
    }
}

impl error_stack::Context for RequestError {}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::InvalidRange => write!(f, "request error: invalid block range"),
            RequestError::InvalidAddress => write!(f, "request error: invalid address filter"),
        }
    }
}
