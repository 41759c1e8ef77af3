//! Client for the EVM archive gateway.
mod error;
mod http;
mod metrics;
pub mod models;

use std::future::Future;

use error_stack::Result;

pub use self::error::{GatewayError, GatewayErrorExt};
pub use self::http::{backoff_delay, GatewayClient, GatewayClientOptions, BACKOFF_MS, CLIENT_ID_HEADER};
pub use self::models::{BatchQuery, FieldSelection, QueryResponse, StatusResponse};

/// The operations the ingestion engine needs from the archive.
///
/// Implementations are expected to retry transient failures internally, any
/// error returned is considered fatal.
pub trait ArchiveGateway: Send + Sync + 'static {
    /// Send a serialized [BatchQuery] and return the matching rows.
    fn query(&self, query: &str) -> impl Future<Output = Result<QueryResponse, GatewayError>> + Send;

    /// Fetch the archive's status.
    fn status(&self) -> impl Future<Output = Result<StatusResponse, GatewayError>> + Send;
}
