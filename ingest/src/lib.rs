//! Ingest EVM logs and transactions from an archive gateway.
//!
//! The crate is split in three layers:
//!
//!  - [request]: the filters that describe what data to fetch and for which blocks.
//!  - [gateway]: the HTTP client used to query the archive, with retries.
//!  - [ingestion]: the engine that turns filters into an ordered stream of
//!    [ingestion::DataBatch].
#[macro_use]
mod macros;

pub mod cli;
pub mod error;
pub mod gateway;
pub mod ingestion;
pub mod request;

pub use self::gateway::{ArchiveGateway, GatewayClient, GatewayClientOptions, GatewayError};
pub use self::ingestion::{DataBatch, DataBatchStream, Ingest, IngestError, IngestOptions};
pub use self::request::{Batch, BatchRequest, BlockRange, PlainBatchRequest};
