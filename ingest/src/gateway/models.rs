//! Gateway wire format.
//!
//! The gateway answers a query with one row per matching log, each row carrying
//! the log, its block and (when selected) its transaction. Numeric fields are
//! accepted both as JSON numbers and as decimal strings.
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::request::{AddressRequest, BatchRequest, TransactionRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub parquet_block_number: i64,
    pub db_max_block_number: i64,
    pub db_min_block_number: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub status: StatusResponse,
    #[serde(alias = "batch", default)]
    pub data: Vec<BatchRow>,
    /// First block not covered by this response, if the gateway stopped early.
    #[serde(default)]
    pub next_block: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRow {
    pub block: BlockRow,
    pub log: LogRow,
    #[serde(default)]
    pub transaction: Option<TransactionRow>,
}

/// A big number, sent either as a JSON number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Number(u64),
    Text(String),
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRow {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub number: u64,
    pub hash: String,
    #[serde(default)]
    pub parent_hash: Option<String>,
    #[serde(default)]
    pub nonce: Option<Quantity>,
    #[serde(default)]
    pub sha3_uncles: Option<String>,
    #[serde(default)]
    pub logs_bloom: Option<String>,
    #[serde(default)]
    pub transactions_root: Option<String>,
    #[serde(default)]
    pub state_root: Option<String>,
    #[serde(default)]
    pub receipts_root: Option<String>,
    #[serde(default)]
    pub miner: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Quantity>,
    #[serde(default)]
    pub total_difficulty: Option<Quantity>,
    #[serde(default)]
    pub extra_data: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub size: Option<u64>,
    #[serde(default)]
    pub gas_limit: Option<Quantity>,
    #[serde(default)]
    pub gas_used: Option<Quantity>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub timestamp: Option<u64>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRow {
    pub address: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(alias = "index")]
    pub log_index: u64,
    #[serde(default)]
    pub removed: Option<bool>,
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub transaction_index: u64,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRow {
    pub hash: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(alias = "index")]
    pub transaction_index: u64,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub dest: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub gas: Option<u64>,
    #[serde(default)]
    pub gas_price: Option<Quantity>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub nonce: Option<u64>,
    #[serde(default)]
    pub value: Option<Quantity>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub kind: Option<u64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub chain_id: Option<u64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub v: Option<u64>,
    #[serde(default)]
    pub r: Option<String>,
    #[serde(default)]
    pub s: Option<String>,
}

/// Body of a `POST /query` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchQuery {
    pub from_block: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_block: Option<u64>,
    pub addresses: Vec<AddressRequest>,
    pub field_selection: FieldSelection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldSelection {
    #[serde(default)]
    pub block: BlockFieldSelection,
    #[serde(default)]
    pub log: LogFieldSelection,
    #[serde(default)]
    pub transaction: TransactionFieldSelection,
}

field_flags! {
    pub struct BlockFieldSelection {
        pub number,
        pub hash,
        pub parent_hash,
        pub nonce,
        pub sha3_uncles,
        pub logs_bloom,
        pub transactions_root,
        pub state_root,
        pub receipts_root,
        pub miner,
        pub difficulty,
        pub total_difficulty,
        pub extra_data,
        pub size,
        pub gas_limit,
        pub gas_used,
        pub timestamp,
    }
}

field_flags! {
    pub struct LogFieldSelection {
        pub address,
        pub data,
        pub index,
        pub removed,
        pub topics,
        pub transaction_index,
    }
}

field_flags! {
    pub struct TransactionFieldSelection {
        pub source,
        pub gas,
        pub gas_price,
        pub hash,
        pub input,
        pub nonce,
        pub dest,
        pub index,
        pub value,
        pub kind,
        pub chain_id,
        pub v,
        pub r,
        pub s,
    }
}

impl StatusResponse {
    /// The highest block the archive has data for, or `-1` if it has no data.
    ///
    /// Recent blocks are served from the database tier until the parquet tier
    /// catches up with the database's lowest block.
    pub fn archive_height(&self) -> i64 {
        let height = if self.parquet_block_number > self.db_min_block_number {
            self.db_max_block_number
        } else {
            self.parquet_block_number
        };

        if height == 0 {
            -1
        } else {
            height
        }
    }
}

impl FieldSelection {
    /// Fields needed to assemble blocks, always selected.
    pub fn required() -> Self {
        Self {
            block: BlockFieldSelection::all(),
            log: LogFieldSelection {
                address: true,
                index: true,
                transaction_index: true,
                ..Default::default()
            },
            transaction: TransactionFieldSelection {
                dest: true,
                index: true,
                hash: true,
                ..Default::default()
            },
        }
    }

    /// The fields to select to satisfy `request`.
    pub fn for_request<R: BatchRequest>(request: &R) -> Self {
        let mut selection = Self::required();

        if let Some(logs) = request.log_request() {
            selection.log = selection.log.union(&LogFieldSelection {
                data: logs.data,
                removed: logs.removed,
                topics: logs.topics,
                ..Default::default()
            });

            if let Some(transaction) = logs.transaction.as_ref() {
                selection.transaction = selection.transaction.union(&transaction.into());
            }
        }

        if let Some(transaction) = request.transaction_request() {
            selection.transaction = selection.transaction.union(&transaction.into());
        }

        selection
    }
}

impl From<&TransactionRequest> for TransactionFieldSelection {
    fn from(request: &TransactionRequest) -> Self {
        Self {
            source: request.source,
            gas: request.gas,
            gas_price: request.gas_price,
            hash: request.hash,
            input: request.input,
            nonce: request.nonce,
            value: request.value,
            kind: request.kind,
            chain_id: request.chain_id,
            v: request.v,
            r: request.r,
            s: request.s,
            ..Default::default()
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Number(n) => write!(f, "{}", n),
            Quantity::Text(s) => write!(f, "{}", s),
        }
    }
}
