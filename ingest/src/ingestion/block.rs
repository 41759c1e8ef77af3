//! Normalized block data handed to consumers.
use std::cmp::Ordering;

use serde::Serialize;

use crate::gateway::models::Quantity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    /// `{number}-{hash fragment}`.
    pub id: String,
    pub number: u64,
    pub hash: String,
    pub parent_hash: Option<String>,
    pub nonce: Option<Quantity>,
    pub sha3_uncles: Option<String>,
    pub logs_bloom: Option<String>,
    pub transactions_root: Option<String>,
    pub state_root: Option<String>,
    pub receipts_root: Option<String>,
    pub miner: Option<String>,
    pub difficulty: Option<Quantity>,
    pub total_difficulty: Option<Quantity>,
    pub extra_data: Option<String>,
    pub size: Option<u64>,
    pub gas_limit: Option<Quantity>,
    pub gas_used: Option<Quantity>,
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// `{block}-{index}-{block hash fragment}`.
    pub id: String,
    pub address: String,
    pub data: Option<String>,
    pub index: u64,
    pub removed: Option<bool>,
    pub topics: Vec<String>,
    pub transaction_index: u64,
    pub transaction_hash: Option<String>,
    /// The transaction that emitted the log, if it's part of the response.
    pub transaction: Option<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// `{block}-{index}-{block hash fragment}`.
    pub id: String,
    pub index: u64,
    pub hash: String,
    pub source: Option<String>,
    pub dest: Option<String>,
    pub gas: Option<u64>,
    pub gas_price: Option<Quantity>,
    pub input: Option<String>,
    pub nonce: Option<u64>,
    pub value: Option<Quantity>,
    pub kind: Option<u64>,
    pub chain_id: Option<u64>,
    pub v: Option<u64>,
    pub r: Option<String>,
    pub s: Option<String>,
}

/// An entry in a block's item log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Item {
    Log { address: String, log: Log },
    Transaction { address: String, transaction: Transaction },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockData {
    pub header: BlockHeader,
    /// Sorted by [compare_items].
    pub items: Vec<Item>,
}

/// Execution order of two items in the same block.
///
/// Logs are ordered by transaction and log index, transactions by index. A
/// log sorts before the transaction that emitted it.
pub fn compare_items(a: &Item, b: &Item) -> Ordering {
    match (a, b) {
        (Item::Log { log: a, .. }, Item::Log { log: b, .. }) => {
            (a.transaction_index, a.index).cmp(&(b.transaction_index, b.index))
        }
        (Item::Transaction { transaction: a, .. }, Item::Transaction { transaction: b, .. }) => {
            a.index.cmp(&b.index)
        }
        (Item::Log { log, .. }, Item::Transaction { transaction, .. }) => log
            .transaction_index
            .cmp(&transaction.index)
            .then(Ordering::Less),
        (Item::Transaction { .. }, Item::Log { .. }) => compare_items(b, a).reverse(),
    }
}

impl BlockData {
    pub fn logs(&self) -> impl Iterator<Item = &Log> {
        self.items.iter().filter_map(|item| match item {
            Item::Log { log, .. } => Some(log),
            Item::Transaction { .. } => None,
        })
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.items.iter().filter_map(|item| match item {
            Item::Transaction { transaction, .. } => Some(transaction),
            Item::Log { .. } => None,
        })
    }
}
