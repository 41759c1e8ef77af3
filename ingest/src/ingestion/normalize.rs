//! Convert gateway rows into ordered block data.
use std::collections::{BTreeMap, HashMap};

use error_stack::{Result, ResultExt};

use crate::{
    gateway::models::{BatchRow, BlockRow, LogRow, TransactionRow},
    request::BatchRequest,
};

use super::{
    block::{compare_items, BlockData, BlockHeader, Item, Log, Transaction},
    error::IngestError,
};

/// Rows of a single block, with transactions deduplicated by hash.
struct RowGroup {
    header: BlockRow,
    logs: Vec<LogRow>,
    transactions: Vec<TransactionRow>,
}

/// Group `rows` by block and build each block's item log.
///
/// Blocks are returned sorted by number.
pub fn normalize_rows<R: BatchRequest>(
    rows: Vec<BatchRow>,
    request: &R,
) -> Result<Vec<BlockData>, IngestError> {
    let mut groups = BTreeMap::<u64, RowGroup>::new();

    for row in rows {
        let BatchRow {
            block,
            log,
            transaction,
        } = row;

        let group = groups.entry(block.number).or_insert_with(|| RowGroup {
            header: block.clone(),
            logs: Vec::new(),
            transactions: Vec::new(),
        });

        if group.header.hash != block.hash {
            return Err(IngestError::InconsistentData)
                .attach_printable("rows for the same block have different hashes")
                .attach_printable_lazy(|| format!("block number: {}", block.number))
                .attach_printable_lazy(|| {
                    format!("block hashes: {} {}", group.header.hash, block.hash)
                });
        }

        if let Some(transaction) = transaction {
            if transaction.transaction_index != log.transaction_index {
                return Err(IngestError::InconsistentData)
                    .attach_printable("log references a transaction missing from the response")
                    .attach_printable_lazy(|| format!("block number: {}", block.number))
                    .attach_printable_lazy(|| format!("block hash: {}", block.hash))
                    .attach_printable_lazy(|| format!("log index: {}", log.log_index))
                    .attach_printable_lazy(|| {
                        format!(
                            "transaction index: {} != {}",
                            log.transaction_index, transaction.transaction_index
                        )
                    });
            }

            if !group
                .transactions
                .iter()
                .any(|existing| existing.hash == transaction.hash)
            {
                group.transactions.push(transaction);
            }
        }

        group.logs.push(log);
    }

    groups
        .into_values()
        .map(|group| {
            let number = group.header.number;
            let hash = group.header.hash.clone();
            build_block(group, request)
                .attach_printable_lazy(|| format!("block number: {number}"))
                .attach_printable_lazy(|| format!("block hash: {hash}"))
        })
        .collect()
}

fn build_block<R: BatchRequest>(group: RowGroup, request: &R) -> Result<BlockData, IngestError> {
    let RowGroup {
        header,
        logs,
        transactions,
    } = group;

    let fragment = short_hash(&header.hash).to_string();
    let number = header.number;

    let transactions = transactions
        .into_iter()
        .map(|transaction| {
            let transaction = Transaction::from_row(transaction, number, &fragment);
            (transaction.index, transaction)
        })
        .collect::<BTreeMap<_, _>>();

    let mut items = Vec::with_capacity(logs.len());
    let mut seen_logs = HashMap::with_capacity(logs.len());

    for log in logs {
        if let Some(previous) = seen_logs.insert(log.log_index, log.transaction_index) {
            if previous != log.transaction_index {
                return Err(IngestError::InconsistentData)
                    .attach_printable("log index is used by two transactions")
                    .attach_printable_lazy(|| format!("log index: {}", log.log_index));
            }
            continue;
        }

        let transaction = transactions.get(&log.transaction_index).cloned();
        let log = Log::from_row(log, number, &fragment, transaction);
        items.push(Item::Log {
            address: log.address.clone(),
            log,
        });
    }

    if request.transaction_request().is_some() {
        for transaction in transactions.into_values() {
            let Some(address) = matching_address(request, transaction.dest.as_deref()) else {
                continue;
            };

            items.push(Item::Transaction {
                address,
                transaction,
            });
        }
    }

    items.sort_by(compare_items);

    Ok(BlockData {
        header: BlockHeader::from_row(header, &fragment),
        items,
    })
}

/// The request address `dest` refers to, in the request's spelling.
fn matching_address<R: BatchRequest>(request: &R, dest: Option<&str>) -> Option<String> {
    let dest = dest?;
    request
        .addresses()
        .iter()
        .find(|address| address.address.eq_ignore_ascii_case(dest))
        .map(|address| address.address.clone())
}

/// Four characters of the hash, skipping the `0x` prefix and the first digit.
pub fn short_hash(hash: &str) -> &str {
    let end = hash.len().min(7);
    let start = end.min(3);
    hash.get(start..end).unwrap_or_default()
}

impl BlockHeader {
    fn from_row(row: BlockRow, fragment: &str) -> Self {
        BlockHeader {
            id: format!("{}-{}", row.number, fragment),
            number: row.number,
            hash: row.hash,
            parent_hash: row.parent_hash,
            nonce: row.nonce,
            sha3_uncles: row.sha3_uncles,
            logs_bloom: row.logs_bloom,
            transactions_root: row.transactions_root,
            state_root: row.state_root,
            receipts_root: row.receipts_root,
            miner: row.miner,
            difficulty: row.difficulty,
            total_difficulty: row.total_difficulty,
            extra_data: row.extra_data,
            size: row.size,
            gas_limit: row.gas_limit,
            gas_used: row.gas_used,
            timestamp: row.timestamp,
        }
    }
}

impl Log {
    fn from_row(row: LogRow, block: u64, fragment: &str, transaction: Option<Transaction>) -> Self {
        Log {
            id: format!("{}-{}-{}", block, row.log_index, fragment),
            address: row.address,
            data: row.data,
            index: row.log_index,
            removed: row.removed,
            topics: row.topics.unwrap_or_default(),
            transaction_index: row.transaction_index,
            transaction_hash: row.transaction_hash,
            transaction,
        }
    }
}

impl Transaction {
    fn from_row(row: TransactionRow, block: u64, fragment: &str) -> Self {
        Transaction {
            id: format!("{}-{}-{}", block, row.transaction_index, fragment),
            index: row.transaction_index,
            hash: row.hash,
            source: row.source,
            dest: row.dest,
            gas: row.gas,
            gas_price: row.gas_price,
            input: row.input,
            nonce: row.nonce,
            value: row.value,
            kind: row.kind,
            chain_id: row.chain_id,
            v: row.v,
            r: row.r,
            s: row.s,
        }
    }
}
