#![allow(dead_code)]
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use error_stack::Result;
use evm_ingest::{
    gateway::{BatchQuery, QueryResponse, StatusResponse},
    ArchiveGateway, GatewayError,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use wiremock::{http::Method, Match, Request};

/// Matches `POST /query` requests by the window they ask for.
pub struct QueryMatcher {
    from_block: u64,
    to_block: Option<u64>,
}

pub fn query_for(from_block: u64, to_block: Option<u64>) -> QueryMatcher {
    QueryMatcher {
        from_block,
        to_block,
    }
}

impl Match for QueryMatcher {
    fn matches(&self, req: &Request) -> bool {
        if req.method != Method::Post {
            return false;
        }

        match serde_json::from_slice::<BatchQuery>(&req.body) {
            Ok(query) => query.from_block == self.from_block && query.to_block == self.to_block,
            Err(_) => false,
        }
    }
}

pub fn status_json(height: i64) -> Value {
    json!({
        "parquetBlockNumber": height,
        "dbMaxBlockNumber": height,
        "dbMinBlockNumber": height,
    })
}

pub fn status(height: i64) -> StatusResponse {
    StatusResponse {
        parquet_block_number: height,
        db_max_block_number: height,
        db_min_block_number: height,
    }
}

/// Every third block has one log per queried address.
pub fn has_logs(block: u64) -> bool {
    block % 3 == 0
}

pub fn block_hash(block: u64) -> String {
    format!("0x{block:064x}")
}

/// In-memory archive gateway.
///
/// Status calls return the scripted heights in order, repeating the last
/// one. Queries are answered with synthetic rows and recorded.
#[derive(Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<FakeState>>,
    requested: Arc<AtomicUsize>,
}

#[derive(Default)]
struct FakeState {
    heights: VecDeque<i64>,
    current_height: i64,
    status_calls: usize,
    queries: Vec<BatchQuery>,
    response_height: Option<i64>,
    page_size: Option<u64>,
    block_limit: Option<usize>,
    fail_queries: bool,
    started: Option<mpsc::UnboundedSender<u64>>,
    requested_at_start: Vec<usize>,
}

impl FakeGateway {
    pub fn new(heights: impl IntoIterator<Item = i64>) -> Self {
        let state = FakeState {
            heights: heights.into_iter().collect(),
            current_height: -1,
            ..Default::default()
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            requested: Arc::default(),
        }
    }

    /// Report this height in query responses.
    pub fn with_response_height(self, height: i64) -> Self {
        self.state.lock().unwrap().response_height = Some(height);
        self
    }

    /// Answer at most `size` blocks per query and report a `nextBlock`.
    pub fn with_page_size(self, size: u64) -> Self {
        self.state.lock().unwrap().page_size = Some(size);
        self
    }

    /// Answer at most `limit` blocks per query, without a `nextBlock`.
    pub fn with_block_limit(self, limit: usize) -> Self {
        self.state.lock().unwrap().block_limit = Some(limit);
        self
    }

    /// Send the first block of every query as it starts.
    pub fn with_started_events(self) -> (Self, mpsc::UnboundedReceiver<u64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().started = Some(tx);
        (self, rx)
    }

    /// Record that the consumer asked for one more batch.
    ///
    /// Call before polling the stream so the count is never behind.
    pub fn request_batch(&self) {
        self.requested.fetch_add(1, Ordering::SeqCst);
    }

    /// For each query, the number of batches requested when it started.
    pub fn requested_at_start(&self) -> Vec<usize> {
        self.state.lock().unwrap().requested_at_start.clone()
    }

    /// Fail all queries with a non-retryable error.
    pub fn with_failing_queries(self) -> Self {
        self.state.lock().unwrap().fail_queries = true;
        self
    }

    pub fn queries(&self) -> Vec<BatchQuery> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn query_count(&self) -> usize {
        self.state.lock().unwrap().queries.len()
    }

    pub fn status_calls(&self) -> usize {
        self.state.lock().unwrap().status_calls
    }

    fn respond(&self, query: &str) -> Result<QueryResponse, GatewayError> {
        let query: BatchQuery = serde_json::from_str(query).map_err(|err| {
            error_stack::Report::new(err).change_context(GatewayError::Request)
        })?;

        let mut state = self.state.lock().unwrap();
        state.queries.push(query.clone());
        state
            .requested_at_start
            .push(self.requested.load(Ordering::SeqCst));
        if let Some(started) = state.started.as_ref() {
            let _ = started.send(query.from_block);
        }

        if state.fail_queries {
            return Err(error_stack::Report::new(GatewayError::Http(400)));
        }

        let height = state.response_height.unwrap_or(state.current_height);
        let to_block = query.to_block.unwrap_or(u64::try_from(height).unwrap_or(0));

        let (last, next_block) = match state.page_size {
            Some(size) if query.from_block + size <= to_block => {
                let next = query.from_block + size;
                (next - 1, Some(next))
            }
            _ => (to_block, None),
        };

        let limit = state.block_limit.unwrap_or(usize::MAX);
        let mut data = Vec::new();
        for block in (query.from_block..=last)
            .filter(|block| has_logs(*block))
            .take(limit)
        {
            for (index, address) in query.addresses.iter().enumerate() {
                data.push(json!({
                    "block": { "number": block, "hash": block_hash(block) },
                    "log": {
                        "address": address.address,
                        "logIndex": index,
                        "transactionIndex": 0,
                        "topics": [],
                    },
                    "transaction": {
                        "hash": format!("0x{block:x}00"),
                        "transactionIndex": 0,
                        "dest": address.address,
                    },
                }));
            }
        }

        let response = json!({
            "status": status_json(height),
            "data": data,
            "nextBlock": next_block,
        });

        Ok(serde_json::from_value(response).unwrap())
    }
}

impl ArchiveGateway for FakeGateway {
    async fn query(&self, query: &str) -> Result<QueryResponse, GatewayError> {
        self.respond(query)
    }

    async fn status(&self) -> Result<StatusResponse, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.status_calls += 1;

        let height = if state.heights.len() > 1 {
            state.heights.pop_front().unwrap_or(-1)
        } else {
            state.heights.front().copied().unwrap_or(-1)
        };
        state.current_height = height;

        Ok(status(height))
    }
}
