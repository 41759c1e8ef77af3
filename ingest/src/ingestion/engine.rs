use std::{
    collections::VecDeque,
    ops::RangeInclusive,
    pin::Pin,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use error_stack::{Report, Result, ResultExt};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace};

use crate::{
    gateway::{ArchiveGateway, BatchQuery, FieldSelection},
    request::{Batch, BatchRequest, BlockRange},
};

use super::{
    block::BlockData,
    error::IngestError,
    height::{height_reaches, ArchiveHeight},
    normalize::normalize_rows,
};

/// Maximum number of batches fetched ahead of the consumer.
pub const MAX_QUEUE_SIZE: usize = 3;

pub const DEFAULT_BATCH_SIZE: u64 = 100;

#[derive(Debug, Clone)]
pub struct IngestOptions<R> {
    /// Work to do, sorted by block and non-overlapping.
    pub batches: Vec<Batch<R>>,
    /// Maximum number of blocks past the first block of a window.
    pub batch_size: u64,
    /// How often to poll the archive status while waiting for new blocks.
    pub poll_interval: Duration,
}

/// The data fetched for one window of a batch.
#[derive(Debug, Clone)]
pub struct DataBatch<R> {
    /// Blocks covered by this batch, including blocks without data.
    pub range: RangeInclusive<u64>,
    pub request: R,
    pub blocks: Vec<BlockData>,
    pub fetch_start: Instant,
    pub fetch_end: Instant,
}

/// Fetches the configured batches from the archive.
pub struct Ingest<G, R> {
    gateway: G,
    options: IngestOptions<R>,
    archive_height: ArchiveHeight,
}

/// Stream of [DataBatch] produced by [Ingest::produce_blocks].
///
/// The stream ends once all batches have been fetched. After an error, the
/// error is the last item of the stream.
pub struct DataBatchStream<R> {
    inner: ReceiverStream<Result<DataBatch<R>, IngestError>>,
    archive_height: ArchiveHeight,
}

impl<G, R> Ingest<G, R>
where
    G: ArchiveGateway,
    R: BatchRequest,
{
    pub fn new(gateway: G, options: IngestOptions<R>) -> Result<Self, IngestError> {
        if options.batch_size == 0 {
            return Err(IngestError::Configuration).attach_printable("batch size must be positive");
        }

        for pair in options.batches.windows(2) {
            let (current, next) = (&pair[0].range, &pair[1].range);
            if current.end() >= next.from() {
                return Err(IngestError::Configuration)
                    .attach_printable("batches must be sorted and non-overlapping")
                    .attach_printable_lazy(|| format!("ranges: {current} {next}"));
            }
        }

        Ok(Self {
            gateway,
            options,
            archive_height: ArchiveHeight::new(),
        })
    }

    /// The highest archive height observed so far, `-1` if none.
    pub fn latest_known_archive_height(&self) -> i64 {
        self.archive_height.get()
    }

    /// Start fetching blocks in the background.
    ///
    /// At most [MAX_QUEUE_SIZE] batches are fetched ahead of the consumer.
    /// Dropping the stream stops the background task.
    pub fn produce_blocks(self) -> DataBatchStream<R> {
        let (tx, rx) = mpsc::channel(MAX_QUEUE_SIZE);

        let fetch_loop = FetchLoop {
            gateway: self.gateway,
            queue: self.options.batches.into(),
            batch_size: self.options.batch_size,
            poll_interval: self.options.poll_interval,
            archive_height: self.archive_height.clone(),
        };

        tokio::spawn(fetch_loop.run(tx));

        DataBatchStream {
            inner: ReceiverStream::new(rx),
            archive_height: self.archive_height,
        }
    }
}

struct FetchLoop<G, R> {
    gateway: G,
    queue: VecDeque<Batch<R>>,
    batch_size: u64,
    poll_interval: Duration,
    archive_height: ArchiveHeight,
}

impl<G, R> FetchLoop<G, R>
where
    G: ArchiveGateway,
    R: BatchRequest,
{
    async fn run(mut self, tx: mpsc::Sender<Result<DataBatch<R>, IngestError>>) {
        while !self.queue.is_empty() {
            // Reserve the slot first so that in-flight fetches count against
            // the channel capacity.
            let Ok(permit) = tx.reserve().await else {
                debug!("data batch stream dropped");
                return;
            };

            let result = tokio::select! {
                _ = tx.closed() => {
                    debug!("data batch stream dropped while fetching");
                    return;
                }
                result = self.fetch_next() => result,
            };

            let failed = result.is_err();
            permit.send(result);

            if failed {
                return;
            }
        }

        debug!("all batches fetched");
    }

    async fn fetch_next(&mut self) -> Result<DataBatch<R>, IngestError> {
        let batch = self
            .queue
            .front()
            .cloned()
            .ok_or(IngestError::InvalidState)
            .attach_printable("work queue is empty")?;

        let from = batch.range.from();
        let height = self
            .wait_for_height(from)
            .await
            .attach_printable_lazy(|| format!("range: {}", batch.range))?;

        let to = window_end(&batch.range, height, self.batch_size);
        let query = build_batch_query(from, to, &batch.request)
            .attach_printable_lazy(|| format!("range: {}", batch.range))?;

        self.fetch_window(&batch, to, height, &query)
            .await
            .attach_printable_lazy(|| format!("range: {}", batch.range))
            .attach_printable_lazy(|| format!("window: [{from}, {to}]"))
            .attach_printable_lazy(|| format!("archive height: {height}"))
            .attach_printable_lazy(|| format!("query: {query}"))
    }

    /// Wait until the archive has data for `block` and return its height.
    async fn wait_for_height(&self, block: u64) -> Result<u64, IngestError> {
        loop {
            let height = self.archive_height.get();
            if let Some(height) = reached_height(height, block) {
                return Ok(height);
            }

            let status = self
                .gateway
                .status()
                .await
                .change_context(IngestError::Gateway)
                .attach_printable("failed to fetch archive status")?;

            let height = self.archive_height.observe(status.archive_height());
            debug!(height, block, "archive height polled");

            if let Some(height) = reached_height(height, block) {
                return Ok(height);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn fetch_window(
        &mut self,
        batch: &Batch<R>,
        to: u64,
        height: u64,
        query: &str,
    ) -> Result<DataBatch<R>, IngestError> {
        let from = batch.range.from();

        debug!(from, to, height, "fetching batch");
        let fetch_start = Instant::now();
        let response = self
            .gateway
            .query(query)
            .await
            .change_context(IngestError::Gateway)?;
        let fetch_end = Instant::now();

        let response_height = response.status.archive_height();
        if !height_reaches(response_height, height) {
            return Err(IngestError::HeightRegressed)
                .attach_printable_lazy(|| format!("response archive height: {response_height}"));
        }
        self.archive_height.observe(response_height);

        trace!(rows = response.data.len(), "normalizing response");
        let blocks = normalize_rows(response.data, &batch.request)?;

        let last_block = blocks.last().map(|block| block.header.number);
        let achieved = achieved_end(from, to, response.next_block, last_block)?;
        check_blocks(&blocks, from, to, achieved)?;

        self.advance(batch, achieved)?;

        debug!(
            from,
            to = achieved,
            blocks = blocks.len(),
            elapsed = ?fetch_end.duration_since(fetch_start),
            "batch fetched"
        );

        Ok(DataBatch {
            range: from..=achieved,
            request: batch.request.clone(),
            blocks,
            fetch_start,
            fetch_end,
        })
    }

    /// Mark the blocks up to `achieved` as fetched.
    ///
    /// The head of the queue is removed once its range is covered, otherwise
    /// it's replaced by the remaining range.
    fn advance(&mut self, batch: &Batch<R>, achieved: u64) -> Result<(), IngestError> {
        let head = self
            .queue
            .pop_front()
            .ok_or(IngestError::InvalidState)
            .attach_printable("work queue is empty")?;

        if head.range != batch.range {
            return Err(IngestError::InvalidState)
                .attach_printable("head of the work queue changed while fetching")
                .attach_printable_lazy(|| format!("head range: {}", head.range));
        }

        if batch.range.to().is_some_and(|end| achieved >= end) {
            return Ok(());
        }

        let next = achieved
            .checked_add(1)
            .ok_or(IngestError::InvalidState)
            .attach_printable("block number overflow")?;

        let range = BlockRange::new(next, batch.range.to())
            .change_context(IngestError::InvalidState)
            .attach_printable("failed to narrow batch range")?;

        self.queue.push_front(Batch {
            range,
            request: head.request,
        });

        Ok(())
    }
}

/// Last block of the next window: capped by the archive height, the range end
/// and the batch size.
fn window_end(range: &BlockRange, height: u64, batch_size: u64) -> u64 {
    height
        .min(range.end())
        .min(range.from().saturating_add(batch_size))
}

fn reached_height(height: i64, block: u64) -> Option<u64> {
    if height_reaches(height, block) {
        u64::try_from(height).ok()
    } else {
        None
    }
}

/// The last block covered by a response to a query for `[from, to]`.
///
/// The gateway may stop before `to` without reporting a `nextBlock`. In that
/// case only the blocks up to the last one returned are covered.
fn achieved_end(
    from: u64,
    to: u64,
    next_block: Option<u64>,
    last_block: Option<u64>,
) -> Result<u64, IngestError> {
    match (next_block, last_block) {
        (Some(next), _) if next <= from => Err(IngestError::Protocol)
            .attach_printable("gateway made no progress")
            .attach_printable_lazy(|| format!("next block: {next}")),
        (Some(next), _) => Ok((next - 1).min(to)),
        (None, Some(last)) => Ok(last.min(to)),
        (None, None) => Ok(to),
    }
}

fn check_blocks(blocks: &[BlockData], from: u64, to: u64, achieved: u64) -> Result<(), IngestError> {
    let window_size = to - from + 1;
    if blocks.len() as u64 > window_size {
        return Err(IngestError::InvalidState)
            .attach_printable("fetched more blocks than the window size")
            .attach_printable_lazy(|| format!("blocks: {}", blocks.len()));
    }

    if let Some(block) = blocks
        .iter()
        .find(|block| block.header.number < from || block.header.number > achieved)
    {
        return Err(IngestError::InvalidState)
            .attach_printable("fetched block outside of the window")
            .attach_printable_lazy(|| format!("block number: {}", block.header.number))
            .attach_printable_lazy(|| format!("fetched range: [{from}, {achieved}]"));
    }

    Ok(())
}

fn build_batch_query<R: BatchRequest>(from: u64, to: u64, request: &R) -> Result<String, IngestError> {
    let query = BatchQuery {
        from_block: from,
        to_block: Some(to),
        addresses: request.addresses().to_vec(),
        field_selection: FieldSelection::for_request(request),
    };

    serde_json::to_string(&query).change_context(IngestError::Serialization)
}

impl<R> DataBatch<R> {
    pub fn fetch_duration(&self) -> Duration {
        self.fetch_end.duration_since(self.fetch_start)
    }

    pub fn item_count(&self) -> usize {
        self.blocks.iter().map(|block| block.items.len()).sum()
    }
}

impl<R> DataBatchStream<R> {
    /// The highest archive height observed so far, `-1` if none.
    pub fn latest_known_archive_height(&self) -> i64 {
        self.archive_height.get()
    }
}

impl<R> Stream for DataBatchStream<R> {
    type Item = std::result::Result<DataBatch<R>, Report<IngestError>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
