use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

use clap::Args;
use error_stack::{Result, ResultExt};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cli::gateway::GatewayArgs,
    error::EvmIngestError,
    ingestion::{DataBatch, Ingest, IngestOptions, DEFAULT_BATCH_SIZE},
    request::{
        apply_range_bound, merge_batches, AddressRequest, Batch, BlockRange, LogRequest,
        PlainBatchRequest, TransactionRequest,
    },
};

#[derive(Args, Debug)]
pub struct StartCommand {
    #[clap(flatten)]
    gateway: GatewayArgs,
    #[clap(flatten)]
    ingest: IngestArgs,
    /// Contract to ingest, as `address[:topic0,topic0]`. Can be repeated.
    #[arg(long = "address", required = true)]
    addresses: Vec<String>,
    /// Also ingest the transactions sent to the contracts.
    #[arg(long = "transactions")]
    transactions: bool,
    /// Append the ingested blocks to this file, one JSON object per line.
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct IngestArgs {
    /// Maximum number of blocks fetched with a single query.
    #[arg(
        long = "ingest.batch-size",
        env = "EVM_INGEST_BATCH_SIZE",
        default_value_t = DEFAULT_BATCH_SIZE
    )]
    pub ingest_batch_size: u64,
    /// How often to poll the archive while waiting for new blocks, for example "5s" or "500ms".
    #[arg(
        long = "ingest.poll-interval",
        env = "EVM_INGEST_POLL_INTERVAL",
        default_value = "5s"
    )]
    pub ingest_poll_interval: String,
    /// First block to ingest.
    #[arg(
        long = "ingest.from-block",
        env = "EVM_INGEST_FROM_BLOCK",
        default_value = "0"
    )]
    pub ingest_from_block: u64,
    /// Last block to ingest, ingest forever if not set.
    #[arg(long = "ingest.to-block", env = "EVM_INGEST_TO_BLOCK")]
    pub ingest_to_block: Option<u64>,
}

impl StartCommand {
    pub async fn run(self, ct: CancellationToken) -> Result<(), EvmIngestError> {
        info!("starting evm ingestion");
        let client = self.gateway.to_gateway_client()?;
        let batches = self.batches()?;
        let options = self.ingest.to_ingest_options(batches)?;

        let mut writer = match self.json.as_ref() {
            None => None,
            Some(path) => {
                let file = File::options()
                    .create(true)
                    .append(true)
                    .open(path)
                    .change_context(EvmIngestError)
                    .attach_printable("failed to open output file")
                    .attach_printable_lazy(|| format!("path: {}", path.display()))?;
                Some(BufWriter::new(file))
            }
        };

        let ingest = Ingest::new(client, options)
            .change_context(EvmIngestError)
            .attach_printable("failed to create ingestion")?;

        let mut stream = ingest.produce_blocks();

        loop {
            tokio::select! {
                _ = ct.cancelled() => {
                    warn!("ingestion cancelled");
                    break;
                }
                batch = stream.next() => {
                    let Some(batch) = batch else {
                        info!("ingestion finished");
                        break;
                    };

                    let batch = batch
                        .change_context(EvmIngestError)
                        .attach_printable("ingestion failed")?;

                    info!(
                        from = batch.range.start(),
                        to = batch.range.end(),
                        blocks = batch.blocks.len(),
                        items = batch.item_count(),
                        fetch_time = ?batch.fetch_duration(),
                        archive_height = stream.latest_known_archive_height(),
                        "batch ingested"
                    );

                    if let Some(writer) = writer.as_mut() {
                        write_blocks(writer, &batch)?;
                    }
                }
            }
        }

        if let Some(mut writer) = writer {
            writer.flush().change_context(EvmIngestError)?;
        }

        Ok(())
    }

    /// One batch per address filter, merged into non-overlapping batches.
    fn batches(&self) -> Result<Vec<Batch<PlainBatchRequest>>, EvmIngestError> {
        let logs = LogRequest {
            data: true,
            topics: true,
            ..Default::default()
        };

        let batches = self
            .addresses
            .iter()
            .map(|filter| -> Result<Batch<PlainBatchRequest>, EvmIngestError> {
                let filter = AddressRequest::parse(filter).change_context(EvmIngestError)?;
                let mut request = PlainBatchRequest::for_log(filter.address, filter.topics, logs);
                if self.transactions {
                    request = request.with_transactions(TransactionRequest::all());
                }

                Ok(Batch {
                    range: BlockRange::default(),
                    request,
                })
            })
            .collect::<Result<Vec<_>, EvmIngestError>>()?;

        let bound = self.ingest.block_range()?;
        let batches = merge_batches(batches, PlainBatchRequest::merge);
        Ok(apply_range_bound(batches, &bound))
    }
}

impl IngestArgs {
    pub fn to_ingest_options<R>(&self, batches: Vec<Batch<R>>) -> Result<IngestOptions<R>, EvmIngestError> {
        let poll_interval = duration_str::parse_std(&self.ingest_poll_interval).or_else(|err| {
            Err(EvmIngestError)
                .attach_printable("failed to parse poll interval")
                .attach_printable(format!("error: {}", err))
        })?;

        Ok(IngestOptions {
            batches,
            batch_size: self.ingest_batch_size,
            poll_interval,
        })
    }

    pub fn block_range(&self) -> Result<BlockRange, EvmIngestError> {
        BlockRange::new(self.ingest_from_block, self.ingest_to_block)
            .change_context(EvmIngestError)
            .attach_printable("invalid block range")
    }
}

fn write_blocks<W: Write>(writer: &mut W, batch: &DataBatch<PlainBatchRequest>) -> Result<(), EvmIngestError> {
    for block in batch.blocks.iter() {
        serde_json::to_writer(&mut *writer, block)
            .change_context(EvmIngestError)
            .attach_printable("failed to write block")
            .attach_printable_lazy(|| format!("block number: {}", block.header.number))?;
        writeln!(writer).change_context(EvmIngestError)?;
    }

    Ok(())
}
