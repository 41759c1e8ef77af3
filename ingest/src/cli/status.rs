use std::time::Instant;

use clap::Args;
use error_stack::{Result, ResultExt};
use tracing::info;

use crate::{cli::gateway::GatewayArgs, error::EvmIngestError, gateway::ArchiveGateway};

#[derive(Args, Debug)]
pub struct StatusCommand {
    #[clap(flatten)]
    gateway: GatewayArgs,
}

impl StatusCommand {
    pub async fn run(self) -> Result<(), EvmIngestError> {
        let client = self.gateway.to_gateway_client()?;

        let start = Instant::now();
        let status = client
            .status()
            .await
            .change_context(EvmIngestError)
            .attach_printable("failed to fetch gateway status")?;

        info!(
            parquet_block_number = status.parquet_block_number,
            db_max_block_number = status.db_max_block_number,
            db_min_block_number = status.db_min_block_number,
            archive_height = status.archive_height(),
            elapsed = ?start.elapsed(),
            "gateway status"
        );

        Ok(())
    }
}
