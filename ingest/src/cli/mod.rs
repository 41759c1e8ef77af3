mod gateway;
mod start;
mod status;

use clap::{Parser, Subcommand};
use error_stack::Result;
use tokio_util::sync::CancellationToken;

use crate::error::EvmIngestError;

pub use self::gateway::GatewayArgs;
pub use self::start::{IngestArgs, StartCommand};
pub use self::status::StatusCommand;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest logs and transactions for the given contracts.
    Start(StartCommand),
    /// Print the archive gateway status.
    Status(StatusCommand),
}

impl Cli {
    pub async fn run(self, ct: CancellationToken) -> Result<(), EvmIngestError> {
        match self.command {
            Command::Start(command) => command.run(ct).await,
            Command::Status(command) => command.run().await,
        }
    }
}
